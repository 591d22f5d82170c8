//! Playback engine - streaming buffer and lookahead scheduler
//!
//! The engine is the single state object behind the public streamer API:
//! frame assembly, the FIFO playback queue, the scheduling cursor, the
//! end-of-queue marker, and the session flags all live here, and every
//! transition is one synchronous method call made while holding the
//! engine's lock.
//!
//! `drain_once` is the core transition: it submits queued frames against
//! the sink clock up to the lookahead window and reports which timer (if
//! any) should re-invoke it. Timer ownership also lives here so stop can
//! disarm whatever is currently scheduled.

use std::collections::VecDeque;

use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::config::StreamConfig;
use crate::decode::decode_pcm16;
use crate::error::Result;
use crate::frame::{Frame, FrameAssembler};
use crate::sink::{AudioSink, SubmissionId};
use crate::tap::{AudioTap, TapHandler, TapRegistry};

/// Timer the scheduler wants armed after a drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rearm {
    /// Nothing left and the stream is complete: cancel any timer.
    None,

    /// Starved but more data may arrive: ensure the periodic poll is armed.
    Poll,

    /// Data pending beyond the lookahead window: re-enter `drain` shortly
    /// before the cursor would stall.
    OneShot(std::time::Duration),
}

/// Which kind of timer currently owns the re-arm slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    Poll,
    OneShot,
}

struct ArmedTimer {
    kind: TimerKind,
    handle: JoinHandle<()>,
}

/// Callback fired when a completed session has fully drained.
pub type CompletionCallback = Box<dyn FnMut() + Send>;

/// Scheduler and lifecycle state for one playback session.
pub(crate) struct Engine {
    cfg: StreamConfig,
    sink: Box<dyn AudioSink>,
    assembler: FrameAssembler,
    queue: VecDeque<Frame>,

    /// Device-clock time at which the next not-yet-submitted frame should
    /// start. Non-decreasing within a session; reset only by resume, stop,
    /// and first-ingest activation.
    cursor: f64,

    playing: bool,
    stream_complete: bool,

    next_submission: u64,

    /// At most one outstanding submission is designated to fire the
    /// completion callback when it finishes with the queue still empty.
    /// Arming a new marker disarms the previous one; stale completion
    /// notifications are filtered by token comparison.
    end_of_queue: Option<SubmissionId>,

    timer: Option<ArmedTimer>,
    taps: TapRegistry,
    on_complete: Option<CompletionCallback>,
}

impl Engine {
    pub(crate) fn new(cfg: StreamConfig, sink: Box<dyn AudioSink>) -> Self {
        let assembler = FrameAssembler::new(cfg.frame_samples);
        Self {
            cfg,
            sink,
            assembler,
            queue: VecDeque::new(),
            cursor: 0.0,
            playing: false,
            stream_complete: false,
            next_submission: 0,
            end_of_queue: None,
            timer: None,
            taps: TapRegistry::new(),
            on_complete: None,
        }
    }

    pub(crate) fn config(&self) -> &StreamConfig {
        &self.cfg
    }

    pub(crate) fn playing(&self) -> bool {
        self.playing
    }

    pub(crate) fn set_on_complete(&mut self, callback: CompletionCallback) {
        self.on_complete = Some(callback);
    }

    /// Decode a raw chunk, assemble frames, and report whether this ingest
    /// activated the scheduler (caller must then invoke `drain_once`).
    pub(crate) fn push_pcm16(&mut self, bytes: &[u8]) -> bool {
        let samples = decode_pcm16(bytes);
        for frame in self.assembler.ingest(&samples) {
            self.queue.push_back(frame);
        }

        if self.playing {
            return false;
        }

        self.playing = true;
        self.cursor = self.sink.now() + self.cfg.initial_buffer_latency;
        debug!(
            "Scheduler activated: cursor={:.3}s, {} frame(s) queued, {} sample(s) buffered",
            self.cursor,
            self.queue.len(),
            self.assembler.remainder_len()
        );
        true
    }

    /// One drain pass: submit queued frames up to the lookahead window and
    /// decide which timer should re-enter the loop.
    pub(crate) fn drain_once(&mut self) -> Rearm {
        loop {
            let now = self.sink.now();
            if self.cursor >= now + self.cfg.lookahead_window {
                break;
            }
            let Some(frame) = self.queue.pop_front() else {
                break;
            };

            // Never schedule in the past
            let start_time = self.cursor.max(now);
            let id = SubmissionId(self.next_submission);
            self.next_submission += 1;

            self.sink.submit(frame.samples(), start_time, id);
            self.taps.fan_out(frame.samples(), self.cfg.sample_rate);

            trace!(
                "Submitted frame {:?}: start={:.3}s len={} cursor->{:.3}s",
                id,
                start_time,
                frame.len(),
                start_time + frame.duration(self.cfg.sample_rate)
            );
            self.cursor = start_time + frame.duration(self.cfg.sample_rate);

            if self.queue.is_empty() {
                // This submission becomes the end-of-queue marker; any
                // previously armed marker is superseded.
                self.end_of_queue = Some(id);
            }
        }

        if self.queue.is_empty() {
            // A sub-frame remainder is not submittable on its own; wait for
            // more data (or a flush) on the poll rather than spinning a
            // zero-delay one-shot once the clock passes the cursor.
            if self.stream_complete && self.assembler.is_empty() {
                debug!("Stream complete and fully drained; scheduler deactivating");
                self.playing = false;
                Rearm::None
            } else {
                Rearm::Poll
            }
        } else {
            let now = self.sink.now();
            let delay_ms = ((self.cursor - now) * 1000.0 - self.cfg.rearm_margin_ms).max(0.0);
            Rearm::OneShot(std::time::Duration::from_secs_f64(delay_ms / 1000.0))
        }
    }

    /// Handle a completion notification from the sink.
    ///
    /// Fires the completion callback only if the token matches the armed
    /// end-of-queue marker and the queue is still empty at this moment;
    /// anything else is a stale notification and is ignored.
    pub(crate) fn handle_finished(&mut self, id: SubmissionId) {
        if self.end_of_queue == Some(id) && self.queue.is_empty() {
            self.end_of_queue = None;
            debug!("End-of-queue submission {:?} finished; firing completion", id);
            self.fire_completion();
        }
    }

    /// Resume playback: restart the device, reset the cursor, and restore
    /// full gain. Device errors propagate unretried.
    pub(crate) fn resume(&mut self) -> Result<()> {
        self.sink.resume()?;
        self.stream_complete = false;
        self.playing = true;
        self.cursor = self.sink.now() + self.cfg.initial_buffer_latency;
        self.sink.set_gain(1.0);
        info!("Playback resumed: cursor={:.3}s", self.cursor);
        Ok(())
    }

    /// Hard stop: discard all buffered-but-unscheduled audio, disarm the
    /// timer and marker, and fade the output to silence. Already-submitted
    /// playback cannot be recalled; the fade mutes it without a click.
    pub(crate) fn stop(&mut self) {
        let discarded_frames = self.queue.len();
        let discarded_samples = self.assembler.remainder_len();

        self.playing = false;
        self.stream_complete = true;
        self.queue.clear();
        self.assembler.clear();
        self.end_of_queue = None;
        self.cursor = self.sink.now();
        self.cancel_timer();
        self.sink.ramp_gain(0.0, self.cfg.gain_fade);

        info!(
            "Playback stopped: discarded {} queued frame(s), {} buffered sample(s)",
            discarded_frames, discarded_samples
        );
    }

    /// Graceful end-of-stream: no further chunks will arrive.
    ///
    /// A partial remainder is flushed as one final short frame; returns
    /// `true` if the caller should drain immediately. With nothing left to
    /// drain and no submission still in flight the completion callback
    /// fires synchronously; an armed end-of-queue marker fires it instead.
    pub(crate) fn complete(&mut self) -> bool {
        self.stream_complete = true;

        if let Some(frame) = self.assembler.flush() {
            debug!("Stream complete: flushing final short frame of {} samples", frame.len());
            self.queue.push_back(frame);
            return self.playing;
        }

        if self.queue.is_empty() {
            // An armed marker means the final submission is still playing;
            // it fires completion when it finishes. Firing here as well
            // would complete the session twice.
            if self.end_of_queue.is_none() {
                debug!("Stream complete with nothing to drain; firing completion");
                self.fire_completion();
            }
        }
        false
    }

    /// Rebuild the sink's output gain stage (delayed stop follow-up).
    pub(crate) fn reset_output_stage(&mut self) {
        self.sink.reset_output_stage();
    }

    pub(crate) fn register_tap<F>(
        &mut self,
        name: &str,
        factory: F,
        handler: TapHandler,
    ) -> Result<()>
    where
        F: FnOnce() -> Result<Box<dyn AudioTap>>,
    {
        self.taps.register(name, factory, handler)
    }

    pub(crate) fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }
    }

    pub(crate) fn timer_kind(&self) -> Option<TimerKind> {
        self.timer.as_ref().map(|t| t.kind)
    }

    pub(crate) fn set_timer(&mut self, kind: TimerKind, handle: JoinHandle<()>) {
        self.cancel_timer();
        self.timer = Some(ArmedTimer { kind, handle });
    }

    fn fire_completion(&mut self) {
        if let Some(callback) = self.on_complete.as_mut() {
            callback();
        }
    }

    #[cfg(test)]
    pub(crate) fn queued_frames(&self) -> usize {
        self.queue.len()
    }

    #[cfg(test)]
    pub(crate) fn remainder_len(&self) -> usize {
        self.assembler.remainder_len()
    }

    #[cfg(test)]
    pub(crate) fn cursor(&self) -> f64 {
        self.cursor
    }

    #[cfg(test)]
    pub(crate) fn end_of_queue(&self) -> Option<SubmissionId> {
        self.end_of_queue
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}
