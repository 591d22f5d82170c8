//! Public streamer API and timer plumbing
//!
//! `PcmStreamer` wraps the engine in a mutex and wires up the two classes
//! of external re-entry: cooperative timers (the starvation poll and the
//! one-shot re-arm) and sink completion notifications. Each re-entry locks
//! the engine, performs one synchronous transition, and releases; nothing
//! awaits while holding the lock.
//!
//! At most one timer is armed at a time. Arming a new timer aborts the old
//! one, and stop disarms whatever is scheduled.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::StreamConfig;
use crate::engine::{Engine, Rearm, TimerKind};
use crate::error::Result;
use crate::sink::{AudioSink, SinkEvent, SinkEventReceiver};
use crate::tap::{AudioTap, TapHandler};

/// Streaming PCM player: accepts live byte chunks and plays them gaplessly
/// against the sink's real-time clock.
///
/// Methods must be called from within a tokio runtime (timers and the
/// completion listener are tokio tasks). The completion callback runs on
/// the engine's control context and must not call back into the streamer.
pub struct PcmStreamer {
    engine: Arc<Mutex<Engine>>,
    listener: JoinHandle<()>,
}

impl PcmStreamer {
    /// Create a streamer with production scheduling parameters.
    ///
    /// `events` is the receiver half of the completion-notification channel
    /// whose sender was handed to the sink at construction.
    pub fn new(sink: Box<dyn AudioSink>, events: SinkEventReceiver) -> Self {
        Self::with_config(StreamConfig::default(), sink, events)
    }

    pub fn with_config(
        cfg: StreamConfig,
        sink: Box<dyn AudioSink>,
        mut events: SinkEventReceiver,
    ) -> Self {
        let engine = Arc::new(Mutex::new(Engine::new(cfg, sink)));

        let listener = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    match event {
                        SinkEvent::Finished(id) => {
                            engine.lock().unwrap().handle_finished(id);
                        }
                    }
                }
                debug!("Sink event channel closed; completion listener exiting");
            })
        };

        Self { engine, listener }
    }

    /// Feed a chunk of raw little-endian 16-bit PCM bytes.
    ///
    /// Decoding and frame assembly happen synchronously; the first chunk of
    /// an idle session activates the scheduler.
    pub fn push_pcm16(&self, bytes: &[u8]) {
        let mut engine = self.engine.lock().unwrap();
        if engine.push_pcm16(bytes) {
            let rearm = engine.drain_once();
            arm_timer(&mut engine, &self.engine, rearm);
        }
    }

    /// Resume playback after construction or a stop.
    ///
    /// Restarts the output device (errors propagate, no retry), clears the
    /// stream-complete flag, resets the scheduling cursor, and restores
    /// full gain.
    pub fn resume(&self) -> Result<()> {
        let mut engine = self.engine.lock().unwrap();
        engine.resume()?;
        let rearm = engine.drain_once();
        arm_timer(&mut engine, &self.engine, rearm);
        Ok(())
    }

    /// Hard stop: discard buffered-but-unscheduled audio, disarm timers,
    /// and fade the output to silence. After a fixed delay the output gain
    /// stage is rebuilt so a later resume starts clean.
    pub fn stop(&self) {
        let mut engine = self.engine.lock().unwrap();
        engine.stop();

        // Deadline anchored to the stop call, not the task's first poll
        let sleeper = sleep(engine.config().graph_reset_delay);
        let shared = Arc::clone(&self.engine);
        tokio::spawn(async move {
            sleeper.await;
            shared.lock().unwrap().reset_output_stage();
            debug!("Output gain stage rebuilt after stop");
        });
    }

    /// Graceful end-of-stream: no further chunks will arrive.
    ///
    /// A partial remainder is flushed as one final short frame and drained
    /// immediately; with nothing left to drain the completion callback
    /// fires synchronously.
    pub fn complete(&self) {
        let mut engine = self.engine.lock().unwrap();
        if engine.complete() {
            let rearm = engine.drain_once();
            arm_timer(&mut engine, &self.engine, rearm);
        }
        info!("Stream marked complete");
    }

    /// Register a named processing tap fed from every submitted frame.
    ///
    /// Registering an existing name appends `handler` to that tap's
    /// subscriber list without recreating the tap. A factory failure is
    /// logged and returned; the name stays unregistered.
    pub fn add_tap<F>(&self, name: &str, factory: F, handler: TapHandler) -> Result<()>
    where
        F: FnOnce() -> Result<Box<dyn AudioTap>>,
    {
        self.engine.lock().unwrap().register_tap(name, factory, handler)
    }

    /// Set the callback fired when a completed session has fully drained.
    pub fn set_on_complete(&self, callback: impl FnMut() + Send + 'static) {
        self.engine.lock().unwrap().set_on_complete(Box::new(callback));
    }
}

impl Drop for PcmStreamer {
    fn drop(&mut self) {
        self.listener.abort();
        if let Ok(mut engine) = self.engine.lock() {
            engine.cancel_timer();
        }
    }
}

/// Re-enter the drain loop from a timer, then arm whatever comes next.
fn drain_and_arm(shared: &Arc<Mutex<Engine>>) {
    let mut engine = shared.lock().unwrap();
    if !engine.playing() {
        engine.cancel_timer();
        return;
    }
    let rearm = engine.drain_once();
    arm_timer(&mut engine, shared, rearm);
}

/// Apply a drain pass's re-arm decision, superseding the current timer.
fn arm_timer(engine: &mut Engine, shared: &Arc<Mutex<Engine>>, rearm: Rearm) {
    match rearm {
        Rearm::None => engine.cancel_timer(),

        Rearm::Poll => {
            // Already polling: leave the running interval in place.
            if engine.timer_kind() == Some(TimerKind::Poll) {
                return;
            }
            // Construct the interval before spawning so its tick schedule
            // is anchored to arm time, not to whenever the task is first
            // polled. Start it one period out: the drain that armed us
            // already ran, so there is no immediate first tick to skip.
            let period = engine.config().poll_interval;
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let shared = Arc::clone(shared);
            let handle = tokio::spawn(async move {
                loop {
                    ticks.tick().await;
                    drain_and_arm(&shared);
                }
            });
            engine.set_timer(TimerKind::Poll, handle);
        }

        Rearm::OneShot(delay) => {
            // Fix the deadline at arm time; a sleep created inside the
            // task would start counting from its first poll instead.
            let sleeper = sleep(delay);
            let shared = Arc::clone(shared);
            let handle = tokio::spawn(async move {
                sleeper.await;
                drain_and_arm(&shared);
            });
            engine.set_timer(TimerKind::OneShot, handle);
        }
    }
}
