//! Audio sink interface
//!
//! The output device is an external collaborator: it owns the real-time
//! clock and performs sample-accurate rendering of submitted buffers. The
//! scheduler only needs the narrow contract below: read the clock, submit a
//! buffer with a start time, control the output gain stage, and hear back
//! when a submission finishes playing.
//!
//! Completion notifications travel over a channel handed to the sink at
//! construction. Every submission carries a generation token so a stale
//! notification from a superseded submission can be recognized and ignored.

pub mod output;

use tokio::sync::mpsc;

use crate::error::Result;

/// Generation token attached to every buffer submission.
///
/// Tokens are unique within a streamer's lifetime; the engine honors a
/// completion notification only if its token matches the currently-armed
/// end-of-queue marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmissionId(pub u64);

/// Notification from the sink back to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    /// The identified submission has been fully rendered.
    Finished(SubmissionId),
}

/// Sender half of the sink's completion-notification channel.
pub type SinkEventSender = mpsc::UnboundedSender<SinkEvent>;

/// Receiver half, consumed by the streamer's listener task.
pub type SinkEventReceiver = mpsc::UnboundedReceiver<SinkEvent>;

/// Contract the scheduler requires of an output device.
///
/// All methods are synchronous: the engine calls them while holding its
/// lock, so implementations must not block for long. `resume` may wait for
/// device confirmation; its errors propagate to the caller unretried.
pub trait AudioSink: Send {
    /// Current device clock time in seconds.
    ///
    /// Monotonic while the device is running; advances with rendered
    /// output, not wall time.
    fn now(&self) -> f64;

    /// Resume the device if suspended. Errors propagate to the caller.
    fn resume(&mut self) -> Result<()>;

    /// Submit samples for playback starting at `start_time` (device clock
    /// seconds). The sink copies the samples; a `Finished` event carrying
    /// `id` is emitted once the buffer has been fully rendered.
    fn submit(&mut self, samples: &[f32], start_time: f64, id: SubmissionId);

    /// Set the output gain immediately, cancelling any ramp in progress.
    fn set_gain(&mut self, gain: f32);

    /// Ramp the output gain linearly to `target` over `duration` seconds.
    fn ramp_gain(&mut self, target: f32, duration: f64);

    /// Rebuild the output gain stage: unity gain, no ramp, all pending
    /// submissions discarded. Invoked a fixed delay after stop so a
    /// subsequent resume starts from a clean stage.
    fn reset_output_stage(&mut self);
}
