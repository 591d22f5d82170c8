//! Streamer configuration
//!
//! Fixed scheduling parameters for the playback pipeline. These are not
//! runtime-negotiated; the defaults below are the production values. Tests
//! override individual fields (smaller frames, shorter windows) to keep
//! fixtures manageable.

use std::time::Duration;

/// Scheduling and buffering parameters for a playback session.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Input and output sample rate in Hz (mono)
    pub sample_rate: u32,

    /// Samples per scheduled frame (320 ms at 24 kHz)
    pub frame_samples: usize,

    /// How far ahead of the device clock the first frame of a session is
    /// scheduled, in seconds. Absorbs network jitter at stream start.
    pub initial_buffer_latency: f64,

    /// How far ahead of the device clock frames are pre-submitted, in
    /// seconds. Bounds how much audio is committed to the device so stop
    /// and gain changes stay responsive.
    pub lookahead_window: f64,

    /// Starvation-poll period: how often the scheduler re-checks for new
    /// data when the queue has run dry but the stream is not complete.
    pub poll_interval: Duration,

    /// Margin subtracted from the one-shot re-arm delay, in milliseconds.
    /// Guarantees the drain loop is re-entered slightly before the
    /// scheduling cursor would otherwise stall.
    pub rearm_margin_ms: f64,

    /// Linear gain fade duration on stop, in seconds. Avoids a click when
    /// already-submitted audio is muted.
    pub gain_fade: f64,

    /// Delay after stop before the output gain stage is rebuilt. Must be
    /// longer than `gain_fade`.
    pub graph_reset_delay: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            frame_samples: 7_680,
            initial_buffer_latency: 0.1,
            lookahead_window: 0.2,
            poll_interval: Duration::from_millis(100),
            rearm_margin_ms: 50.0,
            gain_fade: 0.1,
            graph_reset_delay: Duration::from_millis(200),
        }
    }
}

impl StreamConfig {
    /// Duration of one full frame in seconds
    pub fn frame_duration(&self) -> f64 {
        self.frame_samples as f64 / self.sample_rate as f64
    }
}
