//! Shared test helpers: a recording mock sink with a tokio-time clock
//!
//! The mock's clock is driven by tokio's (paused) time, so tests control
//! the "device clock" with `tokio::time::advance` and timer tasks see a
//! consistent view of it.

// Not every test binary uses every helper
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use pcm_streamer::sink::{
    AudioSink, SinkEvent, SinkEventReceiver, SinkEventSender, SubmissionId,
};
use pcm_streamer::Result;

/// One recorded buffer submission
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: SubmissionId,
    pub start_time: f64,
    pub samples: Vec<f32>,
}

#[derive(Default)]
struct MockState {
    submissions: Vec<Submission>,
    gain_sets: Vec<f32>,
    ramps: Vec<(f32, f64)>,
    resets: usize,
    resumes: usize,
}

/// Sink half: handed to the streamer
pub struct MockSink {
    state: Arc<Mutex<MockState>>,
    epoch: tokio::time::Instant,
}

/// Test half: inspection and manual completion injection
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
    events: SinkEventSender,
}

/// Build a mock sink plus the event receiver the streamer consumes.
pub fn mock_sink() -> (MockSink, SinkEventReceiver, MockHandle) {
    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let state = Arc::new(Mutex::new(MockState::default()));

    let sink = MockSink {
        state: Arc::clone(&state),
        epoch: tokio::time::Instant::now(),
    };
    let handle = MockHandle {
        state,
        events: events_tx,
    };
    (sink, events_rx, handle)
}

impl AudioSink for MockSink {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn resume(&mut self) -> Result<()> {
        self.state.lock().unwrap().resumes += 1;
        Ok(())
    }

    fn submit(&mut self, samples: &[f32], start_time: f64, id: SubmissionId) {
        self.state.lock().unwrap().submissions.push(Submission {
            id,
            start_time,
            samples: samples.to_vec(),
        });
    }

    fn set_gain(&mut self, gain: f32) {
        self.state.lock().unwrap().gain_sets.push(gain);
    }

    fn ramp_gain(&mut self, target: f32, duration: f64) {
        self.state.lock().unwrap().ramps.push((target, duration));
    }

    fn reset_output_stage(&mut self) {
        self.state.lock().unwrap().resets += 1;
    }
}

impl MockHandle {
    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn submitted_samples(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .submissions
            .iter()
            .map(|s| s.samples.len())
            .sum()
    }

    pub fn ramps(&self) -> Vec<(f32, f64)> {
        self.state.lock().unwrap().ramps.clone()
    }

    pub fn resets(&self) -> usize {
        self.state.lock().unwrap().resets
    }

    /// Report a submission as fully rendered, like a real sink would.
    pub fn finish(&self, id: SubmissionId) {
        let _ = self.events.send(SinkEvent::Finished(id));
    }
}

/// Let spawned timer and listener tasks run to quiescence.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

/// Encode `count` copies of `value` as little-endian int16 bytes.
pub fn pcm_bytes(count: usize, value: i16) -> Vec<u8> {
    std::iter::repeat(value)
        .take(count)
        .flat_map(|v| v.to_le_bytes())
        .collect()
}
