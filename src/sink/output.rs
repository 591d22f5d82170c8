//! Audio output using cpal
//!
//! Production [`AudioSink`] implementation. A dedicated audio thread owns
//! the cpal stream (streams are not `Send`); the handle communicates with
//! it through shared state and a small command channel.
//!
//! The device clock is frame-counted: `now()` is rendered frames divided by
//! the sample rate, so it advances with audible output, not wall time. The
//! render callback mixes every scheduled buffer whose start frame has been
//! reached, applies the gain stage (immediate level plus linear ramp), and
//! emits a `Finished` event once a buffer has been fully rendered.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::sink::{AudioSink, SinkEvent, SinkEventReceiver, SinkEventSender, SubmissionId};

/// A buffer committed to the device, pinned to a start frame.
struct ScheduledBuffer {
    id: SubmissionId,
    start_frame: u64,
    samples: Vec<f32>,
}

/// Linear gain ramp between two frame positions.
struct GainRamp {
    from: f32,
    to: f32,
    start_frame: u64,
    end_frame: u64,
}

/// Output gain stage: an immediate level plus an optional ramp.
struct GainStage {
    level: f32,
    ramp: Option<GainRamp>,
}

impl GainStage {
    fn unity() -> Self {
        Self { level: 1.0, ramp: None }
    }

    fn level_at(&self, frame: u64) -> f32 {
        match &self.ramp {
            None => self.level,
            Some(ramp) => {
                if frame <= ramp.start_frame {
                    ramp.from
                } else if frame >= ramp.end_frame {
                    ramp.to
                } else {
                    let progress = (frame - ramp.start_frame) as f32
                        / (ramp.end_frame - ramp.start_frame) as f32;
                    ramp.from + (ramp.to - ramp.from) * progress
                }
            }
        }
    }

    /// Collapse a finished ramp into the steady level.
    fn advance_to(&mut self, frame: u64) {
        if let Some(ramp) = &self.ramp {
            if frame >= ramp.end_frame {
                self.level = ramp.to;
                self.ramp = None;
            }
        }
    }
}

/// State shared between the sink handle and the render callback.
struct SinkShared {
    frames_rendered: AtomicU64,
    schedule: Mutex<Vec<ScheduledBuffer>>,
    gain: Mutex<GainStage>,
}

enum SinkCommand {
    /// Start (or restart) the stream; the reply carries the device's answer.
    Play(std_mpsc::Sender<Result<()>>),
    Shutdown,
}

/// cpal-backed audio sink.
///
/// Created with [`CpalSink::open`], which also returns the completion-event
/// receiver to hand to the streamer.
pub struct CpalSink {
    shared: Arc<SinkShared>,
    control: std_mpsc::Sender<SinkCommand>,
    sample_rate: u32,
}

impl CpalSink {
    /// Open an output device and start its stream.
    ///
    /// `device_name` of `None` selects the default device; a named device
    /// that cannot be found falls back to the default with a warning. Fails
    /// if no device offers an f32 configuration at `sample_rate`.
    pub fn open(
        device_name: Option<String>,
        sample_rate: u32,
    ) -> Result<(Self, SinkEventReceiver)> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();

        let shared = Arc::new(SinkShared {
            frames_rendered: AtomicU64::new(0),
            schedule: Mutex::new(Vec::new()),
            gain: Mutex::new(GainStage::unity()),
        });

        let thread_shared = Arc::clone(&shared);
        std::thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                audio_thread(
                    device_name,
                    sample_rate,
                    thread_shared,
                    events_tx,
                    control_rx,
                    ready_tx,
                );
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn audio thread: {}", e)))?;

        // Wait for the thread to open the device and start the stream
        ready_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Audio thread exited during startup".to_string()))??;

        Ok((
            Self {
                shared,
                control: control_tx,
                sample_rate,
            },
            events_rx,
        ))
    }
}

impl AudioSink for CpalSink {
    fn now(&self) -> f64 {
        self.shared.frames_rendered.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn resume(&mut self) -> Result<()> {
        let (reply_tx, reply_rx) = std_mpsc::channel();
        self.control
            .send(SinkCommand::Play(reply_tx))
            .map_err(|_| Error::AudioOutput("Audio thread has exited".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Audio thread dropped resume reply".to_string()))?
    }

    fn submit(&mut self, samples: &[f32], start_time: f64, id: SubmissionId) {
        let start_frame = (start_time * self.sample_rate as f64).round() as u64;
        let mut schedule = self.shared.schedule.lock().unwrap();
        schedule.push(ScheduledBuffer {
            id,
            start_frame,
            samples: samples.to_vec(),
        });
    }

    fn set_gain(&mut self, gain: f32) {
        let mut stage = self.shared.gain.lock().unwrap();
        stage.level = gain;
        stage.ramp = None;
    }

    fn ramp_gain(&mut self, target: f32, duration: f64) {
        let now_frame = self.shared.frames_rendered.load(Ordering::Acquire);
        let ramp_frames = ((duration * self.sample_rate as f64).round() as u64).max(1);

        let mut stage = self.shared.gain.lock().unwrap();
        let from = stage.level_at(now_frame);
        stage.ramp = Some(GainRamp {
            from,
            to: target,
            start_frame: now_frame,
            end_frame: now_frame + ramp_frames,
        });
    }

    fn reset_output_stage(&mut self) {
        self.shared.schedule.lock().unwrap().clear();
        *self.shared.gain.lock().unwrap() = GainStage::unity();
        debug!("Output gain stage reset to unity");
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        let _ = self.control.send(SinkCommand::Shutdown);
    }
}

/// Body of the dedicated audio thread: owns the cpal stream end to end.
fn audio_thread(
    device_name: Option<String>,
    sample_rate: u32,
    shared: Arc<SinkShared>,
    events: SinkEventSender,
    control: std_mpsc::Receiver<SinkCommand>,
    ready: std_mpsc::Sender<Result<()>>,
) {
    let stream = match build_stream(device_name, sample_rate, shared, events) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready.send(Err(Error::AudioOutput(format!(
            "Failed to start stream: {}",
            e
        ))));
        return;
    }
    let _ = ready.send(Ok(()));

    // Keep the stream alive until the handle shuts us down
    while let Ok(command) = control.recv() {
        match command {
            SinkCommand::Play(reply) => {
                let result = stream
                    .play()
                    .map_err(|e| Error::AudioOutput(format!("Failed to resume stream: {}", e)));
                let _ = reply.send(result);
            }
            SinkCommand::Shutdown => break,
        }
    }
    debug!("Audio output thread exiting");
}

fn build_stream(
    device_name: Option<String>,
    sample_rate: u32,
    shared: Arc<SinkShared>,
    events: SinkEventSender,
) -> Result<cpal::Stream> {
    let device = select_device(device_name)?;
    let config = select_config(&device, sample_rate)?;
    let channels = config.channels as usize;

    debug!(
        "Audio config: sample_rate={}, channels={}, buffer_size={:?}",
        config.sample_rate.0, config.channels, config.buffer_size
    );

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _| {
                render(&shared, &events, channels, data);
            },
            |e| {
                error!("Audio stream error: {}", e);
            },
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build output stream: {}", e)))?;

    Ok(stream)
}

/// Open the requested device, falling back to the default on failure.
fn select_device(device_name: Option<String>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = device_name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;

        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name.as_str())) {
            info!("Found requested audio device: {}", name);
            return Ok(device);
        }

        warn!(
            "Requested device '{}' not found, falling back to default device",
            name
        );
    }

    let device = host.default_output_device().ok_or_else(|| {
        Error::AudioOutput("No default output device available".to_string())
    })?;
    info!(
        "Using audio device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    Ok(device)
}

/// Pick an f32 output configuration supporting the stream's sample rate.
///
/// No resampling happens anywhere in this crate, so a device that cannot
/// run at the stream rate is an error rather than a silent pitch shift.
fn select_config(device: &Device, sample_rate: u32) -> Result<StreamConfig> {
    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

    let matching = supported
        .filter(|config| {
            config.sample_format() == SampleFormat::F32
                && config.min_sample_rate().0 <= sample_rate
                && config.max_sample_rate().0 >= sample_rate
        })
        .min_by_key(|config| config.channels());

    match matching {
        Some(config) => Ok(config
            .with_sample_rate(cpal::SampleRate(sample_rate))
            .config()),
        None => Err(Error::AudioOutput(format!(
            "Device has no f32 output configuration at {} Hz",
            sample_rate
        ))),
    }
}

/// Render one callback quantum: mix scheduled buffers, apply gain, emit
/// completion events for buffers that finished inside this quantum.
fn render(shared: &SinkShared, events: &SinkEventSender, channels: usize, out: &mut [f32]) {
    let frames = out.len() / channels;
    let base = shared.frames_rendered.load(Ordering::Acquire);

    let mut schedule = shared.schedule.lock().unwrap();
    let mut gain = shared.gain.lock().unwrap();

    for i in 0..frames {
        let t = base + i as u64;
        let mut sample = 0.0f32;

        for buffer in schedule.iter() {
            if t >= buffer.start_frame {
                let index = (t - buffer.start_frame) as usize;
                if index < buffer.samples.len() {
                    sample += buffer.samples[index];
                }
            }
        }

        let value = (sample * gain.level_at(t)).clamp(-1.0, 1.0);
        for c in 0..channels {
            out[i * channels + c] = value;
        }
    }

    let end = base + frames as u64;
    gain.advance_to(end);

    schedule.retain(|buffer| {
        let finished = end >= buffer.start_frame + buffer.samples.len() as u64;
        if finished {
            let _ = events.send(SinkEvent::Finished(buffer.id));
        }
        !finished
    });

    shared.frames_rendered.store(end, Ordering::Release);
}
