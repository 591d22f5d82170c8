//! pcm-streamer demo - main entry point
//!
//! Streams a generated sine tone to the output device in live-paced chunks,
//! exercising the full path: chunk ingest, frame assembly, lookahead
//! scheduling, tap fan-out, and end-of-stream completion.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pcm_streamer::sink::output::CpalSink;
use pcm_streamer::tap::LevelMeterTap;
use pcm_streamer::{PcmStreamer, StreamConfig};

/// Command-line arguments for pcm-streamer
#[derive(Parser, Debug)]
#[command(name = "pcm-streamer")]
#[command(about = "Live PCM stream playback demo")]
#[command(version)]
struct Args {
    /// Output device name (default device if omitted)
    #[arg(short, long, env = "PCM_STREAMER_DEVICE")]
    device: Option<String>,

    /// Tone frequency in Hz
    #[arg(short, long, default_value = "440.0")]
    frequency: f64,

    /// Stream duration in seconds
    #[arg(short = 'n', long, default_value = "3.0")]
    seconds: f64,

    /// Print per-frame level measurements from the level-meter tap
    #[arg(long)]
    levels: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pcm_streamer=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let cfg = StreamConfig::default();

    info!(
        "Streaming {:.0} Hz tone for {:.1}s at {} Hz",
        args.frequency, args.seconds, cfg.sample_rate
    );

    let (sink, events) = CpalSink::open(args.device.clone(), cfg.sample_rate)
        .context("Failed to open audio output")?;
    let streamer = PcmStreamer::with_config(cfg.clone(), Box::new(sink), events);

    let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
    streamer.set_on_complete(move || {
        let _ = done_tx.send(());
    });

    if args.levels {
        streamer.add_tap(
            "level-meter",
            || Ok(Box::new(LevelMeterTap)),
            Box::new(|message| info!("Frame level: {}", message)),
        )?;
    }

    // Feed 50 ms chunks at live pace, the way a network source would
    let chunk_samples = cfg.sample_rate as usize / 20;
    let total_samples = (args.seconds * cfg.sample_rate as f64) as usize;
    let mut phase = 0.0f64;
    let mut sent = 0usize;

    let mut ticker = tokio::time::interval(Duration::from_millis(50));
    while sent < total_samples {
        ticker.tick().await;
        let count = chunk_samples.min(total_samples - sent);
        let chunk = sine_chunk(&mut phase, count, args.frequency, cfg.sample_rate);
        streamer.push_pcm16(&chunk);
        sent += count;
    }

    streamer.complete();
    info!("Stream finished; waiting for playback to drain");

    tokio::time::timeout(Duration::from_secs(10), done_rx.recv())
        .await
        .context("Timed out waiting for playback completion")?;

    info!("Playback complete");
    Ok(())
}

/// Generate one chunk of 16-bit LE sine samples, carrying phase across calls.
fn sine_chunk(phase: &mut f64, samples: usize, frequency: f64, sample_rate: u32) -> Vec<u8> {
    let step = 2.0 * std::f64::consts::PI * frequency / sample_rate as f64;
    let mut bytes = Vec::with_capacity(samples * 2);
    for _ in 0..samples {
        let value = (phase.sin() * 0.4 * 32767.0) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
        *phase += step;
    }
    bytes
}
