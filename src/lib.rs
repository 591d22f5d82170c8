//! # PCM Streamer
//!
//! Gapless, low-latency playback of a live, incrementally-arriving raw audio
//! stream (mono 16-bit little-endian PCM at a fixed sample rate).
//!
//! **Purpose:** Accept PCM byte chunks from a network or decode source, slice
//! them into fixed-size frames, and schedule each frame against the output
//! device's real-time clock far enough ahead to avoid underrun but close
//! enough that stop and stream-completion stay responsive.
//!
//! **Architecture:** Single-threaded cooperative scheduling: all state lives
//! in one engine guarded by a mutex, re-entered only by public API calls,
//! tokio timers (starvation poll / one-shot re-arm), and sink completion
//! notifications.

pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod frame;
pub mod player;
pub mod sink;
pub mod tap;

pub use config::StreamConfig;
pub use error::{Error, Result};
pub use frame::Frame;
pub use player::PcmStreamer;
pub use sink::{AudioSink, SinkEvent, SubmissionId};
pub use tap::{AudioTap, TapHandler};
