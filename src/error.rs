//! Error types for pcm-streamer
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Decode faults are never surfaced here: a malformed sample
//! pair degrades to silence locally and playback continues.

use thiserror::Error;

/// Main error type for pcm-streamer
#[derive(Error, Debug)]
pub enum Error {
    /// Audio output device errors (open, resume, configuration)
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Processing tap failed to load or instantiate
    #[error("Tap load error for '{name}': {reason}")]
    TapLoad { name: String, reason: String },
}

/// Convenience Result type using pcm-streamer Error
pub type Result<T> = std::result::Result<T, Error>;
