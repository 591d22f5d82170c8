//! Processing-tap bridge
//!
//! Named downstream analysis nodes attached to the playback path. Every
//! frame the scheduler submits is fanned out to each registered tap;
//! messages a tap emits are relayed to every handler registered under that
//! tap's name, in registration order.
//!
//! Registering an existing name appends another handler to the existing
//! tap rather than recreating it, so multiple subscribers share one node.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{Error, Result};

/// A downstream analysis node fed from the playback path.
///
/// `process` receives every submitted frame's samples and may emit any
/// number of JSON messages, which the registry relays to the handlers
/// registered under this tap's name.
pub trait AudioTap: Send {
    fn process(&mut self, samples: &[f32], sample_rate: u32) -> Vec<Value>;
}

/// Handler invoked for every message a tap emits.
pub type TapHandler = Box<dyn FnMut(&Value) + Send>;

struct TapEntry {
    tap: Box<dyn AudioTap>,
    handlers: Vec<TapHandler>,
}

/// Registry mapping tap names to live taps and their message handlers.
///
/// Owned by the engine, so its lifetime is scoped to the playback session
/// rather than hanging off an external side table.
#[derive(Default)]
pub struct TapRegistry {
    taps: HashMap<String, TapEntry>,
}

impl TapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `name`, constructing the tap via `factory`
    /// if this is the first registration for that name.
    ///
    /// A factory failure leaves the name unregistered and propagates to the
    /// caller; it never affects playback.
    pub fn register<F>(&mut self, name: &str, factory: F, handler: TapHandler) -> Result<()>
    where
        F: FnOnce() -> Result<Box<dyn AudioTap>>,
    {
        if let Some(entry) = self.taps.get_mut(name) {
            entry.handlers.push(handler);
            debug!("Added handler to existing tap '{}' ({} total)", name, entry.handlers.len());
            return Ok(());
        }

        let tap = factory().map_err(|e| {
            error!("Failed to load processing tap '{}': {}", name, e);
            e
        })?;

        self.taps.insert(
            name.to_string(),
            TapEntry {
                tap,
                handlers: vec![handler],
            },
        );
        debug!("Registered processing tap '{}'", name);
        Ok(())
    }

    /// Fan a submitted frame out to every registered tap and relay emitted
    /// messages to that tap's handlers in registration order.
    pub fn fan_out(&mut self, samples: &[f32], sample_rate: u32) {
        for entry in self.taps.values_mut() {
            let messages = entry.tap.process(samples, sample_rate);
            for message in &messages {
                for handler in entry.handlers.iter_mut() {
                    handler(message);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }
}

/// Built-in level-meter tap: emits one RMS/peak measurement per frame.
pub struct LevelMeterTap;

/// Message emitted by [`LevelMeterTap`] for every processed frame.
#[derive(Debug, Serialize)]
pub struct LevelMessage {
    pub rms: f32,
    pub peak: f32,
}

impl AudioTap for LevelMeterTap {
    fn process(&mut self, samples: &[f32], _sample_rate: u32) -> Vec<Value> {
        if samples.is_empty() {
            return Vec::new();
        }

        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        let message = LevelMessage {
            rms: (sum_sq / samples.len() as f32).sqrt(),
            peak: samples.iter().fold(0.0f32, |p, s| p.max(s.abs())),
        };

        match serde_json::to_value(&message) {
            Ok(value) => vec![value],
            Err(e) => {
                error!("Level meter message serialization failed: {}", e);
                Vec::new()
            }
        }
    }
}

/// Build the error a [`TapRegistry::register`] factory returns when the
/// underlying processing node fails to load.
pub fn tap_load_error(name: &str, reason: impl Into<String>) -> Error {
    Error::TapLoad {
        name: name.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingTap {
        frames: usize,
    }

    impl AudioTap for CountingTap {
        fn process(&mut self, _samples: &[f32], _sample_rate: u32) -> Vec<Value> {
            self.frames += 1;
            vec![serde_json::json!({ "frame": self.frames })]
        }
    }

    #[test]
    fn test_register_and_fan_out() {
        let mut registry = TapRegistry::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let seen_clone = Arc::clone(&seen);
        registry
            .register(
                "counter",
                || Ok(Box::new(CountingTap { frames: 0 })),
                Box::new(move |_msg| {
                    seen_clone.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        registry.fan_out(&[0.0; 8], 24_000);
        registry.fan_out(&[0.0; 8], 24_000);

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_second_registration_appends_handler() {
        let mut registry = TapRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let first_clone = Arc::clone(&first);
        registry
            .register(
                "counter",
                || Ok(Box::new(CountingTap { frames: 0 })),
                Box::new(move |_| {
                    first_clone.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        // Second registration must not recreate the tap
        let second_clone = Arc::clone(&second);
        registry
            .register(
                "counter",
                || panic!("factory must not run for an existing tap"),
                Box::new(move |_| {
                    second_clone.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        registry.fan_out(&[0.0; 4], 24_000);

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_factory_failure_leaves_name_unregistered() {
        let mut registry = TapRegistry::new();

        let result = registry.register(
            "broken",
            || Err(tap_load_error("broken", "module load failed")),
            Box::new(|_| {}),
        );

        assert!(result.is_err());
        assert!(registry.is_empty());

        // A later registration with a working factory succeeds
        registry
            .register(
                "broken",
                || Ok(Box::new(CountingTap { frames: 0 })),
                Box::new(|_| {}),
            )
            .unwrap();
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_level_meter_measures_frame() {
        let mut tap = LevelMeterTap;
        let messages = tap.process(&[0.5, -0.5, 0.5, -0.5], 24_000);

        assert_eq!(messages.len(), 1);
        let rms = messages[0]["rms"].as_f64().unwrap();
        let peak = messages[0]["peak"].as_f64().unwrap();
        assert!((rms - 0.5).abs() < 1e-6);
        assert!((peak - 0.5).abs() < 1e-6);
    }
}
