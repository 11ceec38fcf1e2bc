//! Time-boxed exposure of secrets: a resettable countdown that purges the
//! exposed value when it runs out.

pub mod exposer;
pub mod timer;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use exposer::{SecretExposer, SecretSink};
pub use timer::{ExposureTimer, TimerState};

pub const DEFAULT_CLEAR_AFTER_SECS: u64 = 45;
pub const DEFAULT_TICK_MILLIS: u64 = 1000;

/// Errors produced while exposing a secret.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExposureError {
    /// The sink refused the secret.
    #[error("failed to expose secret: {reason}")]
    Sink { reason: String },
}

/// Countdown configuration.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExposureConfig {
    pub clear_after_secs: u64,
    pub tick_millis: u64,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            clear_after_secs: DEFAULT_CLEAR_AFTER_SECS,
            tick_millis: DEFAULT_TICK_MILLIS,
        }
    }
}

impl ExposureConfig {
    pub fn total(&self) -> Duration {
        Duration::from_secs(self.clear_after_secs)
    }

    /// Tick interval, never shorter than one millisecond.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis.max(1))
    }
}
