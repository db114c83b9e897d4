//! Clock backend selection.
//!
//! Chooses between the operating system clock and the discrete-event
//! simulator. The real clock is the default; tests opt into simulated time.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Which time source drives timers, tickers and filters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockBackend {
    /// Operating system clock.
    #[default]
    Real,
    /// Virtual time advanced only by the simulator's event loop.
    Simulated,
}

/// Clock configuration.
#[derive(Debug, Default, Serialize, Deserialize, Validate, Clone)]
pub struct ClockConfig {
    /// Time source backend.
    #[serde(default)]
    pub backend: ClockBackend,

    /// Initial virtual time in milliseconds since the Unix epoch.
    /// Ignored by the real backend.
    #[serde(default)]
    pub start_unix_ms: u64,
}

impl ClockConfig {
    /// Instant the simulated clock starts at.
    pub fn start_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.start_unix_ms)
    }
}
