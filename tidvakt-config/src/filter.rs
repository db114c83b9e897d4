//! Traffic-shaping filter parameters.
//!
//! - Delay filter: fixed per-chunk delay
//! - Token bucket filter: capacity rate and burst ceiling

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

/// One kilobit, in bits.
pub const KBIT: u64 = 1_000;
/// One megabit, in bits.
pub const MBIT: u64 = 1_000 * KBIT;

/// Delay filter configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct DelayFilterConfig {
    /// Fixed delay applied to every chunk (milliseconds).
    #[serde(default = "default_delay_ms")]
    #[validate(range(max = 3_600_000))]
    pub delay_ms: u64,

    /// Wake interval of the scheduling loop while no chunk is queued (milliseconds).
    #[serde(default = "default_idle_poll_ms")]
    #[validate(range(min = 1, max = 3_600_000))]
    pub idle_poll_ms: u64,
}

fn default_delay_ms() -> u64 {
    10
}

fn default_idle_poll_ms() -> u64 {
    60_000
}

impl Default for DelayFilterConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            idle_poll_ms: default_idle_poll_ms(),
        }
    }
}

impl DelayFilterConfig {
    /// Configuration with the given delay and the default idle interval.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay_ms: delay.as_millis() as u64,
            ..Self::default()
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

/// Token bucket filter configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct TokenBucketConfig {
    /// Capacity rate in bits per second.
    #[serde(default = "default_rate_bps")]
    #[validate(range(min = 1))]
    pub rate_bps: u64,

    /// Maximum burst in bits.
    #[serde(default = "default_max_burst_bits")]
    #[validate(range(min = 8))]
    pub max_burst_bits: u64,

    /// Whether the bucket starts full (`true`) or empty.
    #[serde(default = "default_true")]
    pub start_full: bool,
}

fn default_rate_bps() -> u64 {
    MBIT
}

fn default_max_burst_bits() -> u64 {
    8 * KBIT
}

fn default_true() -> bool {
    true
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self {
            rate_bps: default_rate_bps(),
            max_burst_bits: default_max_burst_bits(),
            start_full: default_true(),
        }
    }
}

impl TokenBucketConfig {
    /// Configuration with the given rate and burst, starting full.
    pub fn new(rate_bps: u64, max_burst_bits: u64) -> Self {
        Self {
            rate_bps,
            max_burst_bits,
            start_full: true,
        }
    }
}
