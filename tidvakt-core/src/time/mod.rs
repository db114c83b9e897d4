//! Time capability shared by production code and tests.
//!
//! Components take an `Arc<dyn TimeManager>` and never touch the OS clock
//! directly. In production that is a [`RealClock`]; in tests it is a
//! [`Simulator`], where virtual time only moves when the event loop fires the
//! next scheduled event.

use std::io;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crossbeam::channel::Receiver;
use tidvakt_config::{ClockBackend, ClockConfig};

pub mod lock;
pub mod queue;
mod real;
mod simulator;
pub mod tick;
mod ticker;
mod timer;

pub use real::RealClock;
pub use simulator::Simulator;
pub use tick::{offer, Emission, PendingAck, Tick};

/// How a timer or ticker hands its tick to a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Wait for a receiver, then for its acknowledgment.
    #[default]
    Blocking,
    /// Deliver only to a receiver already waiting; otherwise drop the tick.
    NonBlocking,
}

/// One-shot timer.
pub trait Timer: Send + Sync {
    /// Channel the tick arrives on.
    fn receiver(&self) -> &Receiver<Tick>;

    /// Disarm. Returns `true` if the timer was armed.
    fn stop(&self) -> bool;

    /// Re-arm for `now + duration`, superseding any pending expiry.
    /// Returns `true` if the new expiry is later than the previous one.
    fn reset(&self, duration: Duration) -> bool;
}

/// Periodic ticker. Only one tick is outstanding at a time.
pub trait Ticker: Send + Sync {
    fn receiver(&self) -> &Receiver<Tick>;

    /// Stop ticking. Returns `false` if already stopped.
    fn stop(&self) -> bool;
}

/// Source of time, timers and tickers.
pub trait TimeManager: Send + Sync {
    fn now(&self) -> SystemTime;

    /// Time elapsed since `t`, zero if `t` is in the future.
    fn since(&self, t: SystemTime) -> Duration {
        self.now().duration_since(t).unwrap_or_default()
    }

    /// Time left until `t`, zero if `t` has passed.
    fn until(&self, t: SystemTime) -> Duration {
        t.duration_since(self.now()).unwrap_or_default()
    }

    /// Block until the clock reaches `now + duration` and return that instant.
    fn sleep(&self, duration: Duration) -> SystemTime;

    fn new_timer(&self, duration: Duration, delivery: Delivery) -> Box<dyn Timer>;

    /// # Panics
    ///
    /// Panics if `period` is zero.
    fn new_ticker(&self, period: Duration, delivery: Delivery) -> Box<dyn Ticker>;

    /// Channel of a one-shot timer. The timer keeps running after its handle
    /// is gone.
    fn after(&self, duration: Duration, delivery: Delivery) -> Receiver<Tick> {
        self.new_timer(duration, delivery).receiver().clone()
    }

    /// Snapshot of now. Under simulation, time does not advance until the
    /// returned tick is acknowledged.
    fn freeze_now(&self) -> Tick;
}

/// Configured clock backend.
#[derive(Debug, Clone)]
pub enum Clock {
    Real(RealClock),
    Simulated(Simulator),
}

impl Default for Clock {
    fn default() -> Self {
        Clock::Real(RealClock)
    }
}

impl Clock {
    pub fn from_config(config: &ClockConfig) -> Self {
        match config.backend {
            ClockBackend::Real => Clock::Real(RealClock),
            ClockBackend::Simulated => Clock::Simulated(Simulator::new(config.start_time())),
        }
    }

    /// Starts the simulator's event loop. No-op for the real clock.
    pub fn start(&self) -> io::Result<()> {
        match self {
            Clock::Real(_) => Ok(()),
            Clock::Simulated(sim) => sim.start(),
        }
    }

    /// Stops the simulator. Always `false` for the real clock.
    pub fn stop(&self) -> bool {
        match self {
            Clock::Real(_) => false,
            Clock::Simulated(sim) => sim.stop(),
        }
    }

    pub fn manager(&self) -> Arc<dyn TimeManager> {
        match self {
            Clock::Real(clock) => Arc::new(*clock),
            Clock::Simulated(sim) => Arc::new(sim.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    #[test]
    fn default_clock_is_real() {
        let clock = Clock::default();
        assert!(matches!(clock, Clock::Real(_)));
        clock.start().unwrap();
        assert!(!clock.stop());
    }

    #[test]
    fn simulated_clock_from_config() {
        let config = ClockConfig {
            backend: ClockBackend::Simulated,
            start_unix_ms: 2_000,
        };
        let clock = Clock::from_config(&config);
        let time = clock.manager();
        assert_eq!(time.now(), UNIX_EPOCH + Duration::from_secs(2));

        clock.start().unwrap();
        assert_eq!(
            time.sleep(Duration::from_millis(500)),
            UNIX_EPOCH + Duration::from_millis(2_500)
        );
        assert!(clock.stop());
        assert!(!clock.stop());
    }
}
