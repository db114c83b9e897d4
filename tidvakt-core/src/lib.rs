//! # tidvakt-core
//!
//! Time abstraction shared by production code and deterministic tests.
//!
//! ### Key Submodules:
//! - `time`: the `TimeManager` capability, its real and simulated backends,
//!   timers, tickers and the acknowledged `Tick`
//! - `time::queue`: blocking min-heap of scheduled callbacks
//! - `time::lock`: reentrant reader/writer lock guarding virtual now
//!
//! Code written against `Arc<dyn TimeManager>` runs unchanged on the wall
//! clock and under the discrete-event `Simulator`, where the test decides
//! exactly when time moves.

pub mod time;

pub mod prelude {
    pub use crate::time::*;
}

pub use time::{Clock, Delivery, RealClock, Simulator, Tick, Ticker, TimeManager, Timer};
