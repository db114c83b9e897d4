//! # tidvakt-vnet
//!
//! Time-driven traffic shaping for virtual network links.
//!
//! ### Key Submodules:
//! - `chunk`: the opaque unit of traffic and the downstream `Forward` seam
//! - `deadline_queue`: min-heap of values keyed by release time
//! - `delay`: fixed-delay filter
//! - `token_bucket`: rate and burst limiting filter
//!
//! Both filters take an `Arc<dyn TimeManager>`, so the same code runs on the
//! wall clock and under the simulator.

pub mod chunk;
pub mod deadline_queue;
pub mod delay;
pub mod error;
pub mod token_bucket;

pub use chunk::{Chunk, Datagram, Forward};
pub use deadline_queue::DeadlineQueue;
pub use delay::DelayFilter;
pub use error::FilterError;
pub use token_bucket::TokenBucketFilter;
