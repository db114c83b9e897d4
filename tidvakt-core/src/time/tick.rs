//! Timestamped emissions paired with an acknowledgment.
//!
//! A producer hands a [`Tick`] to a consumer over a zero-capacity channel and
//! then waits on the matching [`PendingAck`] until the consumer calls
//! [`Tick::done`]. Dropping a tick acknowledges it as well, so a consumer that
//! bails out early never wedges the producer.

use std::fmt;
use std::time::SystemTime;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use super::lock::ReadGuard;
use super::Delivery;

/// A timestamped emission that must be acknowledged before the producer's
/// step is complete.
pub struct Tick {
    time: SystemTime,
    ack: Ack,
}

enum Ack {
    /// Nothing waits on the acknowledgment.
    Detached,
    /// Producer blocks on the other end of this one-slot channel.
    Signal(Sender<()>),
    /// Frozen read of virtual now; releasing it lets time advance.
    Release(ReadGuard<SystemTime>),
}

impl Tick {
    /// Tick whose acknowledgment is trivially satisfied.
    pub fn detached(time: SystemTime) -> Self {
        Self {
            time,
            ack: Ack::Detached,
        }
    }

    /// Tick plus the handle its producer waits on.
    pub fn with_ack(time: SystemTime) -> (Self, PendingAck) {
        let (tx, rx) = channel::bounded(1);
        (
            Self {
                time,
                ack: Ack::Signal(tx),
            },
            PendingAck(rx),
        )
    }

    /// Tick that keeps virtual now frozen until acknowledged.
    pub(crate) fn frozen(guard: ReadGuard<SystemTime>) -> Self {
        Self {
            time: *guard,
            ack: Ack::Release(guard),
        }
    }

    /// Instant this tick was emitted for.
    pub fn time(&self) -> SystemTime {
        self.time
    }

    /// Acknowledge the tick. Consumes it, so a tick is acknowledged at most once.
    pub fn done(self) {
        match self.ack {
            Ack::Detached => {}
            Ack::Signal(tx) => {
                let _ = tx.send(());
            }
            Ack::Release(guard) => drop(guard),
        }
    }
}

impl fmt::Debug for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ack = match self.ack {
            Ack::Detached => "detached",
            Ack::Signal(_) => "signal",
            Ack::Release(_) => "release",
        };
        f.debug_struct("Tick")
            .field("time", &self.time)
            .field("ack", &ack)
            .finish()
    }
}

/// Producer side of a tick's acknowledgment.
#[derive(Debug)]
pub struct PendingAck(Receiver<()>);

impl PendingAck {
    /// Block until the tick is acknowledged or dropped.
    pub fn wait(self) {
        let _ = self.0.recv();
    }
}

/// Outcome of offering a tick to a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emission {
    Delivered,
    /// No receiver was waiting (non-blocking delivery only).
    Dropped,
    /// Every receiver is gone.
    Disconnected,
}

/// Offer `tick` on `tx` according to the delivery mode.
pub fn offer(tx: &Sender<Tick>, delivery: Delivery, tick: Tick) -> Emission {
    match delivery {
        Delivery::Blocking => match tx.send(tick) {
            Ok(()) => Emission::Delivered,
            Err(_) => Emission::Disconnected,
        },
        Delivery::NonBlocking => match tx.try_send(tick) {
            Ok(()) => Emission::Delivered,
            Err(TrySendError::Full(_)) => Emission::Dropped,
            Err(TrySendError::Disconnected(_)) => Emission::Disconnected,
        },
    }
}

/// Emit an acknowledged tick for `time` and wait for the consumer to finish.
pub(crate) fn emit(tx: &Sender<Tick>, delivery: Delivery, time: SystemTime) -> Emission {
    let (tick, ack) = Tick::with_ack(time);
    let emission = offer(tx, delivery, tick);
    if emission == Emission::Delivered {
        ack.wait();
    }
    emission
}
