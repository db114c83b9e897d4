//! Discrete-event simulator.
//!
//! A single event loop thread pulls the earliest scheduled event, commits its
//! fire time as the new virtual now and runs the callback to completion before
//! pulling again. It is the only writer of now. Every other thread reads now
//! through the reentrant lock, which is how `freeze_now` holds time still
//! while a caller schedules relative to it.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use crossbeam::channel;
use tracing::{debug, info, info_span, trace, warn};

use super::lock::ReentrantRwLock;
use super::queue::EventQueue;
use super::ticker::SimTicker;
use super::timer::SimTimer;
use super::{Delivery, Tick, Ticker, TimeManager, Timer};

pub(crate) struct Shared {
    pub(crate) queue: EventQueue,
    pub(crate) now: Arc<ReentrantRwLock<SystemTime>>,
    started: AtomicBool,
}

/// Virtual clock driven by a discrete-event loop.
///
/// Cloning yields another handle to the same simulation.
#[derive(Clone)]
pub struct Simulator {
    shared: Arc<Shared>,
}

impl Simulator {
    /// Creates a stopped simulator whose virtual now starts at `start`.
    pub fn new(start: SystemTime) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: EventQueue::new(),
                now: ReentrantRwLock::new(start),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Spawns the event loop. Calling it again is a no-op.
    pub fn start(&self) -> io::Result<()> {
        if self.shared.started.swap(true, Ordering::AcqRel) {
            warn!("simulator already started");
            return Ok(());
        }
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name("sim-event-loop".into())
            .spawn(move || event_loop(shared))?;
        Ok(())
    }

    /// Stops the simulation. Pending events never fire and sleepers are
    /// released. Returns `false` if it was already stopped.
    pub fn stop(&self) -> bool {
        let stopped = self.shared.queue.stop();
        if stopped {
            info!(now = ?self.now(), "simulator stopped");
        }
        stopped
    }

    pub fn is_running(&self) -> bool {
        self.shared.started.load(Ordering::Acquire) && !self.shared.queue.is_stopped()
    }

    /// Number of events waiting to fire.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }
}

fn event_loop(shared: Arc<Shared>) {
    let span = info_span!("sim_event_loop");
    let _enter = span.enter();
    info!("event loop started");

    while let Some(pulled) = shared.queue.pull() {
        let mut now = shared.now.write();
        // Readers may have scheduled earlier events while the write was pending.
        let Some(event) = shared.queue.requeue(pulled) else {
            break;
        };
        let at = event.at().max(now.get());
        now.set(at);
        drop(now);
        trace!(now = ?at, id = event.id(), "advanced virtual time");
        event.fire(&shared.queue, at);
    }

    info!("event loop exited");
}

impl TimeManager for Simulator {
    fn now(&self) -> SystemTime {
        *self.shared.now.read()
    }

    fn sleep(&self, duration: Duration) -> SystemTime {
        let (tx, rx) = channel::bounded(1);
        {
            let now = self.shared.now.read();
            self.shared.queue.push(*now + duration, move |_, fired| {
                let _ = tx.send(fired);
            });
        }
        match rx.recv() {
            Ok(fired) => fired,
            Err(_) => {
                debug!("sleep interrupted by simulator stop");
                self.now()
            }
        }
    }

    fn new_timer(&self, duration: Duration, delivery: Delivery) -> Box<dyn Timer> {
        let timer = SimTimer::new(Arc::clone(&self.shared), delivery);
        timer.reset(duration);
        Box::new(timer)
    }

    fn new_ticker(&self, period: Duration, delivery: Delivery) -> Box<dyn Ticker> {
        Box::new(SimTicker::start(&self.shared, period, delivery))
    }

    fn freeze_now(&self) -> Tick {
        Tick::frozen(self.shared.now.read())
    }
}

impl fmt::Debug for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulator")
            .field("now", &self.now())
            .field("queue", &self.shared.queue)
            .finish()
    }
}
