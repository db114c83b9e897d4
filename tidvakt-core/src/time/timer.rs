//! One-shot timer on simulated time.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::simulator::Shared;
use super::tick::{emit, Emission};
use super::{Delivery, Tick, Timer};

struct TimerState {
    expires_at: Mutex<Option<SystemTime>>,
    tx: Sender<Tick>,
    delivery: Delivery,
}

impl TimerState {
    fn fire(&self, now: SystemTime) {
        {
            let mut expires_at = self.expires_at.lock();
            // Superseded by a later reset, or stopped.
            if *expires_at != Some(now) {
                trace!(?now, "stale timer event");
                return;
            }
            *expires_at = None;
        }
        if emit(&self.tx, self.delivery, now) == Emission::Dropped {
            debug!(?now, "timer tick dropped, no receiver waiting");
        }
    }
}

pub(crate) struct SimTimer {
    shared: Arc<Shared>,
    state: Arc<TimerState>,
    rx: Receiver<Tick>,
}

impl SimTimer {
    /// Creates an unarmed timer.
    pub(crate) fn new(shared: Arc<Shared>, delivery: Delivery) -> Self {
        let (tx, rx) = channel::bounded(0);
        Self {
            shared,
            state: Arc::new(TimerState {
                expires_at: Mutex::new(None),
                tx,
                delivery,
            }),
            rx,
        }
    }
}

impl Timer for SimTimer {
    fn receiver(&self) -> &Receiver<Tick> {
        &self.rx
    }

    fn stop(&self) -> bool {
        self.state.expires_at.lock().take().is_some()
    }

    fn reset(&self, duration: Duration) -> bool {
        // Held across the push so the event loop cannot move past the expiry
        // before it is queued.
        let now = self.shared.now.read();
        let expires_at = *now + duration;
        let later = {
            let mut current = self.state.expires_at.lock();
            let later = current.map_or(true, |previous| previous < expires_at);
            *current = Some(expires_at);
            later
        };
        let state = Arc::clone(&self.state);
        self.shared
            .queue
            .push(expires_at, move |_, now| state.fire(now));
        later
    }
}
