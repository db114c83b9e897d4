//! Blocking min-heap of scheduled callbacks.
//!
//! Events pull in ascending fire time; events sharing a fire time pull in push
//! order, which keeps replays deterministic. Any number of threads may push;
//! the simulator's event loop is the single puller.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::mem;
use std::time::SystemTime;

use parking_lot::{Condvar, Mutex};

/// Callback run by the event loop. Receives the queue, for nested scheduling,
/// and the committed virtual now.
pub type Action = Box<dyn FnOnce(&EventQueue, SystemTime) + Send + 'static>;

/// A callback scheduled at a fire time.
pub struct ScheduledEvent {
    id: u64,
    at: SystemTime,
    action: Action,
}

impl ScheduledEvent {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn at(&self) -> SystemTime {
        self.at
    }

    /// Run the callback to completion.
    pub fn fire(self, queue: &EventQueue, now: SystemTime) {
        (self.action)(queue, now)
    }
}

impl fmt::Debug for ScheduledEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledEvent")
            .field("id", &self.id)
            .field("at", &self.at)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap.
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

struct State {
    heap: BinaryHeap<ScheduledEvent>,
    next_id: u64,
    stopped: bool,
}

pub struct EventQueue {
    state: Mutex<State>,
    available: Condvar,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                heap: BinaryHeap::new(),
                next_id: 0,
                stopped: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Schedule `action` at `at` and wake one blocked puller.
    ///
    /// After [`stop`](Self::stop) the push is accepted but the action is
    /// released without ever running.
    pub fn push<F>(&self, at: SystemTime, action: F)
    where
        F: FnOnce(&EventQueue, SystemTime) + Send + 'static,
    {
        let mut state = self.state.lock();
        if state.stopped {
            drop(state);
            drop(action);
            return;
        }
        let id = state.next_id;
        state.next_id += 1;
        state.heap.push(ScheduledEvent {
            id,
            at,
            action: Box::new(action),
        });
        drop(state);
        self.available.notify_one();
    }

    /// Pop the earliest event, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is stopped.
    pub fn pull(&self) -> Option<ScheduledEvent> {
        let mut state = self.state.lock();
        while state.heap.is_empty() && !state.stopped {
            self.available.wait(&mut state);
        }
        if state.stopped {
            return None;
        }
        state.heap.pop()
    }

    /// Put a pulled `event` back, keeping its id, and pop whichever event is
    /// now earliest. That is `event` itself unless an earlier one was pushed
    /// after it was pulled.
    ///
    /// Returns `None` once the queue is stopped; `event` is then released
    /// without running.
    pub fn requeue(&self, event: ScheduledEvent) -> Option<ScheduledEvent> {
        let mut state = self.state.lock();
        if state.stopped {
            drop(state);
            drop(event);
            return None;
        }
        state.heap.push(event);
        state.heap.pop()
    }

    /// Fire time of the earliest pending event.
    pub fn peek_at(&self) -> Option<SystemTime> {
        self.state.lock().heap.peek().map(ScheduledEvent::at)
    }

    /// Stop the queue, wake every puller and release pending actions.
    ///
    /// Returns `false` if the queue was already stopped.
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock();
        if state.stopped {
            return false;
        }
        state.stopped = true;
        let pending = mem::take(&mut state.heap);
        drop(state);
        self.available.notify_all();
        // Dropped outside the lock: actions may own senders whose receivers
        // wake and push again.
        drop(pending);
        true
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().heap.is_empty()
    }
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EventQueue")
            .field("pending", &state.heap.len())
            .field("stopped", &state.stopped)
            .finish()
    }
}
