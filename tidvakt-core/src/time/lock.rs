//! Reentrant reader/writer lock around a single `Copy` value.
//!
//! Readers are counted: the first reader excludes the writer, nested readers
//! only bump the count, and the last release lets the writer in. A reader
//! never waits while the count is non-zero, so a call chain that re-enters
//! the read path cannot deadlock against a writer queued behind it. The
//! writer waits for the count to reach zero and blocks new readers while it
//! holds the lock.
//!
//! Read guards own a handle to the lock and may be released on any thread.

use std::ops::Deref;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

struct State<T> {
    value: T,
    readers: usize,
    writing: bool,
}

pub struct ReentrantRwLock<T> {
    state: Mutex<State<T>>,
    changed: Condvar,
}

impl<T: Copy> ReentrantRwLock<T> {
    pub fn new(value: T) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                value,
                readers: 0,
                writing: false,
            }),
            changed: Condvar::new(),
        })
    }

    /// Acquire a read guard. The value cannot change until every outstanding
    /// read guard is dropped.
    pub fn read(self: &Arc<Self>) -> ReadGuard<T> {
        let mut state = self.state.lock();
        while state.writing {
            self.changed.wait(&mut state);
        }
        state.readers += 1;
        ReadGuard {
            lock: Arc::clone(self),
            value: state.value,
        }
    }

    /// Acquire the write lock once no reader is active.
    pub fn write(&self) -> WriteGuard<'_, T> {
        let mut state = self.state.lock();
        while state.writing || state.readers > 0 {
            self.changed.wait(&mut state);
        }
        state.writing = true;
        WriteGuard { lock: self }
    }

    /// Number of read guards currently held.
    pub fn readers(&self) -> usize {
        self.state.lock().readers
    }

    fn release_read(&self) {
        let mut state = self.state.lock();
        state.readers -= 1;
        if state.readers == 0 {
            drop(state);
            self.changed.notify_all();
        }
    }
}

/// Shared access to a snapshot of the guarded value.
pub struct ReadGuard<T: Copy> {
    lock: Arc<ReentrantRwLock<T>>,
    value: T,
}

impl<T: Copy> Deref for ReadGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Copy> Drop for ReadGuard<T> {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

/// Exclusive access; the only way to change the guarded value.
pub struct WriteGuard<'a, T> {
    lock: &'a ReentrantRwLock<T>,
}

impl<T: Copy> WriteGuard<'_, T> {
    pub fn get(&self) -> T {
        self.lock.state.lock().value
    }

    pub fn set(&mut self, value: T) {
        self.lock.state.lock().value = value;
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.state.lock().writing = false;
        self.lock.changed.notify_all();
    }
}
