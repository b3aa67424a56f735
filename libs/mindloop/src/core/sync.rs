// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Shared-state primitives
//!
//! Two small building blocks used across thread boundaries:
//!
//! - [`Latch`] - a single value with many readers and one writer; readers
//!   either peek the current value or block until the next change. The
//!   lifecycle state rides on one of these.
//! - [`SharedValue`] - a read-mostly value with versioned publish.
//!
//! Both are backed by `parking_lot` and are cheap to clone (handles share
//! the underlying state).

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};

struct LatchState<T> {
    value: T,
    generation: u64,
}

struct LatchShared<T> {
    state: Mutex<LatchState<T>>,
    changed: Condvar,
}

/// Single-writer, many-reader value with change notification.
///
/// Every `set` bumps a generation counter and wakes all waiters, so a reader
/// that remembers the generation it last observed can never miss a change.
pub struct Latch<T> {
    shared: Arc<LatchShared<T>>,
}

impl<T> Clone for Latch<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone> Latch<T> {
    pub fn new(value: T) -> Self {
        Self {
            shared: Arc::new(LatchShared {
                state: Mutex::new(LatchState {
                    value,
                    generation: 0,
                }),
                changed: Condvar::new(),
            }),
        }
    }

    /// Peek the current value.
    pub fn get(&self) -> T {
        self.shared.state.lock().value.clone()
    }

    /// Current value together with its generation.
    pub fn observe(&self) -> (T, u64) {
        let state = self.shared.state.lock();
        (state.value.clone(), state.generation)
    }

    /// Publish a new value and wake all waiters.
    pub fn set(&self, value: T) {
        let mut state = self.shared.state.lock();
        state.value = value;
        state.generation += 1;
        drop(state);
        self.shared.changed.notify_all();
    }

    /// Block until the generation moves past `seen`, or until `timeout`
    /// elapses. Returns the value and generation current at wakeup.
    ///
    /// Returns immediately when `seen` is already stale, so the
    /// observe-then-wait pattern has no lost-wakeup window.
    pub fn wait_for_change(&self, seen: u64, timeout: Duration) -> (T, u64) {
        let mut state = self.shared.state.lock();
        if state.generation == seen {
            let _ = self.shared.changed.wait_for(&mut state, timeout);
        }
        (state.value.clone(), state.generation)
    }

    /// Block until `pred` accepts the current value.
    pub fn wait_until<F>(&self, mut pred: F) -> T
    where
        F: FnMut(&T) -> bool,
    {
        let mut state = self.shared.state.lock();
        while !pred(&state.value) {
            self.shared.changed.wait(&mut state);
        }
        state.value.clone()
    }
}

struct Versioned<T> {
    value: T,
    version: u64,
}

/// Read-mostly value with versioned publish.
///
/// `read` hands out a clone of the last published value; `publish` swaps the
/// value under an exclusive lock and bumps the version. Readers never observe
/// a partially written value.
pub struct SharedValue<T> {
    inner: Arc<RwLock<Versioned<T>>>,
}

impl<T> Clone for SharedValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> SharedValue<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Versioned { value, version: 0 })),
        }
    }

    pub fn read(&self) -> T {
        self.inner.read().value.clone()
    }

    pub fn version(&self) -> u64 {
        self.inner.read().version
    }

    pub fn publish(&self, value: T) {
        let mut guard = self.inner.write();
        guard.value = value;
        guard.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_latch_get_set() {
        let latch = Latch::new(1);
        assert_eq!(latch.get(), 1);
        latch.set(2);
        assert_eq!(latch.get(), 2);
    }

    #[test]
    fn test_latch_generation_bumps() {
        let latch = Latch::new("a");
        let (_, g0) = latch.observe();
        latch.set("b");
        let (value, g1) = latch.observe();
        assert_eq!(value, "b");
        assert_eq!(g1, g0 + 1);
    }

    #[test]
    fn test_latch_wait_for_change_returns_immediately_when_stale() {
        let latch = Latch::new(0);
        let (_, seen) = latch.observe();
        latch.set(1);
        // Generation already moved - must not block for the full timeout.
        let (value, _) = latch.wait_for_change(seen, Duration::from_secs(10));
        assert_eq!(value, 1);
    }

    #[test]
    fn test_latch_wakes_waiter() {
        let latch = Latch::new(0);
        let (_, seen) = latch.observe();

        let waiter = {
            let latch = latch.clone();
            thread::spawn(move || latch.wait_for_change(seen, Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        latch.set(42);

        let (value, _) = waiter.join().unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_latch_wait_until() {
        let latch = Latch::new(0);
        let waiter = {
            let latch = latch.clone();
            thread::spawn(move || latch.wait_until(|v| *v >= 3))
        };
        latch.set(1);
        latch.set(3);
        assert_eq!(waiter.join().unwrap(), 3);
    }

    #[test]
    fn test_shared_value_publish_bumps_version() {
        let shared = SharedValue::new(vec![1, 2]);
        assert_eq!(shared.version(), 0);
        assert_eq!(shared.read(), vec![1, 2]);

        shared.publish(vec![3]);
        assert_eq!(shared.version(), 1);
        assert_eq!(shared.read(), vec![3]);
    }

    #[test]
    fn test_shared_value_reader_sees_clone() {
        let shared = SharedValue::new(String::from("before"));
        let snapshot = shared.read();
        shared.publish(String::from("after"));
        assert_eq!(snapshot, "before");
        assert_eq!(shared.read(), "after");
    }
}
