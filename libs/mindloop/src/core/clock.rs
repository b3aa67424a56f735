// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Wall and virtual time
//!
//! [`VirtualClock`] exposes two readings, both in fractional seconds:
//!
//! - `wall()` - monotonic time since clock construction, always advancing.
//! - `now()` - virtual time: advances 1:1 with wall time while running and
//!   freezes while the runtime is paused.
//!
//! The orchestrator drives `pause()`/`resume()` at the lifecycle transition
//! points; `restore()` continues virtual time from a persisted offset.

use std::time::Instant;

use parking_lot::Mutex;

struct VirtualState {
    /// Virtual seconds accumulated across completed running intervals.
    accumulated: f64,
    /// Wall anchor of the current running interval; `None` while frozen.
    anchor: Option<Instant>,
}

pub struct VirtualClock {
    origin: Instant,
    inner: Mutex<VirtualState>,
}

impl VirtualClock {
    /// Create a clock that is running (not frozen) from the start.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            origin: now,
            inner: Mutex::new(VirtualState {
                accumulated: 0.0,
                anchor: Some(now),
            }),
        }
    }

    /// Monotonic wall seconds since the clock was created.
    pub fn wall(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    /// Virtual seconds: frozen while paused, otherwise 1:1 with wall time.
    pub fn now(&self) -> f64 {
        let state = self.inner.lock();
        let running = state
            .anchor
            .map(|anchor| anchor.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        state.accumulated + running
    }

    /// Freeze virtual time. Idempotent.
    pub fn pause(&self) {
        let mut state = self.inner.lock();
        if let Some(anchor) = state.anchor.take() {
            state.accumulated += anchor.elapsed().as_secs_f64();
        }
    }

    /// Unfreeze virtual time. Idempotent.
    pub fn resume(&self) {
        let mut state = self.inner.lock();
        if state.anchor.is_none() {
            state.anchor = Some(Instant::now());
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.lock().anchor.is_none()
    }

    /// Continue virtual time from `offset` seconds, e.g. after restoring a
    /// persisted state. The running/frozen status is preserved.
    pub fn restore(&self, offset: f64) {
        let mut state = self.inner.lock();
        state.accumulated = offset;
        if state.anchor.is_some() {
            state.anchor = Some(Instant::now());
        }
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_wall_advances() {
        let clock = VirtualClock::new();
        let t1 = clock.wall();
        thread::sleep(Duration::from_millis(10));
        let t2 = clock.wall();
        assert!(t2 > t1, "wall time should advance");
        assert!(t2 - t1 >= 0.010, "should be at least 10ms");
    }

    #[test]
    fn test_virtual_tracks_wall_while_running() {
        let clock = VirtualClock::new();
        thread::sleep(Duration::from_millis(20));
        let wall = clock.wall();
        let virt = clock.now();
        assert!((wall - virt).abs() < 0.005, "wall={wall} virtual={virt}");
    }

    #[test]
    fn test_virtual_freezes_during_pause() {
        let clock = VirtualClock::new();
        thread::sleep(Duration::from_millis(10));
        clock.pause();
        let frozen = clock.now();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(clock.now(), frozen, "paused clock must not advance");

        clock.resume();
        thread::sleep(Duration::from_millis(10));
        let resumed = clock.now();
        assert!(resumed > frozen);
        // The paused 30ms must not be counted.
        assert!(resumed - frozen < 0.025, "delta={}", resumed - frozen);
    }

    #[test]
    fn test_monotone_across_pause_cycles() {
        let clock = VirtualClock::new();
        let mut last = clock.now();
        for _ in 0..5 {
            clock.pause();
            let t = clock.now();
            assert!(t >= last);
            last = t;
            clock.resume();
            let t = clock.now();
            assert!(t >= last);
            last = t;
        }
    }

    #[test]
    fn test_pause_and_resume_idempotent() {
        let clock = VirtualClock::new();
        clock.pause();
        clock.pause();
        assert!(clock.is_frozen());
        clock.resume();
        clock.resume();
        assert!(!clock.is_frozen());
    }

    #[test]
    fn test_restore_offsets_virtual_time() {
        let clock = VirtualClock::new();
        clock.restore(100.0);
        let t = clock.now();
        assert!(t >= 100.0);
        assert!(t < 101.0);
        // Wall time is unaffected by restore.
        assert!(clock.wall() < 1.0);
    }

    #[test]
    fn test_restore_while_frozen() {
        let clock = VirtualClock::new();
        clock.pause();
        clock.restore(42.0);
        assert_eq!(clock.now(), 42.0);
    }
}
