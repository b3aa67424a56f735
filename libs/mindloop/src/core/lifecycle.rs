// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Runtime lifecycle: state machine, thread flags, and pause gate
//!
//! The process-wide state machine is
//!
//! ```text
//! Initializing ──► Running ◄──► Paused
//!       │             │            │
//!       └─────────────┴────────────┴──► ShuttingDown ──► Stopped
//! ```
//!
//! Transitions are monotonic past `ShuttingDown`. Only the control thread
//! initiates transitions; every other thread observes the state through a
//! [`Latch`] and suspends or cancels at its [`PauseGate`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::clock::VirtualClock;
use super::error::{LoopError, Result};
use super::sync::Latch;

/// How long a blocked gate sleeps between state re-checks when no change
/// notification arrives. Bounds shutdown propagation latency.
const GATE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Components are being constructed and restored; threads are spawning.
    Initializing,
    /// All threads active.
    Running,
    /// Threads suspended at their pause gates; virtual time frozen.
    Paused,
    /// Shutdown signalled; suspension points cancel.
    ShuttingDown,
    /// All threads joined (or reported stuck).
    Stopped,
}

impl LifecycleState {
    /// Running or paused.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Shutdown has begun; no way back.
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, Self::ShuttingDown | Self::Stopped)
    }

    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Initializing, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Initializing | Running | Paused, ShuttingDown)
                | (ShuttingDown, Stopped)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        }
    }
}

/// Shared handle on the lifecycle latch with transition validation.
#[derive(Clone)]
pub struct Lifecycle {
    latch: Latch<LifecycleState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            latch: Latch::new(LifecycleState::Initializing),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.latch.get()
    }

    pub fn observe(&self) -> (LifecycleState, u64) {
        self.latch.observe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state().is_shutting_down()
    }

    /// Apply a state transition. Idempotent for the current state; illegal
    /// edges are rejected with a configuration error.
    pub fn transition(&self, next: LifecycleState) -> Result<()> {
        let current = self.latch.get();
        if current == next {
            return Ok(());
        }
        if !current.can_transition_to(next) {
            return Err(LoopError::Configuration(format!(
                "cannot transition from {:?} to {:?}",
                current, next
            )));
        }
        self.latch.set(next);
        tracing::debug!("lifecycle: {:?} -> {:?}", current, next);
        Ok(())
    }

    pub fn wait_for_change(&self, seen: u64, timeout: Duration) -> (LifecycleState, u64) {
        self.latch.wait_for_change(seen, timeout)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-thread readiness and quiescence flags, shared with the orchestrator.
pub struct ThreadFlags {
    name: String,
    ready: AtomicBool,
    quiescent: AtomicBool,
    done: AtomicBool,
}

impl ThreadFlags {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ready: AtomicBool::new(false),
            quiescent: AtomicBool::new(false),
            done: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn set_quiescent(&self, value: bool) {
        self.quiescent.store(value, Ordering::SeqCst);
    }

    pub fn is_quiescent(&self) -> bool {
        self.quiescent.load(Ordering::SeqCst)
    }

    pub fn mark_done(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

/// Outcome of [`PauseGate::sleep_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    /// The virtual deadline was reached.
    Completed,
    /// A pause was observed before the deadline; the caller should park at
    /// the gate (running its pause hooks) and retry.
    Paused,
}

/// Per-thread suspension point.
///
/// Combines the lifecycle latch, the virtual clock, and this thread's
/// quiescence flag. All blocking here is cancellable: once shutdown begins,
/// every method returns [`LoopError::Cancelled`] within [`GATE_POLL`].
pub struct PauseGate {
    lifecycle: Lifecycle,
    clock: Arc<VirtualClock>,
    flags: Arc<ThreadFlags>,
}

impl PauseGate {
    pub fn new(lifecycle: Lifecycle, clock: Arc<VirtualClock>, flags: Arc<ThreadFlags>) -> Self {
        Self {
            lifecycle,
            clock,
            flags,
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    pub fn flags(&self) -> &ThreadFlags {
        &self.flags
    }

    /// Return immediately while running, block while paused (raising this
    /// thread's quiescence flag), error with `Cancelled` once shutdown
    /// begins.
    pub fn wait_if_paused(&self) -> Result<()> {
        loop {
            let (state, generation) = self.lifecycle.observe();
            match state {
                LifecycleState::ShuttingDown | LifecycleState::Stopped => {
                    return Err(LoopError::Cancelled);
                }
                LifecycleState::Paused => {
                    self.flags.set_quiescent(true);
                    self.lifecycle.wait_for_change(generation, GATE_POLL);
                }
                LifecycleState::Initializing | LifecycleState::Running => {
                    self.flags.set_quiescent(false);
                    return Ok(());
                }
            }
        }
    }

    /// Sleep until virtual time reaches `deadline`. Does not block through a
    /// pause: the caller gets [`SleepOutcome::Paused`] and decides what to do
    /// (the interaction harness runs its pause hooks, [`PauseGate::sleep`]
    /// just parks and retries).
    pub fn sleep_until(&self, deadline: f64) -> Result<SleepOutcome> {
        loop {
            let (state, generation) = self.lifecycle.observe();
            match state {
                LifecycleState::ShuttingDown | LifecycleState::Stopped => {
                    return Err(LoopError::Cancelled);
                }
                LifecycleState::Paused => return Ok(SleepOutcome::Paused),
                LifecycleState::Initializing | LifecycleState::Running => {
                    let remaining = deadline - self.clock.now();
                    if remaining <= 0.0 {
                        return Ok(SleepOutcome::Completed);
                    }
                    // Waiting out the full remainder is safe: any lifecycle
                    // transition notifies the latch and re-enters the loop.
                    self.lifecycle
                        .wait_for_change(generation, Duration::from_secs_f64(remaining));
                }
            }
        }
    }

    /// Sleep for `virtual_secs` of virtual time. Pauses extend the sleep;
    /// shutdown cancels it.
    pub fn sleep(&self, virtual_secs: f64) -> Result<()> {
        let deadline = self.clock.now() + virtual_secs.max(0.0);
        loop {
            match self.sleep_until(deadline)? {
                SleepOutcome::Completed => return Ok(()),
                SleepOutcome::Paused => self.wait_if_paused()?,
            }
        }
    }
}


#[cfg(test)]
impl PauseGate {
    fn clock_arc_for_test(&self) -> Arc<VirtualClock> {
        Arc::clone(&self.clock)
    }
}
