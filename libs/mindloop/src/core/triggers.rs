// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Triggers: stateful predicates deciding when periodic work fires
//!
//! Trainers and the persistence controller are paced by triggers polled
//! against virtual time. `fire` consumes the trigger's readiness; composites
//! poll every child on each call so no child's state is skipped.

use super::error::{LoopError, Result};

pub trait Trigger: Send + 'static {
    /// Poll the trigger. `now` is virtual seconds. Returns true when the
    /// periodic action should run; the readiness is consumed.
    fn fire(&mut self, now: f64) -> bool;

    /// Drop any internal anchor so the trigger re-arms from the next poll.
    fn reset(&mut self) {}
}

/// Fires when at least `period` virtual seconds have passed since the last
/// fire. The anchor initializes at the first poll, so the first fire happens
/// one full period in.
pub struct TimeIntervalTrigger {
    period: f64,
    last_fire: Option<f64>,
}

impl TimeIntervalTrigger {
    pub fn new(period: f64) -> Result<Self> {
        if !period.is_finite() || period <= 0.0 {
            return Err(LoopError::Configuration(format!(
                "trigger period must be positive, got {}",
                period
            )));
        }
        Ok(Self {
            period,
            last_fire: None,
        })
    }

    pub fn period(&self) -> f64 {
        self.period
    }
}

impl Trigger for TimeIntervalTrigger {
    fn fire(&mut self, now: f64) -> bool {
        let last = *self.last_fire.get_or_insert(now);
        if now - last >= self.period {
            self.last_fire = Some(now);
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.last_fire = None;
    }
}

/// Fires every `every`-th poll.
pub struct StepCountTrigger {
    every: u64,
    count: u64,
}

impl StepCountTrigger {
    pub fn new(every: u64) -> Result<Self> {
        if every == 0 {
            return Err(LoopError::Configuration(
                "step count trigger requires a positive step count".into(),
            ));
        }
        Ok(Self { every, count: 0 })
    }
}

impl Trigger for StepCountTrigger {
    fn fire(&mut self, _now: f64) -> bool {
        self.count += 1;
        if self.count >= self.every {
            self.count = 0;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

/// Fires when any child fires. All children are polled on every call.
pub struct AnyTrigger {
    triggers: Vec<Box<dyn Trigger>>,
}

impl AnyTrigger {
    pub fn new(triggers: Vec<Box<dyn Trigger>>) -> Self {
        Self { triggers }
    }
}

impl Trigger for AnyTrigger {
    fn fire(&mut self, now: f64) -> bool {
        let mut fired = false;
        for trigger in &mut self.triggers {
            fired |= trigger.fire(now);
        }
        fired
    }

    fn reset(&mut self) {
        for trigger in &mut self.triggers {
            trigger.reset();
        }
    }
}

/// Fires when all children fire on the same poll. All children are polled on
/// every call.
pub struct AllTrigger {
    triggers: Vec<Box<dyn Trigger>>,
}

impl AllTrigger {
    pub fn new(triggers: Vec<Box<dyn Trigger>>) -> Self {
        Self { triggers }
    }
}

impl Trigger for AllTrigger {
    fn fire(&mut self, now: f64) -> bool {
        let mut fired = true;
        for trigger in &mut self.triggers {
            fired &= trigger.fire(now);
        }
        fired
    }

    fn reset(&mut self) {
        for trigger in &mut self.triggers {
            trigger.reset();
        }
    }
}
