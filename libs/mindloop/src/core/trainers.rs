// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Trainer runtime
//!
//! Each trainer runs on its own thread: wait at the pause gate, poll the
//! trigger against virtual time, run `train()` when it fires, then throttle
//! briefly before re-polling so an unarmed trigger never spins hot.
//!
//! Deadlock rule for `train()` implementations: take data-fabric consumer
//! snapshots first, then acquire training views, and never hold a training
//! view while waiting on a consumer.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::error::Result;
use super::lifecycle::PauseGate;
use super::persistence::Persistable;
use super::triggers::Trigger;

/// Back-off between trigger polls when no training ran.
pub const DEFAULT_TRAINER_THROTTLE: Duration = Duration::from_millis(1);

/// User-implemented trainer. `train()` is one training iteration; the
/// persistence hooks default to stateless no-ops.
pub trait Trainer: Send + 'static {
    fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    fn train(&mut self) -> Result<()>;

    fn teardown(&mut self) -> Result<()> {
        Ok(())
    }

    fn save_to(&self, _dir: &Path) -> Result<()> {
        Ok(())
    }

    fn load_from(&mut self, _dir: &Path) -> Result<()> {
        Ok(())
    }
}

/// Trainer shared between its thread and the persistence controller. The
/// mutex is uncontended except while a save runs, and saves only run while
/// the trainer thread is quiescent at its gate.
pub(crate) type SharedTrainer = Arc<Mutex<Box<dyn Trainer>>>;

/// A registered trainer waiting to be spawned.
pub(crate) struct TrainerSpec {
    pub name: String,
    pub trainer: SharedTrainer,
    pub trigger: Box<dyn Trigger>,
    pub throttle: Duration,
}

/// Persistence adapter: locks the shared trainer for the duration of a
/// save/load.
pub(crate) struct TrainerPersistHandle {
    trainer: SharedTrainer,
}

impl TrainerPersistHandle {
    pub fn new(trainer: SharedTrainer) -> Arc<Self> {
        Arc::new(Self { trainer })
    }
}

impl Persistable for TrainerPersistHandle {
    fn save_to(&self, dir: &Path) -> Result<()> {
        self.trainer.lock().save_to(dir)
    }

    fn load_from(&self, dir: &Path) -> Result<()> {
        self.trainer.lock().load_from(dir)
    }
}

/// Trainer thread body after setup: gate, trigger, train, throttle.
/// Returns `Err(Cancelled)` on orderly shutdown, any other error is fatal.
pub(crate) fn run_trainer_loop(
    name: &str,
    trainer: &SharedTrainer,
    trigger: &mut dyn Trigger,
    throttle: Duration,
    gate: &PauseGate,
) -> Result<()> {
    loop {
        gate.wait_if_paused()?;
        let now = gate.clock().now();
        if trigger.fire(now) {
            tracing::trace!("[{}] trigger fired at {:.3}s", name, now);
            trainer.lock().train()?;
        }
        gate.sleep(throttle.as_secs_f64())?;
    }
}
