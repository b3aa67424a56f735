// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Worker thread bodies and the fatal-error slot
//!
//! Every worker follows the same shape: setup, flip the readiness flag,
//! loop until cancelled, teardown, flip the done flag. `Cancelled` is the
//! orderly exit; any other error is stored in the [`FatalSlot`] (first one
//! wins) for the control thread to notice.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::error::{LoopError, Result};
use crate::core::interaction::InteractionDriver;
use crate::core::lifecycle::{LifecycleState, PauseGate};
use crate::core::trainers::{run_trainer_loop, TrainerSpec};

pub(crate) struct FatalError {
    pub thread: String,
    pub error: LoopError,
}

/// First-error-wins slot shared by every thread.
#[derive(Clone)]
pub(crate) struct FatalSlot {
    inner: Arc<Mutex<Option<FatalError>>>,
}

impl FatalSlot {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    pub fn store(&self, thread: &str, error: LoopError) {
        let mut slot = self.inner.lock();
        if slot.is_none() {
            tracing::error!("[{}] fatal: {}", thread, error);
            *slot = Some(FatalError {
                thread: thread.to_string(),
                error,
            });
        } else {
            tracing::error!("[{}] error after first fatal: {}", thread, error);
        }
    }

    pub fn is_set(&self) -> bool {
        self.inner.lock().is_some()
    }

    pub fn message(&self) -> Option<String> {
        self.inner
            .lock()
            .as_ref()
            .map(|f| format!("thread '{}': {}", f.thread, f.error))
    }

    pub fn take(&self) -> Option<FatalError> {
        self.inner.lock().take()
    }
}

/// Interaction thread body.
pub(crate) fn run_interaction_thread(
    mut driver: Box<dyn InteractionDriver>,
    gate: PauseGate,
    fatal: FatalSlot,
) {
    let name = gate.flags().name().to_string();
    tracing::info!("[{}] thread started", name);

    if let Err(e) = driver.setup() {
        fatal.store(&name, e);
        gate.flags().mark_done();
        return;
    }
    gate.flags().mark_ready();

    let result = interaction_loop(driver.as_mut(), &gate);

    if let Err(e) = driver.teardown() {
        tracing::warn!("[{}] teardown error: {}", name, e);
    }
    match result {
        Ok(()) | Err(LoopError::Cancelled) => {}
        Err(e) => fatal.store(&name, e),
    }
    gate.flags().mark_done();
    tracing::debug!("[{}] thread stopped", name);
}

fn interaction_loop(driver: &mut dyn InteractionDriver, gate: &PauseGate) -> Result<()> {
    loop {
        // Run the pause hooks around the gate so external resources can
        // quiesce while the thread is parked.
        if gate.lifecycle().state() == LifecycleState::Paused {
            driver.on_paused();
            let outcome = gate.wait_if_paused();
            if outcome.is_ok() {
                driver.on_resumed();
            }
            outcome?;
        } else {
            gate.wait_if_paused()?;
        }
        driver.tick(gate)?;
    }
}

/// Trainer thread body.
pub(crate) fn run_trainer_thread(mut spec: TrainerSpec, gate: PauseGate, fatal: FatalSlot) {
    let name = gate.flags().name().to_string();
    tracing::info!("[{}] thread started", name);

    let setup_result = spec.trainer.lock().setup();
    if let Err(e) = setup_result {
        fatal.store(&name, e);
        gate.flags().mark_done();
        return;
    }
    gate.flags().mark_ready();

    let result = run_trainer_loop(
        &spec.name,
        &spec.trainer,
        spec.trigger.as_mut(),
        spec.throttle,
        &gate,
    );

    let teardown_result = spec.trainer.lock().teardown();
    if let Err(e) = teardown_result {
        tracing::warn!("[{}] teardown error: {}", name, e);
    }
    match result {
        Ok(()) | Err(LoopError::Cancelled) => {}
        Err(e) => fatal.store(&name, e),
    }
    gate.flags().mark_done();
    tracing::debug!("[{}] thread stopped", name);
}
