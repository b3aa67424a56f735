// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The orchestrator itself
//!
//! `run()` turns the calling thread into the control thread: it spawns the
//! workers, waits for the readiness barrier, then serves control commands,
//! the periodic save trigger, the uptime ceiling and the fatal slot until
//! shutdown, and finally joins every thread within a bounded grace period.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use super::commands::ControlCommand;
use super::status::{ModelStatus, RuntimeStatus, ThreadStatus};
use super::workers::{self, FatalSlot};
use super::RuntimeBuilder;
use super::RuntimeController;
use crate::core::clock::VirtualClock;
use crate::core::config::LauncherConfig;
use crate::core::console;
use crate::core::error::{LoopError, Result};
use crate::core::interaction::InteractionDriver;
use crate::core::lifecycle::{Lifecycle, LifecycleState, PauseGate, ThreadFlags};
use crate::core::models::{AnyModelEntry, ModelRegistry};
use crate::core::persistence::{Persistable, PersistKind, StateStore};
use crate::core::trainers::{TrainerPersistHandle, TrainerSpec};
use crate::core::triggers::{TimeIntervalTrigger, Trigger};

/// Control-loop poll interval: bounds how late a fatal error, the save
/// trigger or the uptime ceiling can be noticed.
const CONTROL_POLL: Duration = Duration::from_millis(100);

/// How long threads get to finish after shutdown is signalled.
const JOIN_GRACE: Duration = Duration::from_secs(5);

/// How long workers get to become ready at startup.
const READY_TIMEOUT: Duration = Duration::from_secs(30);

struct WorkerHandle {
    name: String,
    flags: Arc<ThreadFlags>,
    handle: Option<thread::JoinHandle<()>>,
    /// Whether this thread participates in pause quiescence. The console
    /// thread does not: it must keep answering `status` while paused.
    pauses: bool,
}

enum Flow {
    Continue,
    Shutdown,
}

/// Persistence adapter over a type-erased model entry.
struct ModelPersistAdapter(Arc<dyn AnyModelEntry>);

impl Persistable for ModelPersistAdapter {
    fn save_to(&self, dir: &Path) -> Result<()> {
        self.0.save_to(dir)
    }

    fn load_from(&self, dir: &Path) -> Result<()> {
        self.0.load_from(dir)
    }
}

pub struct LoopRuntime {
    config: LauncherConfig,
    lifecycle: Lifecycle,
    clock: Arc<VirtualClock>,
    registry: Arc<ModelRegistry>,
    store: StateStore,
    interaction: Option<Box<dyn InteractionDriver>>,
    trainers: Vec<TrainerSpec>,
    threads: Vec<WorkerHandle>,
    fatal: FatalSlot,
    cmd_tx: Sender<ControlCommand>,
    cmd_rx: Receiver<ControlCommand>,
    save_trigger: Option<TimeIntervalTrigger>,
}

impl LoopRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub(crate) fn assemble(
        config: LauncherConfig,
        interaction: Box<dyn InteractionDriver>,
        trainers: Vec<TrainerSpec>,
        models: Vec<Arc<dyn AnyModelEntry>>,
        buffers: Vec<(String, Arc<dyn Persistable>)>,
    ) -> Result<Self> {
        let registry = Arc::new(ModelRegistry::new());
        let mut store = StateStore::new(config.states_dir.clone(), config.max_keep_states);

        for entry in models {
            registry.register_erased(Arc::clone(&entry))?;
            let name = entry.name().to_string();
            store.register(
                PersistKind::Model,
                name,
                Arc::new(ModelPersistAdapter(entry)),
            )?;
        }
        for (name, buffer) in buffers {
            store.register(PersistKind::Buffer, name, buffer)?;
        }
        for spec in &trainers {
            store.register(
                PersistKind::Trainer,
                spec.name.clone(),
                TrainerPersistHandle::new(Arc::clone(&spec.trainer)),
            )?;
        }

        let save_trigger = if config.save_interval_seconds > 0.0 {
            Some(TimeIntervalTrigger::new(config.save_interval_seconds)?)
        } else {
            None
        };

        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        Ok(Self {
            config,
            lifecycle: Lifecycle::new(),
            clock: Arc::new(VirtualClock::new()),
            registry,
            store,
            interaction: Some(interaction),
            trainers,
            threads: Vec::new(),
            fatal: FatalSlot::new(),
            cmd_tx,
            cmd_rx,
            save_trigger,
        })
    }

    pub fn controller(&self) -> RuntimeController {
        RuntimeController::new(self.cmd_tx.clone(), self.lifecycle.clone())
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn clock(&self) -> Arc<VirtualClock> {
        Arc::clone(&self.clock)
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Run the whole lifecycle on the calling thread. Returns after
    /// shutdown; the first fatal error from any thread is re-raised here.
    pub fn run(&mut self) -> Result<()> {
        tracing::info!(
            "starting runtime ({} trainer(s), console {})",
            self.trainers.len(),
            self.config
                .web_api_address
                .as_deref()
                .unwrap_or("disabled"),
        );

        if let Some(resume_from) = self.config.resume_from.clone() {
            let manifest = self.store.load(&resume_from)?;
            self.clock.restore(manifest.virtual_time);
        }

        if let Err(e) = self.spawn_workers() {
            self.shutdown_and_join();
            return Err(e);
        }
        if let Err(e) = self.wait_until_ready() {
            self.shutdown_and_join();
            return Err(self.take_fatal().unwrap_or(e));
        }
        self.lifecycle.transition(LifecycleState::Running)?;
        tracing::info!("runtime running");

        let outcome = self.control_loop();
        self.shutdown_and_join();

        if let Some(fatal) = self.take_fatal() {
            return Err(fatal);
        }
        outcome
    }

    fn spawn_workers(&mut self) -> Result<()> {
        let driver = self.interaction.take().ok_or_else(|| {
            LoopError::Configuration("runtime has already been run".into())
        })?;

        let flags = Arc::new(ThreadFlags::new("interaction"));
        let gate = PauseGate::new(
            self.lifecycle.clone(),
            Arc::clone(&self.clock),
            Arc::clone(&flags),
        );
        let fatal = self.fatal.clone();
        let handle = thread::Builder::new()
            .name("interaction".into())
            .spawn(move || workers::run_interaction_thread(driver, gate, fatal))?;
        self.threads.push(WorkerHandle {
            name: "interaction".into(),
            flags,
            handle: Some(handle),
            pauses: true,
        });

        for spec in std::mem::take(&mut self.trainers) {
            let thread_name = format!("trainer-{}", spec.name);
            let flags = Arc::new(ThreadFlags::new(thread_name.clone()));
            let gate = PauseGate::new(
                self.lifecycle.clone(),
                Arc::clone(&self.clock),
                Arc::clone(&flags),
            );
            let fatal = self.fatal.clone();
            let handle = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || workers::run_trainer_thread(spec, gate, fatal))?;
            self.threads.push(WorkerHandle {
                name: thread_name,
                flags,
                handle: Some(handle),
                pauses: true,
            });
        }

        if let Some(addr) = self.config.web_api_address.clone() {
            let flags = Arc::new(ThreadFlags::new("console"));
            let controller = self.controller();
            let fatal = self.fatal.clone();
            let thread_flags = Arc::clone(&flags);
            let handle = thread::Builder::new()
                .name("console".into())
                .spawn(move || console::run_console_thread(addr, controller, thread_flags, fatal))?;
            self.threads.push(WorkerHandle {
                name: "console".into(),
                flags,
                handle: Some(handle),
                pauses: false,
            });
        }
        Ok(())
    }

    fn wait_until_ready(&self) -> Result<()> {
        let deadline = Instant::now() + READY_TIMEOUT;
        loop {
            if self.fatal.is_set() {
                return Err(LoopError::Cancelled);
            }
            if self.threads.iter().all(|w| w.flags.is_ready()) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                let stuck: Vec<&str> = self
                    .threads
                    .iter()
                    .filter(|w| !w.flags.is_ready())
                    .map(|w| w.name.as_str())
                    .collect();
                return Err(LoopError::Other(anyhow::anyhow!(
                    "threads failed to become ready within {:?}: {}",
                    READY_TIMEOUT,
                    stuck.join(", ")
                )));
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn control_loop(&mut self) -> Result<()> {
        loop {
            match self.cmd_rx.recv_timeout(CONTROL_POLL) {
                Ok(cmd) => {
                    if matches!(self.handle_command(cmd), Flow::Shutdown) {
                        return Ok(());
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }

            if self.fatal.is_set() {
                return Ok(());
            }

            let max_uptime = self.config.max_uptime_seconds;
            if max_uptime > 0.0 && self.clock.wall() >= max_uptime {
                tracing::info!("max uptime of {:.1}s reached", max_uptime);
                return Ok(());
            }

            if self.lifecycle.state() == LifecycleState::Running {
                let now = self.clock.now();
                let due = self.save_trigger.as_mut().is_some_and(|t| t.fire(now));
                if due {
                    if let Err(e) = self.save_state(None) {
                        self.fatal.store("persistence", e);
                        return Ok(());
                    }
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: ControlCommand) -> Flow {
        match cmd {
            ControlCommand::Status { reply } => {
                let _ = reply.send(self.status());
                Flow::Continue
            }
            ControlCommand::Pause { reply } => {
                let _ = reply.send(self.pause());
                Flow::Continue
            }
            ControlCommand::Resume { reply } => {
                let _ = reply.send(self.resume());
                Flow::Continue
            }
            ControlCommand::SaveState { target, reply } => {
                let result = self.save_state(target);
                if let Err(e) = &result {
                    // I/O failures during a commit are fatal; validation
                    // errors just bounce back to the requester.
                    if !matches!(e, LoopError::Configuration(_)) {
                        self.fatal
                            .store("persistence", LoopError::Persistence(e.to_string()));
                    }
                }
                let _ = reply.send(result);
                Flow::Continue
            }
            ControlCommand::Shutdown { reply } => {
                let _ = reply.send(());
                Flow::Shutdown
            }
        }
    }

    fn status(&self) -> RuntimeStatus {
        RuntimeStatus {
            state: self.lifecycle.state(),
            wall_time: self.clock.wall(),
            virtual_time: self.clock.now(),
            threads: self
                .threads
                .iter()
                .map(|w| ThreadStatus {
                    name: w.name.clone(),
                    ready: w.flags.is_ready(),
                    quiescent: w.flags.is_quiescent(),
                    done: w.flags.is_done(),
                })
                .collect(),
            models: self
                .registry
                .entries()
                .into_iter()
                .map(|(name, entry)| ModelStatus {
                    name,
                    has_inference: entry.has_inference(),
                    publish_seq: entry.publish_seq(),
                })
                .collect(),
            fatal: self.fatal.message(),
        }
    }

    /// Freeze the clock, flip to paused and block until every pausing
    /// thread is quiescent at its gate (or has exited).
    fn pause(&mut self) -> Result<()> {
        let state = self.lifecycle.state();
        if state != LifecycleState::Running {
            return Err(LoopError::Configuration(format!(
                "cannot pause from {:?} (must be Running)",
                state
            )));
        }
        self.clock.pause();
        self.lifecycle.transition(LifecycleState::Paused)?;
        self.wait_for_quiescence();
        tracing::info!("runtime paused");
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        let state = self.lifecycle.state();
        if state != LifecycleState::Paused {
            return Err(LoopError::Configuration(format!(
                "cannot resume from {:?} (must be Paused)",
                state
            )));
        }
        self.clock.resume();
        self.lifecycle.transition(LifecycleState::Running)?;
        tracing::info!("runtime resumed");
        Ok(())
    }

    fn wait_for_quiescence(&self) {
        loop {
            let pending = self
                .threads
                .iter()
                .filter(|w| w.pauses)
                .filter(|w| !w.flags.is_quiescent() && !w.flags.is_done())
                .count();
            if pending == 0 {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Save a state record. The runtime is paused for the duration so every
    /// persistable is quiescent; a running runtime resumes afterwards even
    /// when the save fails.
    fn save_state(&mut self, target: Option<PathBuf>) -> Result<PathBuf> {
        let state = self.lifecycle.state();
        let was_running = state == LifecycleState::Running;
        if was_running {
            self.pause()?;
        } else if state != LifecycleState::Paused {
            return Err(LoopError::Configuration(format!(
                "cannot save state while {:?}",
                state
            )));
        }

        let result = self.store.save(target, self.clock.now());

        if was_running {
            if let Err(e) = self.resume() {
                tracing::error!("failed to resume after save: {}", e);
            }
        }
        result
    }

    fn shutdown_and_join(&mut self) {
        if self.lifecycle.state() == LifecycleState::Stopped {
            return;
        }
        if let Err(e) = self.lifecycle.transition(LifecycleState::ShuttingDown) {
            tracing::warn!("shutdown transition refused: {}", e);
        }
        tracing::info!("shutting down...");

        let deadline = Instant::now() + JOIN_GRACE;
        let total = self.threads.len();
        let fatal = self.fatal.clone();
        for (i, worker) in self.threads.iter_mut().enumerate() {
            let Some(handle) = worker.handle.take() else {
                continue;
            };
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            if handle.is_finished() {
                match handle.join() {
                    Ok(()) => {
                        tracing::debug!("[{}] thread joined ({}/{})", worker.name, i + 1, total)
                    }
                    Err(_) => {
                        fatal.store(
                            &worker.name,
                            LoopError::Other(anyhow::anyhow!("thread panicked")),
                        );
                    }
                }
            } else {
                // Not force-killed; the host process exit reaps it.
                tracing::warn!(
                    "[{}] thread did not stop within {:?} ({}/{})",
                    worker.name,
                    JOIN_GRACE,
                    i + 1,
                    total
                );
            }
        }

        if let Err(e) = self.lifecycle.transition(LifecycleState::Stopped) {
            tracing::warn!("stop transition refused: {}", e);
        }
        tracing::info!("runtime stopped");
    }

    fn take_fatal(&self) -> Option<LoopError> {
        self.fatal.take().map(|f| LoopError::Fatal {
            thread: f.thread,
            source: Box::new(f.error),
        })
    }
}
