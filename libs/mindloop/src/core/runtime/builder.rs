// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Runtime builder
//!
//! Components are registered by name; lookups and duplicate names are
//! validated in `build()` so wiring mistakes fail at launch, not mid-run.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::runtime::LoopRuntime;
use crate::core::config::LauncherConfig;
use crate::core::data::DataBuffer;
use crate::core::error::{LoopError, Result};
use crate::core::interaction::InteractionDriver;
use crate::core::models::{AnyModelEntry, Model, ModelEntry};
use crate::core::persistence::Persistable;
use crate::core::trainers::{Trainer, TrainerSpec, DEFAULT_TRAINER_THROTTLE};
use crate::core::triggers::Trigger;

pub struct RuntimeBuilder {
    config: LauncherConfig,
    interaction: Option<Box<dyn InteractionDriver>>,
    trainers: Vec<TrainerSpec>,
    models: Vec<Arc<dyn AnyModelEntry>>,
    buffers: Vec<(String, Arc<dyn Persistable>)>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config: LauncherConfig::default(),
            interaction: None,
            trainers: Vec::new(),
            models: Vec::new(),
            buffers: Vec::new(),
        }
    }

    pub fn config(mut self, config: LauncherConfig) -> Self {
        self.config = config;
        self
    }

    /// The interaction driver. Exactly one is required.
    pub fn interaction(mut self, driver: impl InteractionDriver) -> Self {
        self.interaction = Some(Box::new(driver));
        self
    }

    /// Register a trainer with the default ~1ms trigger back-off.
    pub fn trainer(self, name: &str, trainer: impl Trainer, trigger: impl Trigger) -> Self {
        self.trainer_paced(name, trainer, trigger, DEFAULT_TRAINER_THROTTLE)
    }

    /// Register a trainer with an explicit back-off between trigger polls.
    pub fn trainer_paced(
        mut self,
        name: &str,
        trainer: impl Trainer,
        trigger: impl Trigger,
        throttle: Duration,
    ) -> Self {
        let boxed: Box<dyn Trainer> = Box::new(trainer);
        self.trainers.push(TrainerSpec {
            name: name.to_string(),
            trainer: Arc::new(Mutex::new(boxed)),
            trigger: Box::new(trigger),
            throttle,
        });
        self
    }

    /// Register a model entry for publishing bookkeeping and persistence.
    pub fn model<M: Model>(mut self, entry: Arc<ModelEntry<M>>) -> Self {
        self.models.push(entry);
        self
    }

    /// Register a buffer for persistence.
    pub fn buffer<T>(mut self, buffer: Arc<DataBuffer<T>>) -> Self
    where
        T: Serialize + DeserializeOwned + Clone + Send + 'static,
    {
        self.buffers.push((buffer.name().to_string(), buffer));
        self
    }

    pub fn build(self) -> Result<LoopRuntime> {
        self.config.validate()?;

        let interaction = self.interaction.ok_or_else(|| {
            LoopError::Configuration("runtime requires an interaction".into())
        })?;

        for spec in &self.trainers {
            if spec.name.is_empty() {
                return Err(LoopError::Configuration("trainer requires a name".into()));
            }
            let duplicates = self
                .trainers
                .iter()
                .filter(|other| other.name == spec.name)
                .count();
            if duplicates > 1 {
                return Err(LoopError::Configuration(format!(
                    "duplicate trainer '{}'",
                    spec.name
                )));
            }
        }

        LoopRuntime::assemble(
            self.config,
            interaction,
            self.trainers,
            self.models,
            self.buffers,
        )
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
