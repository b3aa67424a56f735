// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Commonly used types for `use mindloop::prelude::*`.

pub use crate::core::{
    // Errors
    error::{LoopError, Result},

    // Configuration
    config::LauncherConfig,

    // Data fabric
    data::{DataBuffer, DataCollector, DataUser, Record, ReplacementPolicy},

    // Models
    models::{Model, ModelEntry, ModelRegistry},

    // Interaction
    interaction::{Agent, Environment, FixedIntervalInteraction},

    // Trainers and triggers
    trainers::Trainer,
    triggers::{StepCountTrigger, TimeIntervalTrigger, Trigger},

    // Runtime
    lifecycle::LifecycleState,
    runtime::{LoopRuntime, RuntimeController},
};
