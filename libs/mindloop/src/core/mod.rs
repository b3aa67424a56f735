// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod clock;
pub mod config;
pub mod data;
pub mod error;
pub mod interaction;
pub mod lifecycle;
pub mod models;
pub mod persistence;
pub mod prelude;
pub mod runtime;
pub mod sync;
pub mod trainers;
pub mod triggers;

mod console;

pub use clock::VirtualClock;
pub use config::LauncherConfig;
pub use data::{
    BufferSnapshot, DataBuffer, DataCollector, DataUser, Record, ReplacementPolicy,
};
pub use error::{LoopError, Result};
pub use interaction::{
    Agent, Environment, FixedIntervalInteraction, Interaction, InteractionDriver,
};
pub use lifecycle::{Lifecycle, LifecycleState, PauseGate, SleepOutcome, ThreadFlags};
pub use models::{AnyModelEntry, Model, ModelEntry, ModelRegistry};
pub use persistence::{Manifest, PersistKind, Persistable, StateStore};
pub use runtime::{
    LoopRuntime, ModelStatus, RuntimeBuilder, RuntimeController, RuntimeStatus, ThreadStatus,
};
pub use sync::{Latch, SharedValue};
pub use trainers::{Trainer, DEFAULT_TRAINER_THROTTLE};
pub use triggers::{AllTrigger, AnyTrigger, StepCountTrigger, TimeIntervalTrigger, Trigger};
