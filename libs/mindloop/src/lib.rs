// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! MindLoop: a runtime for concurrent inference and learning
//!
//! An agent interacts with its environment on a fixed cadence while trainer
//! threads consume the experience stream and continuously update model
//! parameters, publishing them back to the inference side atomically. The
//! crate provides the concurrency substrate: lifecycle orchestration
//! (pause/resume/shutdown), pause-aware virtual time, the experience data
//! fabric, the double-buffered model registry, periodic state persistence
//! and a TCP control console.
//!
//! Model math, agent policy and environment physics are user code behind
//! the [`core::Model`], [`core::Agent`], [`core::Environment`] and
//! [`core::Trainer`] traits.

pub mod core;

pub use core::prelude;

pub use core::{
    Agent, AllTrigger, AnyTrigger, BufferSnapshot, DataBuffer, DataCollector, DataUser,
    Environment, FixedIntervalInteraction, Interaction, LauncherConfig, LifecycleState,
    LoopError, LoopRuntime, Model, ModelEntry, ModelRegistry, Record, ReplacementPolicy,
    Result, RuntimeBuilder, RuntimeController, RuntimeStatus, StepCountTrigger,
    TimeIntervalTrigger, Trainer, Trigger, VirtualClock,
};
