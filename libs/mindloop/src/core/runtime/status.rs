// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};

use crate::core::lifecycle::LifecycleState;

/// Snapshot of the runtime reported by `status` and
/// [`RuntimeController::status`](super::RuntimeController::status).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeStatus {
    pub state: LifecycleState,
    /// Wall seconds since launch.
    pub wall_time: f64,
    /// Virtual seconds (frozen while paused).
    pub virtual_time: f64,
    pub threads: Vec<ThreadStatus>,
    pub models: Vec<ModelStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadStatus {
    pub name: String,
    pub ready: bool,
    pub quiescent: bool,
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatus {
    pub name: String,
    pub has_inference: bool,
    pub publish_seq: u64,
}
