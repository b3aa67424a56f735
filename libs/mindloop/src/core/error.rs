// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Error types for mindloop
//!
//! Defines the core error types used throughout the runtime. `Cancelled` is
//! not a failure: suspension points return it when shutdown begins, and
//! callers unwind without reporting.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoopError {
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("model registry error: {0}")]
    Model(String),

    #[error("clock error: {0}")]
    Clock(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("cancelled by shutdown")]
    Cancelled,

    #[error("fatal error in thread '{thread}': {source}")]
    Fatal {
        thread: String,
        #[source]
        source: Box<LoopError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type that uses LoopError
pub type Result<T> = std::result::Result<T, LoopError>;

impl LoopError {
    /// True when this error only signals that shutdown interrupted a
    /// suspension point.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoopError::Cancelled)
    }

    /// Launcher exit code: 0 is reserved for a clean run, configuration
    /// errors exit 2, everything else exits 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoopError::Configuration(_) => 2,
            _ => 1,
        }
    }
}
