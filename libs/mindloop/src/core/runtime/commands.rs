// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Control commands and the cloneable controller handle
//!
//! Commands carry a reply channel; the control thread answers each one
//! before processing the next. The controller is what the console thread,
//! signal handlers and tests hold.

use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::Sender;

use super::status::RuntimeStatus;
use crate::core::error::{LoopError, Result};
use crate::core::lifecycle::{Lifecycle, LifecycleState};

/// How long a controller waits for the control thread to answer.
const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

type Reply<T> = Sender<T>;

pub(crate) enum ControlCommand {
    Status {
        reply: Reply<RuntimeStatus>,
    },
    Pause {
        reply: Reply<Result<()>>,
    },
    Resume {
        reply: Reply<Result<()>>,
    },
    SaveState {
        target: Option<PathBuf>,
        reply: Reply<Result<PathBuf>>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// Cloneable handle for driving a running [`LoopRuntime`](super::LoopRuntime)
/// from other threads.
#[derive(Clone)]
pub struct RuntimeController {
    tx: Sender<ControlCommand>,
    lifecycle: Lifecycle,
}

impl RuntimeController {
    pub(crate) fn new(tx: Sender<ControlCommand>, lifecycle: Lifecycle) -> Self {
        Self { tx, lifecycle }
    }

    /// Current lifecycle state, read directly off the latch.
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn status(&self) -> Result<RuntimeStatus> {
        self.request(|reply| ControlCommand::Status { reply })
    }

    pub fn pause(&self) -> Result<()> {
        self.request(|reply| ControlCommand::Pause { reply })?
    }

    pub fn resume(&self) -> Result<()> {
        self.request(|reply| ControlCommand::Resume { reply })?
    }

    /// Save a state record, optionally to an explicit directory. Returns the
    /// record path.
    pub fn save_state(&self, target: Option<PathBuf>) -> Result<PathBuf> {
        self.request(|reply| ControlCommand::SaveState { target, reply })?
    }

    /// Request an orderly shutdown. Succeeds even when the runtime is
    /// already gone.
    pub fn shutdown(&self) -> Result<()> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        if self
            .tx
            .send(ControlCommand::Shutdown { reply: reply_tx })
            .is_err()
        {
            return Ok(());
        }
        let _ = reply_rx.recv_timeout(REPLY_TIMEOUT);
        Ok(())
    }

    fn request<T>(&self, make: impl FnOnce(Reply<T>) -> ControlCommand) -> Result<T> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.tx
            .send(make(reply_tx))
            .map_err(|_| control_unavailable())?;
        reply_rx
            .recv_timeout(REPLY_TIMEOUT)
            .map_err(|_| control_unavailable())
    }
}

fn control_unavailable() -> LoopError {
    LoopError::Other(anyhow::anyhow!("control thread is not available"))
}
