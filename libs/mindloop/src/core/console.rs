// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Control console: TCP line protocol
//!
//! One command per line (`status`, `pause`, `resume`, `shutdown`,
//! `save_state [path]`), one single-line JSON response each. The server runs
//! a current-thread tokio runtime confined to the console thread and
//! forwards every verb over the command channel; the control thread does the
//! actual state validation. Unknown verbs get an error response without
//! disturbing the runtime.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use super::error::LoopError;
use super::lifecycle::ThreadFlags;
use super::runtime::workers::FatalSlot;
use super::runtime::{RuntimeController, RuntimeStatus};

/// How often the server re-checks the lifecycle while idle.
const CONSOLE_POLL: Duration = Duration::from_millis(100);

#[derive(Serialize)]
struct ConsoleResponse {
    result: &'static str,
    state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<RuntimeStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

impl ConsoleResponse {
    fn ok(state: String) -> Self {
        Self {
            result: "ok",
            state,
            message: None,
            status: None,
            path: None,
        }
    }

    fn error(state: String, message: String) -> Self {
        Self {
            result: "error",
            state,
            message: Some(message),
            status: None,
            path: None,
        }
    }
}

/// Console thread body. Owns a current-thread tokio runtime for the server.
pub(crate) fn run_console_thread(
    addr: String,
    controller: RuntimeController,
    flags: Arc<ThreadFlags>,
    fatal: FatalSlot,
) {
    tracing::info!("[console] thread started");
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            fatal.store("console", LoopError::Io(e));
            flags.mark_done();
            return;
        }
    };
    runtime.block_on(serve(addr, controller, &flags, &fatal));
    flags.mark_done();
    tracing::debug!("[console] thread stopped");
}

async fn serve(
    addr: String,
    controller: RuntimeController,
    flags: &Arc<ThreadFlags>,
    fatal: &FatalSlot,
) {
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            fatal.store("console", LoopError::Io(e));
            return;
        }
    };
    flags.mark_ready();
    tracing::info!("[console] listening on {}", addr);

    loop {
        tokio::select! {
            _ = tokio::time::sleep(CONSOLE_POLL) => {
                if controller.state().is_shutting_down() {
                    break;
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!("[console] client connected from {}", peer);
                        if let Err(e) = handle_client(stream, &controller).await {
                            tracing::debug!("[console] client io error: {}", e);
                        }
                    }
                    Err(e) => tracing::warn!("[console] accept failed: {}", e),
                }
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    controller: &RuntimeController,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        if controller.state().is_shutting_down() {
            break;
        }
        let line = tokio::select! {
            _ = tokio::time::sleep(CONSOLE_POLL) => continue,
            maybe = lines.next_line() => match maybe? {
                Some(line) => line,
                None => break,
            },
        };
        let command = line.trim();
        if command.is_empty() {
            continue;
        }

        let is_shutdown = command.split_whitespace().next() == Some("shutdown");
        let response = dispatch(command, controller);
        let mut text = serde_json::to_string(&response)
            .unwrap_or_else(|_| String::from(r#"{"result":"error"}"#));
        text.push('\n');
        writer.write_all(text.as_bytes()).await?;
        writer.flush().await?;

        if is_shutdown {
            break;
        }
    }
    Ok(())
}

fn dispatch(command: &str, controller: &RuntimeController) -> ConsoleResponse {
    let mut parts = command.split_whitespace();
    let verb = parts.next().unwrap_or_default();
    let state = || controller.state().as_str().to_string();

    match verb {
        "status" => match controller.status() {
            Ok(status) => {
                let mut response = ConsoleResponse::ok(status.state.as_str().to_string());
                response.status = Some(status);
                response
            }
            Err(e) => ConsoleResponse::error(state(), e.to_string()),
        },
        "pause" => match controller.pause() {
            Ok(()) => ConsoleResponse::ok(state()),
            Err(e) => ConsoleResponse::error(state(), e.to_string()),
        },
        "resume" => match controller.resume() {
            Ok(()) => ConsoleResponse::ok(state()),
            Err(e) => ConsoleResponse::error(state(), e.to_string()),
        },
        "save_state" => {
            let target = parts.next().map(PathBuf::from);
            match controller.save_state(target) {
                Ok(record) => {
                    let mut response = ConsoleResponse::ok(state());
                    response.path = Some(record.display().to_string());
                    response
                }
                Err(e) => ConsoleResponse::error(state(), e.to_string()),
            }
        }
        "shutdown" => {
            let _ = controller.shutdown();
            ConsoleResponse::ok(state())
        }
        other => ConsoleResponse::error(state(), format!("unknown command '{}'", other)),
    }
}
