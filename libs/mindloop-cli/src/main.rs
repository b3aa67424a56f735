// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! MindLoop console client
//!
//! Speaks the one-command-per-line protocol of a running runtime's control
//! console and pretty-prints the single-line JSON responses.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mindloop")]
#[command(author, version, about = "Control a running MindLoop runtime", long_about = None)]
struct Args {
    /// Runtime host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Console port
    #[arg(short, long, default_value = "9500")]
    port: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report runtime state, thread readiness and model publish counters
    Status,
    /// Suspend the interaction loop and all trainers
    Pause,
    /// Resume a paused runtime
    Resume,
    /// Begin an orderly shutdown
    Shutdown,
    /// Save a state record, optionally to an explicit directory
    SaveState {
        /// Target record directory (defaults to the runtime's states_dir)
        path: Option<PathBuf>,
    },
}

impl Command {
    fn wire_format(&self) -> String {
        match self {
            Command::Status => "status".into(),
            Command::Pause => "pause".into(),
            Command::Resume => "resume".into(),
            Command::Shutdown => "shutdown".into(),
            Command::SaveState { path: None } => "save_state".into(),
            Command::SaveState { path: Some(path) } => {
                format!("save_state {}", path.display())
            }
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let stream = TcpStream::connect(&addr)
        .with_context(|| format!("cannot reach runtime console at {}", addr))?;
    stream.set_read_timeout(Some(Duration::from_secs(30)))?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);

    writeln!(writer, "{}", args.command.wire_format())?;
    writer.flush()?;

    let mut line = String::new();
    reader
        .read_line(&mut line)
        .context("runtime closed the connection without responding")?;
    let response: serde_json::Value =
        serde_json::from_str(line.trim()).context("malformed response from runtime")?;

    println!("{}", serde_json::to_string_pretty(&response)?);

    if response.get("result").and_then(|v| v.as_str()) != Some("ok") {
        let message = response
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("command failed");
        bail!("{}", message);
    }
    Ok(())
}
