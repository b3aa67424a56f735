// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Minimal MindLoop launcher
//!
//! Wires the smallest complete runtime: a noisy scalar environment, an agent
//! that damps it with a one-weight controller, and a trainer that tunes the
//! weight from collected experience at 10 Hz. Demonstrates the launcher
//! contract: TOML config + flag overrides, Ctrl+C shutdown, and the exit
//! codes (0 normal, 1 fatal, 2 configuration).
//!
//! Try it:
//! ```text
//! minimal-agent --web-api 127.0.0.1:9500 --states-dir ./states --save-interval 30
//! mindloop status
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use mindloop::prelude::*;

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "minimal-agent")]
#[command(author, version, about = "Minimal MindLoop runtime", long_about = None)]
struct Args {
    /// TOML config file (flags below override it)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Control console address, host:port
    #[arg(long, value_name = "ADDR")]
    web_api: Option<String>,

    /// Root directory for state records
    #[arg(long, value_name = "DIR")]
    states_dir: Option<PathBuf>,

    /// Periodic save cadence in seconds (0 disables)
    #[arg(long, value_name = "SECS")]
    save_interval: Option<f64>,

    /// Retention count for state records (0 keeps everything)
    #[arg(long, value_name = "N")]
    max_keep: Option<usize>,

    /// Wall-clock ceiling in seconds (0 means no limit)
    #[arg(long, value_name = "SECS")]
    max_uptime: Option<f64>,

    /// Record directory (or states root) to restore from
    #[arg(long, value_name = "PATH")]
    resume_from: Option<PathBuf>,

    /// Interaction cadence in Hz
    #[arg(long, default_value = "50.0")]
    hz: f64,
}

impl Args {
    fn into_config(self) -> mindloop::Result<(LauncherConfig, f64)> {
        let mut config = match &self.config {
            Some(path) => LauncherConfig::from_toml_file(path)?,
            None => LauncherConfig::default(),
        };
        if self.web_api.is_some() {
            config.web_api_address = self.web_api;
        }
        if let Some(dir) = self.states_dir {
            config.states_dir = dir;
        }
        if let Some(interval) = self.save_interval {
            config.save_interval_seconds = interval;
        }
        if let Some(keep) = self.max_keep {
            config.max_keep_states = keep;
        }
        if let Some(uptime) = self.max_uptime {
            config.max_uptime_seconds = uptime;
        }
        if self.resume_from.is_some() {
            config.resume_from = self.resume_from;
        }
        config.validate()?;
        if !self.hz.is_finite() || self.hz <= 0.0 {
            return Err(LoopError::Configuration(format!(
                "--hz must be positive, got {}",
                self.hz
            )));
        }
        Ok((config, self.hz))
    }
}

// ---------------------------------------------------------------------------
// Toy model: a single damping weight
// ---------------------------------------------------------------------------

struct DampingModel {
    weight: f64,
}

impl Model for DampingModel {
    fn copy_params_to(&self, target: &mut Self) -> mindloop::Result<()> {
        target.weight = self.weight;
        Ok(())
    }

    fn save_to(&self, dir: &Path) -> mindloop::Result<()> {
        let file = std::fs::File::create(dir.join("weight.json"))?;
        serde_json::to_writer(file, &self.weight)
            .map_err(|e| LoopError::Persistence(e.to_string()))?;
        Ok(())
    }

    fn load_from(&mut self, dir: &Path) -> mindloop::Result<()> {
        let file = std::fs::File::open(dir.join("weight.json"))?;
        self.weight = serde_json::from_reader(file)
            .map_err(|e| LoopError::Persistence(e.to_string()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Environment: a drifting scalar the agent is supposed to hold near zero
// ---------------------------------------------------------------------------

struct DriftingScalar {
    state: f64,
    rng: fastrand::Rng,
}

impl Environment for DriftingScalar {
    type Obs = f64;
    type Action = f64;

    fn observe(&mut self) -> mindloop::Result<f64> {
        // Random drift plus measurement noise.
        self.state += self.rng.f64() * 0.2 - 0.1;
        Ok(self.state + (self.rng.f64() * 0.02 - 0.01))
    }

    fn affect(&mut self, action: f64) -> mindloop::Result<()> {
        self.state += action;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Agent: proportional controller reading the published weight
// ---------------------------------------------------------------------------

struct DampingAgent {
    model: Arc<ModelEntry<DampingModel>>,
    collector: DataCollector<f64>,
}

impl Agent for DampingAgent {
    type Obs = f64;
    type Action = f64;

    fn step(&mut self, obs: f64) -> mindloop::Result<f64> {
        let action = {
            let inference = self.model.inference()?;
            -inference.weight * obs
        };
        let record: Record<f64> =
            Record::from([("obs".to_string(), obs), ("action".to_string(), action)]);
        self.collector.collect(record)?;
        Ok(action)
    }
}

// ---------------------------------------------------------------------------
// Trainer: nudge the weight toward critical damping and publish
// ---------------------------------------------------------------------------

struct DampingTrainer {
    model: Arc<ModelEntry<DampingModel>>,
    experience: DataUser<f64>,
}

impl Trainer for DampingTrainer {
    fn train(&mut self) -> mindloop::Result<()> {
        // Consumer snapshot first, then the training view.
        let snapshot = self.experience.get_data();
        if snapshot.is_empty() {
            return Ok(());
        }
        let observations = snapshot.column("obs").unwrap_or(&[]);
        let mean_abs: f64 =
            observations.iter().map(|o| o.abs()).sum::<f64>() / observations.len() as f64;

        {
            let mut training = self.model.training();
            // Drive toward 1.0 faster the further the state wanders.
            let rate = (0.05 * mean_abs).clamp(0.001, 0.2);
            training.weight += rate * (1.0 - training.weight);
        }
        self.model.publish()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Launcher
// ---------------------------------------------------------------------------

fn build_runtime(config: LauncherConfig, hz: f64) -> mindloop::Result<LoopRuntime> {
    let model = ModelEntry::new(
        "damping",
        DampingModel { weight: 0.1 },
        Some(DampingModel { weight: 0.0 }),
    )?;
    let buffer = Arc::new(DataBuffer::new(
        "experience",
        &["obs", "action"],
        256,
        ReplacementPolicy::Queue,
    )?);
    let (collector, user) = buffer.endpoints();

    let environment = DriftingScalar {
        state: 1.0,
        rng: fastrand::Rng::with_seed(7),
    };
    let agent = DampingAgent {
        model: Arc::clone(&model),
        collector,
    };
    let trainer = DampingTrainer {
        model: Arc::clone(&model),
        experience: user,
    };

    LoopRuntime::builder()
        .config(config)
        .interaction(FixedIntervalInteraction::new(environment, agent, 1.0 / hz)?)
        .trainer("damping", trainer, TimeIntervalTrigger::new(0.1)?)
        .model(model)
        .buffer(buffer)
        .build()
}

fn run() -> mindloop::Result<()> {
    let (config, hz) = Args::parse().into_config()?;
    let mut runtime = build_runtime(config, hz)?;

    let controller = runtime.controller();
    ctrlc::set_handler(move || {
        tracing::info!("interrupt received, shutting down");
        let _ = controller.shutdown();
    })
    .map_err(|e| LoopError::Configuration(format!("cannot install signal handler: {}", e)))?;

    runtime.run()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run() {
        Ok(()) => {}
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(e.exit_code());
        }
    }
}
