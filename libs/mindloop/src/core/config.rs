// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Launcher configuration
//!
//! Loadable from a TOML file; every field has a default so a partial file
//! (or none at all) is fine. Validation errors surface as configuration
//! errors, which launchers map to exit code 2.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::{LoopError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LauncherConfig {
    /// `host:port` for the control console; `None` disables it.
    pub web_api_address: Option<String>,

    /// Wall-clock ceiling in seconds; 0 means no limit.
    pub max_uptime_seconds: f64,

    /// Root directory for persistence records.
    pub states_dir: PathBuf,

    /// Periodic save cadence in virtual seconds; 0 saves only on explicit
    /// request.
    pub save_interval_seconds: f64,

    /// Retention count for persistence records; 0 keeps everything.
    pub max_keep_states: usize,

    /// Record directory (or states root, whose latest record is used) to
    /// restore from at startup.
    pub resume_from: Option<PathBuf>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            web_api_address: None,
            max_uptime_seconds: 0.0,
            states_dir: PathBuf::from("states"),
            save_interval_seconds: 0.0,
            max_keep_states: 0,
            resume_from: None,
        }
    }
}

impl LauncherConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LoopError::Configuration(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&text).map_err(|e| {
            LoopError::Configuration(format!("malformed config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(addr) = &self.web_api_address {
            let port_valid = addr
                .rsplit_once(':')
                .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
                .unwrap_or(false);
            if !port_valid {
                return Err(LoopError::Configuration(format!(
                    "web_api_address '{}' is not host:port",
                    addr
                )));
            }
        }
        if !self.max_uptime_seconds.is_finite() || self.max_uptime_seconds < 0.0 {
            return Err(LoopError::Configuration(format!(
                "max_uptime_seconds must be >= 0, got {}",
                self.max_uptime_seconds
            )));
        }
        if !self.save_interval_seconds.is_finite() || self.save_interval_seconds < 0.0 {
            return Err(LoopError::Configuration(format!(
                "save_interval_seconds must be >= 0, got {}",
                self.save_interval_seconds
            )));
        }
        Ok(())
    }
}
