// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Record store: save/load/retention for the runtime state tree

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use super::{Manifest, Persistable};
use crate::core::error::{LoopError, Result};

const RECORD_NAME_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";
const TMP_PREFIX: &str = ".tmp-";

/// Component kind, mapped to a subdirectory of each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistKind {
    Model,
    Buffer,
    Trainer,
}

impl PersistKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Model => "models",
            Self::Buffer => "buffers",
            Self::Trainer => "trainers",
        }
    }
}

struct Registered {
    kind: PersistKind,
    name: String,
    persistable: Arc<dyn Persistable>,
}

impl Registered {
    fn rel_path(&self) -> String {
        format!("{}/{}", self.kind.dir_name(), self.name)
    }
}

/// Owns the record tree under a root directory and the set of registered
/// persistables. Load order equals registration order.
pub struct StateStore {
    root: PathBuf,
    /// Retention count; 0 keeps every record.
    max_keep: usize,
    registered: Vec<Registered>,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>, max_keep: usize) -> Self {
        Self {
            root: root.into(),
            max_keep,
            registered: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn register(
        &mut self,
        kind: PersistKind,
        name: impl Into<String>,
        persistable: Arc<dyn Persistable>,
    ) -> Result<()> {
        let name = name.into();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(LoopError::Configuration(format!(
                "invalid persistable name '{}'",
                name
            )));
        }
        if self
            .registered
            .iter()
            .any(|r| r.kind == kind && r.name == name)
        {
            return Err(LoopError::Configuration(format!(
                "duplicate persistable '{}/{}'",
                kind.dir_name(),
                name
            )));
        }
        self.registered.push(Registered {
            kind,
            name,
            persistable,
        });
        Ok(())
    }

    pub fn component_names(&self) -> Vec<String> {
        self.registered.iter().map(Registered::rel_path).collect()
    }

    /// Write a complete record and return its final directory.
    ///
    /// With `target: None` the record lands under the configured root with a
    /// UTC-timestamp name and retention is enforced afterwards; an explicit
    /// `target` names the record directory itself and is exempt from
    /// retention. Either way the record is built under a temporary name and
    /// renamed into place once the manifest is on disk.
    pub fn save(&self, target: Option<PathBuf>, virtual_time: f64) -> Result<PathBuf> {
        let (parent, record_name) = match target {
            Some(path) => {
                let parent = path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_owned)
                    .ok_or_else(|| {
                        LoopError::Configuration(format!(
                            "invalid save target '{}'",
                            path.display()
                        ))
                    })?;
                (parent, name)
            }
            None => (self.root.clone(), self.fresh_record_name()?),
        };

        fs::create_dir_all(&parent)?;
        let tmp_dir = parent.join(format!("{}{}", TMP_PREFIX, record_name));
        if tmp_dir.exists() {
            fs::remove_dir_all(&tmp_dir)?;
        }
        fs::create_dir_all(&tmp_dir)?;

        for registered in &self.registered {
            let dir = tmp_dir
                .join(registered.kind.dir_name())
                .join(&registered.name);
            fs::create_dir_all(&dir)?;
            registered.persistable.save_to(&dir)?;
        }

        Manifest::new(virtual_time, self.component_names()).write_to(&tmp_dir)?;

        let final_dir = parent.join(&record_name);
        if final_dir.exists() {
            fs::remove_dir_all(&final_dir)?;
        }
        fs::rename(&tmp_dir, &final_dir)?;
        tracing::info!("state saved to {}", final_dir.display());

        if final_dir.parent() == Some(self.root.as_path()) {
            self.enforce_retention();
        }
        Ok(final_dir)
    }

    /// Restore from `path`: either a record directory (manifest present) or
    /// a root directory, in which case the latest record with a readable
    /// manifest is used. Returns the manifest so the caller can continue the
    /// virtual clock.
    pub fn load(&self, path: &Path) -> Result<Manifest> {
        let record = self.resolve_record(path)?;
        let manifest = Manifest::read_from(&record)?;
        tracing::info!(
            "restoring state from {} (virtual time {:.3}s)",
            record.display(),
            manifest.virtual_time
        );

        for registered in &self.registered {
            let dir = record
                .join(registered.kind.dir_name())
                .join(&registered.name);
            if !dir.is_dir() {
                return Err(LoopError::Configuration(format!(
                    "record {} is missing component '{}'",
                    record.display(),
                    registered.rel_path()
                )));
            }
            registered.persistable.load_from(&dir)?;
        }
        Ok(manifest)
    }

    /// Record directories under the root, oldest first. Partial records
    /// (no manifest) and foreign directories are skipped.
    pub fn list_records(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut records: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !n.starts_with(TMP_PREFIX))
            })
            .filter(|p| Manifest::exists_in(p))
            .collect();
        // Timestamp names are fixed-width, so lexicographic order is
        // chronological order.
        records.sort();
        records
    }

    fn resolve_record(&self, path: &Path) -> Result<PathBuf> {
        if Manifest::exists_in(path) {
            return Ok(path.to_path_buf());
        }
        if path.is_dir() {
            let mut candidates: Vec<PathBuf> = fs::read_dir(path)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir() && Manifest::exists_in(p))
                .collect();
            candidates.sort();
            if let Some(latest) = candidates.pop() {
                return Ok(latest);
            }
        }
        Err(LoopError::Configuration(format!(
            "no usable state record at {}",
            path.display()
        )))
    }

    fn fresh_record_name(&self) -> Result<String> {
        let base = Utc::now().format(RECORD_NAME_FORMAT).to_string();
        if !self.root.join(&base).exists() {
            return Ok(base);
        }
        // Same-millisecond collision: disambiguate with a numeric suffix.
        for n in 1..1000 {
            let candidate = format!("{}-{}", base, n);
            if !self.root.join(&candidate).exists() {
                return Ok(candidate);
            }
        }
        Err(LoopError::Persistence(format!(
            "could not allocate a record name under {}",
            self.root.display()
        )))
    }

    fn enforce_retention(&self) {
        if self.max_keep == 0 {
            return;
        }
        let records = self.list_records();
        if records.len() <= self.max_keep {
            return;
        }
        let excess = records.len() - self.max_keep;
        for old in records.into_iter().take(excess) {
            match fs::remove_dir_all(&old) {
                Ok(()) => tracing::debug!("retention: deleted old record {}", old.display()),
                Err(e) => {
                    tracing::warn!("retention: failed to delete {}: {}", old.display(), e);
                }
            }
        }
    }
}
