// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};

use crate::core::error::{LoopError, Result};
use crate::core::persistence::Persistable;

const ENTRY_META_FILE: &str = "entry.json";
const PARAMS_DIR: &str = "params";

/// User-implemented model contract. Models are opaque to the runtime: all it
/// needs is directory serialization and a way to mirror parameters onto a
/// sibling instance. `Sync` because the inference side is read concurrently
/// by shared reference.
pub trait Model: Send + Sync + 'static {
    /// Copy this model's parameters onto `target`.
    fn copy_params_to(&self, target: &mut Self) -> Result<()>
    where
        Self: Sized;

    fn save_to(&self, dir: &Path) -> Result<()>;

    fn load_from(&mut self, dir: &Path) -> Result<()>;
}

#[derive(Serialize, Deserialize)]
struct EntryMeta {
    publish_seq: u64,
    has_inference: bool,
}

/// Named training/inference pair.
///
/// The training side is owned by exactly one trainer and guarded by a mutex;
/// the inference side is read-mostly behind a rwlock. Entries without an
/// inference side are trainer-private: `publish` is a no-op and
/// `inference()` errors.
pub struct ModelEntry<M: Model> {
    name: String,
    training: Mutex<M>,
    inference: Option<RwLock<M>>,
    publish_seq: AtomicU64,
}

impl<M: Model> ModelEntry<M> {
    /// Build an entry. When an inference instance is given, the training
    /// parameters are mirrored onto it so the pair starts identical
    /// (`publish_seq` stays 0 until the first real publish).
    pub fn new(name: impl Into<String>, training: M, inference: Option<M>) -> Result<Arc<Self>> {
        let name = name.into();
        if name.is_empty() {
            return Err(LoopError::Model("model entry requires a name".into()));
        }
        let mut inference = inference;
        if let Some(instance) = inference.as_mut() {
            training.copy_params_to(instance)?;
        }
        Ok(Arc::new(Self {
            name,
            training: Mutex::new(training),
            inference: inference.map(RwLock::new),
            publish_seq: AtomicU64::new(0),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_inference(&self) -> bool {
        self.inference.is_some()
    }

    /// Publishes so far. Monotone non-decreasing.
    pub fn publish_seq(&self) -> u64 {
        self.publish_seq.load(Ordering::Acquire)
    }

    /// Exclusive view of the training side. Held by the owning trainer for
    /// the duration of a training step; must be released before `publish`
    /// can be called by anyone else.
    pub fn training(&self) -> MutexGuard<'_, M> {
        self.training.lock()
    }

    /// Shared view of the inference side. Many concurrent readers; no writer
    /// while any reader is active. Do not call `publish` while holding one.
    pub fn inference(&self) -> Result<RwLockReadGuard<'_, M>> {
        match &self.inference {
            Some(lock) => Ok(lock.read()),
            None => Err(LoopError::Model(format!(
                "model '{}' has no inference side",
                self.name
            ))),
        }
    }

    /// Mirror the current training parameters into the inference side and
    /// bump `publish_seq`. Blocks until all inference readers have drained.
    /// No-op for trainer-private entries.
    pub fn publish(&self) -> Result<()> {
        let Some(inference) = &self.inference else {
            return Ok(());
        };
        let training = self.training.lock();
        let mut target = inference.write();
        training.copy_params_to(&mut target)?;
        self.publish_seq.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// Type-erased view of a [`ModelEntry`], used by the orchestrator for
/// status, publishing bookkeeping and persistence. User code keeps the typed
/// `Arc<ModelEntry<M>>`.
pub trait AnyModelEntry: Persistable {
    fn name(&self) -> &str;
    fn has_inference(&self) -> bool;
    fn publish_seq(&self) -> u64;
    fn publish(&self) -> Result<()>;
}

impl std::fmt::Debug for dyn AnyModelEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyModelEntry").field("name", &self.name()).finish()
    }
}

impl<M: Model> AnyModelEntry for ModelEntry<M> {
    fn name(&self) -> &str {
        self.name()
    }

    fn has_inference(&self) -> bool {
        self.has_inference()
    }

    fn publish_seq(&self) -> u64 {
        self.publish_seq()
    }

    fn publish(&self) -> Result<()> {
        self.publish()
    }
}

impl<M: Model> Persistable for ModelEntry<M> {
    fn save_to(&self, dir: &Path) -> Result<()> {
        let params_dir = dir.join(PARAMS_DIR);
        std::fs::create_dir_all(&params_dir)?;
        let training = self.training.lock();
        training.save_to(&params_dir)?;
        let meta = EntryMeta {
            publish_seq: self.publish_seq(),
            has_inference: self.has_inference(),
        };
        let file = File::create(dir.join(ENTRY_META_FILE))?;
        serde_json::to_writer(file, &meta).map_err(|e| {
            LoopError::Persistence(format!("model '{}': failed to write meta: {}", self.name, e))
        })?;
        Ok(())
    }

    fn load_from(&self, dir: &Path) -> Result<()> {
        let file = File::open(dir.join(ENTRY_META_FILE))?;
        let meta: EntryMeta = serde_json::from_reader(file).map_err(|e| {
            LoopError::Persistence(format!("model '{}': malformed meta: {}", self.name, e))
        })?;
        if meta.has_inference != self.has_inference() {
            return Err(LoopError::Configuration(format!(
                "model '{}': record inference-side mismatch",
                self.name
            )));
        }

        let mut training = self.training.lock();
        training.load_from(&dir.join(PARAMS_DIR))?;
        // Re-sync the inference twin with what was just loaded.
        if let Some(inference) = &self.inference {
            let mut target = inference.write();
            training.copy_params_to(&mut target)?;
        }
        self.publish_seq.store(meta.publish_seq, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Toy model: a vector of weights.
    pub struct VecModel {
        pub weights: Vec<f64>,
    }

    impl VecModel {
        pub fn new(weights: Vec<f64>) -> Self {
            Self { weights }
        }
    }

    impl Model for VecModel {
        fn copy_params_to(&self, target: &mut Self) -> Result<()> {
            target.weights = self.weights.clone();
            Ok(())
        }

        fn save_to(&self, dir: &Path) -> Result<()> {
            let file = File::create(dir.join("weights.json"))?;
            serde_json::to_writer(file, &self.weights)
                .map_err(|e| LoopError::Persistence(e.to_string()))?;
            Ok(())
        }

        fn load_from(&mut self, dir: &Path) -> Result<()> {
            let file = File::open(dir.join("weights.json"))?;
            self.weights = serde_json::from_reader(file)
                .map_err(|e| LoopError::Persistence(e.to_string()))?;
            Ok(())
        }
    }
}
