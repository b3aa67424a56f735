// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::entry::{AnyModelEntry, Model, ModelEntry};
use crate::core::error::{LoopError, Result};

/// Name-keyed registry of model entries.
///
/// The registry owns type-erased handles for orchestration (status,
/// persistence); user components keep the typed `Arc<ModelEntry<M>>` they
/// registered. Iteration order is the entry name order, which keeps
/// persistence layouts stable.
pub struct ModelRegistry {
    entries: Mutex<BTreeMap<String, Arc<dyn AnyModelEntry>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn register<M: Model>(&self, entry: Arc<ModelEntry<M>>) -> Result<()> {
        self.register_erased(entry)
    }

    pub(crate) fn register_erased(&self, entry: Arc<dyn AnyModelEntry>) -> Result<()> {
        let mut entries = self.entries.lock();
        let name = entry.name().to_string();
        if entries.contains_key(&name) {
            return Err(LoopError::Configuration(format!(
                "duplicate model entry '{}'",
                name
            )));
        }
        entries.insert(name, entry);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AnyModelEntry>> {
        self.entries.lock().get(name).cloned()
    }

    /// Lookup that treats an unknown name as a configuration error.
    pub fn expect(&self, name: &str) -> Result<Arc<dyn AnyModelEntry>> {
        self.get(name)
            .ok_or_else(|| LoopError::Configuration(format!("unknown model '{}'", name)))
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(String, Arc<dyn AnyModelEntry>)> {
        self.entries
            .lock()
            .iter()
            .map(|(name, entry)| (name.clone(), Arc::clone(entry)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
