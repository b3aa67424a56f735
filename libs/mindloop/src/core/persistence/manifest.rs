// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{LoopError, Result};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_SCHEMA: u32 = 1;

/// Record metadata written last; its presence marks a complete record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub schema: u32,
    /// Virtual-time offset at capture; the clock continues from here on
    /// restore.
    pub virtual_time: f64,
    /// `kind/name` paths of every component in the record, in registration
    /// order.
    pub components: Vec<String>,
}

impl Manifest {
    pub fn new(virtual_time: f64, components: Vec<String>) -> Self {
        Self {
            schema: MANIFEST_SCHEMA,
            virtual_time,
            components,
        }
    }

    pub fn write_to(&self, record_dir: &Path) -> Result<()> {
        let file = File::create(record_dir.join(MANIFEST_FILE))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .map_err(|e| LoopError::Persistence(format!("failed to write manifest: {}", e)))?;
        Ok(())
    }

    /// Read and validate a manifest. Missing file or schema mismatch is a
    /// configuration error: the record cannot be used.
    pub fn read_from(record_dir: &Path) -> Result<Self> {
        let path = record_dir.join(MANIFEST_FILE);
        let file = File::open(&path).map_err(|e| {
            LoopError::Configuration(format!("no manifest at {}: {}", path.display(), e))
        })?;
        let manifest: Manifest = serde_json::from_reader(file).map_err(|e| {
            LoopError::Configuration(format!("malformed manifest {}: {}", path.display(), e))
        })?;
        if manifest.schema != MANIFEST_SCHEMA {
            return Err(LoopError::Configuration(format!(
                "unsupported state schema {} in {} (expected {})",
                manifest.schema,
                path.display(),
                MANIFEST_SCHEMA
            )));
        }
        Ok(manifest)
    }

    pub fn exists_in(record_dir: &Path) -> bool {
        record_dir.join(MANIFEST_FILE).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::new(12.5, vec!["models/actor".into(), "buffers/exp".into()]);
        manifest.write_to(dir.path()).unwrap();

        let loaded = Manifest::read_from(dir.path()).unwrap();
        assert_eq!(loaded.schema, MANIFEST_SCHEMA);
        assert_eq!(loaded.virtual_time, 12.5);
        assert_eq!(loaded.components.len(), 2);
    }

    #[test]
    fn test_missing_manifest_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Manifest::read_from(dir.path()).unwrap_err();
        assert!(matches!(err, LoopError::Configuration(_)));
    }

    #[test]
    fn test_schema_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"schema": 99, "virtual_time": 0.0, "components": []}"#,
        )
        .unwrap();
        let err = Manifest::read_from(dir.path()).unwrap_err();
        assert!(err.to_string().contains("schema"));
    }
}
