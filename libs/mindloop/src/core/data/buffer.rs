// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Bounded buffers of named-field records
//!
//! Key properties:
//! - Fixed capacity declared at construction
//! - Field set declared at construction, validated on every collect
//! - `Queue` policy: oldest-out, producer order preserved
//! - `RandomReplacement` policy: a seeded RNG picks the slot to overwrite
//!   when full; presence is guaranteed, order is not
//! - Snapshot reads are independent copies of the live contents

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::error::{LoopError, Result};
use crate::core::persistence::Persistable;

/// One experience record: a value per declared field.
pub type Record<T> = HashMap<String, T>;

/// What happens on `collect` when the buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacementPolicy {
    /// Drop the oldest record.
    Queue,
    /// Overwrite a uniformly random slot, chosen by an RNG seeded with
    /// `seed`.
    RandomReplacement { seed: u64 },
}

struct BufferInner<T> {
    records: VecDeque<Record<T>>,
    rng: fastrand::Rng,
}

/// Fixed-capacity record buffer shared between one producer and its
/// consumers. All access goes through the internal mutex.
pub struct DataBuffer<T> {
    name: String,
    fields: Vec<String>,
    capacity: usize,
    policy: ReplacementPolicy,
    inner: Mutex<BufferInner<T>>,
}

impl<T> DataBuffer<T> {
    pub fn new(
        name: impl Into<String>,
        fields: &[&str],
        capacity: usize,
        policy: ReplacementPolicy,
    ) -> Result<Self> {
        let name = name.into();
        if capacity == 0 {
            return Err(LoopError::Configuration(format!(
                "buffer '{}' requires a positive capacity",
                name
            )));
        }
        if fields.is_empty() {
            return Err(LoopError::Configuration(format!(
                "buffer '{}' requires at least one field",
                name
            )));
        }
        let mut owned: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        owned.sort();
        owned.dedup();
        if owned.len() != fields.len() {
            return Err(LoopError::Configuration(format!(
                "buffer '{}' has duplicate fields",
                name
            )));
        }

        let seed = match policy {
            ReplacementPolicy::RandomReplacement { seed } => seed,
            ReplacementPolicy::Queue => 0,
        };
        Ok(Self {
            name,
            fields: owned,
            capacity,
            policy,
            inner: Mutex::new(BufferInner {
                records: VecDeque::with_capacity(capacity),
                rng: fastrand::Rng::with_seed(seed),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared field names, sorted.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> ReplacementPolicy {
        self.policy
    }

    /// Current number of resident records.
    pub fn count(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Append one record, applying the replacement policy when full. The
    /// record's key set must equal the declared field set.
    pub fn collect(&self, record: Record<T>) -> Result<()> {
        self.check_schema(&record)?;
        let mut inner = self.inner.lock();
        if inner.records.len() < self.capacity {
            inner.records.push_back(record);
            return Ok(());
        }
        match self.policy {
            ReplacementPolicy::Queue => {
                inner.records.pop_front();
                inner.records.push_back(record);
            }
            ReplacementPolicy::RandomReplacement { .. } => {
                let slot = inner.rng.usize(0..self.capacity);
                inner.records[slot] = record;
            }
        }
        Ok(())
    }

    fn check_schema(&self, record: &Record<T>) -> Result<()> {
        let matches = record.len() == self.fields.len()
            && self.fields.iter().all(|f| record.contains_key(f));
        if matches {
            return Ok(());
        }
        let mut got: Vec<&str> = record.keys().map(String::as_str).collect();
        got.sort_unstable();
        Err(LoopError::SchemaMismatch(format!(
            "buffer '{}' expects fields {:?}, got {:?}",
            self.name, self.fields, got
        )))
    }
}

impl<T: Clone> DataBuffer<T> {
    /// Copy out the current contents as per-field columns. The snapshot is
    /// independent of subsequent writes.
    pub fn get_data(&self) -> BufferSnapshot<T> {
        let inner = self.inner.lock();
        let mut columns: HashMap<String, Vec<T>> = self
            .fields
            .iter()
            .map(|f| (f.clone(), Vec::with_capacity(inner.records.len())))
            .collect();
        for record in &inner.records {
            for (field, value) in record {
                if let Some(column) = columns.get_mut(field) {
                    column.push(value.clone());
                }
            }
        }
        BufferSnapshot {
            len: inner.records.len(),
            columns,
        }
    }
}

/// Independent copy of a buffer's contents at one point in time.
#[derive(Debug, Clone)]
pub struct BufferSnapshot<T> {
    len: usize,
    columns: HashMap<String, Vec<T>>,
}

impl<T> BufferSnapshot<T> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Values of one field, in buffer residence order.
    pub fn column(&self, field: &str) -> Option<&[T]> {
        self.columns.get(field).map(Vec::as_slice)
    }
}

impl<T> Persistable for DataBuffer<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    fn save_to(&self, dir: &Path) -> Result<()> {
        let inner = self.inner.lock();
        let records: Vec<&Record<T>> = inner.records.iter().collect();
        let file = std::fs::File::create(dir.join("records.json"))?;
        serde_json::to_writer(std::io::BufWriter::new(file), &records).map_err(|e| {
            LoopError::Persistence(format!("buffer '{}': failed to serialize: {}", self.name, e))
        })?;
        Ok(())
    }

    fn load_from(&self, dir: &Path) -> Result<()> {
        let file = std::fs::File::open(dir.join("records.json"))?;
        let records: Vec<Record<T>> = serde_json::from_reader(file).map_err(|e| {
            LoopError::Persistence(format!(
                "buffer '{}': failed to deserialize: {}",
                self.name, e
            ))
        })?;
        if records.len() > self.capacity {
            return Err(LoopError::Configuration(format!(
                "buffer '{}': record holds {} entries but capacity is {}",
                self.name,
                records.len(),
                self.capacity
            )));
        }
        for record in &records {
            self.check_schema(record)?;
        }
        let mut inner = self.inner.lock();
        inner.records = records.into();
        // The RNG restarts from the configured seed rather than persisting
        // its state; replacement stays deterministic per process run.
        if let ReplacementPolicy::RandomReplacement { seed } = self.policy {
            inner.rng = fastrand::Rng::with_seed(seed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(step: i64, reward: i64) -> Record<i64> {
        HashMap::from([("step".to_string(), step), ("reward".to_string(), reward)])
    }

    fn queue_buffer(capacity: usize) -> DataBuffer<i64> {
        DataBuffer::new("exp", &["step", "reward"], capacity, ReplacementPolicy::Queue).unwrap()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result: Result<DataBuffer<i64>> =
            DataBuffer::new("bad", &["x"], 0, ReplacementPolicy::Queue);
        assert!(matches!(result, Err(LoopError::Configuration(_))));
    }

    #[test]
    fn test_duplicate_fields_rejected() {
        let result: Result<DataBuffer<i64>> =
            DataBuffer::new("bad", &["x", "x"], 3, ReplacementPolicy::Queue);
        assert!(result.is_err());
    }

    #[test]
    fn test_schema_mismatch_is_synchronous_and_nonfatal() {
        let buffer = queue_buffer(3);
        let wrong = HashMap::from([("step".to_string(), 1i64)]);
        assert!(matches!(
            buffer.collect(wrong),
            Err(LoopError::SchemaMismatch(_))
        ));
        // The buffer stays usable.
        buffer.collect(record(1, 0)).unwrap();
        assert_eq!(buffer.count(), 1);
    }

    #[test]
    fn test_queue_drops_oldest() {
        let buffer = queue_buffer(3);
        for step in 1..=5 {
            buffer.collect(record(step, step * 10)).unwrap();
        }
        let snapshot = buffer.get_data();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.column("step").unwrap(), &[3, 4, 5]);
        assert_eq!(snapshot.column("reward").unwrap(), &[30, 40, 50]);
    }

    #[test]
    fn test_size_never_exceeds_capacity() {
        let buffer = queue_buffer(4);
        for k in 0..20 {
            buffer.collect(record(k, 0)).unwrap();
            assert!(buffer.count() <= 4);
            assert!(buffer.count() == usize::min(k as usize + 1, 4));
        }
    }

    #[test]
    fn test_snapshot_is_independent_of_later_writes() {
        let buffer = queue_buffer(3);
        buffer.collect(record(1, 1)).unwrap();
        let snapshot = buffer.get_data();
        buffer.collect(record(2, 2)).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.column("step").unwrap(), &[1]);
    }

    #[test]
    fn test_random_replacement_keeps_capacity_and_is_deterministic() {
        let make = || {
            DataBuffer::new(
                "rr",
                &["step"],
                2,
                ReplacementPolicy::RandomReplacement { seed: 42 },
            )
            .unwrap()
        };
        let fill = |buffer: &DataBuffer<i64>| {
            for step in 1..=4 {
                buffer
                    .collect(HashMap::from([("step".to_string(), step)]))
                    .unwrap();
            }
        };

        let a = make();
        let b = make();
        fill(&a);
        fill(&b);

        assert_eq!(a.count(), 2);
        assert_eq!(
            a.get_data().column("step").unwrap(),
            b.get_data().column("step").unwrap(),
            "same seed must give the same residents"
        );
    }

    #[test]
    fn test_random_replacement_every_item_resident_at_some_point() {
        let buffer = DataBuffer::new(
            "rr",
            &["step"],
            2,
            ReplacementPolicy::RandomReplacement { seed: 7 },
        )
        .unwrap();
        let mut seen: Vec<i64> = Vec::new();
        for step in 1..=5 {
            buffer
                .collect(HashMap::from([("step".to_string(), step)]))
                .unwrap();
            let snapshot = buffer.get_data();
            for v in snapshot.column("step").unwrap() {
                if !seen.contains(v) {
                    seen.push(*v);
                }
            }
        }
        // Every item was resident immediately after its own insert.
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_persistence_roundtrip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = queue_buffer(3);
        for step in 1..=5 {
            buffer.collect(record(step, -step)).unwrap();
        }
        buffer.save_to(dir.path()).unwrap();

        let restored = queue_buffer(3);
        restored.load_from(dir.path()).unwrap();
        let snapshot = restored.get_data();
        assert_eq!(snapshot.column("step").unwrap(), &[3, 4, 5]);
        assert_eq!(snapshot.column("reward").unwrap(), &[-3, -4, -5]);
    }

    #[test]
    fn test_load_rejects_oversized_record() {
        let dir = tempfile::tempdir().unwrap();
        let big = queue_buffer(5);
        for step in 1..=5 {
            big.collect(record(step, 0)).unwrap();
        }
        big.save_to(dir.path()).unwrap();

        let small = queue_buffer(2);
        assert!(matches!(
            small.load_from(dir.path()),
            Err(LoopError::Configuration(_))
        ));
    }
}
