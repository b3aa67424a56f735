// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Producer/consumer endpoints over a shared buffer

use std::sync::Arc;

use super::buffer::{BufferSnapshot, DataBuffer, Record};
use crate::core::error::Result;

/// Producer handle: the interaction side appends records through this.
pub struct DataCollector<T> {
    buffer: Arc<DataBuffer<T>>,
}

impl<T> Clone for DataCollector<T> {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl<T> DataCollector<T> {
    pub fn collect(&self, record: Record<T>) -> Result<()> {
        self.buffer.collect(record)
    }

    pub fn buffer_name(&self) -> &str {
        self.buffer.name()
    }
}

/// Consumer handle: trainers pull independent snapshots through this.
pub struct DataUser<T> {
    buffer: Arc<DataBuffer<T>>,
}

impl<T> Clone for DataUser<T> {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl<T> DataUser<T> {
    pub fn count(&self) -> usize {
        self.buffer.count()
    }

    pub fn buffer_name(&self) -> &str {
        self.buffer.name()
    }
}

impl<T: Clone> DataUser<T> {
    pub fn get_data(&self) -> BufferSnapshot<T> {
        self.buffer.get_data()
    }
}

impl<T> DataBuffer<T> {
    /// Producer and consumer handles over this buffer.
    pub fn endpoints(self: &Arc<Self>) -> (DataCollector<T>, DataUser<T>) {
        (
            DataCollector {
                buffer: Arc::clone(self),
            },
            DataUser {
                buffer: Arc::clone(self),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::data::ReplacementPolicy;
    use std::collections::HashMap;
    use std::thread;

    #[test]
    fn test_endpoints_share_one_buffer() {
        let buffer = Arc::new(
            DataBuffer::new("exp", &["v"], 4, ReplacementPolicy::Queue).unwrap(),
        );
        let (collector, user) = buffer.endpoints();

        collector
            .collect(HashMap::from([("v".to_string(), 1)]))
            .unwrap();
        assert_eq!(user.count(), 1);
        assert_eq!(user.get_data().column("v").unwrap(), &[1]);
    }

    #[test]
    fn test_producer_order_observed_by_consumer() {
        let buffer = Arc::new(
            DataBuffer::new("exp", &["v"], 64, ReplacementPolicy::Queue).unwrap(),
        );
        let (collector, user) = buffer.endpoints();

        let producer = thread::spawn(move || {
            for v in 0..50 {
                collector
                    .collect(HashMap::from([("v".to_string(), v)]))
                    .unwrap();
            }
        });
        producer.join().unwrap();

        let snapshot = user.get_data();
        let column = snapshot.column("v").unwrap();
        assert_eq!(column.len(), 50);
        for (i, v) in column.iter().enumerate() {
            assert_eq!(*v, i as i32);
        }
    }

    #[test]
    fn test_concurrent_collect_and_snapshot() {
        let buffer = Arc::new(
            DataBuffer::new("exp", &["v"], 8, ReplacementPolicy::Queue).unwrap(),
        );
        let (collector, user) = buffer.endpoints();

        let producer = thread::spawn(move || {
            for v in 0..200 {
                collector
                    .collect(HashMap::from([("v".to_string(), v)]))
                    .unwrap();
            }
        });
        for _ in 0..50 {
            let snapshot = user.get_data();
            assert!(snapshot.len() <= 8);
            // Queue policy: whatever is resident is contiguous and ordered.
            let column = snapshot.column("v").unwrap();
            for pair in column.windows(2) {
                assert_eq!(pair[1], pair[0] + 1);
            }
        }
        producer.join().unwrap();
    }
}
