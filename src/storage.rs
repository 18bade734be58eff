//! volatile record store: keeps the most recent `capacity` records, oldest dropped first.

use crate::capabilities::Storage;
use crate::domain::Record;

use anyhow::{bail, Result};
use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 10;

#[derive(Debug)]
pub struct MemoryStorage {
    capacity: usize,
    records: VecDeque<Record>,
}

impl MemoryStorage {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, records: VecDeque::with_capacity(capacity) }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Storage for MemoryStorage {
    fn init(&mut self) -> Result<()> {
        if self.capacity == 0 {
            bail!("storage capacity must be at least 1");
        }
        self.records.clear();
        tracing::info!("[STORAGE] In-memory storage ready (keeps last {} records)", self.capacity);
        Ok(())
    }

    fn append(&mut self, record: Record) {
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    fn retrieve_all(&self) -> Vec<Record> {
        self.records.iter().cloned().collect()
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Reading, ReadingValue};
    use chrono::Utc;

    fn record(n: f64) -> Record {
        Record::merge(vec![Reading::new("seq", n)], Utc::now())
    }

    fn seq(r: &Record) -> f64 {
        match r.get("seq") {
            Some(ReadingValue::Number(n)) => *n,
            other => panic!("unexpected seq value {:?}", other),
        }
    }

    #[test]
    fn test_keeps_everything_below_capacity() {
        let mut storage = MemoryStorage::new(10);
        storage.init().unwrap();
        for i in 0..4 {
            storage.append(record(i as f64));
        }
        assert_eq!(storage.len(), 4);
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut storage = MemoryStorage::new(10);
        storage.init().unwrap();
        for i in 0..25 {
            storage.append(record(i as f64));
        }

        let kept: Vec<f64> = storage.retrieve_all().iter().map(seq).collect();
        assert_eq!(kept.len(), 10);
        assert_eq!(kept, (15..25).map(|i| i as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_capacity_fails_init() {
        let mut storage = MemoryStorage::new(0);
        assert!(storage.init().is_err());
    }
}
