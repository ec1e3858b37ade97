//! In-memory liveness records keyed by job address.

use alloy_primitives::Address;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

/// Liveness state of one tracked job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLivenessRecord {
    pub address: Address,
    pub last_worked_block: u64,
    /// Height up to which this record has been reconciled. Never decreases.
    pub last_checked_block: u64,
    pub consecutive_unworked_blocks: u64,
    /// Wall-clock time of the last mutation. Only used for eviction.
    pub last_update_time: SystemTime,
}

impl JobLivenessRecord {
    pub fn new(
        address: Address,
        last_worked_block: u64,
        last_checked_block: u64,
        now: SystemTime,
    ) -> Self {
        let last_worked_block = last_worked_block.min(last_checked_block);
        Self {
            address,
            last_worked_block,
            last_checked_block,
            consecutive_unworked_blocks: last_checked_block - last_worked_block,
            last_update_time: now,
        }
    }

    /// Time since the last mutation; zero when the clock went backwards.
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.last_update_time)
            .unwrap_or(Duration::ZERO)
    }
}

/// Exclusive owner of every [`JobLivenessRecord`]. One record per address.
#[derive(Debug, Default, Clone)]
pub struct JobStateStore {
    records: BTreeMap<Address, JobLivenessRecord>,
}

impl JobStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &Address) -> Option<&JobLivenessRecord> {
        self.records.get(address)
    }

    /// Inserts or replaces the record stored under `record.address`.
    pub fn upsert(&mut self, record: JobLivenessRecord) {
        self.records.insert(record.address, record);
    }

    pub fn delete(&mut self, address: &Address) -> Option<JobLivenessRecord> {
        self.records.remove(address)
    }

    pub fn values(&self) -> impl Iterator<Item = &JobLivenessRecord> {
        self.records.values()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.records.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
