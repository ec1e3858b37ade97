//! Work-event history lookups with a bounded block span per request.

use crate::chain::contracts::work_event_topic;
use crate::chain::{ChainClient, ChainLog, LogFilter};
use alloy_primitives::{Address, B256};
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Splits `[from, to]` into consecutive inclusive windows of at most `max_span`
/// blocks, newest window first.
pub fn windows_newest_first(from: u64, to: u64, max_span: u64) -> Vec<(u64, u64)> {
    let max_span = max_span.max(1);
    let mut windows = Vec::new();
    if from > to {
        return windows;
    }

    let mut end = to;
    loop {
        let start = end.saturating_sub(max_span - 1).max(from);
        windows.push((start, end));
        if start == from {
            break;
        }
        end = start - 1;
    }
    windows
}

/// Reads `Work` events for tracked jobs.
#[derive(Clone)]
pub struct WorkHistory {
    client: Arc<dyn ChainClient>,
    topic: B256,
    max_span: u64,
}

impl WorkHistory {
    /// `max_span` caps the number of blocks covered by one `get_logs` request.
    pub fn new(client: Arc<dyn ChainClient>, max_span: u64) -> Self {
        Self {
            client,
            topic: work_event_topic(),
            max_span: max_span.max(1),
        }
    }

    /// Highest block in `[from, to]` at which each job emitted a work event,
    /// fetched with a single request regardless of span.
    pub async fn latest_work_single(
        &self,
        jobs: &[Address],
        from: u64,
        to: u64,
    ) -> Result<HashMap<Address, u64>> {
        let mut latest = HashMap::new();
        if jobs.is_empty() || from > to {
            return Ok(latest);
        }
        let logs = self.fetch(jobs, from, to).await?;
        self.collect_latest(jobs, &logs, &mut latest);
        Ok(latest)
    }

    /// Same as [`WorkHistory::latest_work_single`] but walks the range in bounded
    /// windows from newest to oldest, stopping once every job has a hit.
    pub async fn latest_work(
        &self,
        jobs: &[Address],
        from: u64,
        to: u64,
    ) -> Result<HashMap<Address, u64>> {
        let mut latest = HashMap::new();
        if jobs.is_empty() {
            return Ok(latest);
        }

        for (start, end) in windows_newest_first(from, to, self.max_span) {
            let pending: Vec<Address> = jobs
                .iter()
                .copied()
                .filter(|job| !latest.contains_key(job))
                .collect();
            if pending.is_empty() {
                break;
            }
            let logs = self.fetch(&pending, start, end).await?;
            self.collect_latest(&pending, &logs, &mut latest);
        }
        Ok(latest)
    }

    /// Whether `job` emitted at least one work event in `[from, to]`.
    pub async fn worked_between(&self, job: Address, from: u64, to: u64) -> Result<bool> {
        for (start, end) in windows_newest_first(from, to, self.max_span) {
            let logs = self.fetch(std::slice::from_ref(&job), start, end).await?;
            if logs.iter().any(|log| self.is_work_of(log, job)) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn fetch(&self, jobs: &[Address], from: u64, to: u64) -> Result<Vec<ChainLog>> {
        let filter = LogFilter {
            addresses: jobs.to_vec(),
            topic: self.topic,
            from_block: from,
            to_block: to,
        };
        self.client
            .get_logs(&filter)
            .await
            .with_context(|| format!("failed to fetch work events for blocks {from}..={to}"))
    }

    fn collect_latest(&self, jobs: &[Address], logs: &[ChainLog], latest: &mut HashMap<Address, u64>) {
        let wanted: HashSet<&Address> = jobs.iter().collect();
        for log in logs {
            if !wanted.contains(&log.address) || log.topics.first() != Some(&self.topic) {
                continue;
            }
            latest
                .entry(log.address)
                .and_modify(|block| *block = (*block).max(log.block_number))
                .or_insert(log.block_number);
        }
    }

    fn is_work_of(&self, log: &ChainLog, job: Address) -> bool {
        log.address == job && log.topics.first() == Some(&self.topic)
    }
}
