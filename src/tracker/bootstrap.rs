//! Seeds liveness records from recent work-event history.

use super::history::WorkHistory;
use super::store::JobLivenessRecord;
use alloy_primitives::Address;
use anyhow::Result;
use std::collections::HashMap;
use std::time::SystemTime;

/// Widest history window scanned when seeding a record.
pub const MAX_LOG_RANGE_BLOCKS: u64 = 1_000;

/// Oldest block considered when seeding at `height`: `max(0, height - lookback)`.
pub fn lookback_floor(height: u64, lookback: u64) -> u64 {
    height.saturating_sub(lookback.min(MAX_LOG_RANGE_BLOCKS))
}

/// Initial records for `jobs` at chain height `height`, read with one
/// `get_logs` request over `[floor, height]`.
pub async fn bootstrap_records(
    history: &WorkHistory,
    jobs: &[Address],
    height: u64,
    lookback: u64,
    now: SystemTime,
) -> Result<Vec<JobLivenessRecord>> {
    let floor = lookback_floor(height, lookback);
    let latest = history.latest_work_single(jobs, floor, height).await?;
    Ok(build_records(jobs, &latest, floor, height, now))
}

/// Records for jobs discovered after startup. Uses bounded windows so no
/// request spans more than the history's window.
pub async fn seed_new_jobs(
    history: &WorkHistory,
    jobs: &[Address],
    height: u64,
    lookback: u64,
    now: SystemTime,
) -> Result<Vec<JobLivenessRecord>> {
    let floor = lookback_floor(height, lookback);
    let latest = history.latest_work(jobs, floor, height).await?;
    Ok(build_records(jobs, &latest, floor, height, now))
}

fn build_records(
    jobs: &[Address],
    latest: &HashMap<Address, u64>,
    floor: u64,
    height: u64,
    now: SystemTime,
) -> Vec<JobLivenessRecord> {
    jobs.iter()
        .map(|job| {
            let last_worked = latest.get(job).copied().unwrap_or(floor);
            JobLivenessRecord::new(*job, last_worked, height, now)
        })
        .collect()
}
