//! Block-by-block reconciliation of job liveness.
//!
//! For every block the tracker reads the active leader, asks each job whether it
//! still needs work, and cross-checks "no work needed" answers against the job's
//! `Work` events before moving the unworked streak. Alerts are raised once the
//! streak crosses the configured threshold.

use super::bootstrap::{self, MAX_LOG_RANGE_BLOCKS};
use super::history::WorkHistory;
use super::store::{JobLivenessRecord, JobStateStore};
use crate::alert::{Alert, AlertDispatcher};
use crate::chain::{contracts, ChainClient, JobRegistry};
use crate::runtime::config::MonitorConfig;
use crate::runtime::telemetry::Telemetry;
use alloy_primitives::{Address, Bytes, B256};
use anyhow::{bail, Context, Result};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Decides whether a streak warrants notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertPolicy {
    threshold: u64,
    suppressed_reasons: Vec<String>,
}

impl AlertPolicy {
    pub fn new(threshold: u64, suppressed_reasons: Vec<String>) -> Self {
        Self {
            threshold,
            suppressed_reasons,
        }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn should_alert(&self, unworked_blocks: u64) -> bool {
        unworked_blocks >= self.threshold
    }

    /// Exact, case-sensitive match against the suppression list.
    pub fn is_suppressed(&self, reason: &str) -> bool {
        self.suppressed_reasons.iter().any(|entry| entry == reason)
    }
}

#[derive(Debug, Clone)]
pub struct TrackerParams {
    pub sequencer: Address,
    pub policy: AlertPolicy,
    pub lookback_blocks: u64,
    pub registry_refresh_interval: Duration,
    /// Work-event lookups allowed in flight while reconciling one block.
    pub max_concurrent_lookups: usize,
}

impl TrackerParams {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            sequencer: config.sequencer_address(),
            policy: AlertPolicy::new(
                config.unworked_blocks_threshold(),
                config.suppressed_reasons().to_vec(),
            ),
            lookback_blocks: config.lookback_blocks(),
            registry_refresh_interval: config.registry_refresh_interval(),
            max_concurrent_lookups: config.max_concurrent_requests(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapSummary {
    pub height: u64,
    pub jobs: usize,
    pub leader: B256,
}

/// Counts of what happened to the tracked jobs during one block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockSummary {
    pub block: u64,
    pub reconciled: usize,
    pub worked: usize,
    pub job_failures: usize,
    pub alerts_sent: usize,
    pub alerts_suppressed: usize,
    pub alert_failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// No leader was active; nothing was mutated.
    SkippedNoLeader { block: u64 },
    Reconciled(BlockSummary),
}

/// What one job's predicate said for the current block.
enum Observation {
    NeedsWork { reason: String },
    Idle { reason: String },
    Failed,
}

/// Owns the job state store and applies blocks to it.
pub struct LivenessTracker {
    client: Arc<dyn ChainClient>,
    registry: JobRegistry,
    history: WorkHistory,
    dispatcher: Arc<dyn AlertDispatcher>,
    telemetry: Arc<Telemetry>,
    store: JobStateStore,
    jobs: Vec<Address>,
    policy: AlertPolicy,
    lookback_blocks: u64,
    registry_refresh_interval: Duration,
    max_concurrent_lookups: usize,
    last_registry_refresh: Option<Instant>,
}

impl LivenessTracker {
    pub fn new(
        client: Arc<dyn ChainClient>,
        dispatcher: Arc<dyn AlertDispatcher>,
        telemetry: Arc<Telemetry>,
        params: TrackerParams,
    ) -> Self {
        let lookback_blocks = params.lookback_blocks.clamp(2, MAX_LOG_RANGE_BLOCKS);
        Self {
            registry: JobRegistry::new(Arc::clone(&client), params.sequencer),
            history: WorkHistory::new(Arc::clone(&client), lookback_blocks - 1),
            client,
            dispatcher,
            telemetry,
            store: JobStateStore::new(),
            jobs: Vec::new(),
            policy: params.policy,
            lookback_blocks,
            registry_refresh_interval: params.registry_refresh_interval,
            max_concurrent_lookups: params.max_concurrent_lookups.max(1),
            last_registry_refresh: None,
        }
    }

    pub fn store(&self) -> &JobStateStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut JobStateStore {
        &mut self.store
    }

    /// Jobs reconciled on each block, in registry order.
    pub fn jobs(&self) -> &[Address] {
        &self.jobs
    }

    /// Enumerates the registry and seeds one record per job. Any failure aborts
    /// without touching the store.
    pub async fn bootstrap(&mut self) -> Result<BootstrapSummary> {
        let jobs = self
            .registry
            .jobs()
            .await
            .context("bootstrap failed to enumerate jobs")?;
        let height = self
            .client
            .current_height()
            .await
            .context("bootstrap failed to read chain height")?;
        let leader = self
            .registry
            .active_leader()
            .await
            .context("bootstrap failed to read active leader")?;

        let records = bootstrap::bootstrap_records(
            &self.history,
            &jobs,
            height,
            self.lookback_blocks,
            SystemTime::now(),
        )
        .await
        .context("bootstrap failed to read work history")?;

        for record in records {
            tracing::info!(
                job = %format!("{:#x}", record.address),
                last_worked_block = record.last_worked_block,
                unworked_blocks = record.consecutive_unworked_blocks,
                block = height,
                "job seeded"
            );
            self.store.upsert(record);
        }
        self.jobs = jobs;
        self.last_registry_refresh = Some(Instant::now());
        self.telemetry.set_tracked_jobs(self.store.len());

        tracing::info!(
            height,
            jobs = self.jobs.len(),
            leader = %leader,
            threshold = self.policy.threshold(),
            "bootstrap complete"
        );

        Ok(BootstrapSummary {
            height,
            jobs: self.jobs.len(),
            leader,
        })
    }

    /// Re-enumerates the registry when the refresh interval has elapsed. New jobs
    /// are seeded at `height`; departed jobs simply stop being reconciled.
    pub async fn refresh_registry_if_due(&mut self, height: u64, now: Instant) -> Result<bool> {
        if let Some(last) = self.last_registry_refresh {
            if now.saturating_duration_since(last) < self.registry_refresh_interval {
                return Ok(false);
            }
        }

        let jobs = self
            .registry
            .jobs()
            .await
            .context("registry refresh failed")?;
        let new_jobs: Vec<Address> = jobs
            .iter()
            .copied()
            .filter(|job| !self.store.contains(job))
            .collect();

        if !new_jobs.is_empty() {
            let records = bootstrap::seed_new_jobs(
                &self.history,
                &new_jobs,
                height,
                self.lookback_blocks,
                SystemTime::now(),
            )
            .await
            .context("failed to seed newly registered jobs")?;
            for record in records {
                tracing::info!(
                    job = %format!("{:#x}", record.address),
                    last_worked_block = record.last_worked_block,
                    unworked_blocks = record.consecutive_unworked_blocks,
                    block = height,
                    "new job registered"
                );
                self.store.upsert(record);
            }
        }

        let departed = self.jobs.iter().filter(|job| !jobs.contains(job)).count();
        if departed > 0 {
            tracing::info!(departed, "jobs left the registry; records will age out");
        }

        self.jobs = jobs;
        self.last_registry_refresh = Some(now);
        self.telemetry.set_tracked_jobs(self.store.len());
        Ok(true)
    }

    /// Reconciles every tracked job against block `block`.
    ///
    /// An `Err` means nothing was mutated and the block must be retried. Failures
    /// scoped to one job are absorbed and leave only that job's record behind.
    pub async fn process_block(&mut self, block: u64) -> Result<BlockOutcome> {
        let leader = self
            .registry
            .active_leader()
            .await
            .with_context(|| format!("failed to read leader for block {block}"))?;
        if leader == B256::ZERO {
            tracing::debug!(block, "no active leader; skipping block");
            self.telemetry.record_skipped_block();
            return Ok(BlockOutcome::SkippedNoLeader { block });
        }

        let targets: Vec<Address> = self
            .jobs
            .iter()
            .copied()
            .filter(|job| {
                self.store
                    .get(job)
                    .is_some_and(|record| record.last_checked_block < block)
            })
            .collect();

        let mut summary = BlockSummary {
            block,
            ..BlockSummary::default()
        };
        if targets.is_empty() {
            self.telemetry.record_processed_blocks(1);
            return Ok(BlockOutcome::Reconciled(summary));
        }

        let observations = self.evaluate(&targets, leader, block).await?;

        // Jobs that report no work needed are checked against their Work events
        // since the record was last reconciled, at most `max_concurrent_lookups`
        // at a time and in job order.
        let lookups = targets
            .iter()
            .zip(&observations)
            .filter(|(_, observation)| matches!(observation, Observation::Idle { .. }))
            .filter_map(|(job, _)| {
                let from = self.store.get(job)?.last_checked_block + 1;
                Some((*job, from))
            })
            .collect::<Vec<_>>();
        let history = &self.history;
        let lookup_results: Vec<_> = stream::iter(lookups)
            .map(|(job, from)| async move {
                (job, from, history.worked_between(job, from, block).await)
            })
            .buffered(self.max_concurrent_lookups)
            .collect()
            .await;

        for (job, observation) in targets.into_iter().zip(observations) {
            let (worked, reason) = match observation {
                Observation::Failed => {
                    summary.job_failures += 1;
                    continue;
                }
                Observation::NeedsWork { reason } => (Some(false), reason),
                Observation::Idle { reason } => {
                    (self.lookup_outcome(job, block, &lookup_results), reason)
                }
            };

            let Some(worked) = worked else {
                summary.job_failures += 1;
                continue;
            };
            self.apply(job, block, worked, reason, &mut summary).await;
        }

        self.telemetry.record_processed_blocks(1);
        tracing::debug!(
            block,
            reconciled = summary.reconciled,
            worked = summary.worked,
            job_failures = summary.job_failures,
            alerts_sent = summary.alerts_sent,
            "block reconciled"
        );
        Ok(BlockOutcome::Reconciled(summary))
    }

    /// One batched `workable(leader)` round-trip for `targets`.
    async fn evaluate(
        &self,
        targets: &[Address],
        leader: B256,
        block: u64,
    ) -> Result<Vec<Observation>> {
        let calls: Vec<_> = targets
            .iter()
            .map(|job| contracts::workable_call(*job, leader))
            .collect();
        let results = self
            .client
            .batch_call(&calls)
            .await
            .with_context(|| format!("workable batch failed for block {block}"))?;
        if results.len() != calls.len() {
            bail!(
                "workable batch returned {} results for {} calls",
                results.len(),
                calls.len()
            );
        }

        let observations = targets
            .iter()
            .zip(results)
            .map(|(job, result)| {
                let decoded = result.and_then(|output| contracts::decode_workable(&output));
                match decoded {
                    Ok((true, reason)) => Observation::NeedsWork {
                        reason: decode_reason(&reason),
                    },
                    Ok((false, reason)) => Observation::Idle {
                        reason: decode_reason(&reason),
                    },
                    Err(err) => {
                        tracing::warn!(
                            job = %format!("{:#x}", job),
                            block,
                            error = %format!("{err:#}"),
                            "workable call failed; job left for next block"
                        );
                        Observation::Failed
                    }
                }
            })
            .collect();
        Ok(observations)
    }

    /// Whether the Work-event lookup for `job` found work. `None` when the lookup
    /// failed or the record moved since the lookup range was computed.
    fn lookup_outcome(
        &self,
        job: Address,
        block: u64,
        results: &[(Address, u64, Result<bool>)],
    ) -> Option<bool> {
        let (_, from, result) = results.iter().find(|(candidate, _, _)| *candidate == job)?;
        match result {
            Ok(worked) => {
                let current_from = self.store.get(&job)?.last_checked_block + 1;
                (current_from == *from).then_some(*worked)
            }
            Err(err) => {
                tracing::warn!(
                    job = %format!("{:#x}", job),
                    block,
                    error = %format!("{err:#}"),
                    "work event lookup failed; job left for next block"
                );
                None
            }
        }
    }

    async fn apply(
        &mut self,
        job: Address,
        block: u64,
        worked: bool,
        reason: String,
        summary: &mut BlockSummary,
    ) {
        let Some(mut record) = self.store.get(&job).cloned() else {
            return;
        };
        if block <= record.last_checked_block {
            return;
        }

        if worked {
            record.last_worked_block = block;
            record.consecutive_unworked_blocks = 0;
            summary.worked += 1;
        } else {
            record.consecutive_unworked_blocks = record
                .consecutive_unworked_blocks
                .saturating_add(block - record.last_checked_block);
        }
        record.last_checked_block = block;
        record.last_update_time = SystemTime::now();
        summary.reconciled += 1;

        if self.policy.should_alert(record.consecutive_unworked_blocks) {
            self.notify(&mut record, block, reason, summary).await;
        }

        self.store.upsert(record);
    }

    async fn notify(
        &self,
        record: &mut JobLivenessRecord,
        block: u64,
        reason: String,
        summary: &mut BlockSummary,
    ) {
        let job = format!("{:#x}", record.address);
        if self.policy.is_suppressed(&reason) {
            tracing::info!(
                job = %job,
                block,
                unworked_blocks = record.consecutive_unworked_blocks,
                reason = %reason,
                "alert suppressed"
            );
            self.telemetry.record_alert_suppressed();
            summary.alerts_suppressed += 1;
            return;
        }

        let alert = Alert::job(
            record.address,
            record.consecutive_unworked_blocks,
            block,
            (!reason.is_empty()).then_some(reason),
        );
        match self.dispatcher.send(&alert).await {
            Ok(()) => {
                tracing::warn!(
                    job = %job,
                    block,
                    unworked_blocks = record.consecutive_unworked_blocks,
                    reason = alert.reason.as_deref().unwrap_or(""),
                    "alert dispatched"
                );
                record.consecutive_unworked_blocks = 0;
                self.telemetry.record_alert_sent();
                summary.alerts_sent += 1;
            }
            Err(err) => {
                tracing::error!(
                    job = %job,
                    block,
                    unworked_blocks = record.consecutive_unworked_blocks,
                    error = %format!("{err:#}"),
                    "alert dispatch failed; streak kept"
                );
                self.telemetry.record_alert_failure();
                summary.alert_failures += 1;
            }
        }
    }
}

/// UTF-8 view of a `workable` reason, or a hex sentinel for binary payloads.
pub fn decode_reason(bytes: &Bytes) -> String {
    match std::str::from_utf8(bytes) {
        Ok(reason) => reason.to_owned(),
        Err(_) => format!("non-UTF8 reason: 0x{}", hex::encode(bytes)),
    }
}
