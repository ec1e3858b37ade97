//! Reads the sequencer contract: the active leader identifier and the list
//! of registered job addresses.

use super::contracts;
use super::types::{ChainClient, ContractCall};
use alloy_primitives::{Address, Bytes, B256};
use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct JobRegistry {
    client: Arc<dyn ChainClient>,
    sequencer: Address,
}

impl JobRegistry {
    pub fn new(client: Arc<dyn ChainClient>, sequencer: Address) -> Self {
        Self { client, sequencer }
    }

    /// Current leader (network) identifier. `B256::ZERO` means no network is
    /// allowed to work jobs right now.
    pub async fn active_leader(&self) -> Result<B256> {
        let output = self
            .call_single(contracts::get_master_call(self.sequencer))
            .await
            .context("failed to read active leader from sequencer")?;
        contracts::decode_master(&output)
    }

    pub async fn job_count(&self) -> Result<u64> {
        let output = self
            .call_single(contracts::num_jobs_call(self.sequencer))
            .await
            .context("failed to read job count from sequencer")?;
        contracts::decode_num_jobs(&output)
    }

    /// Enumerates every registered job in registry order. Duplicate entries
    /// and the zero address are dropped.
    pub async fn jobs(&self) -> Result<Vec<Address>> {
        let count = self.job_count().await?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let calls: Vec<ContractCall> = (0..count)
            .map(|index| contracts::job_at_call(self.sequencer, index))
            .collect();
        let results = self
            .client
            .batch_call(&calls)
            .await
            .context("failed to enumerate sequencer jobs")?;
        if results.len() != calls.len() {
            bail!(
                "jobAt batch returned {} results for {} calls",
                results.len(),
                calls.len()
            );
        }

        let mut seen = HashSet::with_capacity(results.len());
        let mut jobs = Vec::with_capacity(results.len());
        for (index, result) in results.into_iter().enumerate() {
            let output = result.with_context(|| format!("jobAt({index}) failed"))?;
            let job = contracts::decode_job_at(&output)
                .with_context(|| format!("jobAt({index}) returned malformed data"))?;
            if job == Address::ZERO {
                tracing::warn!(index, "sequencer returned the zero address as a job; ignoring");
                continue;
            }
            if seen.insert(job) {
                jobs.push(job);
            }
        }

        tracing::debug!(
            sequencer = %format!("{:#x}", self.sequencer),
            jobs = jobs.len(),
            "enumerated sequencer jobs"
        );
        Ok(jobs)
    }

    async fn call_single(&self, call: ContractCall) -> Result<Bytes> {
        let mut results = self.client.batch_call(std::slice::from_ref(&call)).await?;
        match results.pop() {
            Some(result) if results.is_empty() => result,
            _ => bail!("expected exactly one result for a single call"),
        }
    }
}
