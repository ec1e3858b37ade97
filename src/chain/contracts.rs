//! ABI bindings for the sequencer (job registry + leader election) and the
//! job interface polled by the tracker.

use super::types::ContractCall;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall, SolEvent};
use anyhow::{anyhow, Context, Result};

sol! {
    interface ISequencer {
        function getMaster() external view returns (bytes32);
        function numJobs() external view returns (uint256);
        function jobAt(uint256 index) external view returns (address);
    }

    interface IJob {
        event Work(bytes32 indexed network);

        function workable(bytes32 network) external returns (bool canWork, bytes memory args);
    }
}

/// Topic0 of the `Work(bytes32)` event emitted by a job when it is serviced.
pub fn work_event_topic() -> B256 {
    IJob::Work::SIGNATURE_HASH
}

pub fn get_master_call(sequencer: Address) -> ContractCall {
    ContractCall::new(sequencer, ISequencer::getMasterCall {}.abi_encode())
}

pub fn decode_master(output: &[u8]) -> Result<B256> {
    let decoded = ISequencer::getMasterCall::abi_decode_returns(output, true)
        .context("failed to decode getMaster() output")?;
    Ok(decoded._0)
}

pub fn num_jobs_call(sequencer: Address) -> ContractCall {
    ContractCall::new(sequencer, ISequencer::numJobsCall {}.abi_encode())
}

pub fn decode_num_jobs(output: &[u8]) -> Result<u64> {
    let decoded = ISequencer::numJobsCall::abi_decode_returns(output, true)
        .context("failed to decode numJobs() output")?;
    let count = decoded._0;
    u64::try_from(count).map_err(|_| anyhow!("job count {count} does not fit in u64"))
}

pub fn job_at_call(sequencer: Address, index: u64) -> ContractCall {
    let call = ISequencer::jobAtCall {
        index: U256::from(index),
    };
    ContractCall::new(sequencer, call.abi_encode())
}

pub fn decode_job_at(output: &[u8]) -> Result<Address> {
    let decoded = ISequencer::jobAtCall::abi_decode_returns(output, true)
        .context("failed to decode jobAt() output")?;
    Ok(decoded._0)
}

pub fn workable_call(job: Address, network: B256) -> ContractCall {
    ContractCall::new(job, IJob::workableCall { network }.abi_encode())
}

/// Decodes `workable()` into `(can_work, reason_bytes)`.
pub fn decode_workable(output: &[u8]) -> Result<(bool, Bytes)> {
    let decoded = IJob::workableCall::abi_decode_returns(output, true)
        .context("failed to decode workable() output")?;
    Ok((decoded.canWork, decoded.args))
}
