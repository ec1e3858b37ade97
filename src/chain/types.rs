use alloy_primitives::{Address, Bytes, B256};
use anyhow::Result;
use futures::future::BoxFuture;

/// A read-only contract call (`eth_call` against the latest block).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub to: Address,
    pub data: Bytes,
}

impl ContractCall {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            data: data.into(),
        }
    }
}

/// Event-log query over an inclusive block range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub addresses: Vec<Address>,
    pub topic: B256,
    pub from_block: u64,
    pub to_block: u64,
}

impl LogFilter {
    /// Number of blocks covered by the filter, both ends included.
    pub fn span(&self) -> u64 {
        self.to_block
            .saturating_sub(self.from_block)
            .saturating_add(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLog {
    pub address: Address,
    pub block_number: u64,
    pub topics: Vec<B256>,
}

/// Outcome of one entry of a batched call. A failing entry does not fail the
/// rest of the batch.
pub type CallResult = Result<Bytes>;

/// Capability set the liveness tracker needs from a chain node.
///
/// `batch_call` returns one [`CallResult`] per input call, in input order; an
/// `Err` from the outer future means the whole round-trip failed.
pub trait ChainClient: Send + Sync {
    fn current_height(&self) -> BoxFuture<'_, Result<u64>>;

    fn batch_call<'a>(
        &'a self,
        calls: &'a [ContractCall],
    ) -> BoxFuture<'a, Result<Vec<CallResult>>>;

    fn get_logs<'a>(&'a self, filter: &'a LogFilter) -> BoxFuture<'a, Result<Vec<ChainLog>>>;
}
