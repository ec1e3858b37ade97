//! Ethereum JSON-RPC client backing the [`ChainClient`] capability set:
//! `eth_blockNumber`, batched `eth_call`, and `eth_getLogs`, each wrapped in
//! the same retry/backoff loop.

use crate::chain::types::{CallResult, ChainClient, ChainLog, ContractCall, LogFilter};
use crate::rpc::helpers::{format_quantity, parse_quantity};
use crate::rpc::options::RpcClientOptions;
use crate::rpc::retry::{
    RetryContext, BLOCK_NUMBER_RETRY, ETH_CALL_BATCH_RETRY, GET_LOGS_RETRY,
};
use crate::runtime::config::MonitorConfig;
use crate::runtime::telemetry::Telemetry;
use alloy_primitives::{Address, Bytes, B256};
use anyhow::{anyhow, bail, Context, Result};
use futures::future::BoxFuture;
use jsonrpsee::core::client::{ClientT, Error as JsonRpcError};
use jsonrpsee::core::params::BatchRequestBuilder;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use jsonrpsee::types::ErrorObject;
use serde::Deserialize;
use serde_json::json;
use std::{fmt, future::Future, sync::Arc, time::Duration};
use tokio::time::{sleep, timeout};

#[derive(Debug)]
pub enum RpcError {
    Timeout { method: &'static str },
    Call { method: &'static str, code: i32, message: String },
    InvalidResponse { method: &'static str, detail: String },
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::Timeout { method } => write!(f, "rpc method {method} timed out"),
            RpcError::Call {
                method,
                code,
                message,
            } => write!(f, "rpc {method} call failed (code={code}, message={message})"),
            RpcError::InvalidResponse { method, detail } => {
                write!(f, "rpc {method} returned an invalid response: {detail}")
            }
        }
    }
}

impl std::error::Error for RpcError {}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: Address,
    #[serde(default)]
    topics: Vec<B256>,
    block_number: Option<String>,
    #[serde(default)]
    removed: bool,
}

#[derive(Debug, Clone)]
pub struct AsyncRpcClient {
    rpc_url: Arc<String>,
    client: HttpClient,
    options: RpcClientOptions,
    telemetry: Arc<Telemetry>,
}

impl ChainClient for AsyncRpcClient {
    fn current_height(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(self.block_number())
    }

    fn batch_call<'a>(
        &'a self,
        calls: &'a [ContractCall],
    ) -> BoxFuture<'a, Result<Vec<CallResult>>> {
        Box::pin(self.batch_eth_call(calls))
    }

    fn get_logs<'a>(&'a self, filter: &'a LogFilter) -> BoxFuture<'a, Result<Vec<ChainLog>>> {
        Box::pin(self.logs(filter))
    }
}

impl AsyncRpcClient {
    pub fn new(url: impl Into<String>, telemetry: Arc<Telemetry>) -> Result<Self> {
        Self::with_options(url, RpcClientOptions::default(), telemetry)
    }

    pub fn with_options(
        url: impl Into<String>,
        options: RpcClientOptions,
        telemetry: Arc<Telemetry>,
    ) -> Result<Self> {
        options.validate()?;

        let rpc_url = url.into();
        let max_request_body_size = options.max_request_body_bytes.min(u32::MAX as usize) as u32;
        let max_response_body_size = options.max_response_body_bytes.min(u32::MAX as usize) as u32;

        let client = HttpClientBuilder::default()
            .request_timeout(options.request_timeout)
            .max_concurrent_requests(options.max_concurrent_requests)
            .max_request_size(max_request_body_size)
            .max_response_size(max_response_body_size)
            .build(&rpc_url)
            .map_err(|err| anyhow!("failed to build RPC client: {err}"))?;

        Ok(Self {
            rpc_url: Arc::new(rpc_url),
            client,
            options,
            telemetry,
        })
    }

    pub fn from_config(config: &MonitorConfig, telemetry: Arc<Telemetry>) -> Result<Self> {
        let options = RpcClientOptions {
            request_timeout: config.rpc_timeout(),
            max_concurrent_requests: config.max_concurrent_requests(),
            ..RpcClientOptions::default()
        };
        Self::with_options(config.rpc_url().to_owned(), options, telemetry)
    }

    pub fn endpoint(&self) -> &str {
        &self.rpc_url
    }

    pub async fn block_number(&self) -> Result<u64> {
        let context = RetryContext::new(&BLOCK_NUMBER_RETRY);
        let raw: String = self
            .retry_with_backoff(context, || async {
                timeout(
                    self.options.request_timeout,
                    self.client.request(context.method(), rpc_params![]),
                )
                .await
                .map_err(|_| RpcError::Timeout {
                    method: context.method(),
                })?
                .map_err(|err| map_rpc_error(context.method(), err))
            })
            .await?;

        parse_quantity(&raw).map_err(|err| {
            RpcError::InvalidResponse {
                method: context.method(),
                detail: format!("{err:#}"),
            }
            .into()
        })
    }

    /// Sends every call in one JSON-RPC batch against the latest block.
    ///
    /// Only a failure of the round-trip itself is retried; per-entry errors
    /// (typically reverts) are returned in place so one misbehaving contract
    /// does not poison the batch.
    pub async fn batch_eth_call(&self, calls: &[ContractCall]) -> Result<Vec<CallResult>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let context = RetryContext::new(&ETH_CALL_BATCH_RETRY);
        let results = self
            .retry_with_backoff(context, || async { self.eth_call_batch_once(calls).await })
            .await?;

        tracing::debug!(
            calls = calls.len(),
            failed = results.iter().filter(|result| result.is_err()).count(),
            "eth_call batch completed"
        );
        Ok(results)
    }

    pub async fn logs(&self, filter: &LogFilter) -> Result<Vec<ChainLog>> {
        if filter.to_block < filter.from_block {
            bail!(
                "invalid log range: from_block {} is above to_block {}",
                filter.from_block,
                filter.to_block
            );
        }

        let context = RetryContext::with_range(&GET_LOGS_RETRY, filter.from_block, filter.to_block);
        let params = json!({
            "address": filter
                .addresses
                .iter()
                .map(|address| format!("{address:#x}"))
                .collect::<Vec<_>>(),
            "topics": [format!("{:#x}", filter.topic)],
            "fromBlock": format_quantity(filter.from_block),
            "toBlock": format_quantity(filter.to_block),
        });

        let raw: Vec<RpcLog> = self
            .retry_with_backoff(context, || async {
                timeout(
                    self.options.request_timeout,
                    self.client
                        .request(context.method(), rpc_params![params.clone()]),
                )
                .await
                .map_err(|_| RpcError::Timeout {
                    method: context.method(),
                })?
                .map_err(|err| map_rpc_error(context.method(), err))
            })
            .await?;

        let mut logs = Vec::with_capacity(raw.len());
        for entry in raw {
            if entry.removed {
                continue;
            }
            let Some(block_number) = entry.block_number.as_deref() else {
                continue;
            };
            let block_number = parse_quantity(block_number)
                .with_context(|| format!("log from {:#x} has a malformed blockNumber", entry.address))?;
            logs.push(ChainLog {
                address: entry.address,
                block_number,
                topics: entry.topics,
            });
        }
        Ok(logs)
    }

    async fn eth_call_batch_once(&self, calls: &[ContractCall]) -> Result<Vec<CallResult>> {
        const METHOD: &str = "eth_call";

        let mut batch = BatchRequestBuilder::new();
        for call in calls {
            let request = json!({
                "to": format!("{:#x}", call.to),
                "data": call.data,
            });
            batch
                .insert(METHOD, rpc_params![request, "latest"])
                .context("failed to serialize eth_call params")?;
        }

        let response = timeout(
            self.options.request_timeout,
            self.client.batch_request::<Bytes>(batch),
        )
        .await
        .map_err(|_| RpcError::Timeout { method: METHOD })?
        .map_err(|err| map_rpc_error(METHOD, err))?;

        let mut results = Vec::with_capacity(calls.len());
        for entry in response.into_iter() {
            results.push(entry.map_err(|err| map_rpc_batch_error(METHOD, &err)));
        }

        if results.len() != calls.len() {
            return Err(RpcError::InvalidResponse {
                method: METHOD,
                detail: format!(
                    "expected {} batch entries, got {}",
                    calls.len(),
                    results.len()
                ),
            }
            .into());
        }
        Ok(results)
    }

    /// Shared retry/backoff loop that wraps RPC operations with telemetry,
    /// exponential backoff, and consistent logging.
    async fn retry_with_backoff<T, F, Fut>(
        &self,
        context: RetryContext<'_>,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let timed_out = matches!(
                        err.downcast_ref::<RpcError>(),
                        Some(RpcError::Timeout { .. })
                    );
                    if timed_out {
                        self.telemetry.record_rpc_timeout();
                    } else {
                        self.telemetry.record_rpc_error();
                    }

                    if attempt >= self.options.max_attempts {
                        context.log_exhausted(attempt, &err);
                        return Err(err);
                    }

                    let backoff = self.backoff_delay(attempt);
                    if timed_out {
                        context.log_timeout(attempt, backoff);
                    } else {
                        context.log_retry(attempt, backoff, &err);
                    }
                    sleep(backoff).await;
                }
            }
        }
    }

    fn backoff_delay(&self, attempt: usize) -> Duration {
        if attempt <= 1 {
            return self.options.initial_backoff;
        }

        let exponent = attempt.saturating_sub(1) as u32;
        let multiplier = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.options
            .initial_backoff
            .saturating_mul(multiplier)
            .min(self.options.max_backoff)
    }
}

fn map_rpc_error(label: &'static str, err: JsonRpcError) -> anyhow::Error {
    match err {
        JsonRpcError::Call(call) => RpcError::Call {
            method: label,
            code: call.code(),
            message: call.message().to_owned(),
        }
        .into(),
        JsonRpcError::RequestTimeout => RpcError::Timeout { method: label }.into(),
        JsonRpcError::ParseError(parse) => RpcError::InvalidResponse {
            method: label,
            detail: parse.to_string(),
        }
        .into(),
        other => anyhow!("rpc {label} call failed: {other}"),
    }
}

fn map_rpc_batch_error(label: &'static str, err: &ErrorObject<'_>) -> anyhow::Error {
    let message = match err.data() {
        Some(data) => format!("{} (data={})", err.message(), data.get()),
        None => err.message().to_owned(),
    };
    RpcError::Call {
        method: label,
        code: err.code(),
        message,
    }
    .into()
}
