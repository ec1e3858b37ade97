//! Shared retry context and canned message templates used by the RPC client
//! to keep instrumentation consistent across Ethereum JSON-RPC methods.

use anyhow::Error;
use std::time::Duration;

macro_rules! log_with_retry_ctx {
    ($level:ident, $ctx:expr, $($rest:tt)*) => {{
        if let Some(range) = $ctx.range {
            tracing::$level!(
                from_block = range.from,
                to_block = range.to,
                $($rest)*
            );
        } else {
            tracing::$level!($($rest)*);
        }
    }};
}

pub(crate) use log_with_retry_ctx;

#[derive(Clone, Copy)]
struct RetryRange {
    from: u64,
    to: u64,
}

/// Logging labels describing how a particular RPC operation reports retry
/// attempts, timeouts, and exhaustion.
#[derive(Clone, Copy)]
pub(crate) struct RetryMessages {
    pub(crate) method: &'static str,
    pub(crate) timeout: &'static str,
    pub(crate) retry: &'static str,
    pub(crate) exhausted: &'static str,
}

/// Context passed into `retry_with_backoff` so callers can attach optional
/// block-range metadata and reuse consistent log messaging.
#[derive(Clone, Copy)]
pub(crate) struct RetryContext<'a> {
    range: Option<RetryRange>,
    messages: &'a RetryMessages,
}

impl<'a> RetryContext<'a> {
    pub(crate) fn new(messages: &'a RetryMessages) -> Self {
        Self {
            range: None,
            messages,
        }
    }

    pub(crate) fn with_range(messages: &'a RetryMessages, from: u64, to: u64) -> Self {
        Self {
            range: Some(RetryRange { from, to }),
            messages,
        }
    }

    pub(crate) fn method(&self) -> &'static str {
        self.messages.method
    }

    pub(crate) fn log_timeout(&self, attempt: usize, backoff: Duration) {
        log_with_retry_ctx!(
            warn,
            self,
            attempt,
            method = self.messages.method,
            backoff_ms = Self::duration_to_millis(backoff),
            "{}",
            self.messages.timeout
        );
    }

    pub(crate) fn log_retry(&self, attempt: usize, backoff: Duration, err: &Error) {
        log_with_retry_ctx!(
            warn,
            self,
            attempt,
            backoff_ms = Self::duration_to_millis(backoff),
            error = %err,
            "{}",
            self.messages.retry
        );
    }

    pub(crate) fn log_exhausted(&self, attempt: usize, err: &Error) {
        log_with_retry_ctx!(error, self, attempt, error = %err, "{}", self.messages.exhausted);
    }

    fn duration_to_millis(backoff: Duration) -> u64 {
        backoff.as_millis().min(u128::from(u64::MAX)) as u64
    }
}

pub(crate) const BLOCK_NUMBER_RETRY: RetryMessages = RetryMessages {
    method: "eth_blockNumber",
    timeout: "eth_blockNumber timed out; retrying",
    retry: "eth_blockNumber failed; retrying",
    exhausted: "eth_blockNumber exhausted retries",
};

pub(crate) const ETH_CALL_BATCH_RETRY: RetryMessages = RetryMessages {
    method: "eth_call",
    timeout: "eth_call batch timed out; will retry",
    retry: "eth_call batch failed; retrying",
    exhausted: "eth_call batch exhausted retries",
};

pub(crate) const GET_LOGS_RETRY: RetryMessages = RetryMessages {
    method: "eth_getLogs",
    timeout: "eth_getLogs timed out; will retry",
    retry: "eth_getLogs failed; retrying",
    exhausted: "eth_getLogs exhausted retries",
};
