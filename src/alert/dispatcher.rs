use super::webhook::WebhookDispatcher;
use crate::runtime::config::{MonitorConfig, WebhookTarget};
use alloy_primitives::Address;
use anyhow::Result;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

/// Pseudo-address used for monitor-level notices. Never tracked as a job.
pub const SYSTEM_ADDRESS: Address = Address::ZERO;

/// One notification handed to an [`AlertDispatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub address: Address,
    pub unworked_blocks: u64,
    pub current_block: u64,
    pub reason: Option<String>,
}

impl Alert {
    pub fn job(
        address: Address,
        unworked_blocks: u64,
        current_block: u64,
        reason: Option<String>,
    ) -> Self {
        Self {
            address,
            unworked_blocks,
            current_block,
            reason,
        }
    }

    /// A startup/shutdown notice attributed to [`SYSTEM_ADDRESS`].
    pub fn system(message: impl Into<String>, current_block: u64) -> Self {
        Self {
            address: SYSTEM_ADDRESS,
            unworked_blocks: 0,
            current_block,
            reason: Some(message.into()),
        }
    }

    pub fn is_system(&self) -> bool {
        self.address == SYSTEM_ADDRESS
    }

    /// Human-readable message body, addresses rendered lower-case.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_system() {
            return write!(
                f,
                "[jobwatch] {} (block {})",
                self.reason.as_deref().unwrap_or("system notice"),
                self.current_block
            );
        }

        write!(
            f,
            "[jobwatch] job {:#x} has not been worked for {} blocks (block {})",
            self.address, self.unworked_blocks, self.current_block
        )?;
        match self.reason.as_deref() {
            Some(reason) if !reason.is_empty() => write!(f, ", reason: {reason}"),
            _ => Ok(()),
        }
    }
}

/// Delivers alerts somewhere an operator will see them.
///
/// An `Err` means the alert was not delivered; callers must not treat the
/// underlying condition as acknowledged.
pub trait AlertDispatcher: Send + Sync {
    fn send<'a>(&'a self, alert: &'a Alert) -> BoxFuture<'a, Result<()>>;
}

/// Writes alerts to the `jobwatch::alerts` tracing target. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalDispatcher;

impl AlertDispatcher for LocalDispatcher {
    fn send<'a>(&'a self, alert: &'a Alert) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if alert.is_system() {
                tracing::info!(target: "jobwatch::alerts", block = alert.current_block, "{alert}");
            } else {
                tracing::warn!(
                    target: "jobwatch::alerts",
                    job = %format!("{:#x}", alert.address),
                    unworked_blocks = alert.unworked_blocks,
                    block = alert.current_block,
                    reason = alert.reason.as_deref().unwrap_or(""),
                    "{alert}"
                );
            }
            Ok(())
        })
    }
}

/// Picks the dispatcher named by the configured webhook target.
pub fn dispatcher_from_config(config: &MonitorConfig) -> Result<Arc<dyn AlertDispatcher>> {
    match config.webhook() {
        WebhookTarget::Local => Ok(Arc::new(LocalDispatcher)),
        WebhookTarget::Url(url) => Ok(Arc::new(WebhookDispatcher::new(
            url.clone(),
            config.webhook_timeout(),
        )?)),
    }
}
