use crate::runtime::telemetry;
use alloy_primitives::Address;
use anyhow::{bail, Context, Result};
use std::str::FromStr;
use std::time::Duration;

/// Hard ceiling on the number of blocks one `eth_getLogs` request may span.
pub const MAX_LOOKBACK_BLOCKS: u64 = 1_000;

const DEFAULT_TICK_INTERVAL_SECS: u64 = 12;
const DEFAULT_UNWORKED_BLOCKS_THRESHOLD: u64 = 250;
const DEFAULT_BLOCK_BATCH_SIZE: u64 = 10;
const DEFAULT_MAX_JOB_AGE_SECS: u64 = 60 * 60;
const DEFAULT_JANITOR_INTERVAL_SECS: u64 = 5 * 60;
const DEFAULT_REGISTRY_REFRESH_SECS: u64 = 10 * 60;
const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 32;
const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 5;
const DEFAULT_SUPPRESSED_REASON: &str = "No work to do";

/// Literal webhook value that routes alerts to the local log instead of HTTP.
pub const LOCAL_WEBHOOK: &str = "LOCAL";

const ENV_PREFIX: &str = "JOBWATCH_";
const SUPPRESSED_REASON_SEPARATOR: char = '|';

/// Where alerts are delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookTarget {
    Local,
    Url(String),
}

impl WebhookTarget {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw == LOCAL_WEBHOOK {
            return Ok(Self::Local);
        }
        validate_url(raw, "webhook_url")?;
        Ok(Self::Url(raw.to_owned()))
    }
}

/// Runtime configuration for the liveness monitor.
///
/// All instances must be constructed via [`MonitorConfig::builder`], [`MonitorConfig::new`]
/// or [`MonitorConfig::from_env`] so invariants are validated before any consumer observes
/// the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    rpc_url: String,
    sequencer_address: Address,
    webhook: WebhookTarget,
    tick_interval: Duration,
    unworked_blocks_threshold: u64,
    block_batch_size: u64,
    max_job_age: Duration,
    janitor_interval: Duration,
    registry_refresh_interval: Duration,
    suppressed_reasons: Vec<String>,
    rpc_timeout: Duration,
    max_concurrent_requests: usize,
    webhook_timeout: Duration,
    metrics_interval: Duration,
    lookback_blocks: u64,
}

pub struct MonitorConfigParams {
    pub rpc_url: String,
    pub sequencer_address: Address,
    pub webhook: WebhookTarget,
    pub tick_interval: Duration,
    pub unworked_blocks_threshold: u64,
    pub block_batch_size: u64,
    pub max_job_age: Duration,
    pub janitor_interval: Duration,
    pub registry_refresh_interval: Duration,
    pub suppressed_reasons: Vec<String>,
    pub rpc_timeout: Duration,
    pub max_concurrent_requests: usize,
    pub webhook_timeout: Duration,
    pub metrics_interval: Duration,
    pub lookback_blocks: u64,
}

impl MonitorConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> MonitorConfigBuilder {
        MonitorConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: MonitorConfigParams) -> Result<Self> {
        let MonitorConfigParams {
            rpc_url,
            sequencer_address,
            webhook,
            tick_interval,
            unworked_blocks_threshold,
            block_batch_size,
            max_job_age,
            janitor_interval,
            registry_refresh_interval,
            suppressed_reasons,
            rpc_timeout,
            max_concurrent_requests,
            webhook_timeout,
            metrics_interval,
            lookback_blocks,
        } = params;

        let config = Self {
            rpc_url: rpc_url.trim().to_owned(),
            sequencer_address,
            webhook,
            tick_interval,
            unworked_blocks_threshold,
            block_batch_size,
            max_job_age,
            janitor_interval,
            registry_refresh_interval,
            suppressed_reasons,
            rpc_timeout,
            max_concurrent_requests,
            webhook_timeout,
            metrics_interval,
            lookback_blocks,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reads `JOBWATCH_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`MonitorConfig::from_env`] but resolves variables through `lookup`, which
    /// receives the full variable name (e.g. `JOBWATCH_RPC_URL`).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| -> Option<String> {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let mut builder = Self::builder();

        if let Some(url) = read("RPC_URL") {
            builder = builder.rpc_url(url);
        }
        if let Some(raw) = read("SEQUENCER_ADDRESS") {
            let address = Address::from_str(&raw)
                .with_context(|| format!("{ENV_PREFIX}SEQUENCER_ADDRESS is not an address: {raw}"))?;
            builder = builder.sequencer_address(address);
        }
        if let Some(raw) = read("WEBHOOK_URL") {
            builder = builder.webhook(
                WebhookTarget::parse(&raw)
                    .with_context(|| format!("invalid {ENV_PREFIX}WEBHOOK_URL"))?,
            );
        }
        if let Some(secs) = parse_var::<u64>(&read, "TICK_INTERVAL_SECS")? {
            builder = builder.tick_interval(Duration::from_secs(secs));
        }
        if let Some(threshold) = parse_var::<u64>(&read, "UNWORKED_BLOCKS_THRESHOLD")? {
            builder = builder.unworked_blocks_threshold(threshold);
        }
        if let Some(size) = parse_var::<u64>(&read, "BLOCK_BATCH_SIZE")? {
            builder = builder.block_batch_size(size);
        }
        if let Some(secs) = parse_var::<u64>(&read, "MAX_JOB_AGE_SECS")? {
            builder = builder.max_job_age(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_var::<u64>(&read, "JANITOR_INTERVAL_SECS")? {
            builder = builder.janitor_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_var::<u64>(&read, "REGISTRY_REFRESH_SECS")? {
            builder = builder.registry_refresh_interval(Duration::from_secs(secs));
        }
        if let Some(raw) = read("SUPPRESSED_REASONS") {
            builder = builder.suppressed_reasons(split_reasons(&raw));
        }
        if let Some(secs) = parse_var::<u64>(&read, "RPC_TIMEOUT_SECS")? {
            builder = builder.rpc_timeout(Duration::from_secs(secs));
        }
        if let Some(limit) = parse_var::<usize>(&read, "MAX_CONCURRENT_REQUESTS")? {
            builder = builder.max_concurrent_requests(limit);
        }
        if let Some(secs) = parse_var::<u64>(&read, "WEBHOOK_TIMEOUT_SECS")? {
            builder = builder.webhook_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_var::<u64>(&read, "METRICS_INTERVAL_SECS")? {
            builder = builder.metrics_interval(Duration::from_secs(secs));
        }
        if let Some(blocks) = parse_var::<u64>(&read, "LOOKBACK_BLOCKS")? {
            builder = builder.lookback_blocks(blocks);
        }

        builder.build()
    }

    /// Full RPC URL (including scheme) of the chain node.
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Address of the sequencer contract that registers jobs and elects the leader.
    pub fn sequencer_address(&self) -> Address {
        self.sequencer_address
    }

    pub fn webhook(&self) -> &WebhookTarget {
        &self.webhook
    }

    /// Interval between block ticks.
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Unworked streak (in blocks) at which an alert is raised.
    pub fn unworked_blocks_threshold(&self) -> u64 {
        self.unworked_blocks_threshold
    }

    /// Maximum number of blocks reconciled in one tick.
    pub fn block_batch_size(&self) -> u64 {
        self.block_batch_size
    }

    /// Records not updated for longer than this are evicted by the janitor.
    pub fn max_job_age(&self) -> Duration {
        self.max_job_age
    }

    pub fn janitor_interval(&self) -> Duration {
        self.janitor_interval
    }

    pub fn registry_refresh_interval(&self) -> Duration {
        self.registry_refresh_interval
    }

    /// Reason strings that silence notification without resetting the streak.
    pub fn suppressed_reasons(&self) -> &[String] {
        &self.suppressed_reasons
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    /// Upper bound on RPC requests in flight, including the per-block work-event
    /// lookups.
    pub fn max_concurrent_requests(&self) -> usize {
        self.max_concurrent_requests
    }

    /// HTTP timeout for one webhook delivery. Dispatch holds the tracker, so this
    /// bounds how long an unreachable webhook can stall a block.
    pub fn webhook_timeout(&self) -> Duration {
        self.webhook_timeout
    }

    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Blocks of work-event history scanned when a job is first seeded.
    pub fn lookback_blocks(&self) -> u64 {
        self.lookback_blocks
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.rpc_url, "rpc_url")?;

        if self.sequencer_address == Address::ZERO {
            bail!("sequencer_address cannot be the zero address");
        }

        if let WebhookTarget::Url(url) = &self.webhook {
            validate_url(url, "webhook_url")?;
        }

        if self.tick_interval.is_zero() {
            bail!("tick_interval must be greater than 0");
        }

        if self.unworked_blocks_threshold == 0 {
            bail!("unworked_blocks_threshold must be greater than 0");
        }

        if self.block_batch_size == 0 {
            bail!("block_batch_size must be greater than 0");
        }

        if self.max_job_age.is_zero() {
            bail!("max_job_age must be greater than 0");
        }

        if self.janitor_interval.is_zero() {
            bail!("janitor_interval must be greater than 0");
        }

        if self.registry_refresh_interval.is_zero() {
            bail!("registry_refresh_interval must be greater than 0");
        }

        if self.rpc_timeout.is_zero() {
            bail!("rpc_timeout must be greater than 0");
        }

        if self.max_concurrent_requests == 0 {
            bail!("max_concurrent_requests must be greater than 0");
        }

        if self.webhook_timeout.is_zero() {
            bail!("webhook_timeout must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        if self.lookback_blocks < 2 || self.lookback_blocks > MAX_LOOKBACK_BLOCKS {
            bail!(
                "lookback_blocks must be between 2 and {MAX_LOOKBACK_BLOCKS} (got {})",
                self.lookback_blocks
            );
        }

        if self
            .suppressed_reasons
            .iter()
            .any(|reason| reason.trim().is_empty())
        {
            bail!("suppressed_reasons cannot contain empty entries");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct MonitorConfigBuilder {
    rpc_url: Option<String>,
    sequencer_address: Option<Address>,
    webhook: Option<WebhookTarget>,
    tick_interval: Option<Duration>,
    unworked_blocks_threshold: Option<u64>,
    block_batch_size: Option<u64>,
    max_job_age: Option<Duration>,
    janitor_interval: Option<Duration>,
    registry_refresh_interval: Option<Duration>,
    suppressed_reasons: Option<Vec<String>>,
    rpc_timeout: Option<Duration>,
    max_concurrent_requests: Option<usize>,
    webhook_timeout: Option<Duration>,
    metrics_interval: Option<Duration>,
    lookback_blocks: Option<u64>,
}

impl MonitorConfigBuilder {
    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    pub fn sequencer_address(mut self, address: Address) -> Self {
        self.sequencer_address = Some(address);
        self
    }

    pub fn webhook(mut self, webhook: WebhookTarget) -> Self {
        self.webhook = Some(webhook);
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = Some(interval);
        self
    }

    pub fn unworked_blocks_threshold(mut self, blocks: u64) -> Self {
        self.unworked_blocks_threshold = Some(blocks);
        self
    }

    pub fn block_batch_size(mut self, blocks: u64) -> Self {
        self.block_batch_size = Some(blocks);
        self
    }

    pub fn max_job_age(mut self, age: Duration) -> Self {
        self.max_job_age = Some(age);
        self
    }

    pub fn janitor_interval(mut self, interval: Duration) -> Self {
        self.janitor_interval = Some(interval);
        self
    }

    pub fn registry_refresh_interval(mut self, interval: Duration) -> Self {
        self.registry_refresh_interval = Some(interval);
        self
    }

    pub fn suppressed_reasons<I, S>(mut self, reasons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suppressed_reasons = Some(reasons.into_iter().map(Into::into).collect());
        self
    }

    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = Some(timeout);
        self
    }

    pub fn max_concurrent_requests(mut self, limit: usize) -> Self {
        self.max_concurrent_requests = Some(limit);
        self
    }

    pub fn webhook_timeout(mut self, timeout: Duration) -> Self {
        self.webhook_timeout = Some(timeout);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn lookback_blocks(mut self, blocks: u64) -> Self {
        self.lookback_blocks = Some(blocks);
        self
    }

    pub fn build(self) -> Result<MonitorConfig> {
        let params = MonitorConfigParams {
            rpc_url: self.rpc_url.context("rpc_url is required")?,
            sequencer_address: self
                .sequencer_address
                .context("sequencer_address is required")?,
            webhook: self.webhook.context("webhook_url is required")?,
            tick_interval: self
                .tick_interval
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS)),
            unworked_blocks_threshold: self
                .unworked_blocks_threshold
                .unwrap_or(DEFAULT_UNWORKED_BLOCKS_THRESHOLD),
            block_batch_size: self.block_batch_size.unwrap_or(DEFAULT_BLOCK_BATCH_SIZE),
            max_job_age: self
                .max_job_age
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_MAX_JOB_AGE_SECS)),
            janitor_interval: self
                .janitor_interval
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_JANITOR_INTERVAL_SECS)),
            registry_refresh_interval: self
                .registry_refresh_interval
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_REGISTRY_REFRESH_SECS)),
            suppressed_reasons: self
                .suppressed_reasons
                .unwrap_or_else(|| vec![DEFAULT_SUPPRESSED_REASON.to_owned()]),
            rpc_timeout: self
                .rpc_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS)),
            max_concurrent_requests: self
                .max_concurrent_requests
                .unwrap_or(DEFAULT_MAX_CONCURRENT_REQUESTS),
            webhook_timeout: self
                .webhook_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_WEBHOOK_TIMEOUT_SECS)),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            lookback_blocks: self.lookback_blocks.unwrap_or(MAX_LOOKBACK_BLOCKS),
        };

        MonitorConfig::new(params)
    }
}

fn parse_var<T>(read: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    read(name)
        .map(|raw| {
            raw.parse::<T>()
                .with_context(|| format!("failed to parse {ENV_PREFIX}{name}={raw}"))
        })
        .transpose()
}

fn split_reasons(raw: &str) -> Vec<String> {
    raw.split(SUPPRESSED_REASON_SEPARATOR)
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
        .map(str::to_owned)
        .collect()
}

fn validate_url(url: &str, field: &str) -> Result<()> {
    let url = url.trim();
    if url.is_empty() {
        bail!("{field} cannot be empty");
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("{field} must start with http:// or https://");
    }
    Ok(())
}
