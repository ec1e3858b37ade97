use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(60);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Monotonic counters describing what the monitor has done since startup.
#[derive(Default, Debug)]
pub struct Telemetry {
    processed_blocks: AtomicU64,
    skipped_blocks: AtomicU64,
    rpc_errors: AtomicU64,
    rpc_timeouts: AtomicU64,
    alerts_sent: AtomicU64,
    alerts_suppressed: AtomicU64,
    alert_failures: AtomicU64,
    evicted_records: AtomicU64,
    tick_failures: AtomicU64,
    tracked_jobs: AtomicUsize,
}

impl Telemetry {
    pub fn record_processed_blocks(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.processed_blocks.fetch_add(count, Ordering::Relaxed);
    }

    /// A block skipped because no leader was active.
    pub fn record_skipped_block(&self) {
        self.skipped_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rpc_error(&self) {
        self.rpc_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rpc_timeout(&self) {
        self.rpc_timeouts.fetch_add(1, Ordering::Relaxed);
        self.rpc_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert_sent(&self) {
        self.alerts_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert_suppressed(&self) {
        self.alerts_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert_failure(&self) {
        self.alert_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.evicted_records.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_tick_failure(&self) {
        self.tick_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_tracked_jobs(&self, jobs: usize) {
        self.tracked_jobs.store(jobs, Ordering::Relaxed);
    }

    pub fn tracked_jobs(&self) -> usize {
        self.tracked_jobs.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            processed_blocks: self.processed_blocks.load(Ordering::Relaxed),
            skipped_blocks: self.skipped_blocks.load(Ordering::Relaxed),
            rpc_errors: self.rpc_errors.load(Ordering::Relaxed),
            rpc_timeouts: self.rpc_timeouts.load(Ordering::Relaxed),
            alerts_sent: self.alerts_sent.load(Ordering::Relaxed),
            alerts_suppressed: self.alerts_suppressed.load(Ordering::Relaxed),
            alert_failures: self.alert_failures.load(Ordering::Relaxed),
            evicted_records: self.evicted_records.load(Ordering::Relaxed),
            tick_failures: self.tick_failures.load(Ordering::Relaxed),
            tracked_jobs: self.tracked_jobs.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub processed_blocks: u64,
    pub skipped_blocks: u64,
    pub rpc_errors: u64,
    pub rpc_timeouts: u64,
    pub alerts_sent: u64,
    pub alerts_suppressed: u64,
    pub alert_failures: u64,
    pub evicted_records: u64,
    pub tick_failures: u64,
    pub tracked_jobs: usize,
}

/// Spawns a background task that periodically logs block throughput, alert
/// counters, and the number of tracked jobs.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "jobwatch::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    let processed_delta = current
                        .processed_blocks
                        .saturating_sub(last_snapshot.processed_blocks);

                    tracing::info!(
                        target: "jobwatch::metrics",
                        tracked_jobs = current.tracked_jobs,
                        processed = current.processed_blocks,
                        processed_delta,
                        skipped = current.skipped_blocks,
                        alerts_sent = current.alerts_sent,
                        alerts_suppressed = current.alerts_suppressed,
                        alert_failures = current.alert_failures,
                        evicted = current.evicted_records,
                        rpc_errors = current.rpc_errors,
                        rpc_timeouts = current.rpc_timeouts,
                        tick_failures = current.tick_failures,
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current;
                }
            }
        }
    })
}
