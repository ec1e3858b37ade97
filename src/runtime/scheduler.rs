//! Drives the liveness tracker forward one contiguous block range per tick.

use crate::chain::ChainClient;
use crate::runtime::progress::BlockWatermark;
use crate::runtime::telemetry::Telemetry;
use crate::tracker::LivenessTracker;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick was still running.
    Busy,
    /// Nothing new to process at `height`.
    Idle { height: u64 },
    /// Blocks `from..=to` were reconciled and the watermark now sits at `to`.
    Advanced { from: u64, to: u64 },
}

/// Clears the in-flight flag when a tick ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct BlockScheduler {
    tracker: Arc<Mutex<LivenessTracker>>,
    client: Arc<dyn ChainClient>,
    watermark: Arc<BlockWatermark>,
    telemetry: Arc<Telemetry>,
    block_batch_size: u64,
    in_flight: AtomicBool,
}

impl BlockScheduler {
    pub fn new(
        tracker: Arc<Mutex<LivenessTracker>>,
        client: Arc<dyn ChainClient>,
        watermark: Arc<BlockWatermark>,
        telemetry: Arc<Telemetry>,
        block_batch_size: u64,
    ) -> Self {
        Self {
            tracker,
            client,
            watermark,
            telemetry,
            block_batch_size: block_batch_size.max(1),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn watermark(&self) -> &BlockWatermark {
        &self.watermark
    }

    /// Processes up to `block_batch_size` blocks past the watermark, in order.
    ///
    /// Shutdown is observed between blocks. On error the watermark stays on the
    /// last block that completed and the next tick resumes from there.
    pub async fn tick(&self, shutdown: &CancellationToken) -> Result<TickOutcome> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            tracing::debug!("previous tick still running; skipping");
            return Ok(TickOutcome::Busy);
        };

        let height = self
            .client
            .current_height()
            .await
            .context("failed to read chain height")?;
        let last = self.watermark.initialize_from_height(height);
        if height <= last {
            return Ok(TickOutcome::Idle { height });
        }

        let mut tracker = self.tracker.lock().await;
        if let Err(err) = tracker
            .refresh_registry_if_due(last, Instant::now())
            .await
        {
            tracing::warn!(error = %format!("{err:#}"), "registry refresh failed; keeping current job set");
        }

        let from = last + 1;
        let to = height.min(last.saturating_add(self.block_batch_size));
        let mut processed_to = None;
        for block in from..=to {
            if shutdown.is_cancelled() {
                tracing::debug!(block, "shutdown requested; stopping tick");
                break;
            }
            tracker
                .process_block(block)
                .await
                .with_context(|| format!("failed to reconcile block {block}"))?;
            self.watermark.advance(block);
            processed_to = Some(block);
        }

        match processed_to {
            Some(to) => {
                if to < height {
                    tracing::debug!(to, height, "tick paced; remaining blocks left for next tick");
                }
                Ok(TickOutcome::Advanced { from, to })
            }
            None => Ok(TickOutcome::Idle { height }),
        }
    }

    /// Ticks every `interval` until `shutdown` is cancelled. Each tick runs in its
    /// own task so a slow tick is met by the in-flight guard rather than delaying
    /// the timer.
    pub fn spawn(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut running: Vec<JoinHandle<()>> = Vec::new();

            loop {
                select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("block scheduler shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        running.retain(|handle| !handle.is_finished());
                        let scheduler = Arc::clone(&self);
                        let token = shutdown.clone();
                        running.push(tokio::spawn(async move {
                            scheduler.run_tick(&token).await;
                        }));
                    }
                }
            }

            for handle in running {
                if let Err(err) = handle.await {
                    tracing::error!(error = %err, "tick task panicked");
                }
            }
        })
    }

    async fn run_tick(&self, shutdown: &CancellationToken) {
        match self.tick(shutdown).await {
            Ok(TickOutcome::Advanced { from, to }) => {
                tracing::debug!(from, to, "tick advanced watermark");
            }
            Ok(_) => {}
            Err(err) => {
                self.telemetry.record_tick_failure();
                tracing::error!(
                    watermark = self.watermark.last_processed(),
                    error = %format!("{err:#}"),
                    "tick failed; will retry from watermark"
                );
            }
        }
    }
}
