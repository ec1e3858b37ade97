use crate::alert::{dispatcher_from_config, Alert, AlertDispatcher};
use crate::chain::ChainClient;
use crate::rpc::AsyncRpcClient;
use crate::runtime::config::MonitorConfig;
use crate::runtime::progress::BlockWatermark;
use crate::runtime::scheduler::BlockScheduler;
use crate::runtime::telemetry::{self, Telemetry};
use crate::tracker::{Janitor, LivenessTracker, TrackerParams};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Wires bootstrap, the block tick loop, the janitor and the metrics reporter
/// under one root [`CancellationToken`].
pub struct Runner {
    config: MonitorConfig,
    client: Arc<dyn ChainClient>,
    dispatcher: Arc<dyn AlertDispatcher>,
    telemetry: Arc<Telemetry>,
    watermark: Arc<BlockWatermark>,
    shutdown: CancellationToken,
}

impl Runner {
    pub fn new(
        config: MonitorConfig,
        client: Arc<dyn ChainClient>,
        dispatcher: Arc<dyn AlertDispatcher>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            config,
            client,
            dispatcher,
            telemetry,
            watermark: Arc::new(BlockWatermark::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Builds the JSON-RPC client and the configured alert dispatcher.
    pub fn from_config(config: MonitorConfig) -> Result<Self> {
        let telemetry = Arc::new(Telemetry::default());
        let client = AsyncRpcClient::from_config(&config, Arc::clone(&telemetry))
            .context("failed to build RPC client")?;
        let dispatcher = dispatcher_from_config(&config)?;
        Ok(Self::new(config, Arc::new(client), dispatcher, telemetry))
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        Arc::clone(&self.telemetry)
    }

    /// Last block fully reconciled by the tick loop.
    pub fn last_processed_block(&self) -> Option<u64> {
        self.watermark.last_processed()
    }

    /// Bootstraps, then runs every loop until the root token is cancelled.
    ///
    /// Only bootstrap failures are returned; errors inside ticks are logged and
    /// retried on the next tick.
    pub async fn run(&self) -> Result<()> {
        let mut tracker = LivenessTracker::new(
            Arc::clone(&self.client),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.telemetry),
            TrackerParams::from_config(&self.config),
        );
        let bootstrap = tracker.bootstrap().await?;
        let tracker = Arc::new(Mutex::new(tracker));

        self.notify(Alert::system(
            format!("monitor started, tracking {} jobs", bootstrap.jobs),
            bootstrap.height,
        ))
        .await;

        let run_token = self.shutdown.child_token();
        let scheduler = Arc::new(BlockScheduler::new(
            Arc::clone(&tracker),
            Arc::clone(&self.client),
            Arc::clone(&self.watermark),
            Arc::clone(&self.telemetry),
            self.config.block_batch_size(),
        ));
        let handles: Vec<JoinHandle<()>> = vec![
            scheduler.spawn(self.config.tick_interval(), run_token.clone()),
            Janitor::new(
                Arc::clone(&tracker),
                Arc::clone(&self.telemetry),
                self.config.max_job_age(),
                self.config.janitor_interval(),
            )
            .spawn(run_token.clone()),
            telemetry::spawn_metrics_reporter(
                Arc::clone(&self.telemetry),
                run_token.clone(),
                self.config.metrics_interval(),
            ),
        ];

        tracing::info!(
            tick_interval_ms = self.config.tick_interval().as_millis() as u64,
            threshold = self.config.unworked_blocks_threshold(),
            "monitor running"
        );

        self.shutdown.cancelled().await;
        run_token.cancel();
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "background task panicked during shutdown");
            }
        }

        let block = self
            .watermark
            .last_processed()
            .unwrap_or(bootstrap.height);
        self.notify(Alert::system("monitor stopped", block)).await;
        tracing::info!(last_processed_block = block, "monitor stopped");
        Ok(())
    }

    /// Runs until Ctrl-C, SIGTERM, or the shutdown token is cancelled elsewhere.
    pub async fn run_until_signal(&self) -> Result<()> {
        let token = self.shutdown.clone();
        let watcher = tokio::spawn(async move {
            select_shutdown_signal(&token).await;
            token.cancel();
        });

        let result = self.run().await;
        watcher.abort();
        result
    }

    async fn notify(&self, alert: Alert) {
        if let Err(err) = self.dispatcher.send(&alert).await {
            tracing::warn!(error = %format!("{err:#}"), "failed to deliver system notice");
        }
    }
}

async fn select_shutdown_signal(token: &CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal as unix_signal, SignalKind};

        let mut terminate = match unix_signal(SignalKind::terminate()) {
            Ok(stream) => Some(stream),
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                None
            }
        };

        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down");
            }
            Some(_) = async {
                match terminate.as_mut() {
                    Some(stream) => stream.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                tracing::info!("SIGTERM received; shutting down");
            }
            _ = token.cancelled() => {}
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down");
            }
            _ = token.cancelled() => {}
        }
    }
}
