//! Evicts records that have not been touched within the staleness window.

use super::reconcile::LivenessTracker;
use super::store::JobStateStore;
use crate::runtime::telemetry::Telemetry;
use alloy_primitives::Address;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;

/// Deletes every record whose age exceeds `max_age` and returns the evicted addresses.
pub fn sweep(store: &mut JobStateStore, now: SystemTime, max_age: Duration) -> Vec<Address> {
    let stale: Vec<Address> = store
        .values()
        .filter(|record| record.age(now) > max_age)
        .map(|record| record.address)
        .collect();

    for address in &stale {
        store.delete(address);
    }
    stale
}

pub struct Janitor {
    tracker: Arc<Mutex<LivenessTracker>>,
    telemetry: Arc<Telemetry>,
    max_age: Duration,
    interval: Duration,
}

impl Janitor {
    pub fn new(
        tracker: Arc<Mutex<LivenessTracker>>,
        telemetry: Arc<Telemetry>,
        max_age: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            tracker,
            telemetry,
            max_age,
            interval,
        }
    }

    /// Runs one sweep under the tracker lock.
    pub async fn run_once(&self, now: SystemTime) -> Vec<Address> {
        let mut tracker = self.tracker.lock().await;
        let evicted = sweep(tracker.store_mut(), now, self.max_age);
        let remaining = tracker.store().len();
        drop(tracker);

        for address in &evicted {
            tracing::info!(
                job = %format!("{:#x}", address),
                max_age_secs = self.max_age.as_secs(),
                "evicted stale job record"
            );
        }
        self.telemetry.record_evictions(evicted.len() as u64);
        self.telemetry.set_tracked_jobs(remaining);
        evicted
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; nothing can be stale yet.
            ticker.tick().await;

            loop {
                select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("janitor shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.run_once(SystemTime::now()).await;
                    }
                }
            }
        })
    }
}
