//! Liveness tracking: per-job records, bootstrap seeding, block reconciliation
//! and stale-record eviction.

pub mod bootstrap;
pub mod history;
pub mod janitor;
pub mod reconcile;
pub mod store;

pub use janitor::Janitor;
pub use reconcile::{AlertPolicy, BlockOutcome, BlockSummary, LivenessTracker, TrackerParams};
pub use store::{JobLivenessRecord, JobStateStore};
