pub mod alert;
pub mod chain;
pub mod rpc;
pub mod runtime;
pub mod tracker;


pub use alert::{Alert, AlertDispatcher, LocalDispatcher, WebhookDispatcher, SYSTEM_ADDRESS};
pub use chain::{CallResult, ChainClient, ChainLog, ContractCall, JobRegistry, LogFilter};
pub use rpc::{AsyncRpcClient, RpcClientOptions, RpcError};
pub use runtime::config::{MonitorConfig, MonitorConfigBuilder, MonitorConfigParams, WebhookTarget};
pub use runtime::progress::BlockWatermark;
pub use runtime::runner::Runner;
pub use runtime::scheduler::{BlockScheduler, TickOutcome};
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use tracker::{
    AlertPolicy, BlockOutcome, BlockSummary, Janitor, JobLivenessRecord, JobStateStore,
    LivenessTracker, TrackerParams,
};
