//! Runtime glue that wires configuration, the block watermark, the tick
//! scheduler, telemetry, and runner orchestration.

pub mod config;
pub mod progress;
pub mod runner;
pub mod scheduler;
pub mod telemetry;
