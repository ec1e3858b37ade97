//! Chain-facing abstractions: the `ChainClient` capability set consumed by the
//! tracker, ABI bindings for the sequencer and job contracts, and the registry
//! reader that enumerates jobs.

pub mod contracts;
pub mod registry;
pub mod types;

pub use registry::JobRegistry;
pub use types::{CallResult, ChainClient, ChainLog, ContractCall, LogFilter};
