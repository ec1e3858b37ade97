//! JSON-RPC client plumbing: the Ethereum client implementing `ChainClient`,
//! retry policy, option validation, and quantity helpers.

pub mod client;
pub mod helpers;
pub mod options;
pub mod retry;

pub use client::{AsyncRpcClient, RpcError};
pub use helpers::{format_quantity, parse_quantity};
pub use options::RpcClientOptions;
