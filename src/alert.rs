//! Alert delivery: the dispatcher seam used by the tracker, a local sink that
//! writes alerts to the log, and an HTTP webhook sink.

pub mod dispatcher;
pub mod webhook;

pub use dispatcher::{dispatcher_from_config, Alert, AlertDispatcher, LocalDispatcher, SYSTEM_ADDRESS};
pub use webhook::WebhookDispatcher;
