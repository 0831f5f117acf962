//! Generation worker process.
//!
//! [`WorkerConfig`] reads the process environment; [`Worker`] builds the
//! stores, provider registry, queue manager, and orchestrator from it.

pub mod config;
pub mod runtime;

pub use config::{LogFormat, WorkerConfig};
pub use runtime::Worker;
