//! artgen event bus.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PlatformEvent`]: the canonical event envelope for job, generation,
//!   and credit lifecycle changes.
//! - [`EventLogger`]: background task that writes every event to the
//!   structured log as an audit trail.

pub mod bus;
pub mod logger;
pub mod names;

pub use bus::{EventBus, PlatformEvent};
pub use logger::EventLogger;
