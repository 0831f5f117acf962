//! Pure domain logic for the artgen generation core.
//!
//! Nothing in this crate performs I/O. Stores, providers, the job queue and
//! the orchestrator all build on these types and functions.

pub mod cache_key;
pub mod credits;
pub mod error;
pub mod generation;
pub mod job;
pub mod polling;
pub mod provider_errors;
pub mod status;
pub mod types;
