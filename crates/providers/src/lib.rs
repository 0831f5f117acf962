//! Image-generation provider adapters.
//!
//! Every provider is driven through the same submit-then-poll contract
//! ([`ProviderAdapter`]). [`ProviderRegistry`] resolves adapters by name,
//! [`poll_until_terminal`] drives a submitted task to completion under the
//! adapter's [`PollPolicy`](artgen_core::polling::PollPolicy), and
//! [`HttpTaskAdapter`] speaks the common REST task-id protocol.

pub mod adapter;
pub mod http;
pub mod poller;
pub mod registry;

pub use adapter::{PollOutcome, ProviderAdapter, ProviderError, TaskHandle};
pub use http::{HttpProviderConfig, HttpTaskAdapter};
pub use poller::{poll_until_terminal, PollError};
pub use registry::ProviderRegistry;
