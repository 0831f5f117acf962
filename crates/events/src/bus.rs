//! Lifecycle events and the broadcast hub that fans them out.
//!
//! The queue publishes job transitions, the orchestrator publishes
//! generation and credit settlement outcomes, and any number of listeners
//! (the audit logger, tests) subscribe. Publishing never blocks and never
//! fails the publisher.

use artgen_core::types::{DbId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// PlatformEvent
// ---------------------------------------------------------------------------

/// Something that happened to a job, a generation, or an owner's credits.
///
/// Built with [`PlatformEvent::new`] plus `with_source`, `with_owner`, and
/// `with_payload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    /// Name from [`names`](crate::names), e.g. `"generation.failed"`.
    pub event_type: String,

    /// `"job"` or `"generation"`.
    pub source_entity_type: Option<String>,

    /// Jobs are keyed by UUID and generations by number, so ids travel as
    /// text.
    pub source_entity_id: Option<String>,

    pub owner_id: Option<DbId>,

    /// Event-specific detail such as credits moved or the failure code.
    pub payload: serde_json::Value,

    pub timestamp: Timestamp,
}

impl PlatformEvent {
    /// An event with an empty object payload and no source or owner.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source_entity_type: None,
            source_entity_id: None,
            owner_id: None,
            payload: serde_json::json!({}),
            timestamp: Utc::now(),
        }
    }

    pub fn with_source(mut self, kind: impl Into<String>, id: impl ToString) -> Self {
        self.source_entity_type = Some(kind.into());
        self.source_entity_id = Some(id.to_string());
        self
    }

    pub fn with_owner(mut self, owner_id: DbId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Events buffered per subscriber before the slowest one starts lagging.
const BUFFERED_EVENTS: usize = 1024;

/// Broadcast hub shared as `Arc<EventBus>`.
///
/// A subscriber that falls more than the buffer behind loses the oldest
/// events and sees `RecvError::Lagged` on its next receive.
///
/// ```rust
/// use artgen_events::{names, EventBus, PlatformEvent};
///
/// let bus = EventBus::default();
/// let mut audit = bus.subscribe();
/// bus.publish(PlatformEvent::new(names::JOB_ADDED).with_owner(7));
/// assert_eq!(audit.try_recv().unwrap().owner_id, Some(7));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _initial_receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Deliver `event` to every current subscriber. Events published while
    /// nobody listens are discarded.
    pub fn publish(&self, event: PlatformEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("Event published with no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BUFFERED_EVENTS)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
