//! Audit trail of platform events.
//!
//! [`EventLogger`] subscribes to the [`EventBus`](crate::bus::EventBus) and
//! writes every received [`PlatformEvent`] to the structured log on the
//! `audit` target. Refund failures are repeated at error level on the
//! `reconciliation` target so operators can alert on them.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::bus::PlatformEvent;
use crate::names;

/// Background service that logs platform events.
pub struct EventLogger;

impl EventLogger {
    /// Run the logging loop until the bus is dropped or `cancel` fires.
    pub async fn run(mut receiver: broadcast::Receiver<PlatformEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Event logger shutting down");
                    break;
                }
                received = receiver.recv() => match received {
                    Ok(event) => Self::log(&event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Event logger lagged, some events were not logged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event bus closed, event logger shutting down");
                        break;
                    }
                },
            }
        }
    }

    fn log(event: &PlatformEvent) {
        tracing::info!(
            target: "audit",
            event_type = %event.event_type,
            source_type = event.source_entity_type.as_deref().unwrap_or("-"),
            source_id = event.source_entity_id.as_deref().unwrap_or("-"),
            owner_id = event.owner_id,
            payload = %event.payload,
            "Platform event",
        );

        if event.event_type == names::CREDITS_REFUND_FAILED {
            tracing::error!(
                target: "reconciliation",
                owner_id = event.owner_id,
                source_id = event.source_entity_id.as_deref().unwrap_or("-"),
                payload = %event.payload,
                "Refund requires manual reconciliation",
            );
        }
    }
}
