//! Broadcast fan-out of article events.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;

use crate::domain::{ArticleEvent, ConnectionRegistry, Outbound, PushOutcome};
use crate::error::RelayError;
use crate::ws::messages::ServerMessage;

/// Outcome of one [`Dispatcher::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Connections the event was enqueued for.
    pub delivered: usize,
    /// Of those, how many had to discard their oldest pending message.
    pub dropped: usize,
    /// Connections that closed between the snapshot and the enqueue.
    pub skipped: usize,
}

/// Pushes events to every registered connection.
///
/// The event is serialized once; each connection receives a cheap clone
/// of the same frame in its own bounded queue. Enqueueing never waits, so
/// a stalled consumer only loses its own oldest messages.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl Dispatcher {
    /// Creates a dispatcher over `registry`.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Enqueues `event` for every connection registered at call time.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Internal`] only if the event cannot be
    /// serialized; per-connection failures are counted, not returned.
    pub fn publish(&self, event: &ArticleEvent) -> Result<PublishReport, RelayError> {
        let frame = Utf8Bytes::from(ServerMessage::from(event).to_json()?);
        let mut report = PublishReport::default();

        for connection in self.registry.snapshot() {
            match connection.outbound().push(Outbound::Text(frame.clone())) {
                PushOutcome::Queued => report.delivered += 1,
                PushOutcome::DroppedOldest => {
                    report.delivered += 1;
                    report.dropped += 1;
                    tracing::debug!(
                        connection_id = %connection.id(),
                        "outbound queue full, dropped oldest message"
                    );
                }
                PushOutcome::Closed => report.skipped += 1,
            }
        }

        tracing::debug!(
            kind = ?event.kind(),
            article_id = %event.resource_id(),
            delivered = report.delivered,
            dropped = report.dropped,
            "event published"
        );
        Ok(report)
    }
}
