//! Adapter between the upstream data layer and the dispatcher.
//!
//! [`ChangeFeed`] is a cloneable producer handle. Whatever observes a
//! data mutation calls [`ChangeFeed::emit`]; a single pump task drains the
//! channel and calls [`Dispatcher::publish`], so events reach each
//! connection in the order they were emitted.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::Dispatcher;
use crate::domain::{ArticleEvent, ResourceChange};
use crate::error::RelayError;

/// Producer side of the change feed.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: mpsc::Sender<ArticleEvent>,
}

impl ChangeFeed {
    /// Creates a feed buffering up to `capacity` events, returning the
    /// producer handle and the receiver to pass to [`ChangeFeed::spawn_pump`].
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ArticleEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Validates a raw upstream change and queues it for publishing.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidRequest`] if the payload does not match
    /// its kind, or [`RelayError::Internal`] if the pump has stopped.
    pub async fn emit(&self, change: ResourceChange) -> Result<ArticleEvent, RelayError> {
        let event = ArticleEvent::try_from(change)?;
        self.emit_event(event.clone()).await?;
        Ok(event)
    }

    /// Queues an already validated event for publishing.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Internal`] if the pump has stopped.
    pub async fn emit_event(&self, event: ArticleEvent) -> Result<(), RelayError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| RelayError::Internal("change feed closed".to_string()))
    }

    /// Spawns the task that publishes every received event until
    /// `shutdown` is cancelled or all producers are dropped.
    pub fn spawn_pump(
        mut receiver: mpsc::Receiver<ArticleEvent>,
        dispatcher: Dispatcher,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    () = shutdown.cancelled() => break,
                    event = receiver.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                if let Err(e) = dispatcher.publish(&event) {
                    tracing::error!(error = %e, "failed to publish event");
                }
            }
            tracing::debug!("change feed pump stopped");
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::auth::Identity;
    use crate::domain::{ConnectionRegistry, EventKind};

    #[tokio::test]
    async fn emitted_change_reaches_connections() {
        let registry = Arc::new(ConnectionRegistry::new(8));
        let id = registry.admit(Identity::new("u1"));
        let (feed, rx) = ChangeFeed::channel(8);
        let shutdown = CancellationToken::new();
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let pump = ChangeFeed::spawn_pump(rx, dispatcher, shutdown.clone());

        let change = ResourceChange {
            kind: EventKind::Deleted,
            payload: json!({"id": "A1"}),
        };
        let Ok(event) = feed.emit(change).await else {
            panic!("emit failed");
        };
        assert_eq!(event.kind(), EventKind::Deleted);

        let Some(conn) = registry.get(id) else {
            panic!("connection missing");
        };
        let popped =
            tokio::time::timeout(std::time::Duration::from_secs(1), conn.outbound().pop()).await;
        assert!(matches!(popped, Ok(Some(_))));

        shutdown.cancel();
        let Ok(()) = pump.await else {
            panic!("pump panicked");
        };
    }

    #[tokio::test]
    async fn invalid_change_is_rejected_before_queueing() {
        let (feed, _rx) = ChangeFeed::channel(1);
        let change = ResourceChange {
            kind: EventKind::Updated,
            payload: json!(42),
        };
        assert!(matches!(
            feed.emit(change).await,
            Err(RelayError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn emit_after_pump_stops_fails() {
        let (feed, rx) = ChangeFeed::channel(1);
        drop(rx);
        let result = feed
            .emit_event(ArticleEvent::Deleted { id: "A1".into() })
            .await;
        assert!(matches!(result, Err(RelayError::Internal(_))));
    }
}
