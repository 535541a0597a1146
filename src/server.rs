//! Server assembly: background tasks, router, and shutdown.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::auth::TokenVerifier;
use crate::config::RelayConfig;
use crate::domain::{CloseReason, ConnectionRegistry};
use crate::service::{ChangeFeed, Dispatcher, LivenessMonitor};
use crate::ws::connection::CLOSE_TIMEOUT;
use crate::ws::handler::ws_handler;

/// Time allowed for connection tasks to flush their close frames.
const SHUTDOWN_GRACE: Duration = CLOSE_TIMEOUT.saturating_add(Duration::from_secs(1));

/// A running relay: shared state plus its background tasks.
///
/// [`Relay::start`] spawns the liveness monitor and the change-feed pump;
/// [`Relay::shutdown`] stops them and closes every connection.
#[derive(Debug)]
pub struct Relay {
    state: AppState,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Relay {
    /// Builds the relay and spawns its background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(config: &RelayConfig, verifier: Arc<dyn TokenVerifier>) -> Self {
        let shutdown = CancellationToken::new();

        let registry = Arc::new(ConnectionRegistry::new(config.outbound_queue_capacity));
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let (change_feed, feed_rx) = ChangeFeed::channel(config.change_feed_capacity);

        let monitor = LivenessMonitor::new(Arc::clone(&registry), config.heartbeat_interval);
        let tasks = vec![
            monitor.spawn(shutdown.child_token()),
            ChangeFeed::spawn_pump(feed_rx, dispatcher, shutdown.child_token()),
        ];

        Self {
            state: AppState {
                registry,
                connections: TaskTracker::new(),
                change_feed,
                verifier,
            },
            shutdown,
            tasks,
        }
    }

    /// Shared state handed to handlers.
    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// Builds the HTTP router: REST endpoints plus `GET /ws`.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .merge(api::build_router())
            .route("/ws", get(ws_handler))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive()),
            )
            .with_state(self.state.clone())
    }

    /// Token cancelled when the relay begins shutting down.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stops background tasks and closes every connection with 1001.
    ///
    /// Returns once every connection task has sent its close frame, or
    /// after a short grace period if some peer stalls.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.state.connections.close();
        let closed = self.state.registry.close_all(CloseReason::GOING_AWAY);

        let connections = &self.state.connections;
        if tokio::time::timeout(SHUTDOWN_GRACE, connections.wait()).await.is_err() {
            tracing::warn!(pending = connections.len(), "connections still open at shutdown");
        }
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "background task failed");
            }
        }
        tracing::info!(closed, "relay stopped");
    }
}
