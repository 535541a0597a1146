//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use tokio_util::task::TaskTracker;

use crate::auth::TokenVerifier;
use crate::domain::ConnectionRegistry;
use crate::service::ChangeFeed;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Live connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Tracks every upgraded socket until its close frame is sent.
    pub connections: TaskTracker,
    /// Producer handle for upstream changes.
    pub change_feed: ChangeFeed,
    /// Handshake credential verifier.
    pub verifier: Arc<dyn TokenVerifier>,
}
