//! Process-wide set of live connections.
//!
//! [`ConnectionRegistry`] holds every admitted, not yet evicted
//! [`Connection`] in an insertion-ordered map behind a single mutex. The
//! mutex guards membership only: callers that fan out to connections take
//! a [`ConnectionRegistry::snapshot`] and push to each connection's own
//! queue after the lock is released.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::ConnectionId;
use super::connection::{CloseReason, Connection, Liveness};
use crate::auth::Identity;

/// Shared registry of live connections.
///
/// # Concurrency
///
/// - Admission, eviction and snapshotting are serialized on one lock.
/// - The lock is never held while touching a connection's queue or socket.
/// - A snapshot contains each member exactly once, in admission order.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: Mutex<IndexMap<ConnectionId, Arc<Connection>>>,
    queue_capacity: usize,
}

impl ConnectionRegistry {
    /// Creates an empty registry whose connections buffer at most
    /// `queue_capacity` outbound messages each.
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            connections: Mutex::new(IndexMap::new()),
            queue_capacity,
        }
    }

    /// Admits an authenticated session and returns its fresh id.
    ///
    /// The new connection starts `Alive` with `last_activity = now`.
    pub fn admit(&self, identity: Identity) -> ConnectionId {
        let id = ConnectionId::new();
        let user = identity.user_id().to_string();
        let connection = Arc::new(Connection::new(id, identity, self.queue_capacity));
        let total = {
            let mut map = self.connections.lock();
            map.insert(id, connection);
            map.len()
        };
        tracing::info!(connection_id = %id, %user, total, "connection admitted");
        id
    }

    /// Removes a connection and signals its transport to close.
    ///
    /// Unknown or already evicted ids are ignored. Returns `true` if this
    /// call performed the removal.
    pub fn evict(&self, id: ConnectionId) -> bool {
        self.evict_with(id, CloseReason::NORMAL)
    }

    /// Like [`ConnectionRegistry::evict`] with an explicit close reason.
    pub fn evict_with(&self, id: ConnectionId, reason: CloseReason) -> bool {
        let removed = self.connections.lock().shift_remove(&id);
        let Some(connection) = removed else {
            return false;
        };
        let discarded = connection.close(reason);
        tracing::info!(
            connection_id = %id,
            code = reason.code,
            discarded,
            "connection evicted"
        );
        true
    }

    /// Returns the current members in admission order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.lock().values().cloned().collect()
    }

    /// Looks up a live connection.
    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.lock().get(&id).cloned()
    }

    /// Records a liveness response. Returns `false` for unknown ids.
    pub fn mark_pong(&self, id: ConnectionId) -> bool {
        match self.get(id) {
            Some(connection) => {
                connection.mark_pong();
                true
            }
            None => false,
        }
    }

    /// Advances the probe state machine of `id`.
    ///
    /// Returns the new liveness, or `None` if the id is not registered.
    pub fn mark_probe(&self, id: ConnectionId) -> Option<Liveness> {
        self.get(id).map(|connection| connection.mark_probe())
    }

    /// Evicts every connection, e.g. at shutdown. Returns how many.
    pub fn close_all(&self, reason: CloseReason) -> usize {
        let drained: Vec<_> = self.connections.lock().drain(..).collect();
        for (_, connection) in &drained {
            connection.close(reason);
        }
        tracing::info!(count = drained.len(), "closed all connections");
        drained.len()
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// Returns `true` if no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(64)
    }
}
