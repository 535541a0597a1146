//! One live transport session and its outbound queue.
//!
//! A [`Connection`] is owned by the [`super::ConnectionRegistry`]. The
//! transport task that serves the socket, the dispatcher and the liveness
//! monitor only ever reach it through the registry, so once a connection
//! is evicted nothing new can be enqueued for it.

use std::collections::VecDeque;
use std::sync::OnceLock;

use axum::extract::ws::Utf8Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::ConnectionId;
use crate::auth::Identity;

/// Liveness of a connection as tracked by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Responded since the last probe.
    Alive,
    /// Probed, no response observed yet.
    AwaitingPong,
    /// Missed a full probe period; about to be evicted.
    Dead,
}

/// Message waiting in a connection's outbound queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Pre-serialized JSON text frame.
    Text(Utf8Bytes),
    /// Transport-level liveness probe.
    Probe,
}

/// Result of pushing onto an [`OutboundQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Enqueued without displacing anything.
    Queued,
    /// Queue was full; the oldest pending message was discarded.
    DroppedOldest,
    /// Queue is closed; the message was discarded.
    Closed,
}

/// Close code and reason sent to the peer when a connection is evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseReason {
    /// WebSocket close code.
    pub code: u16,
    /// Human-readable reason.
    pub reason: &'static str,
}

impl CloseReason {
    /// Orderly close (1000).
    pub const NORMAL: Self = Self {
        code: 1000,
        reason: "closed",
    };
    /// Server shutting down (1001).
    pub const GOING_AWAY: Self = Self {
        code: 1001,
        reason: "server shutting down",
    };
    /// Handshake credential rejected (1008).
    pub const AUTH_FAILED: Self = Self {
        code: 1008,
        reason: "authentication failed",
    };
    /// Liveness probe went unanswered (1011).
    pub const UNRESPONSIVE: Self = Self {
        code: 1011,
        reason: "liveness probe timed out",
    };
}

#[derive(Debug)]
struct QueueState {
    items: VecDeque<Outbound>,
    closed: bool,
}

/// Bounded single-consumer queue that drops the oldest entry on overflow.
///
/// Producers never wait: [`OutboundQueue::push`] always returns
/// immediately. The connection's writer task drains it with
/// [`OutboundQueue::pop`].
#[derive(Debug)]
pub struct OutboundQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
}

impl OutboundQueue {
    /// Creates an empty queue holding at most `capacity` messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Enqueues `msg`, evicting the oldest pending message if full.
    pub fn push(&self, msg: Outbound) -> PushOutcome {
        let outcome = {
            let mut state = self.state.lock();
            if state.closed {
                return PushOutcome::Closed;
            }
            let outcome = if state.items.len() >= self.capacity {
                state.items.pop_front();
                PushOutcome::DroppedOldest
            } else {
                PushOutcome::Queued
            };
            state.items.push_back(msg);
            outcome
        };
        self.notify.notify_one();
        outcome
    }

    /// Waits for the next message. Returns `None` once the queue is closed.
    pub async fn pop(&self) -> Option<Outbound> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock();
                if state.closed {
                    return None;
                }
                if let Some(msg) = state.items.pop_front() {
                    return Some(msg);
                }
            }
            notified.await;
        }
    }

    /// Closes the queue and discards pending messages, returning how many.
    pub fn close(&self) -> usize {
        let discarded = {
            let mut state = self.state.lock();
            state.closed = true;
            let n = state.items.len();
            state.items.clear();
            n
        };
        self.notify.notify_one();
        discarded
    }

    /// Number of pending messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct LivenessState {
    liveness: Liveness,
    last_activity: DateTime<Utc>,
}

/// Registry-owned record of one admitted session.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    identity: Identity,
    liveness: Mutex<LivenessState>,
    outbound: OutboundQueue,
    shutdown: CancellationToken,
    close_reason: OnceLock<CloseReason>,
}

impl Connection {
    /// Creates an `Alive` connection with an empty outbound queue.
    #[must_use]
    pub fn new(id: ConnectionId, identity: Identity, queue_capacity: usize) -> Self {
        Self {
            id,
            identity,
            liveness: Mutex::new(LivenessState {
                liveness: Liveness::Alive,
                last_activity: Utc::now(),
            }),
            outbound: OutboundQueue::new(queue_capacity),
            shutdown: CancellationToken::new(),
            close_reason: OnceLock::new(),
        }
    }

    /// Connection identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Authenticated identity behind this connection.
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Current liveness.
    #[must_use]
    pub fn liveness(&self) -> Liveness {
        self.liveness.lock().liveness
    }

    /// Time of the last inbound frame (or admission).
    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.liveness.lock().last_activity
    }

    /// Outbound queue drained by the connection's writer task.
    #[must_use]
    pub const fn outbound(&self) -> &OutboundQueue {
        &self.outbound
    }

    /// Token cancelled when the connection is evicted.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Close code to report to the peer, if the connection was evicted.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason.get().copied()
    }

    /// Records a liveness response. A `Dead` connection stays dead.
    pub fn mark_pong(&self) {
        let mut state = self.liveness.lock();
        if state.liveness != Liveness::Dead {
            state.liveness = Liveness::Alive;
        }
        state.last_activity = Utc::now();
    }

    /// Records inbound traffic that is not a liveness response.
    pub fn touch(&self) {
        self.liveness.lock().last_activity = Utc::now();
    }

    /// Advances the probe state machine and returns the new liveness.
    ///
    /// `Alive -> AwaitingPong`, `AwaitingPong -> Dead`, `Dead -> Dead`.
    pub fn mark_probe(&self) -> Liveness {
        let mut state = self.liveness.lock();
        state.liveness = match state.liveness {
            Liveness::Alive => Liveness::AwaitingPong,
            Liveness::AwaitingPong | Liveness::Dead => Liveness::Dead,
        };
        state.liveness
    }

    /// Signals the transport to close and discards pending messages.
    ///
    /// Only the first reason is kept.
    pub(crate) fn close(&self, reason: CloseReason) -> usize {
        let _ = self.close_reason.set(reason);
        self.shutdown.cancel();
        self.outbound.close()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn text(s: &str) -> Outbound {
        Outbound::Text(Utf8Bytes::from(s))
    }

    fn conn() -> Connection {
        Connection::new(ConnectionId::new(), Identity::new("u1"), 4)
    }

    #[test]
    fn overflow_drops_oldest() {
        let q = OutboundQueue::new(2);
        assert_eq!(q.push(text("a")), PushOutcome::Queued);
        assert_eq!(q.push(text("b")), PushOutcome::Queued);
        assert_eq!(q.push(text("c")), PushOutcome::DroppedOldest);
        assert_eq!(q.len(), 2);

        let mut popped = tokio_test::task::spawn(q.pop());
        let std::task::Poll::Ready(Some(first)) = popped.poll() else {
            panic!("expected a ready message");
        };
        assert_eq!(first, text("b"));
    }

    #[test]
    fn pop_waits_until_push() {
        let q = OutboundQueue::new(2);
        let mut popped = tokio_test::task::spawn(q.pop());
        tokio_test::assert_pending!(popped.poll());

        q.push(text("x"));
        assert!(popped.is_woken());
        let std::task::Poll::Ready(Some(msg)) = popped.poll() else {
            panic!("expected message after push");
        };
        assert_eq!(msg, text("x"));
    }

    #[test]
    fn close_discards_and_rejects() {
        let q = OutboundQueue::new(4);
        q.push(text("a"));
        q.push(Outbound::Probe);
        assert_eq!(q.close(), 2);
        assert_eq!(q.push(text("b")), PushOutcome::Closed);

        let mut popped = tokio_test::task::spawn(q.pop());
        tokio_test::assert_ready_eq!(popped.poll(), None);
    }

    #[test]
    fn probe_state_machine() {
        let c = conn();
        assert_eq!(c.liveness(), Liveness::Alive);
        assert_eq!(c.mark_probe(), Liveness::AwaitingPong);
        c.mark_pong();
        assert_eq!(c.liveness(), Liveness::Alive);
        assert_eq!(c.mark_probe(), Liveness::AwaitingPong);
        assert_eq!(c.mark_probe(), Liveness::Dead);
        c.mark_pong();
        assert_eq!(c.liveness(), Liveness::Dead);
    }

    #[test]
    fn close_keeps_first_reason_and_cancels() {
        let c = conn();
        let token = c.shutdown_token();
        c.close(CloseReason::UNRESPONSIVE);
        c.close(CloseReason::NORMAL);
        assert!(token.is_cancelled());
        assert_eq!(c.close_reason(), Some(CloseReason::UNRESPONSIVE));
    }
}
