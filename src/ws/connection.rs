//! Per-connection read and write loops.
//!
//! Each admitted socket is split in two. The writer task drains the
//! connection's outbound queue onto the socket; the read loop handles
//! keepalive traffic and detects closure. Whichever side stops first
//! evicts the connection, which cancels the other.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};

use super::messages::{Admitted, ClientMessage, ServerMessage};
use crate::auth::Identity;
use crate::domain::{CloseReason, Connection, ConnectionRegistry, Outbound};

/// Upper bound on sending the final close frame to a stalled peer.
pub(crate) const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Admits the socket and serves it until either side closes.
pub async fn run_connection(
    socket: WebSocket,
    identity: Identity,
    registry: Arc<ConnectionRegistry>,
) {
    let id = registry.admit(identity);
    let Some(connection) = registry.get(id) else {
        return;
    };
    let shutdown = connection.shutdown_token();
    let (ws_tx, mut ws_rx) = socket.split();

    if let Some(frame) = encode(&ServerMessage::Connected(Admitted { connection_id: id })) {
        connection.outbound().push(Outbound::Text(frame));
    }
    let writer = tokio::spawn(write_loop(ws_tx, Arc::clone(&connection), Arc::clone(&registry)));

    loop {
        let frame = tokio::select! {
            () = shutdown.cancelled() => break,
            frame = ws_rx.next() => frame,
        };
        match frame {
            Some(Ok(Message::Pong(_))) => {
                registry.mark_pong(id);
            }
            Some(Ok(Message::Text(text))) => match ClientMessage::parse(&text) {
                Ok(ClientMessage::Ping) => {
                    registry.mark_pong(id);
                    if let Some(pong) = encode(&ServerMessage::Pong) {
                        connection.outbound().push(Outbound::Text(pong));
                    }
                }
                Ok(ClientMessage::Pong) => {
                    registry.mark_pong(id);
                }
                Err(e) => {
                    connection.touch();
                    tracing::warn!(connection_id = %id, error = %e, "discarding client message");
                }
            },
            Some(Ok(Message::Ping(_) | Message::Binary(_))) => connection.touch(),
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                tracing::debug!(connection_id = %id, error = %e, "websocket read failed");
                break;
            }
        }
    }

    registry.evict(id);
    drop(connection);
    if let Err(e) = writer.await {
        tracing::error!(connection_id = %id, error = %e, "writer task failed");
    }
    tracing::debug!(connection_id = %id, "ws connection closed");
}

/// Drains the outbound queue onto the socket, then sends a close frame.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    connection: Arc<Connection>,
    registry: Arc<ConnectionRegistry>,
) {
    let shutdown = connection.shutdown_token();

    loop {
        let next = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            next = connection.outbound().pop() => next,
        };
        let Some(item) = next else {
            break;
        };
        let msg = match item {
            Outbound::Text(text) => Message::Text(text),
            Outbound::Probe => Message::Ping(Bytes::new()),
        };
        let sent = tokio::select! {
            () = shutdown.cancelled() => break,
            sent = ws_tx.send(msg) => sent,
        };
        if let Err(e) = sent {
            tracing::debug!(connection_id = %connection.id(), error = %e, "websocket write failed");
            break;
        }
    }

    registry.evict(connection.id());
    let reason = connection.close_reason().unwrap_or(CloseReason::NORMAL);
    let frame = CloseFrame {
        code: reason.code,
        reason: reason.reason.into(),
    };
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, ws_tx.send(Message::Close(Some(frame)))).await;
}

fn encode(msg: &ServerMessage) -> Option<Utf8Bytes> {
    match msg.to_json() {
        Ok(json) => Some(Utf8Bytes::from(json)),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode server message");
            None
        }
    }
}
