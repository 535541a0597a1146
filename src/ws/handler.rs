//! Axum WebSocket upgrade handler.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;

use super::connection::run_connection;
use crate::app_state::AppState;
use crate::domain::CloseReason;

/// Query parameters of the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct HandshakeParams {
    /// Login token. Absent and empty are treated alike.
    pub token: Option<String>,
}

/// `GET /ws?token=<credential>` — Upgrade HTTP connection to WebSocket.
///
/// The credential is verified before the upgrade completes; a rejected
/// connection receives a single close frame with code 1008.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HandshakeParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let verdict = state.verifier.verify(params.token.as_deref());
    let tracker = state.connections.clone();

    ws.on_upgrade(move |socket| {
        tracker.track_future(async move {
            if state.connections.is_closed() {
                close(socket, CloseReason::GOING_AWAY).await;
                return;
            }
            match verdict {
                Ok(identity) => run_connection(socket, identity, state.registry).await,
                Err(err) => {
                    tracing::warn!(error = %err, "rejecting websocket handshake");
                    close(socket, CloseReason::AUTH_FAILED).await;
                }
            }
        })
    })
}

/// Sends a single close frame on a socket that was never admitted.
async fn close(mut socket: WebSocket, reason: CloseReason) {
    let frame = CloseFrame {
        code: reason.code,
        reason: reason.reason.into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        tracing::debug!(error = %e, "peer gone before close frame");
    }
}
