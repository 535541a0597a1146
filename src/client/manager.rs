//! Reconnecting WebSocket client.
//!
//! A [`ReconnectionManager`] runs as one task that owns the socket, the
//! retry timer and the cached credential. Because a single loop performs
//! every step, at most one handshake is ever in flight, and cancelling the
//! [`ClientHandle`] stops whichever step is pending, timer included.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::Backoff;
use super::credentials::{Credential, CredentialProvider};
use super::reconciler::{LocalStore, Reconciler};
use super::state::{ClientConnectionState, ClientEvent};
use crate::config::ClientConfig;
use crate::domain::ConnectionId;
use crate::error::RelayError;
use crate::ws::messages::{ClientMessage, ServerMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on sending the logout close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Capacity of the transition broadcast; slow observers skip states.
const TRANSITION_CAPACITY: usize = 64;

enum Handshake {
    Admitted(WsStream, ConnectionId),
    Refused { policy: bool },
    Failed(RelayError),
    Cancelled,
}

enum SessionEnd {
    Closed { policy: bool },
    Cancelled,
}

/// Client-side connection state machine, ready to be spawned.
///
/// Observers should call [`ReconnectionManager::subscribe`] before
/// [`ReconnectionManager::spawn`] to see every transition.
#[derive(Debug)]
pub struct ReconnectionManager<S> {
    config: ClientConfig,
    backoff: Backoff,
    provider: Arc<dyn CredentialProvider>,
    credential: Option<Credential>,
    reconciler: Arc<Mutex<Reconciler<S>>>,
    state: ClientConnectionState,
    state_tx: watch::Sender<ClientConnectionState>,
    transitions: broadcast::Sender<ClientConnectionState>,
    shutdown: CancellationToken,
}

impl<S: LocalStore + 'static> ReconnectionManager<S> {
    /// Creates a `Disconnected` manager that mirrors events into `store`.
    #[must_use]
    pub fn new(config: ClientConfig, provider: Arc<dyn CredentialProvider>, store: S) -> Self {
        let state = ClientConnectionState::new();
        let (state_tx, _) = watch::channel(state);
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
        Self {
            backoff: Backoff::new(config.backoff_base, config.backoff_cap),
            config,
            provider,
            credential: None,
            reconciler: Arc::new(Mutex::new(Reconciler::new(store))),
            state,
            state_tx,
            transitions,
            shutdown: CancellationToken::new(),
        }
    }

    /// Receiver of every state the manager enters from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClientConnectionState> {
        self.transitions.subscribe()
    }

    /// Starts the connection loop.
    #[must_use]
    pub fn spawn(self) -> ClientHandle<S> {
        let state_rx = self.state_tx.subscribe();
        let transitions = self.transitions.clone();
        let reconciler = Arc::clone(&self.reconciler);
        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(self.run());
        ClientHandle {
            state_rx,
            transitions,
            reconciler,
            shutdown,
            task: Some(task),
        }
    }

    async fn run(mut self) {
        let shutdown = self.shutdown.clone();

        loop {
            let acquired = tokio::select! {
                () = shutdown.cancelled() => break,
                acquired = self.ensure_credential() => acquired,
            };
            let credential = match acquired {
                Ok(credential) => credential,
                Err(e) => {
                    tracing::warn!(error = %e, "no credential available");
                    self.apply(ClientEvent::CredentialUnavailable);
                    if !self.wait_backoff(&shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            self.apply(ClientEvent::Connect);
            match self.handshake(&credential, &shutdown).await {
                Handshake::Cancelled => break,
                Handshake::Refused { policy } => {
                    if policy {
                        self.credential = None;
                    }
                    self.apply(ClientEvent::HandshakeFailed);
                }
                Handshake::Failed(e) => {
                    tracing::warn!(
                        error = %e,
                        attempt = self.state.attempt,
                        "connection attempt failed"
                    );
                    self.apply(ClientEvent::HandshakeFailed);
                }
                Handshake::Admitted(stream, connection_id) => {
                    self.apply(ClientEvent::HandshakeSucceeded);
                    tracing::info!(%connection_id, "connected to relay");
                    match self.session(stream, &shutdown).await {
                        SessionEnd::Cancelled => break,
                        SessionEnd::Closed { policy } => {
                            if policy {
                                self.credential = None;
                            }
                            self.apply(ClientEvent::TransportClosed);
                        }
                    }
                }
            }

            if !self.wait_backoff(&shutdown).await {
                break;
            }
        }

        self.apply(ClientEvent::Logout);
        tracing::info!("client disconnected");
    }

    /// Returns the cached credential, re-acquiring it if absent or expired.
    async fn ensure_credential(&mut self) -> Result<Credential, RelayError> {
        if let Some(credential) = &self.credential
            && !credential.is_expired_at(Utc::now())
        {
            return Ok(credential.clone());
        }
        self.credential = None;

        let fresh = self.provider.acquire().await?;
        if fresh.is_expired_at(Utc::now()) {
            return Err(RelayError::CredentialUnavailable(
                "provider returned an expired credential".to_string(),
            ));
        }
        self.credential = Some(fresh.clone());
        Ok(fresh)
    }

    async fn handshake(&self, credential: &Credential, shutdown: &CancellationToken) -> Handshake {
        tokio::select! {
            () = shutdown.cancelled() => Handshake::Cancelled,
            result = tokio::time::timeout(self.config.handshake_timeout, self.open(credential)) => {
                match result {
                    Ok(Ok(handshake)) => handshake,
                    Ok(Err(e)) => Handshake::Failed(e),
                    Err(_) => Handshake::Failed(RelayError::TransportFailure(
                        "handshake timed out".to_string(),
                    )),
                }
            }
        }
    }

    /// Upgrades the connection and waits for the admission acknowledgement.
    async fn open(&self, credential: &Credential) -> Result<Handshake, RelayError> {
        let url = handshake_url(&self.config.ws_url, credential.token());
        let (mut stream, _) = connect_async(url.as_str()).await?;
        loop {
            let Some(frame) = stream.next().await else {
                break;
            };
            match frame? {
                Message::Text(text) => match ServerMessage::parse(&text) {
                    Ok(ServerMessage::Connected(admitted)) => {
                        return Ok(Handshake::Admitted(stream, admitted.connection_id));
                    }
                    Ok(msg) => self.apply_message(msg),
                    Err(e) => tracing::warn!(error = %e, "discarding server message"),
                },
                Message::Close(frame) => {
                    let policy = is_policy_close(frame.as_ref());
                    tracing::warn!(
                        code = frame.as_ref().map(|f| u16::from(f.code)),
                        "server refused connection"
                    );
                    return Ok(Handshake::Refused { policy });
                }
                _ => {}
            }
        }
        Err(RelayError::TransportFailure(
            "closed during handshake".to_string(),
        ))
    }

    /// Receives events until the transport closes or the client logs out.
    async fn session(&self, stream: WsStream, shutdown: &CancellationToken) -> SessionEnd {
        let (mut tx, mut rx) = stream.split();
        let period = self.config.ping_interval;
        let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
        let ping = serde_json::to_string(&ClientMessage::Ping).unwrap_or_default();

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: Utf8Bytes::from_static("logout"),
                    };
                    let close = tx.send(Message::Close(Some(frame)));
                    let _ = tokio::time::timeout(CLOSE_TIMEOUT, close).await;
                    return SessionEnd::Cancelled;
                }
                _ = keepalive.tick() => {
                    if let Err(e) = tx.send(Message::text(ping.clone())).await {
                        tracing::debug!(error = %e, "keepalive send failed");
                        return SessionEnd::Closed { policy: false };
                    }
                }
                frame = rx.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text),
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(
                            code = frame.as_ref().map(|f| u16::from(f.code)),
                            "server closed connection"
                        );
                        return SessionEnd::Closed { policy: is_policy_close(frame.as_ref()) };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "transport failure");
                        return SessionEnd::Closed { policy: false };
                    }
                    None => return SessionEnd::Closed { policy: false },
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        let applied = self.reconciler.lock().apply_text(text);
        match applied {
            Ok(Some(outcome)) => tracing::info!(?outcome, "applied change"),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "discarding server message"),
        }
    }

    fn apply_message(&self, msg: ServerMessage) {
        if let Some(event) = msg.into_event() {
            let outcome = self.reconciler.lock().apply(&event);
            tracing::info!(article_id = %event.resource_id(), ?outcome, "applied change");
        }
    }

    /// Sleeps for the current backoff delay. Returns `false` on logout.
    async fn wait_backoff(&self, shutdown: &CancellationToken) -> bool {
        let delay = self.state.next_delay(&self.backoff);
        tracing::info!(
            attempt = self.state.attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "retrying after delay"
        );
        tokio::select! {
            () = shutdown.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    fn apply(&mut self, event: ClientEvent) {
        let Some(next) = self.state.transition(event) else {
            tracing::warn!(?event, phase = ?self.state.phase, "ignoring invalid client transition");
            return;
        };
        self.state = next;
        self.state_tx.send_replace(next);
        let _ = self.transitions.send(next);
        tracing::debug!(phase = ?next.phase, attempt = next.attempt, "client state changed");
    }
}

/// Endpoint with `token` set to `token`, replacing any token already in
/// the configured URL and keeping every other query parameter.
fn handshake_url(base: &Url, token: &str) -> Url {
    let mut url = base.clone();
    let kept: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(key, _)| key != "token")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("token", token);
    url
}

fn is_policy_close(frame: Option<&CloseFrame>) -> bool {
    frame.is_some_and(|f| f.code == CloseCode::Policy)
}

/// Handle to a running [`ReconnectionManager`].
///
/// Dropping the handle cancels the manager; [`ClientHandle::disconnect`]
/// additionally waits for it to finish.
#[derive(Debug)]
pub struct ClientHandle<S> {
    state_rx: watch::Receiver<ClientConnectionState>,
    transitions: broadcast::Sender<ClientConnectionState>,
    reconciler: Arc<Mutex<Reconciler<S>>>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<S: LocalStore> ClientHandle<S> {
    /// Current state.
    #[must_use]
    pub fn state(&self) -> ClientConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch receiver tracking the latest state.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ClientConnectionState> {
        self.state_rx.clone()
    }

    /// Receiver of every subsequent transition.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClientConnectionState> {
        self.transitions.subscribe()
    }

    /// Runs `f` against the local store.
    pub fn with_store<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(self.reconciler.lock().store())
    }

    /// Logs out: cancels any pending timer or attempt, closes the socket,
    /// and waits for the manager to reach `Disconnected`.
    pub async fn disconnect(mut self) -> ClientConnectionState {
        self.shutdown.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::error!(error = %e, "client task failed");
        }
        self.state()
    }
}

impl<S> Drop for ClientHandle<S> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Url {
        let Ok(url) = Url::parse(raw) else {
            panic!("valid url");
        };
        url
    }

    #[test]
    fn handshake_url_appends_token() {
        let url = handshake_url(&parse("ws://127.0.0.1:3000/ws"), "abc");
        assert_eq!(url.as_str(), "ws://127.0.0.1:3000/ws?token=abc");
    }

    #[test]
    fn handshake_url_replaces_configured_token() {
        let url = handshake_url(&parse("ws://relay/ws?token=stale&room=main"), "fresh");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("room".to_string(), "main".to_string()),
                ("token".to_string(), "fresh".to_string()),
            ]
        );
    }

    #[test]
    fn policy_close_is_detected() {
        let policy = CloseFrame {
            code: CloseCode::Policy,
            reason: Utf8Bytes::from_static("authentication failed"),
        };
        let away = CloseFrame {
            code: CloseCode::Away,
            reason: Utf8Bytes::from_static("server shutting down"),
        };
        assert!(is_policy_close(Some(&policy)));
        assert!(!is_policy_close(Some(&away)));
        assert!(!is_policy_close(None));
    }
}
