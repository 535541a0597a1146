//! End-to-end tests: a relay on loopback, driven over HTTP and WebSocket.
#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tokio::sync::{broadcast, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

use article_relay::auth::{Claims, JwtVerifier, UserClaim};
use article_relay::client::{
    ClientConnectionState, ClientHandle, ClientPhase, CredentialProvider, MemoryStore,
    ReconnectionManager, StaticCredentials,
};
use article_relay::config::{ClientConfig, RelayConfig};
use article_relay::domain::{ArticleId, CloseReason};
use article_relay::server::Relay;

const SECRET: &str = "integration-secret";
const WAIT: Duration = Duration::from_secs(5);

async fn start_relay() -> (SocketAddr, Relay) {
    let config = RelayConfig {
        jwt_secret: SECRET.to_string(),
        ..RelayConfig::default()
    };
    let relay = Relay::start(&config, Arc::new(JwtVerifier::new(SECRET)));
    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    let app = relay.router();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, relay)
}

fn token_for(user: &str) -> String {
    let exp = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0) + 3600;
    let claims = Claims {
        user: UserClaim { id: user.to_string() },
        exp,
    };
    let Ok(token) = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    ) else {
        panic!("token encoding failed");
    };
    token
}

fn client_config(addr: SocketAddr) -> ClientConfig {
    let Ok(url) = Url::parse(&format!("ws://{addr}/ws")) else {
        panic!("valid url");
    };
    ClientConfig {
        backoff_base: Duration::from_millis(50),
        backoff_cap: Duration::from_millis(200),
        handshake_timeout: Duration::from_secs(2),
        ..ClientConfig::new(url)
    }
}

fn start_client(
    addr: SocketAddr,
    provider: Arc<dyn CredentialProvider>,
) -> (
    ClientHandle<MemoryStore>,
    broadcast::Receiver<ClientConnectionState>,
) {
    let manager = ReconnectionManager::new(client_config(addr), provider, MemoryStore::new());
    let transitions = manager.subscribe();
    (manager.spawn(), transitions)
}

async fn wait_for_phase(handle: &ClientHandle<MemoryStore>, phase: ClientPhase) {
    let mut rx = handle.watch();
    let reached = tokio::time::timeout(WAIT, rx.wait_for(|s| s.phase == phase)).await;
    let Ok(Ok(_)) = reached else {
        panic!("client never reached {phase:?}");
    };
}

async fn next_transition(
    rx: &mut broadcast::Receiver<ClientConnectionState>,
) -> ClientConnectionState {
    let Ok(Ok(state)) = tokio::time::timeout(WAIT, rx.recv()).await else {
        panic!("no transition observed");
    };
    state
}

async fn wait_for_article(handle: &ClientHandle<MemoryStore>, id: &str) {
    let id = ArticleId::from(id);
    let found = tokio::time::timeout(WAIT, async {
        while !handle.with_store(|s| s.get(&id).is_some()) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(found.is_ok(), "article {id} never arrived");
}

async fn publish(addr: SocketAddr, change: Value) -> reqwest::StatusCode {
    let Ok(resp) = reqwest::Client::new()
        .post(format!("http://{addr}/api/v1/events"))
        .json(&change)
        .send()
        .await
    else {
        panic!("publish request failed");
    };
    resp.status()
}

#[tokio::test]
async fn created_event_reaches_client_cache() {
    let (addr, relay) = start_relay().await;
    let (handle, _) = start_client(addr, Arc::new(StaticCredentials::new(token_for("u1"))));
    wait_for_phase(&handle, ClientPhase::Connected).await;

    let status = publish(
        addr,
        json!({"kind": "created", "payload": {"id": "A1", "nom": "Widget"}}),
    )
    .await;
    assert_eq!(status, reqwest::StatusCode::ACCEPTED);

    wait_for_article(&handle, "A1").await;
    let nom = handle.with_store(|s| s.get(&"A1".into()).and_then(|a| a.nom.clone()));
    assert_eq!(nom.as_deref(), Some("Widget"));

    let state = handle.disconnect().await;
    assert_eq!(state.phase, ClientPhase::Disconnected);
    relay.shutdown().await;
}

#[tokio::test]
async fn rejected_credential_enters_backoff() {
    let (addr, relay) = start_relay().await;
    let (handle, mut transitions) = start_client(addr, Arc::new(StaticCredentials::new("")));

    let connecting = next_transition(&mut transitions).await;
    assert_eq!((connecting.phase, connecting.attempt), (ClientPhase::Connecting, 0));
    let backoff = next_transition(&mut transitions).await;
    assert_eq!((backoff.phase, backoff.attempt), (ClientPhase::Backoff, 1));
    assert!(relay.state().registry.is_empty());

    handle.disconnect().await;
    relay.shutdown().await;
}

#[tokio::test]
async fn missing_credential_never_dials() {
    let (addr, relay) = start_relay().await;
    let (handle, mut transitions) = start_client(addr, Arc::new(StaticCredentials::none()));

    let first = next_transition(&mut transitions).await;
    assert_eq!((first.phase, first.attempt), (ClientPhase::Backoff, 1));
    let second = next_transition(&mut transitions).await;
    assert_eq!((second.phase, second.attempt), (ClientPhase::Backoff, 2));

    let state = handle.disconnect().await;
    assert_eq!(state, ClientConnectionState::new());
    relay.shutdown().await;
}

#[tokio::test]
async fn delete_of_unknown_id_leaves_cache_unchanged() {
    let (addr, relay) = start_relay().await;
    let (handle, _) = start_client(addr, Arc::new(StaticCredentials::new(token_for("u1"))));
    wait_for_phase(&handle, ClientPhase::Connected).await;

    publish(addr, json!({"kind": "created", "payload": {"id": "A1", "nom": "Widget"}})).await;
    wait_for_article(&handle, "A1").await;

    publish(addr, json!({"kind": "deleted", "payload": {"id": "never-seen"}})).await;
    publish(addr, json!({"kind": "created", "payload": {"id": "A2", "nom": "Marker"}})).await;
    wait_for_article(&handle, "A2").await;

    assert_eq!(handle.with_store(MemoryStore::len), 2);
    handle.disconnect().await;
    relay.shutdown().await;
}

#[tokio::test]
async fn evicted_client_reconnects_and_resets_attempt() {
    let (addr, relay) = start_relay().await;
    let (handle, mut transitions) =
        start_client(addr, Arc::new(StaticCredentials::new(token_for("u1"))));
    wait_for_phase(&handle, ClientPhase::Connected).await;
    while transitions.try_recv().is_ok() {}

    let registry = &relay.state().registry;
    let Some(conn) = registry.snapshot().into_iter().next() else {
        panic!("client should be registered");
    };
    assert!(registry.evict_with(conn.id(), CloseReason::UNRESPONSIVE));

    let dropped = next_transition(&mut transitions).await;
    assert_eq!((dropped.phase, dropped.attempt), (ClientPhase::Backoff, 1));
    let retry = next_transition(&mut transitions).await;
    assert_eq!((retry.phase, retry.attempt), (ClientPhase::Connecting, 1));
    let back = next_transition(&mut transitions).await;
    assert_eq!((back.phase, back.attempt), (ClientPhase::Connected, 0));

    publish(addr, json!({"kind": "updated", "payload": {"id": "B7", "nom": "Late"}})).await;
    wait_for_article(&handle, "B7").await;

    handle.disconnect().await;
    relay.shutdown().await;
}

#[tokio::test]
async fn missing_token_is_closed_with_policy_code() {
    let (addr, relay) = start_relay().await;
    let Ok((mut ws, _)) = connect_async(format!("ws://{addr}/ws")).await else {
        panic!("upgrade should succeed before the close");
    };
    let Ok(Some(Ok(Message::Close(Some(frame))))) = tokio::time::timeout(WAIT, ws.next()).await
    else {
        panic!("expected a close frame");
    };
    assert_eq!(frame.code, CloseCode::Policy);
    assert!(relay.state().registry.is_empty());
    relay.shutdown().await;
}

#[tokio::test]
async fn admitted_socket_receives_acknowledgement_first() {
    let (addr, relay) = start_relay().await;
    let url = format!("ws://{addr}/ws?token={}", token_for("u2"));
    let Ok((mut ws, _)) = connect_async(url).await else {
        panic!("upgrade failed");
    };
    let Ok(Some(Ok(Message::Text(text)))) = tokio::time::timeout(WAIT, ws.next()).await else {
        panic!("expected an acknowledgement");
    };
    let Ok(ack) = serde_json::from_str::<Value>(&text) else {
        panic!("ack is not json");
    };
    assert_eq!(ack["type"], "connected");
    assert!(ack["data"]["connectionId"].is_string());
    assert_eq!(relay.state().registry.len(), 1);
    relay.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_sockets_with_going_away() {
    let (addr_tx, addr_rx) = oneshot::channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    // The relay gets its own runtime, dropped right after shutdown returns,
    // the way the server binary exits.
    let server = std::thread::spawn(move || {
        let Ok(runtime) = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
        else {
            panic!("server runtime failed to start");
        };
        runtime.block_on(async move {
            let (addr, relay) = start_relay().await;
            let _ = addr_tx.send(addr);
            let _ = stop_rx.await;
            relay.shutdown().await;
        });
    });

    let Ok(addr) = addr_rx.await else {
        panic!("server did not start");
    };
    let url = format!("ws://{addr}/ws?token={}", token_for("u3"));
    let Ok((mut ws, _)) = connect_async(url).await else {
        panic!("upgrade failed");
    };
    let Ok(Some(Ok(Message::Text(_)))) = tokio::time::timeout(WAIT, ws.next()).await else {
        panic!("expected an acknowledgement");
    };

    let _ = stop_tx.send(());
    let Ok(joined) = tokio::task::spawn_blocking(move || server.join()).await else {
        panic!("join task failed");
    };
    assert!(joined.is_ok(), "server thread panicked");

    let Ok(Some(Ok(Message::Close(Some(frame))))) = tokio::time::timeout(WAIT, ws.next()).await
    else {
        panic!("expected a close frame after shutdown");
    };
    assert_eq!(frame.code, CloseCode::Away);
}

#[tokio::test]
async fn silent_server_times_out_handshake() {
    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    // Completes the upgrade but never acknowledges admission.
    let silent = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((tcp, _)) = listener.accept().await {
            if let Ok(ws) = tokio_tungstenite::accept_async(tcp).await {
                held.push(ws);
            }
        }
    });

    let config = ClientConfig {
        handshake_timeout: Duration::from_millis(300),
        ..client_config(addr)
    };
    let provider: Arc<dyn CredentialProvider> = Arc::new(StaticCredentials::new(token_for("u1")));
    let manager = ReconnectionManager::new(config, provider, MemoryStore::new());
    let mut transitions = manager.subscribe();
    let handle = manager.spawn();

    let connecting = next_transition(&mut transitions).await;
    assert_eq!((connecting.phase, connecting.attempt), (ClientPhase::Connecting, 0));
    let backoff = next_transition(&mut transitions).await;
    assert_eq!((backoff.phase, backoff.attempt), (ClientPhase::Backoff, 1));

    handle.disconnect().await;
    silent.abort();
}

#[tokio::test]
async fn health_reports_connection_count() {
    let (addr, relay) = start_relay().await;
    let Ok(resp) = reqwest::get(format!("http://{addr}/health")).await else {
        panic!("health request failed");
    };
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let Ok(body) = resp.json::<Value>().await else {
        panic!("health body is not json");
    };
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["connections"], 0);
    relay.shutdown().await;
}

#[tokio::test]
async fn mismatched_payload_is_rejected() {
    let (addr, relay) = start_relay().await;
    let status = publish(addr, json!({"kind": "created", "payload": "not-an-article"})).await;
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
    relay.shutdown().await;
}
