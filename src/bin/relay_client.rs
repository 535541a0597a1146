//! Command-line subscriber.
//!
//! Connects to the relay at `RELAY_WS_URL`, keeps the connection alive,
//! and logs every state transition and cache change until Ctrl-C.
//! The token comes from the file named by `RELAY_TOKEN_FILE` (re-read on
//! every attempt) or, failing that, from `RELAY_TOKEN`.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use article_relay::client::{
    CredentialProvider, MemoryStore, ReconnectionManager, StaticCredentials, TokenFile,
};
use article_relay::config::ClientConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ClientConfig::from_env().context("invalid RELAY_WS_URL")?;
    tracing::info!(url = %config.ws_url, "starting relay-client");

    let provider: Arc<dyn CredentialProvider> = match std::env::var("RELAY_TOKEN_FILE") {
        Ok(path) => Arc::new(TokenFile::new(path)),
        Err(_) => match std::env::var("RELAY_TOKEN") {
            Ok(token) => Arc::new(StaticCredentials::new(token)),
            Err(_) => {
                tracing::warn!("neither RELAY_TOKEN_FILE nor RELAY_TOKEN is set");
                Arc::new(StaticCredentials::none())
            }
        },
    };

    let manager = ReconnectionManager::new(config, provider, MemoryStore::new());
    let mut transitions = manager.subscribe();
    let handle = manager.spawn();

    let logger = tokio::spawn(async move {
        loop {
            match transitions.recv().await {
                Ok(state) => {
                    tracing::info!(
                        phase = ?state.phase,
                        attempt = state.attempt,
                        "connection state"
                    );
                }
                Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "missed transitions"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    let cached = handle.with_store(MemoryStore::len);
    let state = handle.disconnect().await;
    logger.abort();
    tracing::info!(phase = ?state.phase, cached, "relay-client stopped");
    Ok(())
}
