//! article-relay server entry point.
//!
//! Starts the Axum HTTP server with the REST and WebSocket endpoints and
//! shuts down gracefully on Ctrl-C.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use article_relay::auth::JwtVerifier;
use article_relay::config::RelayConfig;
use article_relay::server::Relay;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = RelayConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, "starting article-relay");

    let verifier = Arc::new(JwtVerifier::new(&config.jwt_secret));
    let relay = Relay::start(&config, verifier);
    let app = relay.router();

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    let shutdown = relay.shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutdown requested");
            shutdown.cancel();
        })
        .await?;

    relay.shutdown().await;
    Ok(())
}

/// Installs the global subscriber. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
