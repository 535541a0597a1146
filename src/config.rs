//! Relay configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Missing or unparsable values fall back
//! to defaults, except for addresses and URLs which are reported as errors.

use std::net::SocketAddr;
use std::time::Duration;

use url::Url;

/// Server-side configuration.
///
/// Loaded once at startup via [`RelayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Shared secret used to verify HS256 handshake tokens.
    pub jwt_secret: String,

    /// Maximum pending messages per connection before the oldest is dropped.
    pub outbound_queue_capacity: usize,

    /// Period of the liveness monitor.
    pub heartbeat_interval: Duration,

    /// Capacity of the change-feed channel between event source and dispatcher.
    pub change_feed_capacity: usize,
}

impl RelayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()?;

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            tracing::warn!("JWT_SECRET not set, using insecure default");
            "change-me".to_string()
        });

        Ok(Self {
            listen_addr,
            jwt_secret,
            outbound_queue_capacity: parse_env("OUTBOUND_QUEUE_CAPACITY", 64).max(1),
            heartbeat_interval: Duration::from_secs(
                parse_env("HEARTBEAT_INTERVAL_SECS", 30).max(1),
            ),
            change_feed_capacity: parse_env("CHANGE_FEED_CAPACITY", 1024).max(1),
        })
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            jwt_secret: "change-me".to_string(),
            outbound_queue_capacity: 64,
            heartbeat_interval: Duration::from_secs(30),
            change_feed_capacity: 1024,
        }
    }
}

/// Client-side configuration for the reconnection manager.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint of the relay, without the `token` parameter.
    pub ws_url: Url,

    /// Delay before the first retry; doubles per failed attempt.
    pub backoff_base: Duration,

    /// Upper bound on the retry delay.
    pub backoff_cap: Duration,

    /// Time allowed for the upgrade plus the server's admission acknowledgement.
    pub handshake_timeout: Duration,

    /// Interval of the application-level `ping` sent while connected.
    pub ping_interval: Duration,
}

impl ClientConfig {
    /// Builds a configuration for `ws_url` with default timings.
    #[must_use]
    pub fn new(ws_url: Url) -> Self {
        Self {
            ws_url,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(25),
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `RELAY_WS_URL` is set but is not a valid URL.
    pub fn from_env() -> Result<Self, url::ParseError> {
        dotenvy::dotenv().ok();

        let ws_url: Url = std::env::var("RELAY_WS_URL")
            .unwrap_or_else(|_| "ws://127.0.0.1:3000/ws".to_string())
            .parse()?;

        Ok(Self {
            ws_url,
            backoff_base: Duration::from_millis(parse_env("BACKOFF_BASE_MS", 1000)),
            backoff_cap: Duration::from_millis(parse_env("BACKOFF_CAP_MS", 5000)),
            handshake_timeout: Duration::from_secs(parse_env("HANDSHAKE_TIMEOUT_SECS", 10)),
            ping_interval: Duration::from_secs(parse_env("CLIENT_PING_INTERVAL_SECS", 25).max(1)),
        })
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_falls_back_on_missing_key() {
        let value: u64 = parse_env("ARTICLE_RELAY_TEST_SURELY_UNSET", 42);
        assert_eq!(value, 42);
    }

    #[test]
    fn client_defaults() {
        let Ok(url) = "ws://localhost:3000/ws".parse::<Url>() else {
            panic!("valid url");
        };
        let cfg = ClientConfig::new(url);
        assert_eq!(cfg.backoff_base, Duration::from_secs(1));
        assert_eq!(cfg.backoff_cap, Duration::from_secs(5));
        assert_eq!(cfg.ping_interval, Duration::from_secs(25));
    }
}
