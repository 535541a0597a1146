//! Credentials the client presents at handshake time.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::RelayError;

/// Opaque login token with an optional expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Wraps a token with no known expiry.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    /// Sets the instant after which the token must be re-acquired.
    #[must_use]
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Raw token value.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns `true` if the token is past its expiry at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of credentials, consulted whenever the cached one is missing,
/// expired, or was refused by the server.
#[async_trait]
pub trait CredentialProvider: fmt::Debug + Send + Sync {
    /// Obtains a credential.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::CredentialUnavailable`] if none can be had
    /// right now; the caller retries on its backoff schedule.
    async fn acquire(&self) -> Result<Credential, RelayError>;
}

/// Provider that always hands out the same credential.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    credential: Option<Credential>,
}

impl StaticCredentials {
    /// Provider for a fixed token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            credential: Some(Credential::new(token)),
        }
    }

    /// Provider that never yields a credential.
    #[must_use]
    pub const fn none() -> Self {
        Self { credential: None }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn acquire(&self) -> Result<Credential, RelayError> {
        self.credential
            .clone()
            .ok_or_else(|| RelayError::CredentialUnavailable("no token configured".to_string()))
    }
}

/// Provider that re-reads a token file on every acquisition, so a token
/// refreshed by a separate login step is picked up on the next retry.
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    /// Reads tokens from `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialProvider for TokenFile {
    async fn acquire(&self) -> Result<Credential, RelayError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            RelayError::CredentialUnavailable(format!("{}: {e}", self.path.display()))
        })?;
        let token = raw.trim();
        if token.is_empty() {
            return Err(RelayError::CredentialUnavailable(format!(
                "{} is empty",
                self.path.display()
            )));
        }
        Ok(Credential::new(token))
    }
}
