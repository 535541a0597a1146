//! Handshake authentication.
//!
//! A [`TokenVerifier`] maps the credential presented on the WebSocket
//! upgrade request to an [`Identity`]. Verification fails closed: a missing
//! credential is rejected exactly like an invalid one. Verifiers are pure;
//! they never touch the connection registry.

use std::fmt;

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Authenticated principal behind a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    user_id: String,
}

impl Identity {
    /// Creates an identity for `user_id`.
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    /// The authenticated user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// Validates handshake credentials.
pub trait TokenVerifier: fmt::Debug + Send + Sync {
    /// Returns the identity for `credential`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Unauthenticated`] if the credential is absent,
    /// empty, malformed, expired, or otherwise rejected.
    fn verify(&self, credential: Option<&str>) -> Result<Identity, RelayError>;
}

/// User reference embedded in token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaim {
    /// User id.
    pub id: String,
}

/// Claims carried by login tokens: `{"user": {"id": ..}, "exp": ..}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject user.
    pub user: UserClaim,
    /// Expiry as seconds since the Unix epoch.
    pub exp: u64,
}

/// Verifies HS256 JSON Web Tokens signed with a shared secret.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Creates a verifier for tokens signed with `secret`.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, credential: Option<&str>) -> Result<Identity, RelayError> {
        let token = credential
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RelayError::Unauthenticated("missing token".to_string()))?;

        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| RelayError::Unauthenticated(format!("invalid token: {e}")))?;

        if data.claims.user.id.is_empty() {
            return Err(RelayError::Unauthenticated("token has no user".to_string()));
        }
        Ok(Identity::new(data.claims.user.id))
    }
}
