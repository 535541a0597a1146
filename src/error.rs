//! Relay error types with HTTP status code mapping.
//!
//! [`RelayError`] is the central error type for both the server and the
//! client side of the relay. Variants used on HTTP surfaces map to a
//! status code and a structured JSON error response.
//!
//! Outbound queue overflow is not an error: it is a delivery policy and
//! is reported through [`crate::service::PublishReport`] instead.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "invalid request: unknown event kind"
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Error enum shared by the server and client halves of the relay.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                |
/// |-----------|-----------------|----------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request            |
/// | 2000–2999 | Authentication  | 401 Unauthorized           |
/// | 3000–3999 | Server          | 500 Internal Server Error  |
/// | 4000–4999 | Transport       | 502 / 503                  |
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// Credential missing or rejected at handshake time.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Connection did not answer a liveness probe in time.
    #[error("connection unresponsive")]
    Unresponsive,

    /// Inbound frame could not be decoded into a known message.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Network drop, refused connection, or server restart.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The client could not obtain a credential to connect with.
    #[error("credential unavailable: {0}")]
    CredentialUnavailable(String),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::MalformedMessage(_) => 1002,
            Self::Unauthenticated(_) => 2001,
            Self::CredentialUnavailable(_) => 2002,
            Self::Internal(_) => 3000,
            Self::TransportFailure(_) => 4001,
            Self::Unresponsive => 4002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::MalformedMessage(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) | Self::CredentialUnavailable(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::TransportFailure(_) => StatusCode::BAD_GATEWAY,
            Self::Unresponsive => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RelayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::TransportFailure(err.to_string())
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn unauthenticated_maps_to_401() {
        let err = RelayError::Unauthenticated("missing token".to_string());
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.error_code(), 2001);
    }

    #[test]
    fn invalid_request_maps_to_400() {
        let resp = RelayError::InvalidRequest("bad kind".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn display_includes_detail() {
        let err = RelayError::TransportFailure("connection refused".to_string());
        assert_eq!(err.to_string(), "transport failure: connection refused");
    }
}
