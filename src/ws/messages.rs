//! WebSocket wire messages.
//!
//! Server to client frames are JSON objects of the form
//! `{"type": "...", "data": ...}`. Client to server frames carry only the
//! application-level keepalive (`{"type": "ping"}` / `{"type": "pong"}`).

use serde::{Deserialize, Serialize};

use crate::domain::{Article, ArticleEvent, ArticleId, ConnectionId};
use crate::error::RelayError;

/// Payload of a `deleteArticle` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedArticle {
    /// Identifier of the removed article.
    pub id: ArticleId,
}

/// Payload of the admission acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Admitted {
    /// Id the server assigned to this connection.
    pub connection_id: ConnectionId,
}

/// Frame sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    /// An article was created.
    NewArticle(Article),
    /// An article was updated.
    UpdateArticle(Article),
    /// An article was deleted.
    DeleteArticle(DeletedArticle),
    /// The connection passed authentication and was admitted.
    Connected(Admitted),
    /// Reply to a client `ping`.
    Pong,
}

impl ServerMessage {
    /// Decodes a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MalformedMessage`] if the text is not JSON or
    /// does not carry a recognised `type`.
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        serde_json::from_str(text).map_err(|e| RelayError::MalformedMessage(e.to_string()))
    }

    /// Encodes this message as JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Internal`] if serialization fails.
    pub fn to_json(&self) -> Result<String, RelayError> {
        serde_json::to_string(self).map_err(|e| RelayError::Internal(e.to_string()))
    }

    /// Converts an article frame back into the event it describes.
    #[must_use]
    pub fn into_event(self) -> Option<ArticleEvent> {
        match self {
            Self::NewArticle(article) => Some(ArticleEvent::Created(article)),
            Self::UpdateArticle(article) => Some(ArticleEvent::Updated(article)),
            Self::DeleteArticle(DeletedArticle { id }) => Some(ArticleEvent::Deleted { id }),
            Self::Connected(_) | Self::Pong => None,
        }
    }
}

impl From<&ArticleEvent> for ServerMessage {
    fn from(event: &ArticleEvent) -> Self {
        match event {
            ArticleEvent::Created(article) => Self::NewArticle(article.clone()),
            ArticleEvent::Updated(article) => Self::UpdateArticle(article.clone()),
            ArticleEvent::Deleted { id } => Self::DeleteArticle(DeletedArticle { id: id.clone() }),
        }
    }
}

/// Frame sent from a client to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Keepalive request; the server answers with `pong`.
    Ping,
    /// Keepalive response.
    Pong,
}

impl ClientMessage {
    /// Decodes a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MalformedMessage`] for anything but a
    /// recognised keepalive frame.
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        serde_json::from_str(text).map_err(|e| RelayError::MalformedMessage(e.to_string()))
    }
}
