//! Change events describing article mutations.
//!
//! The upstream data layer hands the relay loosely typed
//! [`ResourceChange`] tuples; they are validated into immutable
//! [`ArticleEvent`]s before fan-out.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::article::{Article, ArticleId, StoredArticle};
use crate::error::RelayError;

/// Kind of mutation that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A new article was inserted.
    Created,
    /// An existing article changed.
    Updated,
    /// An article was removed.
    Deleted,
}

/// Immutable fact about one article mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum ArticleEvent {
    /// Full record of a newly created article.
    Created(Article),
    /// Full record of an updated article.
    Updated(Article),
    /// Identifier of a deleted article.
    Deleted {
        /// Identifier of the removed article.
        id: ArticleId,
    },
}

impl ArticleEvent {
    /// Returns the mutation kind.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Created(_) => EventKind::Created,
            Self::Updated(_) => EventKind::Updated,
            Self::Deleted { .. } => EventKind::Deleted,
        }
    }

    /// Returns the identifier of the affected article.
    #[must_use]
    pub fn resource_id(&self) -> &ArticleId {
        match self {
            Self::Created(article) | Self::Updated(article) => &article.id,
            Self::Deleted { id } => id,
        }
    }
}

/// Raw `{kind, payload}` tuple emitted by the upstream data layer.
///
/// For `created`/`updated` the payload is the stored article (image
/// included); for `deleted` it is either `{"id": ..}` or a bare id string.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResourceChange {
    /// Mutation kind.
    pub kind: EventKind,
    /// Kind-specific payload.
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
}

#[derive(Deserialize)]
struct DeletedPayload {
    #[serde(alias = "_id")]
    id: ArticleId,
}

impl TryFrom<ResourceChange> for ArticleEvent {
    type Error = RelayError;

    fn try_from(change: ResourceChange) -> Result<Self, Self::Error> {
        let invalid = |e: serde_json::Error| RelayError::InvalidRequest(e.to_string());
        match change.kind {
            EventKind::Created => {
                let stored: StoredArticle =
                    serde_json::from_value(change.payload).map_err(invalid)?;
                Ok(Self::Created(stored.into_wire()))
            }
            EventKind::Updated => {
                let stored: StoredArticle =
                    serde_json::from_value(change.payload).map_err(invalid)?;
                Ok(Self::Updated(stored.into_wire()))
            }
            EventKind::Deleted => {
                let id = match change.payload {
                    serde_json::Value::String(raw) => ArticleId::from(raw),
                    other => serde_json::from_value::<DeletedPayload>(other)
                        .map_err(invalid)?
                        .id,
                };
                Ok(Self::Deleted { id })
            }
        }
    }
}
