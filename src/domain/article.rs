//! Article records as stored upstream and as pushed over the wire.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of an article, opaque to the relay.
///
/// Upstream stores these as database object ids; the relay only compares
/// them for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleId(String);

impl ArticleId {
    /// Wraps a raw identifier.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArticleId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for ArticleId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Article as pushed to clients.
///
/// Binary image content never crosses the wire; `has_image` replaces it.
/// Every field except `id` is optional so partial records from older
/// producers still decode. Unrecognised fields are kept in `extra` and
/// re-emitted unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    /// Article identifier. Accepts the upstream `_id` spelling.
    #[serde(alias = "_id")]
    pub id: ArticleId,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nom: Option<String>,

    /// Business code, unique upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_article: Option<String>,

    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Unit price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prix: Option<f64>,

    /// Quantity in stock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantite: Option<i64>,

    /// Creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Whether the upstream record carries an image.
    #[serde(default)]
    pub has_image: bool,

    /// Fields the relay does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Article {
    /// Creates a minimal article with only an id and a name.
    #[must_use]
    pub fn named(id: impl Into<ArticleId>, nom: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nom: Some(nom.into()),
            code_article: None,
            description: None,
            prix: None,
            quantite: None,
            created_at: None,
            has_image: false,
            extra: serde_json::Map::new(),
        }
    }
}

/// Article as handed over by the upstream data layer, image included.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredArticle {
    /// Everything except the image.
    #[serde(flatten)]
    pub article: Article,

    /// Encoded image content (data URL or base64), if any.
    #[serde(default)]
    pub image: Option<String>,
}

impl StoredArticle {
    /// Strips the image and returns the wire representation.
    #[must_use]
    pub fn into_wire(self) -> Article {
        let has_image = self.image.as_deref().is_some_and(|img| !img.is_empty());
        Article {
            has_image,
            ..self.article
        }
    }
}
