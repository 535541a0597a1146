//! Domain layer: articles, change events, and the connection registry.
//!
//! This module contains the server-side model: the article records the
//! relay carries, the immutable change events built from them, and the
//! registry of live connections with their liveness bookkeeping.

pub mod article;
pub mod article_event;
pub mod connection;
pub mod connection_id;
pub mod connection_registry;

pub use article::{Article, ArticleId, StoredArticle};
pub use article_event::{ArticleEvent, EventKind, ResourceChange};
pub use connection::{CloseReason, Connection, Liveness, Outbound, OutboundQueue, PushOutcome};
pub use connection_id::ConnectionId;
pub use connection_registry::ConnectionRegistry;
