//! Idempotent application of pushed events to the local article cache.
//!
//! Delivery is at-least-once, so every operation tolerates duplicates:
//!
//! | Event   | Present locally     | Absent locally |
//! |---------|---------------------|----------------|
//! | Created | no-op               | insert         |
//! | Updated | replace             | insert         |
//! | Deleted | remove              | no-op          |
//!
//! Events for the same id are applied last-write-wins; a delayed
//! `Updated` arriving after a `Deleted` re-inserts the record.

use indexmap::IndexMap;

use crate::domain::{Article, ArticleEvent, ArticleId};
use crate::error::RelayError;
use crate::ws::messages::ServerMessage;

/// Local cache the reconciler mutates.
pub trait LocalStore: Send {
    /// Returns `true` if a record with `id` is cached.
    fn contains(&self, id: &ArticleId) -> bool;

    /// Inserts `article`, replacing any record with the same id.
    fn upsert(&mut self, article: Article);

    /// Removes the record with `id`. Returns `true` if it existed.
    fn remove(&mut self, id: &ArticleId) -> bool;
}

/// In-memory [`LocalStore`] preserving insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStore {
    articles: IndexMap<ArticleId, Article>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a cached article.
    #[must_use]
    pub fn get(&self, id: &ArticleId) -> Option<&Article> {
        self.articles.get(id)
    }

    /// Cached articles in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Article> {
        self.articles.values()
    }

    /// Number of cached articles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.articles.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

impl LocalStore for MemoryStore {
    fn contains(&self, id: &ArticleId) -> bool {
        self.articles.contains_key(id)
    }

    fn upsert(&mut self, article: Article) {
        self.articles.insert(article.id.clone(), article);
    }

    fn remove(&mut self, id: &ArticleId) -> bool {
        self.articles.shift_remove(id).is_some()
    }
}

/// Effect of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A new record was cached.
    Inserted,
    /// An existing record was overwritten.
    Replaced,
    /// A record was removed.
    Removed,
    /// The event was a duplicate or referred to an unknown id.
    Unchanged,
}

/// Applies events to a [`LocalStore`].
#[derive(Debug, Default)]
pub struct Reconciler<S> {
    store: S,
}

impl<S: LocalStore> Reconciler<S> {
    /// Wraps `store`.
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Read access to the underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Applies one event.
    pub fn apply(&mut self, event: &ArticleEvent) -> ApplyOutcome {
        match event {
            ArticleEvent::Created(article) => {
                if self.store.contains(&article.id) {
                    ApplyOutcome::Unchanged
                } else {
                    self.store.upsert(article.clone());
                    ApplyOutcome::Inserted
                }
            }
            ArticleEvent::Updated(article) => {
                let existed = self.store.contains(&article.id);
                self.store.upsert(article.clone());
                if existed {
                    ApplyOutcome::Replaced
                } else {
                    ApplyOutcome::Inserted
                }
            }
            ArticleEvent::Deleted { id } => {
                if self.store.remove(id) {
                    ApplyOutcome::Removed
                } else {
                    ApplyOutcome::Unchanged
                }
            }
        }
    }

    /// Decodes a server frame and applies it if it carries an event.
    ///
    /// Returns `Ok(None)` for well-formed frames that are not article
    /// events (acknowledgements, pongs).
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MalformedMessage`] for undecodable frames; the
    /// store is left untouched.
    pub fn apply_text(&mut self, text: &str) -> Result<Option<ApplyOutcome>, RelayError> {
        let msg = ServerMessage::parse(text)?;
        Ok(msg.into_event().map(|event| self.apply(&event)))
    }
}
