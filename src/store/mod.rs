//! Deduplicated post storage.
//!
//! The pipeline and the read API only ever see [`Store`] and [`StoreConnection`];
//! the backend behind them is swappable. Every backend enforces the same rule:
//! at most one row per (identity, text) pair. A second insert of the same pair is
//! reported as [`PersistOutcome::Duplicate`] and leaves the stored row untouched.

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PersistError;
use crate::ingest::types::NormalizedPost;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// A persisted post. `id` and `ingested_at` are assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredPost {
    pub id: i64,
    pub source_id: Option<String>,
    pub identity: String,
    pub text: String,
    pub raw_timestamp: String,
    pub published_at: Option<DateTime<Utc>>,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Created(StoredPost),
    /// The (identity, text) pair was already stored.
    Duplicate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Publication time, newest first; posts without one come last.
    #[default]
    Published,
    /// Ingestion time, newest first.
    Ingested,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub sort: SortKey,
    pub search: Option<String>,
    pub limit: Option<usize>,
}

impl ListQuery {
    pub fn sorted_by(sort: SortKey) -> Self {
        Self {
            sort,
            ..Self::default()
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Trimmed search term; blank counts as no filter.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Opens independent connections; one per pipeline run or per read request.
pub trait Store: Send + Sync {
    fn connect(&self) -> Result<Box<dyn StoreConnection>, PersistError>;
}

pub trait StoreConnection: Send {
    /// Insert unless the (identity, text) pair already exists.
    fn persist(&mut self, post: &NormalizedPost) -> Result<PersistOutcome, PersistError>;

    fn list(&self, query: &ListQuery) -> Result<Vec<StoredPost>, PersistError>;

    fn count(&self) -> Result<u64, PersistError>;

    fn close(self: Box<Self>) -> Result<(), PersistError>;
}

/// ASCII case-insensitive substring match over text or identity.
pub(crate) fn matches_search(post: &StoredPost, needle: &str) -> bool {
    let needle = needle.to_ascii_lowercase();
    post.text.to_ascii_lowercase().contains(&needle)
        || post.identity.to_ascii_lowercase().contains(&needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_search_is_no_filter() {
        assert_eq!(ListQuery::default().with_search("   ").search_term(), None);
        assert_eq!(
            ListQuery::default().with_search(" abc ").search_term(),
            Some("abc")
        );
    }

    #[test]
    fn sort_key_parses_lowercase() {
        let k: SortKey = serde_json::from_str(r#""ingested""#).unwrap();
        assert_eq!(k, SortKey::Ingested);
    }
}
