//! In-process backend with the same dedupe and ordering rules as SQLite.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use super::{matches_search, ListQuery, PersistOutcome, SortKey, Store, StoreConnection, StoredPost};
use crate::error::PersistError;
use crate::ingest::types::NormalizedPost;

#[derive(Debug, Default)]
struct Inner {
    rows: Mutex<Vec<StoredPost>>,
    open_connections: AtomicUsize,
}

/// Cloning shares the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections handed out and not yet closed.
    pub fn open_connections(&self) -> usize {
        self.inner.open_connections.load(Ordering::SeqCst)
    }
}

impl Store for MemoryStore {
    fn connect(&self) -> Result<Box<dyn StoreConnection>, PersistError> {
        self.inner.open_connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MemoryConnection {
    inner: Arc<Inner>,
}

impl MemoryConnection {
    fn rows(&self) -> Result<std::sync::MutexGuard<'_, Vec<StoredPost>>, PersistError> {
        self.inner
            .rows
            .lock()
            .map_err(|e| PersistError::Unavailable(format!("lock poisoned: {e}")))
    }
}

impl StoreConnection for MemoryConnection {
    fn persist(&mut self, post: &NormalizedPost) -> Result<PersistOutcome, PersistError> {
        // Check and insert under one lock.
        let mut rows = self.rows()?;
        if rows
            .iter()
            .any(|r| r.identity == post.identity && r.text == post.text)
        {
            return Ok(PersistOutcome::Duplicate);
        }
        let stored = StoredPost {
            id: rows.last().map_or(1, |r| r.id + 1),
            source_id: post.source_id.clone(),
            identity: post.identity.clone(),
            text: post.text.clone(),
            raw_timestamp: post.raw_timestamp.clone(),
            published_at: post.published_at,
            ingested_at: Utc::now(),
        };
        rows.push(stored.clone());
        Ok(PersistOutcome::Created(stored))
    }

    fn list(&self, query: &ListQuery) -> Result<Vec<StoredPost>, PersistError> {
        let rows = self.rows()?;
        let mut out: Vec<StoredPost> = match query.search_term() {
            Some(term) => rows
                .iter()
                .filter(|r| matches_search(r, term))
                .cloned()
                .collect(),
            None => rows.clone(),
        };
        drop(rows);

        // `None` sorts below any `Some`, so undated posts end up last.
        match query.sort {
            SortKey::Published => {
                out.sort_by(|a, b| b.published_at.cmp(&a.published_at).then(b.id.cmp(&a.id)))
            }
            SortKey::Ingested => {
                out.sort_by(|a, b| b.ingested_at.cmp(&a.ingested_at).then(b.id.cmp(&a.id)))
            }
        }
        if let Some(limit) = query.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    fn count(&self) -> Result<u64, PersistError> {
        Ok(self.rows()?.len() as u64)
    }

    fn close(self: Box<Self>) -> Result<(), PersistError> {
        self.inner.open_connections.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
