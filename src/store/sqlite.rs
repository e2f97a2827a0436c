//! SQLite backend.
//!
//! Uniqueness is enforced by the table itself and inserts go through a single
//! `INSERT ... ON CONFLICT DO NOTHING`, so concurrent writers cannot slip a
//! duplicate in between a check and an insert.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, types::Type, Connection, Row};
use tracing::{debug, info};

use super::{ListQuery, PersistOutcome, SortKey, Store, StoreConnection, StoredPost};
use crate::error::PersistError;
use crate::ingest::types::NormalizedPost;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id     TEXT,
    identity      TEXT NOT NULL,
    text          TEXT NOT NULL,
    raw_timestamp TEXT NOT NULL,
    published_at  TEXT,
    ingested_at   TEXT NOT NULL,
    CONSTRAINT uix_identity_text UNIQUE (identity, text)
);
CREATE INDEX IF NOT EXISTS idx_posts_published_at ON posts (published_at);
CREATE INDEX IF NOT EXISTS idx_posts_ingested_at ON posts (ingested_at);
"#;

const COLUMNS: &str = "id, source_id, identity, text, raw_timestamp, published_at, ingested_at";

/// File-backed store. Each [`Store::connect`] opens a fresh connection.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Point at a database file, creating it and the schema if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PersistError> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        info!("Opening post archive at {}", store.path.display());
        // Create schema eagerly so a bad path fails here rather than mid-run.
        store.connect()?.close()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Store for SqliteStore {
    fn connect(&self) -> Result<Box<dyn StoreConnection>, PersistError> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch(SCHEMA)?;
        debug!(path = %self.path.display(), "store connection opened");
        Ok(Box::new(SqliteConnection { conn }))
    }
}

pub struct SqliteConnection {
    conn: Connection,
}

impl StoreConnection for SqliteConnection {
    fn persist(&mut self, post: &NormalizedPost) -> Result<PersistOutcome, PersistError> {
        let ingested_at = Utc::now();
        let inserted = self.conn.execute(
            "INSERT INTO posts (source_id, identity, text, raw_timestamp, published_at, ingested_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (identity, text) DO NOTHING",
            params![
                post.source_id,
                post.identity,
                post.text,
                post.raw_timestamp,
                post.published_at.map(ts_to_sql),
                ts_to_sql(ingested_at),
            ],
        )?;
        if inserted == 0 {
            return Ok(PersistOutcome::Duplicate);
        }

        Ok(PersistOutcome::Created(StoredPost {
            id: self.conn.last_insert_rowid(),
            source_id: post.source_id.clone(),
            identity: post.identity.clone(),
            text: post.text.clone(),
            raw_timestamp: post.raw_timestamp.clone(),
            published_at: post.published_at.map(round_to_sql_precision),
            ingested_at: round_to_sql_precision(ingested_at),
        }))
    }

    fn list(&self, query: &ListQuery) -> Result<Vec<StoredPost>, PersistError> {
        let order = match query.sort {
            SortKey::Published => "published_at DESC, id DESC",
            SortKey::Ingested => "ingested_at DESC, id DESC",
        };
        // SQLite treats a negative LIMIT as unbounded.
        let limit = query
            .limit
            .and_then(|l| i64::try_from(l).ok())
            .unwrap_or(-1);

        let rows = match query.search_term() {
            Some(term) => {
                let sql = format!(
                    "SELECT {COLUMNS} FROM posts
                     WHERE text LIKE ?1 ESCAPE '\\' OR identity LIKE ?1 ESCAPE '\\'
                     ORDER BY {order} LIMIT ?2"
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let pattern = format!("%{}%", escape_like(term));
                let rows = stmt
                    .query_map(params![pattern, limit], stored_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let sql = format!("SELECT {COLUMNS} FROM posts ORDER BY {order} LIMIT ?1");
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![limit], stored_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    }

    fn count(&self) -> Result<u64, PersistError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM posts", [], |r| r.get(0))?;
        Ok(n.max(0) as u64)
    }

    fn close(self: Box<Self>) -> Result<(), PersistError> {
        self.conn.close().map_err(|(_, e)| PersistError::Sqlite(e))
    }
}

fn stored_from_row(row: &Row) -> rusqlite::Result<StoredPost> {
    let published_at: Option<String> = row.get("published_at")?;
    let ingested_at: String = row.get("ingested_at")?;
    Ok(StoredPost {
        id: row.get("id")?,
        source_id: row.get("source_id")?,
        identity: row.get("identity")?,
        text: row.get("text")?,
        raw_timestamp: row.get("raw_timestamp")?,
        published_at: published_at.map(|s| ts_from_sql(5, &s)).transpose()?,
        ingested_at: ts_from_sql(6, &ingested_at)?,
    })
}

// Fixed-width UTC text keeps lexical order equal to chronological order.
fn ts_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn ts_from_sql(col: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(col, Type::Text, Box::new(e)))
}

fn round_to_sql_precision(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts_from_sql(0, &ts_to_sql(ts)).unwrap_or(ts)
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn post(identity: &str, text: &str) -> NormalizedPost {
        NormalizedPost {
            source_id: None,
            identity: identity.into(),
            text: text.into(),
            raw_timestamp: "2h".into(),
            published_at: None,
        }
    }

    fn open_tmp() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("posts.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn timestamps_survive_the_round_trip() {
        let (_dir, store) = open_tmp();
        let mut conn = store.connect().unwrap();
        let mut p = post("alice", "hello");
        p.published_at = Some(Utc.with_ymd_and_hms(2020, 2, 2, 0, 0, 0).unwrap());
        let created = match conn.persist(&p).unwrap() {
            PersistOutcome::Created(s) => s,
            PersistOutcome::Duplicate => panic!("expected insert"),
        };
        let listed = conn.list(&ListQuery::default()).unwrap();
        assert_eq!(listed, vec![created]);
    }

    #[test]
    fn like_wildcards_match_literally() {
        let (_dir, store) = open_tmp();
        let mut conn = store.connect().unwrap();
        conn.persist(&post("alice", "100% sure")).unwrap();
        conn.persist(&post("alice", "100 sure")).unwrap();
        let hits = conn
            .list(&ListQuery::default().with_search("0%"))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "100% sure");
    }

    #[test]
    fn data_outlives_connections() {
        let (_dir, store) = open_tmp();
        let mut c1 = store.connect().unwrap();
        c1.persist(&post("alice", "one")).unwrap();
        c1.close().unwrap();

        let mut c2 = store.connect().unwrap();
        assert_eq!(c2.persist(&post("alice", "one")).unwrap(), PersistOutcome::Duplicate);
        assert_eq!(c2.count().unwrap(), 1);
    }
}
