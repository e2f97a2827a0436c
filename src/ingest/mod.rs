// src/ingest/mod.rs
pub mod config;
pub mod extract;
pub mod providers;
pub mod types;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::IngestError;
use crate::ingest::types::{FetchSession, Fetcher, Identity, NormalizedPost, PostElement};
use crate::store::{PersistOutcome, Store, StoreConnection};
use crate::timestamp;

/// Pause between two identities.
pub const DEFAULT_THROTTLE: Duration = Duration::from_secs(2);

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("archive_posts_created_total", "Posts newly stored.");
        describe_counter!(
            "archive_posts_duplicate_total",
            "Posts skipped because (identity, text) was already stored."
        );
        describe_counter!(
            "archive_extract_errors_total",
            "Post elements dropped because a field could not be read."
        );
        describe_counter!(
            "archive_persist_errors_total",
            "Posts dropped because the store failed."
        );
        describe_counter!(
            "archive_fetch_errors_total",
            "Identities skipped because fetching failed."
        );
        describe_counter!(
            "archive_unparsed_timestamps_total",
            "Posts stored without a publication time."
        );
        describe_histogram!("archive_fetch_ms", "Snapshot fetch time in milliseconds.");
        describe_gauge!("archive_last_run_ts", "Unix ts when the pipeline last finished.");
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Created,
    Duplicate,
    ExtractFailed,
    PersistFailed,
}

/// Tallies for one identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdentityStats {
    pub identity: Identity,
    pub fetch_failed: bool,
    pub fetched: usize,
    pub created: usize,
    pub duplicates: usize,
    pub extract_errors: usize,
    pub persist_errors: usize,
}

impl IdentityStats {
    fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            ..Self::default()
        }
    }

    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Created => self.created += 1,
            ItemOutcome::Duplicate => self.duplicates += 1,
            ItemOutcome::ExtractFailed => self.extract_errors += 1,
            ItemOutcome::PersistFailed => self.persist_errors += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub identities: Vec<IdentityStats>,
    /// Run stopped early on the cancellation token.
    pub cancelled: bool,
}

impl RunStats {
    pub fn created(&self) -> usize {
        self.identities.iter().map(|s| s.created).sum()
    }

    pub fn duplicates(&self) -> usize {
        self.identities.iter().map(|s| s.duplicates).sum()
    }

    pub fn get(&self, identity: &str) -> Option<&IdentityStats> {
        self.identities.iter().find(|s| s.identity == identity)
    }
}

/// Fetch → extract → normalize → persist, one identity and one post at a time.
pub struct IngestPipeline {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn Store>,
    throttle: Duration,
}

impl IngestPipeline {
    pub fn new(fetcher: Arc<dyn Fetcher>, store: Arc<dyn Store>) -> Self {
        Self {
            fetcher,
            store,
            throttle: DEFAULT_THROTTLE,
        }
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// Run one pass over `identities` in order.
    ///
    /// Only a failure to open the fetch session or the store connection is
    /// returned as an error. Both resources are released before returning,
    /// and before a panic in a fetcher or store is resumed.
    pub async fn run(
        &self,
        identities: &[Identity],
        cancel: &CancellationToken,
    ) -> Result<RunStats, IngestError> {
        ensure_metrics_described();

        let mut session = self.fetcher.open().await?;
        let mut conn = match self.store.connect() {
            Ok(c) => c,
            Err(e) => {
                session.close().await;
                return Err(IngestError::StoreOpen(e));
            }
        };
        info!(
            target: "ingest",
            fetcher = self.fetcher.name(),
            identities = identities.len(),
            "ingest run started"
        );

        let outcome = AssertUnwindSafe(self.run_identities(
            session.as_mut(),
            conn.as_mut(),
            identities,
            cancel,
        ))
        .catch_unwind()
        .await;

        session.close().await;
        if let Err(e) = conn.close() {
            warn!(target: "ingest", error = %e, "closing store connection failed");
        }

        let stats = match outcome {
            Ok(stats) => stats,
            Err(panic) => {
                warn!(target: "ingest", "ingest run panicked, resources released");
                std::panic::resume_unwind(panic);
            }
        };

        gauge!("archive_last_run_ts").set(Utc::now().timestamp() as f64);
        info!(
            target: "ingest",
            created = stats.created(),
            duplicates = stats.duplicates(),
            cancelled = stats.cancelled,
            "ingest run finished"
        );
        Ok(stats)
    }

    async fn run_identities(
        &self,
        session: &mut dyn FetchSession,
        conn: &mut dyn StoreConnection,
        identities: &[Identity],
        cancel: &CancellationToken,
    ) -> RunStats {
        let mut stats = RunStats::default();
        let identities: Vec<&str> = identities
            .iter()
            .map(|id| id.trim())
            .filter(|id| {
                if id.is_empty() {
                    warn!(target: "ingest", "skipping blank identity");
                }
                !id.is_empty()
            })
            .collect();

        for (i, &identity) in identities.iter().enumerate() {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                break;
            }
            info!(target: "ingest", identity, "collecting posts");
            stats
                .identities
                .push(self.ingest_identity(session, conn, identity, cancel).await);

            if cancel.is_cancelled() {
                stats.cancelled = true;
                break;
            }
            let is_last = i + 1 == identities.len();
            if !is_last && !self.throttle.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        stats.cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.throttle) => {}
                }
            }
        }
        stats
    }

    async fn ingest_identity(
        &self,
        session: &mut dyn FetchSession,
        conn: &mut dyn StoreConnection,
        identity: &str,
        cancel: &CancellationToken,
    ) -> IdentityStats {
        let mut st = IdentityStats::new(identity);

        let elements = match session.fetch_posts(identity).await {
            Ok(v) => v,
            Err(e) => {
                warn!(target: "ingest", identity, error = %e, "fetch failed, skipping identity");
                counter!("archive_fetch_errors_total").increment(1);
                st.fetch_failed = true;
                return st;
            }
        };
        st.fetched = elements.len();

        for el in &elements {
            if cancel.is_cancelled() {
                break;
            }
            st.record(ingest_element(conn, identity, el));
        }
        st
    }
}

fn ingest_element(conn: &mut dyn StoreConnection, identity: &str, el: &PostElement) -> ItemOutcome {
    let raw = match extract::extract(identity, el) {
        Ok(r) => r,
        Err(e) => {
            warn!(target: "ingest", identity, error = %e, "skipping post element");
            counter!("archive_extract_errors_total").increment(1);
            return ItemOutcome::ExtractFailed;
        }
    };

    let published_at = timestamp::normalize(&raw.raw_timestamp, Utc::now());
    if published_at.is_none() {
        counter!("archive_unparsed_timestamps_total").increment(1);
    }
    let post = NormalizedPost::from_raw(raw, published_at);

    match conn.persist(&post) {
        Ok(PersistOutcome::Created(stored)) => {
            info!(
                target: "ingest",
                identity,
                id = stored.id,
                text = %preview(&stored.text),
                raw_ts = %stored.raw_timestamp,
                published_at = ?stored.published_at,
                "saved post"
            );
            counter!("archive_posts_created_total").increment(1);
            ItemOutcome::Created
        }
        Ok(PersistOutcome::Duplicate) => {
            debug!(target: "ingest", identity, "post already archived, skipping");
            counter!("archive_posts_duplicate_total").increment(1);
            ItemOutcome::Duplicate
        }
        Err(e) => {
            warn!(target: "ingest", identity, error = %e, "could not store post");
            counter!("archive_persist_errors_total").increment(1);
            ItemOutcome::PersistFailed
        }
    }
}

/// First 50 chars, for log lines.
fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(50).collect();
    if text.chars().count() > 50 {
        out.push_str("...");
    }
    out
}
