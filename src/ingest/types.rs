// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, FetchInitError};

/// Handle of a public account whose posts we collect (e.g. "rustlang").
pub type Identity = String;

/// A post as the fetching session exposes it, before any field is trusted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostElement {
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// Time label exactly as displayed ("2h", "Mar 21", ...).
    #[serde(default)]
    pub time: Option<String>,
    /// Link target of an attached content card, if any.
    #[serde(default)]
    pub card_link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawPost {
    /// Source-assigned id; may be missing or repeated, never a dedupe key.
    pub source_id: Option<String>,
    pub identity: Identity,
    /// Post text, with the card link appended as a trailing line when present.
    pub text: String,
    pub raw_timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedPost {
    pub source_id: Option<String>,
    pub identity: Identity,
    pub text: String,
    pub raw_timestamp: String,
    pub published_at: Option<DateTime<Utc>>,
}

impl NormalizedPost {
    pub fn from_raw(raw: RawPost, published_at: Option<DateTime<Utc>>) -> Self {
        Self {
            source_id: raw.source_id,
            identity: raw.identity,
            text: raw.text,
            raw_timestamp: raw.raw_timestamp,
            published_at,
        }
    }
}

/// Something that can open a fetching session (browser, snapshot service, fixture file).
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn open(&self) -> Result<Box<dyn FetchSession>, FetchInitError>;
    fn name(&self) -> &'static str;
}

/// One open session. Returns whatever a single load exposes; no pagination.
#[async_trait::async_trait]
pub trait FetchSession: Send {
    async fn fetch_posts(&mut self, identity: &str) -> Result<Vec<PostElement>, FetchError>;

    /// Release the session. Called exactly once per run.
    async fn close(&mut self);
}
