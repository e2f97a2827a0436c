//! Error types for the archive: fetching, extraction, persistence and the run itself.
//!
//! Only [`IngestError`] ends a pipeline run. Everything else is recovered at the
//! item or identity level and reported through logs and metrics.

use thiserror::Error;

/// A fetching session could not be established. Fatal to the run.
#[derive(Error, Debug)]
pub enum FetchInitError {
    /// Base URL of the snapshot service did not parse.
    #[error("invalid fetch endpoint {url}: {reason}")]
    Endpoint { url: String, reason: String },

    /// HTTP client could not be built.
    #[error("http client: {0}")]
    Client(#[from] reqwest::Error),

    /// Snapshot file could not be read.
    #[error("reading snapshot {path}: {source}")]
    Snapshot {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot file is not the expected JSON shape.
    #[error("snapshot format: {0}")]
    SnapshotFormat(#[from] serde_json::Error),
}

/// Posts for one identity could not be retrieved. The identity is skipped.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("no posts became visible for @{0}")]
    NothingVisible(String),

    #[error("{0:?} is not a usable identity")]
    InvalidIdentity(String),

    #[error("request for @{identity} failed: {source}")]
    Request {
        identity: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("snapshot service answered {status} for @{identity}")]
    Status { identity: String, status: u16 },
}

/// A single post element was missing a field we need. The item is dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("post element has no {0}")]
    MissingField(&'static str),
}

/// Storage failure other than a uniqueness conflict.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors that abort a whole pipeline run.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("cannot open fetch session: {0}")]
    FetchInit(#[from] FetchInitError),

    #[error("cannot open store connection: {0}")]
    StoreOpen(#[source] PersistError),
}
