// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod store;
pub mod timestamp;
pub mod web;

// ---- Re-exports for stable public API ----
pub use crate::error::{ExtractionError, FetchError, FetchInitError, IngestError, PersistError};
pub use crate::ingest::{IngestPipeline, RunStats};
pub use crate::store::{ListQuery, PersistOutcome, SortKey, Store, StoredPost};
pub use crate::web::router;
