// src/ingest/providers/fixture.rs
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{FetchError, FetchInitError};
use crate::ingest::types::{FetchSession, Fetcher, PostElement};

/// Snapshot shape: `{ "<identity>": [PostElement, ...], ... }`.
pub type Snapshot = HashMap<String, Vec<PostElement>>;

/// Serves posts from a JSON snapshot on disk (or an in-memory one for tests).
pub struct FixtureFetcher {
    mode: Mode,
}

enum Mode {
    File(PathBuf),
    Inline(Snapshot),
}

impl FixtureFetcher {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            mode: Mode::File(path.as_ref().to_path_buf()),
        }
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            mode: Mode::Inline(snapshot),
        }
    }
}

#[async_trait]
impl Fetcher for FixtureFetcher {
    async fn open(&self) -> Result<Box<dyn FetchSession>, FetchInitError> {
        let posts = match &self.mode {
            Mode::Inline(s) => s.clone(),
            Mode::File(path) => {
                let body =
                    tokio::fs::read_to_string(path)
                        .await
                        .map_err(|source| FetchInitError::Snapshot {
                            path: path.display().to_string(),
                            source,
                        })?;
                serde_json::from_str(&body)?
            }
        };
        Ok(Box::new(FixtureSession { posts }))
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}

struct FixtureSession {
    posts: Snapshot,
}

#[async_trait]
impl FetchSession for FixtureSession {
    async fn fetch_posts(&mut self, identity: &str) -> Result<Vec<PostElement>, FetchError> {
        match self.posts.get(identity) {
            Some(posts) if !posts.is_empty() => Ok(posts.clone()),
            _ => Err(FetchError::NothingVisible(identity.to_string())),
        }
    }

    async fn close(&mut self) {
        self.posts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_identity_is_a_fetch_error() {
        let mut snap = Snapshot::new();
        snap.insert("alice".into(), vec![PostElement::default()]);
        let mut session = FixtureFetcher::from_snapshot(snap).open().await.unwrap();

        assert_eq!(session.fetch_posts("alice").await.unwrap().len(), 1);
        assert!(matches!(
            session.fetch_posts("bob").await,
            Err(FetchError::NothingVisible(id)) if id == "bob"
        ));
        session.close().await;
    }

    #[tokio::test]
    async fn missing_file_fails_to_open() {
        let f = FixtureFetcher::from_path("/definitely/not/here.json");
        assert!(matches!(
            f.open().await,
            Err(FetchInitError::Snapshot { .. })
        ));
    }
}
