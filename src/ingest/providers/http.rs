// src/ingest/providers/http.rs
use std::time::Duration;

use async_trait::async_trait;
use metrics::histogram;
use reqwest::{Client, Url};

use crate::error::{FetchError, FetchInitError};
use crate::ingest::types::{FetchSession, Fetcher, PostElement};

/// Pulls rendered timelines from a snapshot service: `GET {base_url}/{identity}`
/// answers with a JSON array of post elements.
pub struct HttpFetcher {
    base_url: String,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn open(&self) -> Result<Box<dyn FetchSession>, FetchInitError> {
        let base = Url::parse(&self.base_url).map_err(|e| FetchInitError::Endpoint {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(FetchInitError::Endpoint {
                url: self.base_url.clone(),
                reason: "not a base url".into(),
            });
        }
        let client = Client::builder().timeout(self.timeout).build()?;
        Ok(Box::new(HttpSession {
            base,
            client: Some(client),
        }))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

struct HttpSession {
    base: Url,
    client: Option<Client>,
}

#[async_trait]
impl FetchSession for HttpSession {
    async fn fetch_posts(&mut self, identity: &str) -> Result<Vec<PostElement>, FetchError> {
        let Some(client) = self.client.as_ref() else {
            return Err(FetchError::NothingVisible(identity.to_string()));
        };
        let url = identity_url(&self.base, identity)?;

        let t0 = std::time::Instant::now();
        let request_err = |source| FetchError::Request {
            identity: identity.to_string(),
            source,
        };
        let resp = client.get(url).send().await.map_err(request_err)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                identity: identity.to_string(),
                status: status.as_u16(),
            });
        }
        let posts: Vec<PostElement> = resp.json().await.map_err(request_err)?;
        histogram!("archive_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        if posts.is_empty() {
            return Err(FetchError::NothingVisible(identity.to_string()));
        }
        Ok(posts)
    }

    async fn close(&mut self) {
        self.client = None;
    }
}

/// `{base}/{identity}` with the identity as exactly one percent-encoded segment.
fn identity_url(base: &Url, identity: &str) -> Result<Url, FetchError> {
    // path_segments_mut drops "." and ".." silently
    if matches!(identity.trim(), "" | "." | "..") {
        return Err(FetchError::InvalidIdentity(identity.to_string()));
    }
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| FetchError::InvalidIdentity(identity.to_string()))?
        .pop_if_empty()
        .push(identity);
    Ok(url)
}
