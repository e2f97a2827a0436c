// src/config/archive.rs
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use std::{env, fs};

use crate::ingest::providers::{fixture::FixtureFetcher, http::HttpFetcher};
use crate::ingest::types::Fetcher;

pub const ENV_CONFIG_PATH: &str = "ARCHIVE_CONFIG_PATH";
pub const ENV_DB_PATH: &str = "ARCHIVE_DB_PATH";
pub const ENV_THROTTLE_MS: &str = "ARCHIVE_THROTTLE_MS";

fn default_db_path() -> PathBuf {
    PathBuf::from("archive.db")
}
fn default_throttle_ms() -> u64 {
    2_000
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Pause between identities, in milliseconds.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Listen address of the read API.
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// JSON snapshot file; wins over `base_url` when both are set.
    #[serde(default)]
    pub fixture_path: Option<PathBuf>,
    /// Snapshot service root, queried as `{base_url}/{identity}`.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            fixture_path: None,
            base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            throttle_ms: default_throttle_ms(),
            fetch: FetchConfig::default(),
            bind: default_bind(),
        }
    }
}

impl ArchiveConfig {
    /// Parse a TOML or JSON config file (by extension, JSON otherwise).
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let is_toml = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        let cfg = if is_toml {
            toml::from_str(&data).with_context(|| format!("parsing {}", path.display()))?
        } else {
            serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))?
        };
        Ok(cfg)
    }

    /// Resolve config using env var + fallbacks, then apply env overrides:
    /// 1) $ARCHIVE_CONFIG_PATH
    /// 2) config/archive.toml
    /// 3) config/archive.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(&p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path {p}");
            }
            Self::load_from_file(&pb)?
        } else if Path::new("config/archive.toml").exists() {
            Self::load_from_file("config/archive.toml")?
        } else if Path::new("config/archive.json").exists() {
            Self::load_from_file("config/archive.json")?
        } else {
            Self::default()
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// `ARCHIVE_DB_PATH` and `ARCHIVE_THROTTLE_MS`; unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(p) = env::var(ENV_DB_PATH) {
            if !p.trim().is_empty() {
                self.db_path = PathBuf::from(p.trim());
            }
        }
        if let Some(ms) = env::var(ENV_THROTTLE_MS)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            self.throttle_ms = ms;
        }
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

impl FetchConfig {
    pub fn build(&self) -> Result<Arc<dyn Fetcher>> {
        if let Some(path) = &self.fixture_path {
            return Ok(Arc::new(FixtureFetcher::from_path(path)));
        }
        if let Some(url) = &self.base_url {
            return Ok(Arc::new(
                HttpFetcher::new(url.clone()).with_timeout(self.timeout_secs),
            ));
        }
        bail!("no fetcher configured: set fetch.fixture_path or fetch.base_url")
    }
}
