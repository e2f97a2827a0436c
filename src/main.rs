//! post-archiver — binary entrypoint.
//! `scrape` runs one ingest pass over a list of handles; `serve` exposes the read API.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use post_archiver::config::archive::ArchiveConfig;
use post_archiver::ingest::config::parse_identities;
use post_archiver::ingest::IngestPipeline;
use post_archiver::metrics::Metrics;
use post_archiver::store::SqliteStore;
use post_archiver::web::{self, AppState};

#[derive(Parser, Debug)]
#[command(name = "post-archiver", about = "Archive posts from public handles into SQLite")]
struct Cli {
    /// SQLite database file (overrides config and ARCHIVE_DB_PATH)
    #[arg(long, global = true, env = "ARCHIVE_DB_PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect posts for the given handles once
    Scrape {
        /// Comma-separated list of handles, processed in order
        #[arg(long)]
        handles: String,
        /// Read timelines from a JSON snapshot file
        #[arg(long, conflicts_with = "fetch_url")]
        fixture: Option<PathBuf>,
        /// Snapshot service root, queried as {url}/{handle}
        #[arg(long)]
        fetch_url: Option<String>,
        /// Pause between handles in milliseconds
        #[arg(long)]
        throttle_ms: Option<u64>,
        /// Write the run's Prometheus metrics to this file when done
        #[arg(long, env = "ARCHIVE_METRICS_FILE")]
        metrics_file: Option<PathBuf>,
    },
    /// Serve the archive as JSON over HTTP
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("post_archiver=info,ingest=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let mut cfg = ArchiveConfig::load_default()?;
    if let Some(db) = cli.db {
        cfg.db_path = db;
    }

    match cli.command {
        Command::Scrape {
            handles,
            fixture,
            fetch_url,
            throttle_ms,
            metrics_file,
        } => {
            if let Some(p) = fixture {
                cfg.fetch.fixture_path = Some(p);
                cfg.fetch.base_url = None;
            }
            if let Some(u) = fetch_url {
                cfg.fetch.base_url = Some(u);
                cfg.fetch.fixture_path = None;
            }
            if let Some(ms) = throttle_ms {
                cfg.throttle_ms = ms;
            }
            scrape(&cfg, &handles, metrics_file.as_deref()).await
        }
        Command::Serve { bind } => {
            if let Some(b) = bind {
                cfg.bind = b;
            }
            serve(&cfg).await
        }
    }
}

async fn scrape(cfg: &ArchiveConfig, handles: &str, metrics_file: Option<&Path>) -> Result<()> {
    let identities = parse_identities(handles);
    if identities.is_empty() {
        bail!("no handles given: pass --handles a,b,c");
    }

    let metrics = Metrics::init()?;

    let fetcher = cfg.fetch.build()?;
    let store = Arc::new(SqliteStore::open(&cfg.db_path)?);
    let pipeline = IngestPipeline::new(fetcher, store).with_throttle(cfg.throttle());

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current post");
            ctrl_c.cancel();
        }
    });

    let stats = pipeline.run(&identities, &cancel).await?;
    for s in &stats.identities {
        info!(
            identity = %s.identity,
            fetched = s.fetched,
            created = s.created,
            duplicates = s.duplicates,
            extract_errors = s.extract_errors,
            persist_errors = s.persist_errors,
            fetch_failed = s.fetch_failed,
            "identity done"
        );
    }

    match metrics_file {
        Some(path) => {
            metrics.write_snapshot(path)?;
            info!(path = %path.display(), "metrics written");
        }
        None => debug!(metrics = %metrics.render(), "run metrics"),
    }
    Ok(())
}

async fn serve(cfg: &ArchiveConfig) -> Result<()> {
    let metrics = Metrics::init()?;
    let store = Arc::new(SqliteStore::open(&cfg.db_path)?);
    let app = web::router(AppState { store }).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.bind)
        .await
        .with_context(|| format!("binding {}", cfg.bind))?;
    info!("read API listening on {}", cfg.bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("serving read API")
}
