// tests/api_http.rs
//
// HTTP-level tests for the read API without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use post_archiver::error::PersistError;
use post_archiver::ingest::types::NormalizedPost;
use post_archiver::store::{MemoryStore, Store, StoreConnection};
use post_archiver::web::{self, AppState};

const BODY_LIMIT: usize = 1024 * 1024;

fn seeded_router() -> (Router, MemoryStore) {
    let store = MemoryStore::new();
    let mut conn = store.connect().unwrap();
    let rows = [
        ("rustlang", "Rust 1.80 https://blog.rust-lang.org/x", Some(3)),
        ("tokio_rs", "Tokio release", Some(5)),
        ("alice", "rust is fun", None),
    ];
    for (identity, text, day) in rows {
        conn.persist(&NormalizedPost {
            source_id: None,
            identity: identity.into(),
            text: text.into(),
            raw_timestamp: "raw".into(),
            published_at: day.map(|d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()),
        })
        .unwrap();
    }
    conn.close().unwrap();
    let app = web::router(AppState {
        store: Arc::new(store.clone()),
    });
    (app, store)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, json)
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _) = seeded_router();
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn posts_default_to_publication_order_with_links() {
    let (app, store) = seeded_router();
    let (status, json) = get_json(app, "/api/posts").await;
    assert_eq!(status, StatusCode::OK);

    let items = json.as_array().expect("array");
    let identities: Vec<&str> = items
        .iter()
        .map(|i| i["identity"].as_str().unwrap())
        .collect();
    assert_eq!(identities, vec!["tokio_rs", "rustlang", "alice"]);

    let html = items[1]["html"].as_str().unwrap();
    assert!(html.contains(r#"<a href="https://blog.rust-lang.org/x""#));
    assert!(items[2]["published_at"].is_null());

    // each request closed its connection
    assert_eq!(store.open_connections(), 0);
}

#[tokio::test]
async fn search_filters_case_insensitively() {
    let (app, _) = seeded_router();
    let (status, json) = get_json(app, "/api/posts?search=RUST&sort=ingested").await;
    assert_eq!(status, StatusCode::OK);
    let texts: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["text"].as_str().unwrap())
        .collect();
    // newest ingestion first; matches on text ("rust is fun") and identity ("rustlang")
    assert_eq!(texts, vec!["rust is fun", "Rust 1.80 https://blog.rust-lang.org/x"]);
}

struct DownStore;

impl Store for DownStore {
    fn connect(&self) -> Result<Box<dyn StoreConnection>, PersistError> {
        Err(PersistError::Unavailable("offline".into()))
    }
}

#[tokio::test]
async fn store_failure_is_503() {
    let app = web::router(AppState {
        store: Arc::new(DownStore),
    });
    let (status, _) = get_json(app, "/api/posts").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
