//! Read-only JSON API over the archive.
//!
//! Every request opens its own store connection and closes it before answering.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::store::{ListQuery, SortKey, Store, StoreConnection, StoredPost};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/posts", get(list_posts))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct PostsParams {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: Option<SortKey>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: StoredPost,
    /// Text with URLs rendered as anchors, HTML-escaped otherwise.
    pub html: String,
}

async fn list_posts(
    State(state): State<AppState>,
    Query(params): Query<PostsParams>,
) -> Response {
    let query = ListQuery {
        sort: params.sort.unwrap_or_default(),
        search: params.search,
        limit: params.limit,
    };

    let result = state.store.connect().and_then(|conn| {
        let rows = conn.list(&query);
        conn.close()?;
        rows
    });

    match result {
        Ok(rows) => {
            let views: Vec<PostView> = rows
                .into_iter()
                .map(|post| PostView {
                    html: linkify(&post.text),
                    post,
                })
                .collect();
            Json(views).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "listing posts failed");
            (StatusCode::SERVICE_UNAVAILABLE, "store unavailable").into_response()
        }
    }
}

fn url_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    // scheme, host labels without dots/slashes, optional path up to whitespace, a quote,
    // an angle bracket or an ellipsis
    RE.get_or_init(|| {
        Regex::new("https?://[^\\s./\"<>]+(?:\\.[^\\s./\"<>]+)*(?:/[^\\s\"<>\u{2026}]*)?")
            .expect("url regex")
    })
}

/// Escape `text` for HTML and wrap every http(s) URL in an anchor.
///
/// Matching runs on the raw text; each piece is then escaped for where it lands
/// (attribute value or element content).
pub fn linkify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in url_re().find_iter(text) {
        out.push_str(&html_escape::encode_text(&text[last..m.start()]));
        let url = m.as_str();
        out.push_str(&format!(
            r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
            html_escape::encode_double_quoted_attribute(url),
            html_escape::encode_text(url),
        ));
        last = m.end();
    }
    out.push_str(&html_escape::encode_text(&text[last..]));
    out
}
