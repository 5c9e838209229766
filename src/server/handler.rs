// Axum request handling: bootstrap document and asset streaming for the active bundle.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use super::bootstrap::{inject_runtime_config, merge_runtime_config};
use super::stats::ServerStats;
use crate::bundle::{AssetBundle, ResolvedAsset};

/// What the listener serves: one bundle mounted under one URL prefix.
#[derive(Debug)]
pub struct ActiveSite {
    pub bundle: Arc<AssetBundle>,
    /// Normalized prefix: empty, or `/segment[/segment...]` without a trailing slash.
    pub url_prefix: String,
}

/// State shared between the listener task and the transition logic.
pub struct ServingState {
    active: RwLock<Option<Arc<ActiveSite>>>,
    host_config: Map<String, Value>,
    pub stats: ServerStats,
}

impl ServingState {
    pub fn new(host_config: Map<String, Value>) -> Self {
        Self {
            active: RwLock::new(None),
            host_config,
            stats: ServerStats::new(),
        }
    }

    /// Take a reference to the active site. The lock is held only for the clone.
    pub fn snapshot(&self) -> Option<Arc<ActiveSite>> {
        self.active.read().clone()
    }

    /// Replace the active site, returning the previous one.
    pub fn swap(&self, site: Arc<ActiveSite>) -> Option<Arc<ActiveSite>> {
        self.active.write().replace(site)
    }
}

pub fn router(state: Arc<ServingState>) -> Router {
    Router::new()
        .fallback(serve_request)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Normalize a mount prefix to `""` or `/a/b`.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// Strip the mount prefix. `None` means the path lies outside the mount.
fn strip_mount<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

async fn serve_request(State(state): State<Arc<ServingState>>, request: Request) -> Response {
    state.stats.record_request();

    let method = request.method().clone();
    if method != Method::GET && method != Method::HEAD {
        return (StatusCode::METHOD_NOT_ALLOWED, "method not allowed").into_response();
    }
    let head_only = method == Method::HEAD;

    // Everything below is served from this one snapshot.
    let site = match state.snapshot() {
        Some(site) => site,
        None => return (StatusCode::SERVICE_UNAVAILABLE, "no active bundle").into_response(),
    };

    let path = match urlencoding::decode(request.uri().path()) {
        Ok(path) => path.into_owned(),
        Err(_) => return (StatusCode::BAD_REQUEST, "bad path encoding").into_response(),
    };

    let rel = match strip_mount(&path, &site.url_prefix) {
        Some(rel) => rel,
        None => return not_found(&state, &path),
    };

    let entry_url = format!("/{}", site.bundle.entry_file());
    if rel.is_empty() || rel == "/" || rel == entry_url {
        return serve_bootstrap(&state, &site, head_only).await;
    }

    match site.bundle.resolve(rel) {
        Some(asset) => serve_asset(&state, asset, request, head_only).await,
        None => not_found(&state, &path),
    }
}

fn not_found(state: &ServingState, path: &str) -> Response {
    debug!("no asset for {}", path);
    state.stats.record_not_found();
    (StatusCode::NOT_FOUND, "not found").into_response()
}

async fn serve_bootstrap(state: &ServingState, site: &ActiveSite, head_only: bool) -> Response {
    let entry = match site.bundle.resolve_entry() {
        Some(entry) => entry,
        None => return not_found(state, site.bundle.entry_file()),
    };

    let document = match tokio::fs::read_to_string(&entry.absolute_path).await {
        Ok(document) => document,
        Err(e) => {
            error!(
                "failed to read entry document {}: {}",
                entry.absolute_path.display(),
                e
            );
            return (StatusCode::INTERNAL_SERVER_ERROR, "entry document unreadable")
                .into_response();
        }
    };

    let config = merge_runtime_config(site.bundle.runtime_config(), &state.host_config);
    let body = inject_runtime_config(&document, &config);

    let mut resp_headers = HeaderMap::new();
    resp_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    resp_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    resp_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));

    if head_only {
        return (StatusCode::OK, resp_headers).into_response();
    }
    state.stats.record_served(body.len() as u64);
    (StatusCode::OK, resp_headers, body).into_response()
}

/// Hand the request to `ServeFile`, which owns content type, conditional GET,
/// ranges and HEAD for files on disk.
async fn serve_asset(
    state: &ServingState,
    asset: ResolvedAsset,
    request: Request,
    head_only: bool,
) -> Response {
    let mut response = match ServeFile::new(&asset.absolute_path).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    };
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    match response.status() {
        StatusCode::NOT_FOUND => {
            warn!(
                "asset {} listed by version {} is gone from disk",
                asset.absolute_path.display(),
                asset.version
            );
            state.stats.record_not_found();
        }
        StatusCode::OK | StatusCode::PARTIAL_CONTENT => {
            let len = response
                .headers()
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);
            debug!(
                "serving {} from version {} ({} bytes)",
                asset.absolute_path.display(),
                asset.version,
                len
            );
            if !head_only {
                state.stats.record_served(len);
            }
        }
        status if status.is_server_error() => {
            error!("failed to serve {}: {}", asset.absolute_path.display(), status);
        }
        _ => {}
    }
    response
}
