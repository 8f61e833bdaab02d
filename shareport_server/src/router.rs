//! Request dispatch: prefix handling, share/custom-handler routing, and the
//! method → operation mapping.
//!
//! The whole share surface is served from a single Axum fallback handler
//! because shares and custom handlers can be registered and removed while
//! the server runs; a fixed route table cannot express that. Dispatch order
//! for the first path segment is custom handlers, then the share registry,
//! then 404.
//!
//! Wire mapping:
//! - `GET`/`HEAD` — directory listing (trailing slash) or file download
//! - `PUT` — raw-body upload to the exact path
//! - `POST` multipart — multi-file upload into a directory
//! - `POST` JSON — `{"op": "mkdir" | "move" | "copy", ...}` commands
//! - `DELETE` — remove a file or directory

use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use axum::body::{Body, BodyDataStream};
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, State};
use axum::http::{header, Method, Request};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::Stream;
use percent_encoding::percent_decode_str;

use shareport_core::registry::ShareEntry;
use shareport_core::resolve::resolve;

use crate::error::AppError;
use crate::handlers;
use crate::listener::TlsListener;
use crate::shutdown::ConnectionHandle;
use crate::state::AppState;
use crate::types::FileOpRequest;

/// An externally supplied handler that owns a URL prefix.
///
/// The router passes the raw request through and returns the response
/// unmodified; no path validation or share semantics apply.
#[async_trait]
pub trait CustomHandler: Send + Sync {
    async fn handle(&self, request: Request<Body>) -> Response;
}

/// Build the application router: the dispatch fallback plus the panic
/// boundary, tracking middleware, and body limit. TLS termination and
/// tracing layers are added per listener / in `main`.
pub fn app(state: Arc<AppState>) -> Router {
    let body_limit = state.config.server.max_upload_bytes;
    Router::new()
        .fallback(dispatch)
        // A panicking handler becomes a generic 500, never a dead task.
        .layer(tower_http::catch_panic::CatchPanicLayer::new())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            track_requests,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Middleware: count the request and register it with the shutdown
/// coordinator. The [`ConnectionHandle`] moves into the response body
/// stream so drain accounting covers long downloads, not just handler
/// execution.
pub async fn track_requests(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    state.total_requests.fetch_add(1, Ordering::Relaxed);
    let handle = state.shutdown.track();

    let response = next.run(request).await;

    let (parts, body) = response.into_parts();
    let tracked = TrackedStream {
        inner: body.into_data_stream(),
        _handle: handle,
    };
    Response::from_parts(parts, Body::from_stream(tracked))
}

/// Response body stream that keeps its drain-accounting handle alive until
/// the last byte is written or the client goes away.
struct TrackedStream {
    inner: BodyDataStream,
    _handle: ConnectionHandle,
}

impl Stream for TrackedStream {
    type Item = Result<Bytes, axum::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// The fallback handler: everything not claimed by a fixed route.
pub async fn dispatch(State(state): State<Arc<AppState>>, request: Request<Body>) -> Response {
    match route(state, request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn route(state: Arc<AppState>, request: Request<Body>) -> Result<Response, AppError> {
    let method = request.method().clone();
    let raw_path = request.uri().path().to_string();

    // Plain-HTTP requests get sent to the TLS listener when configured.
    if let Some(redir) = &state.config.server.https_redirect {
        let is_tls = request
            .extensions()
            .get::<TlsListener>()
            .is_some_and(|t| t.0);
        if !is_tls {
            let location = format!("https://{}:{}{}", redir.host, redir.port, raw_path);
            return Ok(Redirect::permanent(&location).into_response());
        }
    }

    // Duplicate slashes get a redirect to the canonical form.
    let collapsed = collapse_slashes(&raw_path);
    if collapsed != raw_path {
        return Ok(Redirect::permanent(&collapsed).into_response());
    }

    let prefix = state.config.server.prefix.clone();
    let Some(rest) = strip_app_prefix(&raw_path, &prefix) else {
        return Ok(Redirect::permanent(&prefix).into_response());
    };

    // The index page at the prefix itself.
    if rest.is_empty() {
        if method != Method::GET && method != Method::HEAD {
            return Err(AppError::method_not_allowed("Index supports GET only"));
        }
        return Ok(handlers::index(&state, handlers::wants_html(request.headers())));
    }

    let (first_raw, remainder) = match rest.split_once('/') {
        Some((first, rem)) => (first, Some(rem)),
        None => (rest, None),
    };
    let first = decode_segment(first_raw)?;

    // Custom handlers win over shares and own the request wholesale.
    if let Some(handler) = state.custom_handler(&first) {
        return Ok(handler.handle(request).await);
    }

    let share = state.registry.lookup(&first)?;

    // A share rooted at a single file: download only, nothing underneath.
    if share.is_file_share() {
        if remainder.is_some_and(|r| !r.is_empty()) {
            return Err(AppError::not_found("Not found"));
        }
        if method != Method::GET && method != Method::HEAD {
            return Err(AppError::method_not_allowed(
                "A file share supports GET only",
            ));
        }
        return handlers::download(&state, &share.root, request.headers()).await;
    }

    let segments: Vec<String> = match remainder {
        None => Vec::new(),
        Some(rem) => rem
            .split('/')
            .map(decode_segment)
            .collect::<Result<_, _>>()?,
    };
    let wants_dir = match remainder {
        None => false,
        Some(rem) => rem.is_empty() || rem.ends_with('/'),
    };

    let resolved = resolve(&share.root, &segments)?;

    match method.as_str() {
        "GET" | "HEAD" => {
            handlers::get_entry(&state, &share, &resolved, &raw_path, wants_dir, request.headers())
                .await
        }
        "PUT" => {
            ensure_writable(&share)?;
            if wants_dir {
                return Err(AppError::bad_request("PUT target must be a file path"));
            }
            handlers::upload_raw(&state, &resolved, request).await
        }
        "DELETE" => {
            ensure_writable(&share)?;
            if resolved == share.root {
                return Err(AppError::bad_request("Cannot delete the share root"));
            }
            handlers::delete(&state, &resolved).await
        }
        "POST" => {
            let content_type = request
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            if content_type.starts_with("multipart/form-data") {
                ensure_writable(&share)?;
                let multipart = Multipart::from_request(request, &())
                    .await
                    .map_err(|e| AppError::bad_request(format!("Invalid multipart body: {}", e)))?;
                handlers::upload_multipart(&state, &resolved, multipart).await
            } else {
                let Json(op): Json<FileOpRequest> = Json::from_request(request, &())
                    .await
                    .map_err(|e| AppError::bad_request(format!("Invalid operation body: {}", e)))?;
                handlers::file_op(&state, &share, &resolved, op).await
            }
        }
        other => Err(AppError::method_not_allowed(format!(
            "Method {} not supported",
            other
        ))),
    }
}

/// Reject mutating operations on readonly shares before touching the
/// filesystem.
pub fn ensure_writable(share: &ShareEntry) -> Result<(), AppError> {
    if share.readonly {
        return Err(AppError::read_only(&share.name));
    }
    Ok(())
}

/// Parse a move/copy destination: a server-absolute routing path such as
/// `/share2/dir/` (into the directory, keeping the source name) or
/// `/share2/dir/newname`. The configured prefix may be included or left
/// out. Destinations are resolved with the same rules as request paths, so
/// a traversal attempt on the destination side fails exactly like one on
/// the source side.
pub fn parse_dest(
    state: &AppState,
    dest: &str,
) -> Result<(ShareEntry, Vec<String>, bool), AppError> {
    let prefix = &state.config.server.prefix;
    let rest = dest
        .strip_prefix(prefix.as_str())
        .or_else(|| dest.strip_prefix('/'))
        .ok_or_else(|| AppError::bad_request("dest must be an absolute path"))?;

    let (first, remainder) = match rest.split_once('/') {
        Some((first, rem)) => (first, Some(rem)),
        None => (rest, None),
    };
    if first.is_empty() {
        return Err(AppError::bad_request("dest must name a share"));
    }
    if state.custom_handler(first).is_some() {
        return Err(AppError::bad_request("dest is not a share"));
    }
    let share = state.registry.lookup(first)?;
    if share.is_file_share() {
        return Err(AppError::bad_request("dest share is a single file"));
    }

    let segments: Vec<String> = remainder
        .map(|rem| rem.split('/').map(str::to_string).collect())
        .unwrap_or_default();
    let wants_dir = match remainder {
        None => true,
        Some(rem) => rem.is_empty() || rem.ends_with('/'),
    };
    Ok((share, segments, wants_dir))
}

fn decode_segment(raw: &str) -> Result<String, AppError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| AppError::bad_request("Path is not valid UTF-8"))
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !prev_slash {
                out.push(c);
            }
            prev_slash = true;
        } else {
            out.push(c);
            prev_slash = false;
        }
    }
    out
}

fn strip_app_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix == "/" {
        return path.strip_prefix('/');
    }
    path.strip_prefix(prefix)
}
