//! Operation handlers for the share API.
//!
//! The router has already validated the share and resolved the filesystem
//! path when these run; handlers enforce the remaining preconditions (entry
//! kind, readonly, conflicts), hold the per-path locks around mutations,
//! and translate [`shareport_core`] errors into responses.

use std::path::Path;
use std::sync::atomic::Ordering;

use axum::body::Body;
use axum::extract::Multipart;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Json;
use futures_util::StreamExt;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use shareport_core::registry::ShareEntry;
use shareport_core::resolve::{resolve, validate_segment};
use shareport_core::{ops, UploadSink};

use crate::error::{ApiError, AppError};
use crate::render;
use crate::state::AppState;
use crate::types::*;

/// Detect Content-Type from file extension.
fn content_type_for_ext(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "txt" | "log" | "toml" | "ini" | "cfg" => "text/plain; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "zip" => "application/zip",
        "tar" => "application/x-tar",
        "gz" => "application/gzip",
        _ => "application/octet-stream",
    }
}

/// Map raw filesystem errors that reach a handler directly.
fn fs_error(err: std::io::Error) -> AppError {
    if matches!(
        err.kind(),
        std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
    ) {
        AppError::not_found("Not found")
    } else {
        AppError::internal(format!("I/O error: {}", err))
    }
}

/// Share-relative display path of a resolved entry ("" for the root).
fn rel_display(share: &ShareEntry, path: &Path) -> String {
    path.strip_prefix(&share.root)
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default()
}

/// Routing path of a resolved entry, for operation responses.
fn routing_path(share: &ShareEntry, path: &Path) -> String {
    let rel = rel_display(share, path);
    if rel.is_empty() {
        format!("/{}", share.name)
    } else {
        format!("/{}/{}", share.name, rel)
    }
}

// ---------------------------------------------------------------------------
// Index & Health
// ---------------------------------------------------------------------------

/// The index page: visible shares and custom handler prefixes in
/// registration order.
#[utoipa::path(
    get,
    path = "/",
    tag = "Index",
    responses(
        (status = 200, description = "Index of visible shares", body = IndexResponse)
    )
)]
pub fn index(state: &AppState, html: bool) -> Response {
    let mut entries: Vec<IndexEntry> = state
        .registry
        .list_visible()
        .into_iter()
        .map(|share| IndexEntry {
            kind: if share.is_file_share() {
                "file".to_string()
            } else {
                "dir".to_string()
            },
            readonly: share.readonly,
            name: share.name,
        })
        .collect();
    for prefix in state.visible_handler_prefixes() {
        entries.push(IndexEntry {
            name: prefix,
            kind: "app".to_string(),
            readonly: false,
        });
    }

    if html {
        Html(render::index_page(&entries)).into_response()
    } else {
        Json(IndexResponse { entries }).into_response()
    }
}

/// Health and metrics summary, served by the built-in `healthz` handler.
pub fn health(state: &AppState) -> HealthResponse {
    HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        shares: state.registry.len(),
        total_requests: state.total_requests.load(Ordering::Relaxed),
        total_uploads: state.total_uploads.load(Ordering::Relaxed),
        total_downloads: state.total_downloads.load(Ordering::Relaxed),
        lifecycle: state.shutdown.state().name().to_string(),
    }
}

// ---------------------------------------------------------------------------
// List & Download
// ---------------------------------------------------------------------------

/// GET on a share path: redirect to the canonical URL form, then list the
/// directory or download the file.
pub async fn get_entry(
    state: &AppState,
    share: &ShareEntry,
    resolved: &Path,
    raw_path: &str,
    wants_dir: bool,
    headers: &HeaderMap,
) -> Result<Response, AppError> {
    let meta = fs::metadata(resolved).await.map_err(fs_error)?;

    if meta.is_dir() {
        // Directory URLs end with '/', so relative links resolve.
        if !wants_dir {
            return Ok(Redirect::permanent(&format!("{}/", raw_path)).into_response());
        }
        list_directory(state, share, resolved, headers).await
    } else {
        if wants_dir {
            return Ok(Redirect::permanent(raw_path.trim_end_matches('/')).into_response());
        }
        download(state, resolved, headers).await
    }
}

/// List a directory within a share.
#[utoipa::path(
    get,
    path = "/{share}/{path}/",
    tag = "Files",
    params(
        ("share" = String, Path, description = "Share name"),
        ("path" = String, Path, description = "Directory path inside the share")
    ),
    responses(
        (status = 200, description = "Directory listing", body = ListResponse),
        (status = 404, description = "Unknown share or path", body = ApiError)
    )
)]
pub async fn list_directory(
    state: &AppState,
    share: &ShareEntry,
    resolved: &Path,
    headers: &HeaderMap,
) -> Result<Response, AppError> {
    let entries: Vec<EntryInfo> = if share.listable {
        ops::list_dir(resolved)
            .await?
            .into_iter()
            .map(EntryInfo::from)
            .collect()
    } else {
        Vec::new()
    };

    let rel = rel_display(share, resolved);
    if wants_html(headers) {
        let display = if rel.is_empty() {
            share.name.clone()
        } else {
            format!("{}/{}", share.name, rel)
        };
        Ok(Html(render::listing_page(
            &display,
            &entries,
            share.readonly,
            share.listable,
        ))
        .into_response())
    } else {
        Ok(Json(ListResponse {
            share: share.name.clone(),
            path: rel,
            readonly: share.readonly,
            listable: share.listable,
            entries,
        })
        .into_response())
    }
}

/// Whether the client prefers the HTML UI over JSON.
pub(crate) fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

/// Download a file, streamed, with single-range support.
#[utoipa::path(
    get,
    path = "/{share}/{path}",
    tag = "Files",
    params(
        ("share" = String, Path, description = "Share name"),
        ("path" = String, Path, description = "File path inside the share")
    ),
    responses(
        (status = 200, description = "File bytes"),
        (status = 206, description = "Requested byte range"),
        (status = 404, description = "Unknown share or path", body = ApiError)
    )
)]
pub async fn download(
    state: &AppState,
    path: &Path,
    headers: &HeaderMap,
) -> Result<Response, AppError> {
    let meta = fs::metadata(path).await.map_err(fs_error)?;
    if !meta.is_file() {
        return Err(AppError::not_found("Not found"));
    }
    let file_size = meta.len();

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let content_type = content_type_for_ext(ext);
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    // Single-range requests: "bytes=START-END" with END optional.
    if let Some(range_header) = headers.get(header::RANGE) {
        let range_str = range_header
            .to_str()
            .map_err(|_| AppError::bad_request("Invalid Range header"))?;
        if let Some(range) = range_str.strip_prefix("bytes=") {
            let parts: Vec<&str> = range.splitn(2, '-').collect();
            let start: u64 = parts[0]
                .parse()
                .map_err(|_| AppError::bad_request("Invalid range start"))?;
            let end: u64 = if parts.len() > 1 && !parts[1].is_empty() {
                parts[1]
                    .parse()
                    .map_err(|_| AppError::bad_request("Invalid range end"))?
            } else {
                file_size.saturating_sub(1)
            };

            if start >= file_size || end >= file_size || start > end {
                return Ok((
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    [(header::CONTENT_RANGE, format!("bytes */{}", file_size))],
                )
                    .into_response());
            }

            let length = end - start + 1;
            let mut file = fs::File::open(path).await.map_err(fs_error)?;
            file.seek(std::io::SeekFrom::Start(start))
                .await
                .map_err(|e| AppError::internal(format!("Failed to seek: {}", e)))?;
            let mut buf = vec![0u8; length as usize];
            file.read_exact(&mut buf)
                .await
                .map_err(|e| AppError::internal(format!("Failed to read range: {}", e)))?;

            return Ok((
                StatusCode::PARTIAL_CONTENT,
                [
                    (header::CONTENT_TYPE, content_type.to_string()),
                    (header::CONTENT_LENGTH, length.to_string()),
                    (
                        header::CONTENT_RANGE,
                        format!("bytes {}-{}/{}", start, end, file_size),
                    ),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                ],
                Body::from(buf),
            )
                .into_response());
        }
    }

    state.total_downloads.fetch_add(1, Ordering::Relaxed);

    let file = fs::File::open(path).await.map_err(fs_error)?;
    let stream = ReaderStream::new(file);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_LENGTH, file_size.to_string()),
            (header::ACCEPT_RANGES, "bytes".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", filename),
            ),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/// Raw-body upload to an exact file path. Creates or overwrites.
#[utoipa::path(
    put,
    path = "/{share}/{path}",
    tag = "Files",
    params(
        ("share" = String, Path, description = "Share name"),
        ("path" = String, Path, description = "Target file path inside the share")
    ),
    responses(
        (status = 201, description = "File stored", body = UploadResponse),
        (status = 403, description = "Share is readonly", body = ApiError),
        (status = 404, description = "Unknown share or parent directory", body = ApiError)
    )
)]
pub async fn upload_raw(
    state: &AppState,
    resolved: &Path,
    request: Request<Body>,
) -> Result<Response, AppError> {
    let _guard = state.locks.lock(resolved).await;

    let mut sink = UploadSink::create(resolved).await?;
    let mut stream = request.into_body().into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| AppError::bad_request(format!("Body read failed: {}", e)))?;
        sink.write_chunk(&chunk).await?;
    }
    let size = sink.finish().await?;

    state.total_uploads.fetch_add(1, Ordering::Relaxed);
    let name = resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            uploaded: vec![UploadedFile { name, size }],
        }),
    )
        .into_response())
}

/// Multipart upload of one or more files into a directory.
///
/// Fields must be named `file` and carry a plain filename; each file is
/// written through its own temp-file sink, so an interrupted transfer never
/// leaves a partial entry.
#[utoipa::path(
    post,
    path = "/{share}/{path}/",
    tag = "Files",
    params(
        ("share" = String, Path, description = "Share name"),
        ("path" = String, Path, description = "Target directory inside the share")
    ),
    responses(
        (status = 201, description = "Files stored", body = UploadResponse),
        (status = 400, description = "Malformed multipart body", body = ApiError),
        (status = 403, description = "Share is readonly", body = ApiError)
    )
)]
pub async fn upload_multipart(
    state: &AppState,
    resolved: &Path,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let meta = fs::metadata(resolved).await.map_err(fs_error)?;
    if !meta.is_dir() {
        return Err(AppError::bad_request(
            "Multipart uploads target a directory",
        ));
    }

    let mut uploaded = Vec::new();
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("Failed to read multipart field: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::bad_request("Multipart field has no filename"))?;
        validate_segment(&filename)?;

        let target = resolved.join(&filename);
        let _guard = state.locks.lock(&target).await;
        let mut sink = UploadSink::create(&target).await?;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| AppError::bad_request(format!("Failed to read file data: {}", e)))?
        {
            sink.write_chunk(&chunk).await?;
        }
        let size = sink.finish().await?;
        state.total_uploads.fetch_add(1, Ordering::Relaxed);
        uploaded.push(UploadedFile {
            name: filename,
            size,
        });
    }

    if uploaded.is_empty() {
        return Err(AppError::bad_request("No 'file' fields in upload"));
    }
    Ok((StatusCode::CREATED, Json(UploadResponse { uploaded })).into_response())
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

/// Remove a file or directory (recursively).
#[utoipa::path(
    delete,
    path = "/{share}/{path}",
    tag = "Files",
    params(
        ("share" = String, Path, description = "Share name"),
        ("path" = String, Path, description = "Path inside the share")
    ),
    responses(
        (status = 204, description = "Entry removed"),
        (status = 403, description = "Share is readonly", body = ApiError),
        (status = 404, description = "Unknown share or path", body = ApiError)
    )
)]
pub async fn delete(state: &AppState, resolved: &Path) -> Result<Response, AppError> {
    let _guard = state.locks.lock(resolved).await;
    ops::delete_entry(resolved).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ---------------------------------------------------------------------------
// Mkdir / Move / Copy
// ---------------------------------------------------------------------------

/// JSON file operations posted to a share path.
///
/// `mkdir` targets the posted directory; `move` and `copy` treat the posted
/// path as the source and take a `dest` routing path, which goes through
/// the same share lookup and path resolution as a request URL. Readonly is
/// enforced on every share the operation writes to — and, for `move`, on
/// the source share it deletes from. Copying *out of* a readonly share is
/// allowed.
#[utoipa::path(
    post,
    path = "/{share}/{path}",
    tag = "Files",
    params(
        ("share" = String, Path, description = "Share name"),
        ("path" = String, Path, description = "Source path inside the share")
    ),
    request_body = FileOpRequest,
    responses(
        (status = 200, description = "Operation applied", body = OpResponse),
        (status = 201, description = "Directory created", body = OpResponse),
        (status = 403, description = "A written share is readonly", body = ApiError),
        (status = 404, description = "Unknown share or path", body = ApiError),
        (status = 409, description = "Destination already exists", body = ApiError)
    )
)]
pub async fn file_op(
    state: &AppState,
    share: &ShareEntry,
    resolved: &Path,
    op: FileOpRequest,
) -> Result<Response, AppError> {
    match op.op {
        FileOp::Mkdir => {
            crate::router::ensure_writable(share)?;
            let name = op
                .name
                .as_deref()
                .ok_or_else(|| AppError::bad_request("mkdir requires 'name'"))?;
            validate_segment(name)?;
            let meta = fs::metadata(resolved).await.map_err(fs_error)?;
            if !meta.is_dir() {
                return Err(AppError::bad_request("mkdir targets a directory"));
            }

            let target = resolved.join(name);
            let _guard = state.locks.lock(&target).await;
            ops::create_dir(&target).await?;
            Ok((
                StatusCode::CREATED,
                Json(OpResponse {
                    op: FileOp::Mkdir,
                    path: routing_path(share, &target),
                }),
            )
                .into_response())
        }
        FileOp::Move | FileOp::Copy => {
            let dest_str = op
                .dest
                .as_deref()
                .ok_or_else(|| AppError::bad_request("move/copy require 'dest'"))?;
            let (dest_share, dest_segments, dest_wants_dir) =
                crate::router::parse_dest(state, dest_str)?;

            crate::router::ensure_writable(&dest_share)?;
            if op.op == FileOp::Move {
                crate::router::ensure_writable(share)?;
                if resolved == share.root {
                    return Err(AppError::bad_request("Cannot move the share root"));
                }
            }

            let dest_base = resolve(&dest_share.root, &dest_segments)?;
            let dest_path = if dest_wants_dir {
                let name = resolved
                    .file_name()
                    .ok_or_else(|| AppError::bad_request("Source has no file name"))?;
                dest_base.join(name)
            } else {
                dest_base
            };
            if dest_path == dest_share.root {
                return Err(AppError::bad_request("dest cannot be a share root"));
            }

            let (_src_guard, _dest_guard) = state.locks.lock_pair(resolved, &dest_path).await;
            match op.op {
                FileOp::Move => ops::move_entry(resolved, &dest_path, op.overwrite).await?,
                FileOp::Copy => ops::copy_entry(resolved, &dest_path, op.overwrite).await?,
                FileOp::Mkdir => unreachable!("handled above"),
            }

            Ok(Json(OpResponse {
                op: op.op,
                path: routing_path(&dest_share, &dest_path),
            })
            .into_response())
        }
    }
}
