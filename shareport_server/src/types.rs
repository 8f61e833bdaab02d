//! Request and response types for the Shareport HTTP API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use shareport_core::DirEntryInfo;

/// Health and metrics summary.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    /// Number of registered shares, hidden included.
    pub shares: usize,
    pub total_requests: u64,
    pub total_uploads: u64,
    pub total_downloads: u64,
    /// Lifecycle state: "running", "draining", or "closed".
    pub lifecycle: String,
}

/// One entry on the index page.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IndexEntry {
    pub name: String,
    /// "dir", "file", or "app" (registered custom handler).
    pub kind: String,
    pub readonly: bool,
}

/// Index of visible shares and custom handler prefixes.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IndexResponse {
    pub entries: Vec<IndexEntry>,
}

/// One directory entry in a listing.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EntryInfo {
    pub name: String,
    /// Size in bytes; 0 for directories and symlinks.
    pub size: u64,
    /// Modification time as seconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<u64>,
    pub is_dir: bool,
    pub is_symlink: bool,
}

impl From<DirEntryInfo> for EntryInfo {
    fn from(e: DirEntryInfo) -> Self {
        Self {
            name: e.name,
            size: e.size,
            modified: e.modified,
            is_dir: e.is_dir,
            is_symlink: e.is_symlink,
        }
    }
}

/// Directory listing response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListResponse {
    pub share: String,
    /// Share-relative path of the listed directory ("" for the root).
    pub path: String,
    pub readonly: bool,
    /// False when the share suppresses listings; `entries` is then empty.
    pub listable: bool,
    pub entries: Vec<EntryInfo>,
}

/// Operation selector for JSON `POST` commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FileOp {
    Mkdir,
    Move,
    Copy,
}

/// JSON body for `POST /{share}/{path}` file operations.
///
/// - `mkdir`: `name` is the new directory's name, created under the posted
///   directory path.
/// - `move`/`copy`: `dest` is a server-absolute routing path
///   (`/share/dir/` or `/share/dir/newname`); a trailing slash keeps the
///   source name. Move doubles as rename when the destination stays in the
///   same directory.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileOpRequest {
    pub op: FileOp,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub dest: Option<String>,
    /// Replace an existing destination instead of failing with 409.
    #[serde(default)]
    pub overwrite: bool,
}

/// Result of a JSON file operation.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OpResponse {
    pub op: FileOp,
    /// Routing path of the entry the operation produced or affected.
    pub path: String,
}

/// One file accepted by a multipart upload.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadedFile {
    pub name: String,
    pub size: u64,
}

/// Result of an upload.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub uploaded: Vec<UploadedFile>,
}
