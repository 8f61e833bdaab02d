//! # Shareport Core
//!
//! Share registry, path resolution, and filesystem operations for the
//! Shareport file server.
//!
//! This crate contains everything that is security- or concurrency-critical
//! and nothing that speaks HTTP:
//!
//! - [`registry`] owns the name → root mapping and the per-share flags
//!   (`hidden`, `readonly`, `listable`).
//! - [`resolve`] turns share-relative URL segments into a validated
//!   filesystem path that is proven to stay inside the share root.
//! - [`ops`] implements the file operations (list, upload, delete, move,
//!   copy, mkdir) on top of resolved paths.
//! - [`pathlock`] serializes mutating operations that target the same
//!   resolved path.
//!
//! The HTTP layer in `shareport_server` maps these into route handlers and
//! translates [`OpError`] into response status codes.

pub mod error;
pub mod ops;
pub mod pathlock;
pub mod registry;
pub mod resolve;

pub use error::OpError;
pub use ops::{
    copy_entry, create_dir, delete_entry, list_dir, move_entry, DirEntryInfo, UploadSink,
};
pub use pathlock::PathLocks;
pub use registry::{RegistryError, ShareEntry, ShareRegistry};
pub use resolve::{resolve, validate_segment, ResolveError};
