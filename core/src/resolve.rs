//! Path resolution: turn share-relative URL segments into a filesystem path
//! that is proven to stay inside the share root.
//!
//! Resolution canonicalizes the deepest ancestor of the requested path that
//! exists on disk (following symlinks), checks that the canonical result is
//! still inside the canonical share root, then re-appends the validated
//! non-existent tail. Upload and mkdir targets therefore resolve even though
//! the leaf does not exist yet, while a symlinked parent that points outside
//! the root is rejected.
//!
//! The containment check uses [`Path::starts_with`], which compares whole
//! components: `/srv/share2` is not inside `/srv/share`.
//!
//! A canonicalize-then-use window remains between resolution and the actual
//! file operation; closing it fully would require openat-style
//! directory-handle-relative I/O, which std does not expose portably.

use std::io;
use std::path::{Path, PathBuf};

/// Error returned by [`resolve`].
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The path escapes the share root (a `..` segment, an absolute
    /// segment, or a symlink pointing outside the root).
    #[error("path escapes share root")]
    Traversal,

    /// A segment failed validation before any filesystem access.
    #[error("invalid path segment: {0:?}")]
    InvalidSegment(String),

    /// Canonicalization failed. `NotFound` here means a dangling symlink or
    /// a root that vanished after registration, not a traversal attempt.
    #[error("resolve i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Validate one URL path segment.
///
/// `.`, `..`, and embedded separators are traversal attempts — separators
/// cannot survive a URL path split, but segments arrive percent-decoded, so
/// `%2F` and `%5C` end up here as literal separators and must be refused
/// rather than spliced into the path. Empty segments and NUL bytes are
/// plain malformed input.
pub fn validate_segment(segment: &str) -> Result<(), ResolveError> {
    if segment == "." || segment == ".." || segment.contains('/') || segment.contains('\\') {
        return Err(ResolveError::Traversal);
    }
    if segment.is_empty() || segment.contains('\0') {
        return Err(ResolveError::InvalidSegment(segment.to_string()));
    }
    Ok(())
}

/// Resolve `segments` against `root`.
///
/// `segments` are percent-decoded URL path segments in order. A single
/// trailing empty segment (a URL ending in `/`) is permitted and ignored;
/// any other empty segment is invalid.
///
/// On success the returned path is canonical up to its deepest existing
/// ancestor and guaranteed to be inside the canonical form of `root`.
/// A missing file is *not* an error here — existence is the caller's
/// concern. Traversal attempts never touch the filesystem beyond the
/// canonicalization itself.
pub fn resolve(root: &Path, segments: &[String]) -> Result<PathBuf, ResolveError> {
    let last = segments.len().saturating_sub(1);
    let mut candidate = root.to_path_buf();
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() && i == last {
            continue;
        }
        validate_segment(segment)?;
        candidate.push(segment);
    }

    let canon_root = root.canonicalize()?;

    // Split `candidate` into its deepest existing ancestor and the missing
    // tail. `symlink_metadata` is used so a dangling symlink still counts as
    // the existing ancestor and fails canonicalization below, like any other
    // unreadable entry.
    let mut existing = candidate.as_path();
    let mut missing: Vec<&std::ffi::OsStr> = Vec::new();
    loop {
        match existing.symlink_metadata() {
            Ok(_) => break,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                ) =>
            {
                let name = existing
                    .file_name()
                    .ok_or(ResolveError::Traversal)?;
                missing.push(name);
                existing = existing.parent().ok_or(ResolveError::Traversal)?;
            }
            Err(e) => return Err(ResolveError::Io(e)),
        }
    }

    let canon_existing = existing.canonicalize()?;
    if !canon_existing.starts_with(&canon_root) {
        return Err(ResolveError::Traversal);
    }

    let mut resolved = canon_existing;
    for name in missing.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}
