//! Operation error taxonomy shared by all filesystem operations.

use std::io;

use crate::registry::RegistryError;
use crate::resolve::ResolveError;

/// Error returned by the filesystem operations in [`crate::ops`].
///
/// The HTTP layer owns the mapping to status codes; this crate only
/// distinguishes the cases that need different handling. `Traversal` is
/// kept separate from `NotFound` so callers can decide how much to reveal.
#[derive(Debug, thiserror::Error)]
pub enum OpError {
    /// The share or the path under it does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The share is readonly and the operation would mutate it.
    #[error("share '{0}' is readonly")]
    ReadOnly(String),

    /// Path resolution escaped the share root.
    #[error("path escapes share root")]
    Traversal,

    /// Destination already exists and no overwrite was requested.
    #[error("destination already exists: {0}")]
    Conflict(String),

    /// A name or path segment failed validation.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Underlying filesystem failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl From<ResolveError> for OpError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Traversal => OpError::Traversal,
            ResolveError::InvalidSegment(s) => OpError::InvalidName(s),
            ResolveError::Io(e) => OpError::Io(e),
        }
    }
}

impl From<RegistryError> for OpError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(name) => OpError::NotFound(format!("share '{}'", name)),
            RegistryError::DuplicateName(name) => {
                OpError::Conflict(format!("share '{}' already registered", name))
            }
            RegistryError::InvalidName(name) => OpError::InvalidName(name),
            RegistryError::InvalidRoot { path, source } => OpError::Io(io::Error::new(
                source.kind(),
                format!("share root '{}': {}", path, source),
            )),
        }
    }
}
