//! Share registry: the name → root mapping consulted by the router.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// One registered share.
///
/// Entries are immutable once registered; changing a flag means `remove`
/// followed by `add`. The root may be a directory or a single regular
/// file; file roots are download-only, since every mutation resolves a
/// path *under* the root.
#[derive(Debug, Clone)]
pub struct ShareEntry {
    /// Unique share name; first URL path segment.
    pub name: String,
    /// Canonical absolute root path. Canonicalized at registration.
    pub root: PathBuf,
    /// Excluded from the index page but still directly reachable.
    pub hidden: bool,
    /// All mutating operations are rejected.
    pub readonly: bool,
    /// When false, directory listings come back empty while the
    /// directories themselves remain browsable and writable.
    pub listable: bool,
}

impl ShareEntry {
    /// Whether the share root is a regular file rather than a directory.
    pub fn is_file_share(&self) -> bool {
        self.root.is_file()
    }
}

/// Error returned by registry mutations and lookups.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("share '{0}' is already registered")]
    DuplicateName(String),

    #[error("invalid share name: {0:?}")]
    InvalidName(String),

    #[error("share root '{path}' is not usable: {source}")]
    InvalidRoot {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("share '{0}' not found")]
    NotFound(String),
}

/// The share table.
///
/// Backed by a `Vec` so `list_visible` preserves insertion order, behind an
/// `RwLock` so `add`/`remove` stay atomic with respect to concurrent
/// lookups. Lookups clone the entry: a request that resolved its share
/// before a `remove` completes against the detached entry, which the drain
/// semantics allow.
#[derive(Debug, Default)]
pub struct ShareRegistry {
    shares: RwLock<Vec<ShareEntry>>,
}

impl ShareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a share.
    ///
    /// The name must be non-empty, free of path separators and NUL, and not
    /// `.`/`..`. The root must exist and be readable at registration time;
    /// it is canonicalized so later resolutions compare against a stable
    /// prefix.
    pub fn add(
        &self,
        name: &str,
        root: &Path,
        hidden: bool,
        readonly: bool,
        listable: bool,
    ) -> Result<(), RegistryError> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
            || name.contains('\0')
        {
            return Err(RegistryError::InvalidName(name.to_string()));
        }

        let canonical = root.canonicalize().map_err(|e| RegistryError::InvalidRoot {
            path: root.display().to_string(),
            source: e,
        })?;
        // Readability probe: metadata for files, a directory read for dirs.
        let meta = canonical
            .metadata()
            .map_err(|e| RegistryError::InvalidRoot {
                path: root.display().to_string(),
                source: e,
            })?;
        if meta.is_dir() {
            canonical
                .read_dir()
                .map_err(|e| RegistryError::InvalidRoot {
                    path: root.display().to_string(),
                    source: e,
                })?;
        }

        let mut shares = self.shares.write().unwrap();
        if shares.iter().any(|s| s.name == name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        shares.push(ShareEntry {
            name: name.to_string(),
            root: canonical,
            hidden,
            readonly,
            listable,
        });
        Ok(())
    }

    /// Remove a share by name.
    pub fn remove(&self, name: &str) -> Result<(), RegistryError> {
        let mut shares = self.shares.write().unwrap();
        let idx = shares
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        shares.remove(idx);
        Ok(())
    }

    /// Look up a share by name, returning a detached clone.
    pub fn lookup(&self, name: &str) -> Result<ShareEntry, RegistryError> {
        let shares = self.shares.read().unwrap();
        shares
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Non-hidden shares in insertion order, for the index page.
    pub fn list_visible(&self) -> Vec<ShareEntry> {
        let shares = self.shares.read().unwrap();
        shares.iter().filter(|s| !s.hidden).cloned().collect()
    }

    /// Number of registered shares, hidden included.
    pub fn len(&self) -> usize {
        self.shares.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
