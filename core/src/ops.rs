//! Filesystem operations executed on resolved paths.
//!
//! Every function here takes paths that already went through
//! [`crate::resolve`]; nothing in this module re-checks containment. The
//! HTTP layer is responsible for readonly enforcement and for holding the
//! per-path locks from [`crate::pathlock`] around the mutating calls.

use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tempfile::TempPath;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::OpError;

/// Prefix given to in-progress upload temp files.
///
/// Listings filter this prefix so a half-written upload is never observed
/// as a final entry.
pub const UPLOAD_TEMP_PREFIX: &str = ".shareport-upload-";

/// One directory entry as reported by [`list_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    /// Size in bytes; 0 for directories and symlinks.
    pub size: u64,
    /// Modification time as seconds since the Unix epoch, if available.
    pub modified: Option<u64>,
    pub is_dir: bool,
    pub is_symlink: bool,
}

/// List a directory.
///
/// Entries come back grouped for the UI: symlinks, then directories, then
/// files, each group sorted by name.
/// Upload temp files are filtered out. Missing path maps to `NotFound`.
pub async fn list_dir(path: &Path) -> Result<Vec<DirEntryInfo>, OpError> {
    let mut rd = fs::read_dir(path).await.map_err(|e| map_notfound(e, path))?;
    let mut entries = Vec::new();
    while let Some(entry) = rd.next_entry().await? {
        let name = match entry.file_name().into_string() {
            Ok(n) => n,
            Err(raw) => raw.to_string_lossy().into_owned(),
        };
        if name.starts_with(UPLOAD_TEMP_PREFIX) {
            continue;
        }
        // DirEntry::metadata does not follow symlinks, matching how the
        // entry itself (not its target) should be described.
        let meta = entry.metadata().await?;
        let file_type = meta.file_type();
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs());
        entries.push(DirEntryInfo {
            name,
            size: if file_type.is_file() { meta.len() } else { 0 },
            modified,
            is_dir: file_type.is_dir(),
            is_symlink: file_type.is_symlink(),
        });
    }
    entries.sort_by(|a, b| group_rank(a).cmp(&group_rank(b)).then(a.name.cmp(&b.name)));
    Ok(entries)
}

fn group_rank(entry: &DirEntryInfo) -> u8 {
    if entry.is_symlink {
        0
    } else if entry.is_dir {
        1
    } else {
        2
    }
}

/// Streaming upload target with atomic finalization.
///
/// Bytes are written to a temp file created in the destination's parent
/// directory (same filesystem, so the final rename is atomic). `finish`
/// persists the temp file over the destination; dropping the sink without
/// calling `finish` — handler error, client disconnect, forced shutdown —
/// deletes the temp file via [`TempPath`]'s drop.
#[derive(Debug)]
pub struct UploadSink {
    file: Option<fs::File>,
    temp: Option<TempPath>,
    dest: PathBuf,
    written: u64,
}

impl UploadSink {
    /// Create a sink targeting `dest`. The parent directory must exist.
    pub async fn create(dest: &Path) -> Result<Self, OpError> {
        let parent = dest
            .parent()
            .ok_or_else(|| OpError::InvalidName(dest.display().to_string()))?;
        if dest.file_name().is_none() {
            return Err(OpError::InvalidName(dest.display().to_string()));
        }
        let parent_meta = fs::metadata(parent)
            .await
            .map_err(|e| map_notfound(e, parent))?;
        if !parent_meta.is_dir() {
            return Err(OpError::NotFound(format!(
                "directory '{}'",
                parent.display()
            )));
        }
        let named = tempfile::Builder::new()
            .prefix(UPLOAD_TEMP_PREFIX)
            .suffix(".part")
            .tempfile_in(parent)?;
        let (std_file, temp) = named.into_parts();
        Ok(Self {
            file: Some(fs::File::from_std(std_file)),
            temp: Some(temp),
            dest: dest.to_path_buf(),
            written: 0,
        })
    }

    /// Append one chunk of the request body.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), OpError> {
        let file = self
            .file
            .as_mut()
            .expect("write_chunk called after finish");
        file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush, sync, and atomically rename the temp file over the target.
    pub async fn finish(mut self) -> Result<u64, OpError> {
        let mut file = self.file.take().expect("finish called twice");
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        let temp = self.temp.take().expect("finish called twice");
        temp.persist(&self.dest).map_err(|e| OpError::Io(e.error))?;
        tracing::debug!("upload persisted to {}", self.dest.display());
        Ok(self.written)
    }
}

/// Remove a file or directory (recursively).
pub async fn delete_entry(path: &Path) -> Result<(), OpError> {
    let meta = fs::symlink_metadata(path)
        .await
        .map_err(|e| map_notfound(e, path))?;
    if meta.is_dir() {
        fs::remove_dir_all(path).await?;
    } else {
        fs::remove_file(path).await?;
    }
    Ok(())
}

/// Create a single directory. The parent must exist.
pub async fn create_dir(path: &Path) -> Result<(), OpError> {
    match fs::create_dir(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(OpError::Conflict(display_name(path)))
        }
        Err(e) => Err(map_notfound(e, path)),
    }
}

/// Relocate `src` to `dest`.
///
/// Plain rename when source and destination share a filesystem; on EXDEV
/// the entry is copied and the source deleted afterwards, so a failed copy
/// leaves the source intact. Existing destinations are a `Conflict` unless
/// `overwrite` is set.
pub async fn move_entry(src: &Path, dest: &Path, overwrite: bool) -> Result<(), OpError> {
    if src == dest {
        return Err(OpError::Conflict(display_name(dest)));
    }
    if fs::symlink_metadata(src).await.is_err() {
        return Err(OpError::NotFound(display_name(src)));
    }
    check_dest(dest, overwrite).await?;

    match fs::rename(src, dest).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            tracing::debug!(
                "rename {} -> {} crosses filesystems, falling back to copy+delete",
                src.display(),
                dest.display()
            );
            copy_tree(src, dest).await?;
            delete_entry(src).await
        }
        Err(e) => Err(map_notfound(e, src)),
    }
}

/// Duplicate `src` at `dest`, recursively for directories.
pub async fn copy_entry(src: &Path, dest: &Path, overwrite: bool) -> Result<(), OpError> {
    if src == dest {
        return Err(OpError::Conflict(display_name(dest)));
    }
    if fs::symlink_metadata(src).await.is_err() {
        return Err(OpError::NotFound(display_name(src)));
    }
    check_dest(dest, overwrite).await?;
    copy_tree(src, dest).await
}

/// Conflict check shared by move and copy. With `overwrite` the existing
/// destination is removed first, so directory renames do not fail on a
/// non-empty target.
async fn check_dest(dest: &Path, overwrite: bool) -> Result<(), OpError> {
    if fs::symlink_metadata(dest).await.is_ok() {
        if !overwrite {
            return Err(OpError::Conflict(display_name(dest)));
        }
        delete_entry(dest).await?;
    }
    Ok(())
}

/// Iterative recursive copy. Symlinks are reproduced as symlinks, never
/// followed.
async fn copy_tree(src: &Path, dest: &Path) -> Result<(), OpError> {
    let mut stack = vec![(src.to_path_buf(), dest.to_path_buf())];
    while let Some((s, d)) = stack.pop() {
        let file_type = fs::symlink_metadata(&s).await?.file_type();
        if file_type.is_symlink() {
            copy_symlink(&s, &d).await?;
        } else if file_type.is_dir() {
            fs::create_dir(&d).await?;
            let mut rd = fs::read_dir(&s).await?;
            while let Some(entry) = rd.next_entry().await? {
                stack.push((entry.path(), d.join(entry.file_name())));
            }
        } else {
            fs::copy(&s, &d).await?;
        }
    }
    Ok(())
}

#[cfg(unix)]
async fn copy_symlink(src: &Path, dest: &Path) -> Result<(), OpError> {
    let target = fs::read_link(src).await?;
    fs::symlink(target, dest).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn copy_symlink(src: &Path, dest: &Path) -> Result<(), OpError> {
    // No portable symlink creation; copy the link target's bytes instead.
    fs::copy(src, dest).await?;
    Ok(())
}

fn is_cross_device(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(libc::EXDEV)
    }
    #[cfg(not(unix))]
    {
        let _ = err;
        false
    }
}

fn map_notfound(err: io::Error, path: &Path) -> OpError {
    // NotADirectory covers paths that run through a regular file, e.g.
    // `file.txt/sub`; to a client that is the same as a missing path.
    if matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    ) {
        OpError::NotFound(display_name(path))
    } else {
        OpError::Io(err)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("data.bin");

        let mut sink = UploadSink::create(&dest).await.unwrap();
        sink.write_chunk(b"hello ").await.unwrap();
        sink.write_chunk(b"world").await.unwrap();
        let written = sink.finish().await.unwrap();

        assert_eq!(written, 11);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_upload_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("data.bin");
        std::fs::write(&dest, b"old contents").unwrap();

        let mut sink = UploadSink::create(&dest).await.unwrap();
        sink.write_chunk(b"new").await.unwrap();
        sink.finish().await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_dropped_upload_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("data.bin");

        {
            let mut sink = UploadSink::create(&dest).await.unwrap();
            sink.write_chunk(b"partial").await.unwrap();
            // Dropped without finish: simulates disconnect or forced close.
        }

        assert!(!dest.exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "temp file leaked: {:?}", leftovers);
    }

    #[tokio::test]
    async fn test_upload_into_missing_dir_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing").join("data.bin");
        let err = UploadSink::create(&dest).await.unwrap_err();
        assert!(matches!(err, OpError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_dir_ordering_and_temp_filter() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), b"bb").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("zdir")).unwrap();
        std::fs::write(
            dir.path().join(format!("{}12345.part", UPLOAD_TEMP_PREFIX)),
            b"junk",
        )
        .unwrap();

        let entries = list_dir(dir.path()).await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["zdir", "a.txt", "b.txt"]);
        assert!(entries[0].is_dir);
        assert_eq!(entries[1].size, 1);
        assert_eq!(entries[2].size, 2);
        assert!(entries.iter().all(|e| e.modified.is_some()));
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = list_dir(&dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, OpError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_file_and_recursive_dir() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"x").unwrap();
        delete_entry(&file).await.unwrap();
        assert!(!file.exists());

        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("deep.txt"), b"x").unwrap();
        delete_entry(&dir.path().join("a")).await.unwrap();
        assert!(!dir.path().join("a").exists());

        let err = delete_entry(&dir.path().join("gone")).await.unwrap_err();
        assert!(matches!(err, OpError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_dir_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("newdir");
        create_dir(&target).await.unwrap();
        assert!(target.is_dir());

        let err = create_dir(&target).await.unwrap_err();
        assert!(matches!(err, OpError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_move_renames_and_respects_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dest = dir.path().join("dest.txt");
        std::fs::write(&src, b"payload").unwrap();

        move_entry(&src, &dest, false).await.unwrap();
        assert!(!src.exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");

        std::fs::write(&src, b"second").unwrap();
        let err = move_entry(&src, &dest, false).await.unwrap_err();
        assert!(matches!(err, OpError::Conflict(_)));
        // Source untouched after the refused move.
        assert_eq!(std::fs::read(&src).unwrap(), b"second");

        move_entry(&src, &dest, true).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_move_missing_source_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = move_entry(
            &dir.path().join("ghost"),
            &dir.path().join("dest"),
            false,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OpError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_copy_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("tree");
        std::fs::create_dir_all(src.join("sub")).unwrap();
        std::fs::write(src.join("top.txt"), b"top").unwrap();
        std::fs::write(src.join("sub/inner.txt"), b"inner").unwrap();

        let dest = dir.path().join("tree-copy");
        copy_entry(&src, &dest, false).await.unwrap();

        assert_eq!(std::fs::read(dest.join("top.txt")).unwrap(), b"top");
        assert_eq!(std::fs::read(dest.join("sub/inner.txt")).unwrap(), b"inner");
        // Source still present.
        assert!(src.join("sub/inner.txt").exists());

        let err = copy_entry(&src, &dest, false).await.unwrap_err();
        assert!(matches!(err, OpError::Conflict(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_copy_preserves_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("tree");
        std::fs::create_dir(&src).unwrap();
        std::fs::write(src.join("real.txt"), b"real").unwrap();
        std::os::unix::fs::symlink("real.txt", src.join("link")).unwrap();

        let dest = dir.path().join("copy");
        copy_entry(&src, &dest, false).await.unwrap();

        let meta = std::fs::symlink_metadata(dest.join("link")).unwrap();
        assert!(meta.file_type().is_symlink());
        assert_eq!(std::fs::read(dest.join("link")).unwrap(), b"real");
    }
}
