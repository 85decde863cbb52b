//! Memoized, in-flight-deduplicated filesystem operations
//!
//! The cache is scoped to one pipeline run and shared by every classifier
//! and bundler in that run. Entries store the pending operation itself, not
//! only its settled value: a second concurrent requester for the same path
//! awaits the same future instead of issuing a duplicate syscall.

use super::{DirEntry, FileStat, FileType};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Bytes read by [`FsCache::head`] for executable-header sniffing.
pub const HEAD_READ_BYTES: usize = 512 * 1024;

/// A cloneable read failure, so settled errors can be shared between
/// concurrent requesters.
#[derive(Debug, Clone, Error)]
#[error("failed to read {}: {message}", path.display())]
pub struct FsError {
    pub path: PathBuf,
    pub message: String,
}

type SharedOp<T> = Shared<BoxFuture<'static, T>>;

/// Per-run filesystem cache.
///
/// A given path's operation is started at most once per run regardless of
/// concurrent requesters.
#[derive(Default)]
pub struct FsCache {
    stats: Mutex<HashMap<PathBuf, SharedOp<Option<FileStat>>>>,
    dirs: Mutex<HashMap<PathBuf, SharedOp<Option<Arc<Vec<DirEntry>>>>>>,
    texts: Mutex<HashMap<PathBuf, SharedOp<Result<Arc<String>, FsError>>>>,
    heads: Mutex<HashMap<PathBuf, SharedOp<Option<Arc<Vec<u8>>>>>>,
}

fn shared_op<T, F>(
    map: &Mutex<HashMap<PathBuf, SharedOp<T>>>,
    path: &Path,
    make: F,
) -> SharedOp<T>
where
    T: Clone + Send + 'static,
    F: FnOnce(PathBuf) -> BoxFuture<'static, T>,
{
    let mut map = map.lock().expect("fs cache lock poisoned");
    if let Some(op) = map.get(path) {
        return op.clone();
    }
    let op = make(path.to_path_buf()).shared();
    map.insert(path.to_path_buf(), op.clone());
    op
}

impl FsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stat a path. Unreadable or missing paths resolve to `None`.
    pub async fn stat(&self, path: &Path) -> Option<FileStat> {
        let op = shared_op(&self.stats, path, |path| {
            async move {
                let meta = tokio::fs::symlink_metadata(&path).await.ok()?;
                let file_type = if meta.is_dir() {
                    FileType::Directory
                } else if meta.file_type().is_symlink() {
                    FileType::Symlink
                } else {
                    FileType::File
                };
                Some(FileStat {
                    size: meta.len(),
                    mtime: meta.modified().ok(),
                    file_type,
                })
            }
            .boxed()
        });
        op.await
    }

    /// List a directory, sorted by name. Unreadable paths resolve to `None`.
    pub async fn read_dir(&self, path: &Path) -> Option<Arc<Vec<DirEntry>>> {
        let op = shared_op(&self.dirs, path, |path| {
            async move {
                let mut reader = tokio::fs::read_dir(&path).await.ok()?;
                let mut entries = Vec::new();
                while let Ok(Some(entry)) = reader.next_entry().await {
                    let file_type = match entry.file_type().await {
                        Ok(t) if t.is_dir() => FileType::Directory,
                        Ok(t) if t.is_symlink() => FileType::Symlink,
                        Ok(_) => FileType::File,
                        Err(_) => continue,
                    };
                    entries.push(DirEntry {
                        path: entry.path(),
                        name: entry.file_name().to_string_lossy().into_owned(),
                        file_type,
                    });
                }
                entries.sort_by(|a, b| a.name.cmp(&b.name));
                Some(Arc::new(entries))
            }
            .boxed()
        });
        op.await
    }

    /// Read a file as UTF-8 text.
    pub async fn read_to_string(&self, path: &Path) -> Result<Arc<String>, FsError> {
        let op = shared_op(&self.texts, path, |path| {
            async move {
                match tokio::fs::read_to_string(&path).await {
                    Ok(text) => Ok(Arc::new(text)),
                    Err(err) => Err(FsError {
                        path,
                        message: err.to_string(),
                    }),
                }
            }
            .boxed()
        });
        op.await
    }

    /// Read the first [`HEAD_READ_BYTES`] of a file, for binary sniffing.
    /// Unreadable paths resolve to `None`.
    pub async fn head(&self, path: &Path) -> Option<Arc<Vec<u8>>> {
        let op = shared_op(&self.heads, path, |path| {
            async move {
                use tokio::io::AsyncReadExt;
                let file = tokio::fs::File::open(&path).await.ok()?;
                let mut buf = Vec::with_capacity(64 * 1024);
                let mut reader = file.take(HEAD_READ_BYTES as u64);
                reader.read_to_end(&mut buf).await.ok()?;
                Some(Arc::new(buf))
            }
            .boxed()
        });
        op.await
    }

    /// True when the path stats as a regular file.
    pub async fn is_file(&self, path: &Path) -> bool {
        matches!(self.stat(path).await, Some(stat) if stat.is_file())
    }

    /// True when the path stats as a directory.
    pub async fn is_dir(&self, path: &Path) -> bool {
        matches!(self.stat(path).await, Some(stat) if stat.is_dir())
    }
}
