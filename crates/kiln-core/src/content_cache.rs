//! Read-through file cache keyed by absolute path and validated by mtime.
//!
//! Entries are replaced wholesale when the file's modification time differs
//! from the cached one; they are never patched in place. The lock is only
//! held to clone an `Arc` out or swap one in, never across the disk read.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use lru::LruCache;
use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result};

/// Default number of cached files.
pub const CONTENT_CACHE_CAPACITY: usize = 10_000;

/// Receives files that must be watched explicitly because they live outside
/// the project root (for example through a directory alias).
pub trait WatchRegistrar: Send + Sync {
    fn watch(&self, path: &Path);
}

/// One cached file.
#[derive(Debug)]
pub struct CachedFile {
    pub content: Arc<[u8]>,
    /// Quoted content digest suitable for an `ETag` header.
    pub etag: String,
    pub modified: SystemTime,
}

impl CachedFile {
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }
}

/// Outcome of [`ContentCache::read`].
#[derive(Debug, Clone)]
pub struct CachedRead {
    pub file: Arc<CachedFile>,
    /// The entry was served from cache because the mtime matched.
    pub not_modified: bool,
}

pub struct ContentCache {
    root: PathBuf,
    entries: Mutex<LruCache<PathBuf, Arc<CachedFile>>>,
    registrar: RwLock<Option<Arc<dyn WatchRegistrar>>>,
}

impl std::fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCache")
            .field("root", &self.root)
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

impl ContentCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_capacity(root, CONTENT_CACHE_CAPACITY)
    }

    pub fn with_capacity(root: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            root: root.into(),
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            registrar: RwLock::new(None),
        }
    }

    /// Install the watcher hook used for out-of-root files.
    pub fn set_watch_registrar(&self, registrar: Arc<dyn WatchRegistrar>) {
        *self.registrar.write() = Some(registrar);
    }

    /// Read `path`, reusing the cached bytes when the mtime is unchanged.
    pub async fn read(&self, path: &Path) -> Result<CachedRead> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|err| Error::io(path, err))?;
        let modified = metadata
            .modified()
            .map_err(|err| Error::io(path, err))?;

        let cached = self.entries.lock().get(path).cloned();
        if let Some(file) = cached.filter(|file| file.modified == modified) {
            return Ok(CachedRead {
                file,
                not_modified: true,
            });
        }

        let content = tokio::fs::read(path)
            .await
            .map_err(|err| Error::io(path, err))?;
        let file = Arc::new(CachedFile {
            etag: etag(&content),
            content: content.into(),
            modified,
        });
        self.entries
            .lock()
            .put(path.to_path_buf(), Arc::clone(&file));
        tracing::debug!(path = %path.display(), "content cache miss");

        self.watch_if_out_of_root(path);

        Ok(CachedRead {
            file,
            not_modified: false,
        })
    }

    /// Read `path` as text.
    pub async fn read_text(&self, path: &Path) -> Result<String> {
        let read = self.read(path).await?;
        Ok(read.file.text().into_owned())
    }

    /// Cached entry for `path` without touching the disk.
    pub fn peek(&self, path: &Path) -> Option<Arc<CachedFile>> {
        self.entries.lock().peek(path).cloned()
    }

    pub fn invalidate(&self, path: &Path) {
        self.entries.lock().pop(path);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn watch_if_out_of_root(&self, path: &Path) {
        if path.starts_with(&self.root)
            || path.components().any(|c| c.as_os_str() == "node_modules")
        {
            return;
        }
        if let Some(registrar) = self.registrar.read().as_ref() {
            tracing::debug!(path = %path.display(), "watching out-of-root file");
            registrar.watch(path);
        }
    }
}

/// Quoted blake3 digest of `content`.
pub fn etag(content: &[u8]) -> String {
    format!("\"{}\"", blake3::hash(content).to_hex())
}
