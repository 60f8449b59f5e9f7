//! File watching for the dev server.
//!
//! The project root is watched recursively. Files read from outside the
//! root (through a directory alias, for instance) are added one by one via
//! the [`WatchRegistrar`] handle given to the content cache.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use kiln_core::WatchRegistrar;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use crate::error::{CliError, Result};

/// Patterns never reported, relative to the root.
pub const DEFAULT_IGNORES: [&str; 3] = ["node_modules", ".git", "*.log"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Modified(PathBuf),
    Created(PathBuf),
    Removed(PathBuf),
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Modified(p) | FileChange::Created(p) | FileChange::Removed(p) => p,
        }
    }

    /// Files appeared or disappeared, so extension probing may now
    /// resolve differently.
    pub fn is_structural(&self) -> bool {
        matches!(self, FileChange::Created(_) | FileChange::Removed(_))
    }
}

/// Recursive watcher over the project root.
pub struct FileWatcher {
    watcher: Arc<Mutex<RecommendedWatcher>>,
    extra: Arc<RwLock<HashSet<PathBuf>>>,
    root: PathBuf,
}

impl FileWatcher {
    /// Start watching `root`. Changes arrive on the returned receiver.
    pub fn new(root: PathBuf, ignore_patterns: Vec<String>) -> Result<(Self, mpsc::Receiver<FileChange>)> {
        if !root.exists() {
            return Err(CliError::FileNotFound(root));
        }

        let (tx, rx) = mpsc::channel(256);
        let extra: Arc<RwLock<HashSet<PathBuf>>> = Arc::default();
        let callback_extra = Arc::clone(&extra);
        let callback_root = root.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!("file watcher error: {err}");
                    return;
                }
            };
            for path in &event.paths {
                let registered = callback_extra.read().contains(path);
                if !registered && should_ignore(path, &callback_root, &ignore_patterns) {
                    continue;
                }
                let change = match event.kind {
                    EventKind::Create(_) => FileChange::Created(path.clone()),
                    EventKind::Modify(_) => FileChange::Modified(path.clone()),
                    EventKind::Remove(_) => FileChange::Removed(path.clone()),
                    _ => continue,
                };
                // The receiver is gone once the server shuts down.
                let _ = tx.blocking_send(change);
            }
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        Ok((
            Self {
                watcher: Arc::new(Mutex::new(watcher)),
                extra,
                root,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Handle for watching individual files outside the root.
    pub fn registrar(&self) -> Arc<dyn WatchRegistrar> {
        Arc::new(ExtraWatches {
            watcher: Arc::clone(&self.watcher),
            extra: Arc::clone(&self.extra),
        })
    }
}

struct ExtraWatches {
    watcher: Arc<Mutex<RecommendedWatcher>>,
    extra: Arc<RwLock<HashSet<PathBuf>>>,
}

impl WatchRegistrar for ExtraWatches {
    fn watch(&self, path: &Path) {
        if !self.extra.write().insert(path.to_path_buf()) {
            return;
        }
        if let Err(err) = self.watcher.lock().watch(path, RecursiveMode::NonRecursive) {
            tracing::warn!(path = %path.display(), "failed to watch file: {err}");
            self.extra.write().remove(path);
        }
    }
}

/// Whether an event for `path` is dropped. Anything outside `root` is,
/// as are hidden entries and `ignore_patterns` (`name` matches a path
/// segment prefix, `*.ext` matches a suffix).
pub fn should_ignore(path: &Path, root: &Path, ignore_patterns: &[String]) -> bool {
    let Ok(rel_path) = path.strip_prefix(root) else {
        return true;
    };
    let path_str = rel_path.to_string_lossy();

    for pattern in ignore_patterns {
        if let Some(ext) = pattern.strip_prefix('*') {
            if path_str.ends_with(ext) {
                return true;
            }
        } else if path_str.starts_with(pattern.as_str()) || path_str.contains(&format!("/{pattern}")) {
            return true;
        }
    }

    rel_path.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
    })
}

/// Collect `first` plus every change that arrives before `quiet` passes
/// without a new event. Repeated events for one path collapse into one;
/// a create or remove is not downgraded by later modifications.
pub async fn collect_burst(
    first: FileChange,
    rx: &mut mpsc::Receiver<FileChange>,
    quiet: Duration,
) -> Vec<FileChange> {
    let mut changes: IndexMap<PathBuf, FileChange> = IndexMap::new();
    let mut push = |change: FileChange| {
        let path = change.path().to_path_buf();
        match changes.get(&path) {
            Some(existing) if existing.is_structural() && !change.is_structural() => {}
            _ => {
                changes.insert(path, change);
            }
        }
    };

    push(first);
    while let Ok(Some(change)) = tokio::time::timeout(quiet, rx.recv()).await {
        push(change);
    }
    changes.into_values().collect()
}
