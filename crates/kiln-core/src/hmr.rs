//! Hot-update engine.
//!
//! Owns the module graph for one server instance, classifies file changes
//! and produces the notifications pushed to connected clients. The engine
//! never talks to sockets itself: [`HotEngine::handle_change`] returns the
//! payload and the server broadcasts it.

use std::num::NonZeroUsize;

use indexmap::IndexSet;
use kiln_graph::{ModuleGraph, ModuleRecord, Propagation};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::paths::{clean_url, is_component, is_html, is_style_request};

/// Timestamps whose dirty sets are retained.
pub const DIRTY_SET_CAPACITY: usize = 10;

/// Message sent over the client channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HmrPayload {
    Connected,
    Update {
        updates: Vec<Update>,
    },
    FullReload {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
}

/// One module the client has to re-import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Update {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    pub path: String,
    pub change_src_path: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateKind {
    JsUpdate,
    ComponentReload,
    StyleUpdate,
}

/// Module graph plus per-timestamp bookkeeping.
#[derive(Debug)]
pub struct HotEngine {
    graph: Mutex<ModuleGraph>,
    dirty: Mutex<LruCache<String, IndexSet<String>>>,
    latest_versions: RwLock<FxHashMap<String, String>>,
}

impl Default for HotEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HotEngine {
    pub fn new() -> Self {
        Self {
            graph: Mutex::new(ModuleGraph::new()),
            dirty: Mutex::new(LruCache::new(
                NonZeroUsize::new(DIRTY_SET_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            )),
            latest_versions: RwLock::default(),
        }
    }

    /// Replace everything `importer` contributes to the graph.
    pub fn record_module(&self, importer: &str, record: ModuleRecord) {
        tracing::debug!(
            importer,
            importees = record.importees.len(),
            accept_self = record.accept_self,
            accepted = record.accepted_deps.len(),
            "recorded module"
        );
        self.graph.lock().record_module(importer, record);
    }

    /// Run `f` against the graph. The lock is held for the duration of `f`.
    pub fn with_graph<R>(&self, f: impl FnOnce(&ModuleGraph) -> R) -> R {
        f(&self.graph.lock())
    }

    /// Remember the version a client last fetched `path` at.
    pub fn record_version(&self, path: &str, timestamp: &str) {
        self.latest_versions
            .write()
            .insert(clean_url(path).to_string(), timestamp.to_string());
    }

    pub fn latest_version(&self, path: &str) -> Option<String> {
        self.latest_versions.read().get(path).cloned()
    }

    /// Whether `path` sits between a changed file and its boundary for the
    /// update stamped `timestamp`.
    pub fn is_dirty(&self, timestamp: &str, path: &str) -> bool {
        self.dirty
            .lock()
            .get(timestamp)
            .is_some_and(|dirty| dirty.contains(path))
    }

    /// Classify a change of the module served at `path` and build the
    /// notification for it. `None` means no client needs to hear about it.
    pub fn handle_change(&self, path: &str, timestamp: u64) -> Option<HmrPayload> {
        if is_html(path) {
            tracing::info!(path, "page reload");
            return Some(HmrPayload::FullReload {
                path: Some(path.to_string()),
            });
        }

        let single = |kind| {
            Some(HmrPayload::Update {
                updates: vec![Update {
                    kind,
                    path: path.to_string(),
                    change_src_path: path.to_string(),
                    timestamp,
                }],
            })
        };
        if is_style_request(path) {
            tracing::info!(path, "style updated");
            return single(UpdateKind::StyleUpdate);
        }
        if is_component(path) {
            tracing::info!(path, "component reloaded");
            return single(UpdateKind::ComponentReload);
        }

        let propagation = self.graph.lock().propagate(path, is_component);
        match propagation {
            Propagation::Unreferenced => {
                tracing::debug!(path, "no importers");
                None
            }
            Propagation::FullReload => {
                tracing::info!(path, "page reload");
                Some(HmrPayload::FullReload {
                    path: Some(path.to_string()),
                })
            }
            Propagation::Update(update) => {
                match update.boundaries.as_slice() {
                    [boundary] => {
                        tracing::info!("{boundary} hot updated due to change in {path}")
                    }
                    many => tracing::info!(
                        "{} files hot updated due to change in {path}",
                        many.len()
                    ),
                }
                let updates = update
                    .boundaries
                    .iter()
                    .map(|boundary| Update {
                        kind: if is_component(boundary) {
                            UpdateKind::ComponentReload
                        } else {
                            UpdateKind::JsUpdate
                        },
                        path: boundary.clone(),
                        change_src_path: path.to_string(),
                        timestamp,
                    })
                    .collect();
                self.dirty.lock().put(timestamp.to_string(), update.dirty);
                Some(HmrPayload::Update { updates })
            }
        }
    }
}
