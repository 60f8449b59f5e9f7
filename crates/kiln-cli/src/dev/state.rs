//! State owned by one dev server instance.
//!
//! Everything a request or a file event touches hangs off [`DevState`]:
//! the resolver, the rewrite pipeline, the hot-update engine, the content
//! cache and the connected clients. Nothing is process-global, so several
//! servers can run side by side in one process.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use kiln_core::paths::strip_hmr_query;
use kiln_core::{Compiler, ContentCache, HmrPayload, HotEngine, OxcCompiler, Resolver, Rewriter};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, mpsc};

use crate::dev::watcher::FileChange;

/// Messages queued per client before it counts as stalled.
pub const CLIENT_QUEUE: usize = 100;

/// Connected hot-update clients by id.
pub type ClientRegistry = Arc<RwLock<HashMap<usize, mpsc::Sender<String>>>>;

pub struct DevState {
    pub root: PathBuf,
    pub mode: String,
    /// Snapshot served as `/@kiln/env`.
    pub env: IndexMap<String, String>,
    pub resolver: Arc<Resolver>,
    pub hot: Arc<HotEngine>,
    pub rewriter: Rewriter,
    pub content: ContentCache,
    pub compiler: Arc<dyn Compiler>,

    clients: ClientRegistry,
    next_client_id: AtomicUsize,
    /// Urls answered with a 200 at least once, without their `t` and
    /// `import` markers; only those may get a 304.
    served: RwLock<HashSet<String>>,
    fatal: Mutex<Option<String>>,
    fatal_notify: Notify,
}

impl DevState {
    pub fn new(
        resolver: Arc<Resolver>,
        mode: impl Into<String>,
        env: IndexMap<String, String>,
    ) -> Self {
        let hot = Arc::new(HotEngine::new());
        let root = resolver.root().to_path_buf();
        Self {
            content: ContentCache::new(&root),
            rewriter: Rewriter::new(Arc::clone(&resolver), Arc::clone(&hot)),
            root,
            mode: mode.into(),
            env,
            resolver,
            hot,
            compiler: Arc::new(OxcCompiler),
            clients: Arc::new(RwLock::new(HashMap::new())),
            next_client_id: AtomicUsize::new(0),
            served: RwLock::new(HashSet::new()),
            fatal: Mutex::new(None),
            fatal_notify: Notify::new(),
        }
    }

    /// Replace the transpiler used for `.ts`, `.tsx` and `.jsx` sources.
    pub fn with_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = compiler;
        self
    }

    /// Register a hot-update client.
    pub fn register_client(&self) -> (usize, mpsc::Receiver<String>) {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE);
        self.clients.write().insert(id, tx);
        (id, rx)
    }

    pub fn unregister_client(&self, id: usize) {
        self.clients.write().remove(&id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Push `payload` to every connected client without waiting. Delivery
    /// is best effort: clients whose channel is closed or full are dropped
    /// and reload once their socket closes.
    pub fn broadcast(&self, payload: &HmrPayload) {
        let json = match serde_json::to_string(payload) {
            Ok(json) => json,
            Err(err) => {
                tracing::error!("failed to serialize hot update: {err}");
                return;
            }
        };

        let clients = self.clients.read().clone();
        let mut failed_ids = Vec::new();
        for (id, tx) in clients {
            match tx.try_send(json.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(client = id, "hot-update client is not keeping up, dropping it");
                    failed_ids.push(id);
                }
                Err(TrySendError::Closed(_)) => failed_ids.push(id),
            }
        }
        for id in failed_ids {
            self.unregister_client(id);
        }
    }

    pub fn mark_served(&self, url: &str) {
        self.served.write().insert(strip_hmr_query(url));
    }

    pub fn was_served(&self, url: &str) -> bool {
        self.served.read().contains(&strip_hmr_query(url))
    }

    /// Record an error the server cannot continue after and wake the
    /// command loop. The first report wins.
    pub fn report_fatal(&self, message: String) {
        let mut fatal = self.fatal.lock();
        if fatal.is_none() {
            tracing::error!("{message}");
            *fatal = Some(message);
            self.fatal_notify.notify_one();
        }
    }

    /// Resolves once [`report_fatal`](Self::report_fatal) has been called.
    pub async fn fatal_error(&self) -> String {
        loop {
            if let Some(message) = self.fatal.lock().clone() {
                return message;
            }
            self.fatal_notify.notified().await;
        }
    }

    /// Apply one file-system change: drop stale cache entries, then notify
    /// clients about the affected module.
    pub fn handle_file_change(&self, change: &FileChange) {
        let path = change.path();
        self.content.invalidate(path);
        if change.is_structural() {
            self.resolver.invalidate_fuzzy();
        }

        let request = self.resolver.file_to_request(path);
        self.rewriter.evict(&request);

        if let Some(payload) = self.hot.handle_change(&request, now_millis()) {
            self.broadcast(&payload);
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

pub type SharedState = Arc<DevState>;

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::ResolverOptions;
    use kiln_graph::ModuleRecord;
    use std::fs;

    fn state_in(dir: &std::path::Path) -> DevState {
        let resolver = Arc::new(Resolver::new(ResolverOptions::new(dir)));
        DevState::new(resolver, "development", IndexMap::new())
    }

    #[tokio::test]
    async fn broadcast_reaches_clients_and_drops_closed_ones() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        let (_, mut rx) = state.register_client();
        let (_, closed) = state.register_client();
        drop(closed);

        state.broadcast(&HmrPayload::Connected);

        assert_eq!(rx.recv().await.unwrap(), r#"{"type":"connected"}"#);
        assert_eq!(state.client_count(), 1);
    }

    #[tokio::test]
    async fn stalled_client_is_dropped_without_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        let (_, mut live) = state.register_client();
        let (_, stalled) = state.register_client();

        // The live client drains its queue; the stalled one never reads.
        for _ in 0..CLIENT_QUEUE {
            state.broadcast(&HmrPayload::Connected);
            live.recv().await.unwrap();
        }
        assert_eq!(state.client_count(), 2);

        state.broadcast(&HmrPayload::Connected);
        assert_eq!(live.recv().await.unwrap(), r#"{"type":"connected"}"#);
        assert_eq!(state.client_count(), 1);
        drop(stalled);
    }

    #[tokio::test]
    async fn file_change_updates_the_accepting_importer() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/dep.js"), "export const a = 1").unwrap();
        let state = state_in(dir.path());
        state.hot.record_module(
            "/src/main.js",
            ModuleRecord::importing(["/src/dep.js"]).with_accepted_deps(["/src/dep.js"]),
        );
        let (_, mut rx) = state.register_client();

        let file = dir.path().join("src/dep.js");
        state.content.read(&file).await.unwrap();
        state.handle_file_change(&FileChange::Modified(file.clone()));

        assert!(state.content.peek(&file).is_none());
        let message: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(message["type"], "update");
        assert_eq!(message["updates"][0]["path"], "/src/main.js");
        assert_eq!(message["updates"][0]["changeSrcPath"], "/src/dep.js");
    }

    #[tokio::test]
    async fn first_fatal_report_wins() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        state.report_fatal("first".into());
        state.report_fatal("second".into());
        assert_eq!(state.fatal_error().await, "first");
    }

    #[test]
    fn served_urls_are_tracked() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        assert!(!state.was_served("/src/main.js"));
        state.mark_served("/src/main.js");
        assert!(state.was_served("/src/main.js"));
    }

    #[test]
    fn served_urls_ignore_update_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        for t in 0..50 {
            state.mark_served(&format!("/src/main.js?t={t}"));
        }
        state.mark_served("/src/App.vue?type=style&index=0&t=3");

        assert_eq!(state.served.read().len(), 2);
        assert!(state.was_served("/src/main.js?t=99"));
        assert!(state.was_served("/src/App.vue?type=style&index=0"));
        assert!(!state.was_served("/src/App.vue"));
    }
}
