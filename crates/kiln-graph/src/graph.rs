//! Interned importer/importee graph.

use indexmap::IndexSet;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

/// Dense identifier of an interned request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u32);

impl ModuleId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Default)]
struct Node {
    importers: FxHashSet<ModuleId>,
    importees: FxHashSet<ModuleId>,
    accept_self: bool,
    accepted_deps: FxHashSet<ModuleId>,
    declined: bool,
}

/// Everything one parse of a module contributes to the graph.
///
/// Built by the rewrite pipeline from a single scan of the module text and
/// applied with [`ModuleGraph::record_module`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleRecord {
    /// Resolved request paths of every static and literal dynamic import.
    pub importees: IndexSet<String>,
    /// `hot.accept()` with no dependency argument.
    pub accept_self: bool,
    /// Resolved request paths passed to `hot.accept(dep)` / `hot.acceptDeps(deps)`.
    pub accepted_deps: IndexSet<String>,
    /// `hot.decline()` was called.
    pub declined: bool,
}

impl ModuleRecord {
    /// Record with only import edges.
    pub fn importing<I, S>(importees: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            importees: importees.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_accept_self(mut self, accept_self: bool) -> Self {
        self.accept_self = accept_self;
        self
    }

    pub fn with_accepted_deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepted_deps = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_declined(mut self, declined: bool) -> Self {
        self.declined = declined;
        self
    }
}

/// Module graph keyed by interned request paths.
///
/// Invariant: `importers` and `importees` are mutual. If `b` is an importee
/// of `a` then `a` is an importer of `b`, and vice versa.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    ids: FxHashMap<Arc<str>, ModuleId>,
    paths: Vec<Arc<str>>,
    nodes: Vec<Node>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `path`, creating an empty node on first sight.
    pub fn intern(&mut self, path: &str) -> ModuleId {
        if let Some(id) = self.ids.get(path) {
            return *id;
        }
        let id = ModuleId(self.paths.len() as u32);
        let key: Arc<str> = Arc::from(path);
        self.ids.insert(Arc::clone(&key), id);
        self.paths.push(key);
        self.nodes.push(Node::default());
        id
    }

    pub fn id_of(&self, path: &str) -> Option<ModuleId> {
        self.ids.get(path).copied()
    }

    pub fn path(&self, id: ModuleId) -> &str {
        &self.paths[id.index()]
    }

    pub fn contains(&self, path: &str) -> bool {
        self.ids.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Apply one parse of `importer`.
    ///
    /// The outgoing edge set is replaced wholesale: accepted dependencies
    /// count as importees, stale back-references are pruned from the
    /// previous importees and the acceptance flags are overwritten.
    pub fn record_module(&mut self, importer: &str, record: ModuleRecord) {
        let id = self.intern(importer);

        let mut importees: IndexSet<&str> = record.importees.iter().map(String::as_str).collect();
        importees.extend(record.accepted_deps.iter().map(String::as_str));
        self.replace_importees(importer, importees);

        let accepted: FxHashSet<ModuleId> = record
            .accepted_deps
            .iter()
            .map(|dep| self.intern(dep))
            .collect();

        let node = &mut self.nodes[id.index()];
        node.accept_self = record.accept_self;
        node.accepted_deps = accepted;
        node.declined = record.declined;
    }

    /// Replace the outgoing edges of `importer` in one step.
    ///
    /// Self-imports are dropped; the graph never records a module as its own
    /// importer.
    pub fn replace_importees<'a, I>(&mut self, importer: &str, importees: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let id = self.intern(importer);
        let next: FxHashSet<ModuleId> = importees
            .into_iter()
            .map(|path| self.intern(path))
            .filter(|importee| *importee != id)
            .collect();

        let previous = std::mem::take(&mut self.nodes[id.index()].importees);
        for stale in previous.difference(&next) {
            self.nodes[stale.index()].importers.remove(&id);
        }
        for current in &next {
            self.nodes[current.index()].importers.insert(id);
        }
        self.nodes[id.index()].importees = next;
    }

    /// Importers of `path`, sorted by path for stable output.
    pub fn importers(&self, path: &str) -> Vec<&str> {
        self.id_of(path)
            .map(|id| self.sorted_paths(&self.nodes[id.index()].importers))
            .unwrap_or_default()
    }

    /// Importees of `path`, sorted by path for stable output.
    pub fn importees(&self, path: &str) -> Vec<&str> {
        self.id_of(path)
            .map(|id| self.sorted_paths(&self.nodes[id.index()].importees))
            .unwrap_or_default()
    }

    pub fn is_self_accepting(&self, path: &str) -> bool {
        self.id_of(path)
            .is_some_and(|id| self.nodes[id.index()].accept_self)
    }

    /// Whether `importer` accepts updates of `dep` on its behalf.
    pub fn accepts(&self, importer: &str, dep: &str) -> bool {
        match (self.id_of(importer), self.id_of(dep)) {
            (Some(importer), Some(dep)) => self.node_accepts(importer, dep),
            _ => false,
        }
    }

    pub fn is_declined(&self, path: &str) -> bool {
        self.id_of(path)
            .is_some_and(|id| self.nodes[id.index()].declined)
    }

    /// Check the mutual-edge invariant over the whole graph.
    pub fn is_consistent(&self) -> bool {
        self.nodes.iter().enumerate().all(|(index, node)| {
            let id = ModuleId(index as u32);
            node.importees
                .iter()
                .all(|importee| self.nodes[importee.index()].importers.contains(&id))
                && node
                    .importers
                    .iter()
                    .all(|importer| self.nodes[importer.index()].importees.contains(&id))
        })
    }

    pub(crate) fn node_accepts(&self, importer: ModuleId, dep: ModuleId) -> bool {
        let node = &self.nodes[importer.index()];
        if importer == dep {
            node.accept_self
        } else {
            node.accepted_deps.contains(&dep)
        }
    }

    pub(crate) fn node_declined(&self, id: ModuleId) -> bool {
        self.nodes[id.index()].declined
    }

    pub(crate) fn sorted_importers(&self, id: ModuleId) -> Vec<ModuleId> {
        let mut importers: Vec<ModuleId> =
            self.nodes[id.index()].importers.iter().copied().collect();
        importers.sort_by(|a, b| self.path(*a).cmp(self.path(*b)));
        importers
    }

    fn sorted_paths(&self, ids: &FxHashSet<ModuleId>) -> Vec<&str> {
        let mut paths: Vec<&str> = ids.iter().map(|id| self.path(*id)).collect();
        paths.sort_unstable();
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_stable() {
        let mut graph = ModuleGraph::new();
        let a = graph.intern("/a.js");
        let b = graph.intern("/b.js");
        assert_ne!(a, b);
        assert_eq!(graph.intern("/a.js"), a);
        assert_eq!(graph.path(b), "/b.js");
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn replace_importees_prunes_stale_back_references() {
        let mut graph = ModuleGraph::new();
        graph.replace_importees("/a.js", ["/b.js", "/c.js"]);
        assert_eq!(graph.importers("/b.js"), vec!["/a.js"]);
        assert_eq!(graph.importers("/c.js"), vec!["/a.js"]);

        graph.replace_importees("/a.js", ["/c.js", "/d.js"]);
        assert!(graph.importers("/b.js").is_empty());
        assert_eq!(graph.importers("/c.js"), vec!["/a.js"]);
        assert_eq!(graph.importers("/d.js"), vec!["/a.js"]);
        assert_eq!(graph.importees("/a.js"), vec!["/c.js", "/d.js"]);
        assert!(graph.is_consistent());
    }

    #[test]
    fn self_imports_are_ignored() {
        let mut graph = ModuleGraph::new();
        graph.replace_importees("/a.js", ["/a.js"]);
        assert!(graph.importers("/a.js").is_empty());
        assert!(graph.importees("/a.js").is_empty());
    }

    #[test]
    fn record_module_overwrites_acceptance() {
        let mut graph = ModuleGraph::new();
        graph.record_module(
            "/b.js",
            ModuleRecord::importing(["/c.js"])
                .with_accepted_deps(["/c.js"])
                .with_declined(true),
        );
        assert!(graph.accepts("/b.js", "/c.js"));
        assert!(graph.is_declined("/b.js"));

        graph.record_module("/b.js", ModuleRecord::importing(["/c.js"]).with_accept_self(true));
        assert!(!graph.accepts("/b.js", "/c.js"));
        assert!(!graph.is_declined("/b.js"));
        assert!(graph.is_self_accepting("/b.js"));
        assert!(graph.accepts("/b.js", "/b.js"));
    }

    #[test]
    fn accepted_deps_become_edges() {
        let mut graph = ModuleGraph::new();
        graph.record_module(
            "/b.js",
            ModuleRecord::default().with_accepted_deps(["/dep.js"]),
        );
        assert_eq!(graph.importers("/dep.js"), vec!["/b.js"]);
        assert!(graph.is_consistent());
    }

    #[test]
    fn unknown_paths_answer_negatively() {
        let graph = ModuleGraph::new();
        assert!(graph.importers("/nope.js").is_empty());
        assert!(!graph.is_self_accepting("/nope.js"));
        assert!(!graph.accepts("/a.js", "/nope.js"));
        assert!(!graph.is_declined("/nope.js"));
    }
}
