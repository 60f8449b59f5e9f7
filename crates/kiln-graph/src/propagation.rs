//! Hot-update propagation.
//!
//! Walks importer edges upward from a changed module until every branch
//! either reaches a module that accepts the update (a boundary) or runs out
//! of importers (a dead end). A single dead end forces a full reload: a
//! partial update would leave stale module instances next to new ones.

use indexmap::IndexSet;

use crate::graph::{ModuleGraph, ModuleId};

/// Outcome of propagating a change through the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Propagation {
    /// Nothing imports the module and it does not accept itself.
    Unreferenced,
    /// Some branch has no accepting module; the page must reload.
    FullReload,
    /// Every branch ends in a boundary.
    Update(HotUpdate),
}

/// Boundaries and dirty modules of a scoped update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HotUpdate {
    /// Modules that re-execute and absorb the update, in discovery order.
    pub boundaries: Vec<String>,
    /// Modules between the changed file and its boundaries, inclusive. These
    /// are force-refetched once for the change timestamp.
    pub dirty: IndexSet<String>,
}

struct Walk {
    boundaries: IndexSet<ModuleId>,
    dirty: IndexSet<ModuleId>,
}

impl ModuleGraph {
    /// Propagate a change of `changed` through the graph.
    ///
    /// `is_component` identifies template-component modules; they always act
    /// as boundaries for their importees and are themselves marked dirty.
    pub fn propagate<F>(&self, changed: &str, is_component: F) -> Propagation
    where
        F: Fn(&str) -> bool,
    {
        let Some(id) = self.id_of(changed) else {
            return Propagation::Unreferenced;
        };

        let importers = self.sorted_importers(id);
        if importers.is_empty() && !self.node_accepts(id, id) {
            return Propagation::Unreferenced;
        }

        let mut walk = Walk {
            boundaries: IndexSet::new(),
            dirty: IndexSet::from([id]),
        };
        let mut chain = Vec::new();

        let dead_end = self.walk(id, &importers, &mut walk, &mut chain, &is_component);
        if dead_end || walk.boundaries.is_empty() {
            return Propagation::FullReload;
        }

        Propagation::Update(HotUpdate {
            boundaries: walk
                .boundaries
                .iter()
                .map(|id| self.path(*id).to_string())
                .collect(),
            dirty: walk
                .dirty
                .iter()
                .map(|id| self.path(*id).to_string())
                .collect(),
        })
    }

    /// Returns `true` when a dead end was reached.
    fn walk<F>(
        &self,
        importee: ModuleId,
        importers: &[ModuleId],
        walk: &mut Walk,
        chain: &mut Vec<ModuleId>,
        is_component: &F,
    ) -> bool
    where
        F: Fn(&str) -> bool,
    {
        if self.node_declined(importee) {
            return true;
        }

        if self.node_accepts(importee, importee) {
            walk.boundaries.insert(importee);
            walk.dirty.insert(importee);
            return false;
        }

        for &importer in importers {
            let component = is_component(self.path(importer));
            if component
                || self.node_accepts(importer, importee)
                || self.node_accepts(importer, importer)
            {
                walk.boundaries.insert(importer);
                walk.dirty.insert(importer);
                walk.dirty.extend(chain.iter().copied());
                continue;
            }

            let parents = self.sorted_importers(importer);
            if parents.is_empty() {
                return true;
            }
            if chain.contains(&importer) {
                continue;
            }

            chain.push(importer);
            let dead_end = self.walk(importer, &parents, walk, chain, is_component);
            chain.pop();
            if dead_end {
                return true;
            }
        }

        false
    }
}
