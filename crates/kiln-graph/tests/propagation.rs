//! Propagation scenarios and graph invariants.

use kiln_graph::{ModuleGraph, ModuleRecord, Propagation};
use proptest::prelude::*;

fn is_vue(path: &str) -> bool {
    path.ends_with(".vue")
}

#[test]
fn self_accepting_module_is_its_own_boundary() {
    let mut graph = ModuleGraph::new();
    graph.record_module("/main.js", ModuleRecord::importing(["/a.js"]));
    graph.record_module("/a.js", ModuleRecord::default().with_accept_self(true));

    let Propagation::Update(update) = graph.propagate("/a.js", is_vue) else {
        panic!("self-accepting module must never force a reload");
    };
    assert_eq!(update.boundaries, vec!["/a.js"]);
    assert_eq!(update.dirty.len(), 1);
    assert!(update.dirty.contains("/a.js"));
}

#[test]
fn self_accepting_entry_without_importers_updates() {
    let mut graph = ModuleGraph::new();
    graph.record_module("/a.js", ModuleRecord::default().with_accept_self(true));

    let Propagation::Update(update) = graph.propagate("/a.js", is_vue) else {
        panic!("expected update");
    };
    assert_eq!(update.boundaries, vec!["/a.js"]);
}

#[test]
fn chain_without_acceptance_reloads() {
    let mut graph = ModuleGraph::new();
    graph.record_module("/a.js", ModuleRecord::importing(["/b.js"]));
    graph.record_module("/b.js", ModuleRecord::importing(["/c.js"]));
    graph.record_module("/c.js", ModuleRecord::default());

    assert_eq!(graph.propagate("/c.js", is_vue), Propagation::FullReload);
}

#[test]
fn dependency_accept_stops_at_acceptor() {
    let mut graph = ModuleGraph::new();
    graph.record_module("/a.js", ModuleRecord::importing(["/b.js"]));
    graph.record_module(
        "/b.js",
        ModuleRecord::importing(["/c.js"]).with_accepted_deps(["/c.js"]),
    );

    let Propagation::Update(update) = graph.propagate("/c.js", is_vue) else {
        panic!("expected update");
    };
    assert_eq!(update.boundaries, vec!["/b.js"]);
    let mut dirty: Vec<&str> = update.dirty.iter().map(String::as_str).collect();
    dirty.sort_unstable();
    assert_eq!(dirty, vec!["/b.js", "/c.js"]);
}

#[test]
fn unimported_module_is_a_no_op() {
    let mut graph = ModuleGraph::new();
    graph.record_module("/orphan.js", ModuleRecord::importing(["/x.js"]));

    assert_eq!(graph.propagate("/orphan.js", is_vue), Propagation::Unreferenced);
}

#[test]
fn multiple_boundaries_are_collected() {
    let mut graph = ModuleGraph::new();
    graph.record_module("/left.js", ModuleRecord::importing(["/shared.js"]).with_accept_self(true));
    graph.record_module("/right.js", ModuleRecord::importing(["/shared.js"]).with_accept_self(true));

    let Propagation::Update(update) = graph.propagate("/shared.js", is_vue) else {
        panic!("expected update");
    };
    assert_eq!(update.boundaries, vec!["/left.js", "/right.js"]);
}

#[test]
fn reparse_removes_old_edges_from_propagation() {
    let mut graph = ModuleGraph::new();
    graph.record_module("/a.js", ModuleRecord::importing(["/b.js"]).with_accept_self(true));
    graph.record_module("/a.js", ModuleRecord::default().with_accept_self(true));

    assert_eq!(graph.propagate("/b.js", is_vue), Propagation::Unreferenced);
}

fn path_strategy() -> impl Strategy<Value = String> {
    (0u8..8).prop_map(|n| format!("/m{n}.js"))
}

proptest! {
    #[test]
    fn edges_stay_mutual_under_arbitrary_reparses(
        parses in prop::collection::vec(
            (path_strategy(), prop::collection::vec(path_strategy(), 0..5), prop::collection::vec(path_strategy(), 0..2)),
            1..40,
        )
    ) {
        let mut graph = ModuleGraph::new();
        for (importer, importees, accepted) in parses {
            graph.record_module(
                &importer,
                ModuleRecord::importing(importees).with_accepted_deps(accepted),
            );
            prop_assert!(graph.is_consistent());
        }
    }

    #[test]
    fn propagation_always_terminates(
        edges in prop::collection::vec((path_strategy(), path_strategy(), any::<bool>()), 1..30),
        changed in path_strategy(),
    ) {
        let mut graph = ModuleGraph::new();
        for (importer, importee, accept_self) in edges {
            let mut importees: Vec<String> = graph.importees(&importer).into_iter().map(String::from).collect();
            importees.push(importee);
            graph.record_module(&importer, ModuleRecord::importing(importees).with_accept_self(accept_self));
        }
        if let Propagation::Update(update) = graph.propagate(&changed, is_vue) {
            prop_assert!(!update.boundaries.is_empty());
            prop_assert!(update.dirty.contains(changed.as_str()));
        }
    }
}
