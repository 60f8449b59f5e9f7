//! # kiln-graph
//!
//! Pure data structures for the dev server's module graph.
//!
//! The graph records, for every served module, which modules it imports
//! (importees), which modules import it (importers) and what it declared
//! through the hot-update handle (self-accept, accepted dependencies,
//! decline). It performs no I/O: the rewrite pipeline feeds it one
//! [`ModuleRecord`] per served module and the hot-update engine asks it to
//! [`propagate`](ModuleGraph::propagate) a change.
//!
//! ## Representation
//!
//! Request paths are interned into dense [`ModuleId`]s. Nodes live in a
//! `Vec` indexed by id and hold adjacency sets of ids, so cycles in the
//! import graph are plain data and edge replacement is a pair of set
//! operations.
//!
//! ```text
//!   "/src/main.ts" ──intern──▶ ModuleId(0) ──▶ Node { importees: {1, 2}, .. }
//!   "/src/app.ts"  ──intern──▶ ModuleId(1) ──▶ Node { importers: {0}, .. }
//! ```
//!
//! ## Example
//!
//! ```rust
//! use kiln_graph::{ModuleGraph, ModuleRecord, Propagation};
//!
//! let mut graph = ModuleGraph::new();
//! graph.record_module("/main.js", ModuleRecord::importing(["/app.js"]));
//! graph.record_module(
//!     "/app.js",
//!     ModuleRecord::importing(["/util.js"]).with_accept_self(true),
//! );
//!
//! match graph.propagate("/util.js", |_| false) {
//!     Propagation::Update(update) => assert_eq!(update.boundaries, vec!["/app.js"]),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

mod graph;
mod propagation;

pub use graph::{ModuleGraph, ModuleId, ModuleRecord};
pub use propagation::{HotUpdate, Propagation};
