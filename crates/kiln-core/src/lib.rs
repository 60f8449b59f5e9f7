//! # kiln-core
//!
//! Request resolution, module rewriting, hot-update bookkeeping and
//! dependency pre-bundling for the kiln dev server.
//!
//! The crate is transport-agnostic: it maps request paths to files and back,
//! turns module text into browser-loadable text, and tells the caller which
//! clients to notify when a file changes. The HTTP server, file watcher and
//! client channel live in `kiln-cli`.
//!
//! ```text
//!  request ──▶ Resolver::request_to_file ──▶ ContentCache::read
//!                                                  │
//!                                                  ▼
//!                         Rewriter::rewrite ──▶ HotEngine::record_module
//!
//!  file change ──▶ Resolver::file_to_request ──▶ HotEngine::handle_change ──▶ HmrPayload
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use kiln_core::{HotEngine, Resolver, ResolverOptions, Rewriter};
//!
//! # fn main() -> kiln_core::Result<()> {
//! let resolver = Arc::new(Resolver::new(ResolverOptions::new("/project")));
//! let rewriter = Rewriter::new(Arc::clone(&resolver), Arc::new(HotEngine::new()));
//! let code = rewriter.rewrite("/src/main.js", "import { h } from 'vue'")?;
//! assert!(code.contains("/@modules/vue"));
//! # Ok(()) }
//! ```

pub mod compile;
pub mod content_cache;
pub mod error;
pub mod hmr;
pub mod optimizer;
pub mod paths;
pub mod resolver;
pub mod rewrite;
pub mod scan;

pub use compile::{CompileOptions, CompileOutput, Compiler, OxcCompiler};
pub use content_cache::{CachedFile, CachedRead, ContentCache, WatchRegistrar};
pub use error::{Error, Result};
pub use hmr::{HmrPayload, HotEngine, Update, UpdateKind};
pub use optimizer::{
    DepBundler, OptimizeError, OptimizeOptions, OptimizeOutcome, RolldownBundler, optimize_deps,
};
pub use resolver::{Resolver, ResolverOptions};
pub use rewrite::Rewriter;
