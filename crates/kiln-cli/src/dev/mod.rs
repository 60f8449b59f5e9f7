//! Dev server: HTTP routes, module pipeline, file watching and the
//! hot-update channel.

pub mod middleware;
pub mod server;
pub mod state;
pub mod watcher;

pub use middleware::{ModuleRequest, Served, serve};
pub use server::{DevServer, build_router};
pub use state::{DevState, SharedState};
pub use watcher::{DEFAULT_IGNORES, FileChange, FileWatcher, collect_burst};
