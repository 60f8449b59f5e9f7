//! Command implementations.
//!
//! - [`dev`] - dev server with hot updates
//! - [`optimize`] - dependency pre-bundling on its own
//!
//! Each command exposes an `execute` function taking its parsed arguments.

pub mod dev;
pub mod optimize;
pub(crate) mod utils;

pub use dev::execute as dev_execute;
pub use optimize::execute as optimize_execute;
