//! Kiln CLI - serves a project's ES modules straight from disk.
//!
//! The binary wires the library crates together:
//!
//! - [`cli`] - argument parsing with clap
//! - [`config`] - layered configuration (defaults, file, environment, flags)
//! - [`error`] - CLI error types with remediation hints
//! - [`logger`] - tracing subscriber setup
//! - [`ui`] - terminal status lines and spinners
//! - [`dev`] - HTTP + WebSocket dev server, file watcher, request middleware
//! - `commands` - `kiln dev` and `kiln optimize`
//!
//! # Example
//!
//! ```rust,no_run
//! use kiln_cli::{error::Result, logger};
//!
//! fn main() -> Result<()> {
//!     logger::init_logger(false, false, false);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod dev;
pub mod error;
pub mod logger;
pub mod ui;

pub use error::{BuildError, CliError, ConfigError, Result};
