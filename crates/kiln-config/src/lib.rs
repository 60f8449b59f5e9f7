//! Configuration for the kiln dev server: the typed model with its
//! defaults, `kiln.toml` / `package.json#kiln` discovery and validation.
//! Layering with the environment and command-line flags happens in the CLI.

pub mod config;
pub mod discovery;
pub mod error;
pub mod validation;

pub use config::{ENV_PREFIX, KilnConfig, OptimizeDepsConfig, ServerOptions};
pub use discovery::{CONFIG_FILE, ConfigDiscovery, PACKAGE_JSON_FIELD, read_value};
pub use error::{ConfigError, Result};
pub use validation::validate;
