//! Error types for the kiln CLI.
//!
//! - [`CliError`] is what commands return
//! - [`ConfigError`] and [`BuildError`] carry a remediation hint in their
//!   message
//!
//! `main` turns the final error into a `miette::Report`.

mod miette;

pub use self::miette::cli_error_to_miette;

use std::path::PathBuf;

use kiln_core::OptimizeError;
use thiserror::Error;

/// Top-level CLI error.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Dev server failures (bind, serve).
    #[error("Server error: {0}")]
    Server(String),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// Errors surfaced by the resolver or rewrite pipeline.
    #[error("{0}")]
    Core(#[from] kiln_core::Error),
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}\n\nHint: Check kiln.toml or the \"kiln\" field of package.json")]
    Load(#[from] kiln_config::ConfigError),

    #[error("Invalid value for '{field}': {value}\n\nHint: {hint}")]
    InvalidValue {
        field: String,
        value: String,
        hint: String,
    },

    #[error("Project root not found: {}\n\nHint: Pass an existing directory with --cwd or set `root` in kiln.toml", .0.display())]
    RootNotFound(PathBuf),
}

/// Failures of the pre-bundle step and fatal server invariants.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{source}{}", hint_suffix(.hint))]
    PreBundle {
        source: OptimizeError,
        hint: Option<String>,
    },

    #[error("Module graph inconsistency: {0}\n\nHint: The resolver mapped one request to two files; restart the server and report the request above")]
    GraphInconsistency(String),
}

impl From<OptimizeError> for BuildError {
    fn from(source: OptimizeError) -> Self {
        let hint = source.tip().map(String::from);
        Self::PreBundle { source, hint }
    }
}

impl From<OptimizeError> for CliError {
    fn from(err: OptimizeError) -> Self {
        Self::Build(err.into())
    }
}

fn hint_suffix(hint: &Option<String>) -> String {
    hint.as_ref()
        .map(|hint| format!("\n\nHint: {hint}"))
        .unwrap_or_default()
}

pub type Result<T, E = CliError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_builtin_failure_carries_the_tip() {
        let err: CliError = OptimizeError::NodeBuiltin {
            package: "request".into(),
            builtin: "http".into(),
            importer: "node_modules/request/index.js".into(),
        }
        .into();
        let msg = err.to_string();
        assert!(msg.starts_with("Build error: dependency \"request\""));
        assert!(msg.contains("\n\nHint: Make sure your \"dependencies\""));
    }

    #[test]
    fn bundle_failure_has_no_hint() {
        let err: BuildError = OptimizeError::Bundle {
            message: "boom".into(),
        }
        .into();
        assert_eq!(err.to_string(), "dependency pre-bundling failed: boom");
    }

    #[test]
    fn config_errors_hint_at_the_files() {
        let err: CliError = ConfigError::from(kiln_config::ConfigError::NotFound).into();
        assert!(matches!(err, CliError::Config(_)));
        assert!(err.to_string().contains("Hint: Check kiln.toml"));
    }

    #[test]
    fn graph_inconsistency_points_at_a_restart() {
        let err: CliError = BuildError::GraphInconsistency("\"/a\" vs \"/a.js\"".into()).into();
        let msg = err.to_string();
        assert!(msg.starts_with("Build error: Module graph inconsistency: \"/a\" vs \"/a.js\""));
        assert!(msg.contains("Hint: The resolver mapped one request to two files"));
    }

    #[test]
    fn missing_root_names_the_directory() {
        let err: CliError = ConfigError::RootNotFound(PathBuf::from("/nope")).into();
        assert!(err.to_string().contains("Project root not found: /nope"));
    }
}
