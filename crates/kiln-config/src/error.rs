//! Error types for configuration loading and validation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config not found")]
    NotFound,

    #[error("invalid config value for `{field}`{}", hint_suffix(.hint))]
    InvalidValue { field: String, hint: Option<String> },

    #[error("{message}{}", hint_suffix(.hint))]
    Validation {
        message: String,
        hint: Option<String>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn hint_suffix(hint: &Option<String>) -> String {
    hint.as_deref()
        .map(|hint| format!(": {hint}"))
        .unwrap_or_default()
}
