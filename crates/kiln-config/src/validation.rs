//! Schema checks that serde cannot express.

use crate::config::KilnConfig;
use crate::error::{ConfigError, Result};

/// Reject configurations the server cannot run with.
pub fn validate(config: &KilnConfig) -> Result<()> {
    if config.mode.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "mode cannot be empty".to_string(),
            hint: Some("use \"development\" or \"production\"".to_string()),
        });
    }

    for (key, target) in &config.alias {
        if key.is_empty() || target.is_empty() {
            return Err(ConfigError::Validation {
                message: format!("alias `{key}` -> `{target}` has an empty side"),
                hint: None,
            });
        }
        let key_is_dir = key.starts_with('/') && key.ends_with('/');
        if key_is_dir && !target.starts_with('/') {
            return Err(ConfigError::Validation {
                message: format!("directory alias `{key}` must map to a root-relative path"),
                hint: Some(format!("write it as \"/{}\"", target.trim_start_matches("./"))),
            });
        }
    }

    let deps = &config.optimize_deps;
    if let Some(id) = deps.include.iter().find(|id| deps.exclude.contains(id)) {
        return Err(ConfigError::Validation {
            message: format!("`{id}` is both included and excluded in optimize_deps"),
            hint: None,
        });
    }
    if let Some(id) = deps
        .include
        .iter()
        .chain(&deps.exclude)
        .chain(&deps.link)
        .chain(&deps.allow_node_builtins)
        .find(|id| id.trim().is_empty())
    {
        return Err(ConfigError::Validation {
            message: format!("optimize_deps contains an empty package id ({id:?})"),
            hint: Some("remove empty strings from the optimize_deps lists".to_string()),
        });
    }

    Ok(())
}
