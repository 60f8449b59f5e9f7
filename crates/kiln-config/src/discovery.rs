//! File-based config discovery.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::KilnConfig;
use crate::error::{ConfigError, Result};

/// Config file looked up in the project root.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Field of `package.json` holding inline configuration.
pub const PACKAGE_JSON_FIELD: &str = "kiln";

/// Finds and reads the project's configuration.
///
/// ```no_run
/// use kiln_config::ConfigDiscovery;
///
/// let discovery = ConfigDiscovery::new(".");
/// let config = discovery.load().unwrap();
/// ```
pub struct ConfigDiscovery {
    root: PathBuf,
}

impl ConfigDiscovery {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Config file in the root directory: `kiln.toml`, then a
    /// `package.json` with a non-null `kiln` field.
    pub fn find(&self) -> Option<PathBuf> {
        let toml_path = self.root.join(CONFIG_FILE);
        if toml_path.is_file() {
            return Some(toml_path);
        }

        let pkg_path = self.root.join("package.json");
        let has_field = fs::read_to_string(&pkg_path)
            .ok()
            .and_then(|content| serde_json::from_str::<Value>(&content).ok())
            .and_then(|parsed| parsed.get(PACKAGE_JSON_FIELD).cloned())
            .is_some_and(|field| !field.is_null());
        has_field.then_some(pkg_path)
    }

    /// Load the discovered file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if there is no config file.
    pub fn load(&self) -> Result<KilnConfig> {
        let path = self.find().ok_or(ConfigError::NotFound)?;
        KilnConfig::from_value(read_value(&path)?)
    }

    /// Load the discovered file, or defaults when there is none.
    pub fn load_or_default(&self) -> Result<(KilnConfig, Option<PathBuf>)> {
        match self.find() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config");
                let config = KilnConfig::from_value(read_value(&path)?)?;
                Ok((config, Some(path)))
            }
            None => Ok((KilnConfig::default(), None)),
        }
    }
}

/// Raw configuration table of `path`: the whole TOML document, or the
/// `kiln` field of a `package.json`.
pub fn read_value(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)?;

    if path.file_name().is_some_and(|name| name == "package.json") {
        let parsed: Value =
            serde_json::from_str(&content).map_err(|err| ConfigError::InvalidValue {
                field: "package.json".to_string(),
                hint: Some(format!("invalid JSON: {err}")),
            })?;
        return match parsed.get(PACKAGE_JSON_FIELD) {
            Some(value) if !value.is_null() => Ok(value.clone()),
            _ => Err(ConfigError::InvalidValue {
                field: PACKAGE_JSON_FIELD.to_string(),
                hint: Some("add a 'kiln' field to your package.json".to_string()),
            }),
        };
    }

    let table: toml::Table = toml::from_str(&content).map_err(|err| ConfigError::InvalidValue {
        field: "toml".to_string(),
        hint: Some(format!("invalid TOML syntax: {err}")),
    })?;
    serde_json::to_value(table).map_err(|err| ConfigError::InvalidValue {
        field: "toml".to_string(),
        hint: Some(format!("TOML to JSON conversion failed: {err}")),
    })
}
