//! Layered configuration loading.
//!
//! Priority, highest last: built-in defaults, the discovered config file,
//! `KILN_`-prefixed environment variables (`__` separates nested keys, so
//! `KILN_SERVER__PORT=4000`), then command-line flags.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Serialized},
};
use kiln_config::{ConfigDiscovery, ENV_PREFIX, KilnConfig, read_value};
use serde::Serialize;

use crate::cli::{DevArgs, OptimizeArgs};
use crate::error::{ConfigError, Result};

/// Configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: KilnConfig,
    /// Absolute project root.
    pub root: PathBuf,
    /// Discovered config file, folded into the dependency hash.
    pub path: Option<PathBuf>,
}

/// Flags that override configuration values. Unset flags leave the lower
/// layers alone.
#[derive(Debug, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "ServerOverrides::is_empty")]
    server: ServerOverrides,
}

#[derive(Debug, Default, Serialize)]
struct ServerOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    open: Option<bool>,
}

impl ServerOverrides {
    fn is_empty(&self) -> bool {
        self.host.is_none() && self.port.is_none() && self.open.is_none()
    }
}

impl From<&DevArgs> for Overrides {
    fn from(args: &DevArgs) -> Self {
        Self {
            server: ServerOverrides {
                host: args.host.clone(),
                port: args.port,
                open: args.open.then_some(true),
            },
        }
    }
}

impl From<&OptimizeArgs> for Overrides {
    fn from(_: &OptimizeArgs) -> Self {
        Self::default()
    }
}

impl LoadedConfig {
    /// Load configuration for the project in `cwd` (or the process working
    /// directory).
    pub fn load(cwd: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let cwd = match cwd {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir()?,
        };
        if !cwd.is_dir() {
            return Err(ConfigError::RootNotFound(cwd).into());
        }
        let cwd = cwd.canonicalize()?;

        let discovery = ConfigDiscovery::new(&cwd);
        let path = discovery.find();

        // The file is parsed on its own first so camelCase aliases collapse
        // onto the canonical keys before layering.
        let file_config = match &path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config file");
                let value = read_value(path).map_err(ConfigError::from)?;
                KilnConfig::from_value(value).map_err(ConfigError::from)?
            }
            None => KilnConfig::default(),
        };

        let figment = Figment::new()
            .merge(Serialized::defaults(file_config))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides));

        let config: KilnConfig = figment.extract().map_err(|err| ConfigError::InvalidValue {
            field: "configuration".to_string(),
            value: err.to_string(),
            hint: "Check kiln.toml syntax and field types".to_string(),
        })?;
        kiln_config::validate(&config).map_err(ConfigError::from)?;

        let root = config.resolve_root(&cwd);
        if !root.is_dir() {
            return Err(ConfigError::RootNotFound(root).into());
        }

        Ok(Self { config, root, path })
    }

    pub fn public_dir(&self) -> PathBuf {
        self.config.resolve_public_dir(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    #[serial]
    fn flags_override_the_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("kiln.toml"),
            "[server]\nport = 4000\nhost = \"0.0.0.0\"\n",
        )
        .unwrap();

        let args = DevArgs {
            port: Some(5000),
            ..DevArgs::default()
        };
        let loaded = LoadedConfig::load(Some(dir.path()), Overrides::from(&args)).unwrap();
        assert_eq!(loaded.config.server.port, 5000);
        assert_eq!(loaded.config.server.host, "0.0.0.0");
        assert!(loaded.path.is_some());
    }

    #[test]
    #[serial]
    fn environment_sits_between_file_and_flags() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("kiln.toml"), "mode = \"staging\"\n").unwrap();

        // SAFETY: serialized with every other test touching the environment.
        unsafe { std::env::set_var("KILN_MODE", "production") };
        let loaded = LoadedConfig::load(Some(dir.path()), Overrides::default());
        unsafe { std::env::remove_var("KILN_MODE") };

        assert!(loaded.unwrap().config.is_production());
    }

    #[test]
    #[serial]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = LoadedConfig::load(Some(dir.path()), Overrides::default()).unwrap();
        assert_eq!(loaded.config.server.port, 3000);
        assert!(loaded.path.is_none());
        assert_eq!(loaded.public_dir(), loaded.root.join("public"));
    }

    #[test]
    #[serial]
    fn missing_root_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = LoadedConfig::load(Some(&dir.path().join("nope")), Overrides::default())
            .unwrap_err();
        assert!(err.to_string().contains("Project root not found"));
    }
}
