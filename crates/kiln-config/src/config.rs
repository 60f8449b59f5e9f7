//! Configuration model.
//!
//! Every field has a serde default so partial files (and the empty table)
//! deserialize. Keys are snake_case; the camelCase spellings common in
//! `package.json` are accepted as aliases.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigError, Result};

/// Prefix of process environment variables exposed to modules.
pub const ENV_PREFIX: &str = "KILN_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KilnConfig {
    /// Project root, relative to the working directory.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default = "default_mode")]
    pub mode: String,

    /// Alias rules in priority order. Keys wrapped in slashes (`/@/`) are
    /// directory aliases; the rest are exact specifier aliases.
    #[serde(default)]
    pub alias: IndexMap<String, String>,

    /// Entries exposed through the environment snapshot module.
    #[serde(default)]
    pub env: IndexMap<String, String>,

    /// Defaults to `<root>/public`.
    #[serde(default, alias = "publicDir")]
    pub public_dir: Option<PathBuf>,

    #[serde(default, alias = "optimizeDeps")]
    pub optimize_deps: OptimizeDepsConfig,

    #[serde(default)]
    pub server: ServerOptions,
}

impl Default for KilnConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            mode: default_mode(),
            alias: IndexMap::new(),
            env: IndexMap::new(),
            public_dir: None,
            optimize_deps: OptimizeDepsConfig::default(),
            server: ServerOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeDepsConfig {
    /// Force-included ids; deep paths are allowed.
    #[serde(default)]
    pub include: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,

    /// Linked monorepo packages whose dependencies are classified too.
    #[serde(default)]
    pub link: Vec<String>,

    #[serde(default, alias = "allowNodeBuiltins")]
    pub allow_node_builtins: Vec<String>,

    /// Pre-bundle when the dev server starts.
    #[serde(default = "default_true")]
    pub auto: bool,
}

impl Default for OptimizeDepsConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            link: Vec::new(),
            allow_node_builtins: Vec::new(),
            auto: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerOptions {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Open the browser once the server is listening.
    #[serde(default)]
    pub open: bool,

    #[serde(default = "default_true")]
    pub cors: bool,

    /// Quiet period before a burst of file events is processed.
    #[serde(default = "default_debounce_ms", alias = "debounceMs")]
    pub debounce_ms: u64,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            open: false,
            cors: true,
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl KilnConfig {
    /// Build from a JSON value (the `kiln` field of `package.json`, a parsed
    /// TOML table, or a programmatic value).
    ///
    /// ```
    /// use kiln_config::KilnConfig;
    /// use serde_json::json;
    ///
    /// let config = KilnConfig::from_value(json!({
    ///     "optimizeDeps": { "include": ["lodash-es/debounce"] },
    ///     "server": { "port": 4000 }
    /// }))
    /// .unwrap();
    /// assert_eq!(config.optimize_deps.include, ["lodash-es/debounce"]);
    /// assert_eq!(config.server.port, 4000);
    /// assert_eq!(config.mode, "development");
    /// ```
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|err| ConfigError::InvalidValue {
            field: "config".to_string(),
            hint: Some(err.to_string()),
        })
    }

    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|err| ConfigError::InvalidValue {
            field: "config".to_string(),
            hint: Some(err.to_string()),
        })
    }

    /// Absolute project root.
    pub fn resolve_root(&self, cwd: &Path) -> PathBuf {
        if self.root.is_absolute() {
            self.root.clone()
        } else {
            cwd.join(&self.root)
        }
    }

    /// Absolute public directory for a resolved `root`.
    pub fn resolve_public_dir(&self, root: &Path) -> PathBuf {
        match &self.public_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => root.join(dir),
            None => root.join("public"),
        }
    }

    pub fn is_production(&self) -> bool {
        self.mode == "production"
    }

    /// Configured `env` entries merged with `KILN_`-prefixed variables from
    /// `vars`. Configured entries win.
    pub fn env_snapshot<I>(&self, vars: I) -> IndexMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut env: IndexMap<String, String> = vars
            .into_iter()
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .collect();
        env.sort_keys();
        for (key, value) in &self.env {
            env.insert(key.clone(), value.clone());
        }
        env
    }

    /// Alias rules as ordered pairs.
    pub fn alias_entries(&self) -> Vec<(String, String)> {
        self.alias
            .iter()
            .map(|(key, target)| (key.clone(), target.clone()))
            .collect()
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_mode() -> String {
    "development".into()
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    3000
}

fn default_debounce_ms() -> u64 {
    50
}

fn default_true() -> bool {
    true
}
