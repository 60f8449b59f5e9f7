//! Config file discovery and loading.

use std::fs;
use std::path::PathBuf;

use kiln_config::{ConfigDiscovery, ConfigError, KilnConfig};
use tempfile::TempDir;

#[test]
fn discovers_kiln_toml() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("kiln.toml"),
        r#"
mode = "production"

[alias]
"/@/" = "/src/components"
react = "preact/compat"

[optimize_deps]
include = ["lodash-es/debounce"]
auto = false

[server]
port = 4000
"#,
    )
    .unwrap();

    let discovery = ConfigDiscovery::new(dir.path());
    let found = discovery.find().unwrap();
    assert_eq!(found.file_name().unwrap(), "kiln.toml");

    let config = discovery.load().unwrap();
    assert!(config.is_production());
    assert_eq!(
        config.alias_entries(),
        vec![
            ("/@/".to_string(), "/src/components".to_string()),
            ("react".to_string(), "preact/compat".to_string()),
        ]
    );
    assert_eq!(config.optimize_deps.include, ["lodash-es/debounce"]);
    assert!(!config.optimize_deps.auto);
    assert_eq!(config.server.port, 4000);
    assert_eq!(config.server.host, "127.0.0.1");
}

#[test]
fn discovers_package_json_field() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("package.json"),
        r#"{
  "name": "app",
  "kiln": {
    "publicDir": "static",
    "optimizeDeps": { "allowNodeBuiltins": ["readable-stream"] }
  }
}"#,
    )
    .unwrap();

    let discovery = ConfigDiscovery::new(dir.path());
    assert_eq!(discovery.find().unwrap().file_name().unwrap(), "package.json");

    let config = discovery.load().unwrap();
    assert_eq!(config.public_dir, Some(PathBuf::from("static")));
    assert_eq!(config.optimize_deps.allow_node_builtins, ["readable-stream"]);
}

#[test]
fn toml_wins_over_package_json() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("kiln.toml"), "mode = \"staging\"").unwrap();
    fs::write(
        dir.path().join("package.json"),
        r#"{"kiln": {"mode": "production"}}"#,
    )
    .unwrap();

    let config = ConfigDiscovery::new(dir.path()).load().unwrap();
    assert_eq!(config.mode, "staging");
}

#[test]
fn package_json_without_field_is_not_config() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("package.json"), r#"{"name": "app", "kiln": null}"#).unwrap();

    let discovery = ConfigDiscovery::new(dir.path());
    assert!(discovery.find().is_none());
    assert!(matches!(discovery.load(), Err(ConfigError::NotFound)));

    let (config, path) = discovery.load_or_default().unwrap();
    assert_eq!(config, KilnConfig::default());
    assert!(path.is_none());
}

#[test]
fn invalid_toml_is_reported() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("kiln.toml"), "mode = ").unwrap();

    let err = ConfigDiscovery::new(dir.path()).load().unwrap_err();
    assert!(err.to_string().contains("invalid TOML syntax"));
}
