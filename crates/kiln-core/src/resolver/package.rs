//! Package manifests and node_modules lookup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use super::fuzzy::fuzzy_postfix;
use crate::paths::{SUPPORTED_EXTS, is_file, posix_normalize};

/// Manifest fields consulted for a package entry, first string wins.
pub const MAIN_FIELDS: [&str; 5] = ["module", "jsnext", "jsnext:main", "browser", "main"];

/// Resolved entry of a third-party package.
#[derive(Debug, Clone)]
pub struct PackageEntryInfo {
    /// Deep specifier of the entry, e.g. `vue/dist/vue.runtime.esm-bundler.js`.
    pub entry_specifier: String,
    pub entry_file: PathBuf,
    pub manifest_path: PathBuf,
    pub manifest: Arc<Value>,
}

impl PackageEntryInfo {
    /// Directory holding the manifest.
    pub fn package_dir(&self) -> &Path {
        self.manifest_path.parent().unwrap_or(Path::new("/"))
    }
}

/// Why a package entry could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PackageError {
    #[error("cannot find package.json for \"{0}\"")]
    NotFound(String),

    #[error("invalid package.json at {}: {message}", .path.display())]
    InvalidManifest { path: PathBuf, message: String },

    #[error("dependency \"{package}\" declares non-existent entry file {}", .entry.display())]
    MissingEntryFile { package: String, entry: PathBuf },
}

/// Read and parse a manifest.
pub fn read_manifest(path: &Path) -> Result<Value, PackageError> {
    let invalid = |message: String| PackageError::InvalidManifest {
        path: path.to_path_buf(),
        message,
    };
    let text = std::fs::read_to_string(path).map_err(|err| invalid(err.to_string()))?;
    serde_json::from_str(&text).map_err(|err| invalid(err.to_string()))
}

/// Entry path declared by a manifest, relative to its directory.
pub fn manifest_entry(manifest: &Value) -> String {
    let entry = MAIN_FIELDS
        .iter()
        .find_map(|field| manifest.get(*field).and_then(Value::as_str))
        .unwrap_or("index.js");

    match manifest.get("browser").and_then(Value::as_object) {
        Some(map) => map_with_browser_field(entry, map),
        None => entry.to_string(),
    }
}

/// Apply an object-valued `browser` field to a path relative to the
/// package directory.
pub fn map_with_browser_field(relative: &str, map: &serde_json::Map<String, Value>) -> String {
    let normalized = posix_normalize(relative);
    map.iter()
        .find(|(from, _)| posix_normalize(from) == normalized)
        .and_then(|(_, to)| to.as_str())
        .map(posix_normalize)
        .unwrap_or(normalized)
}

/// Node module resolution backed by [`oxc_resolver`].
///
/// Only `main`-style fields and the `browser` alias map are honored;
/// `exports` and `imports` are ignored so deep imports keep working.
#[derive(Debug)]
pub struct NodeResolver {
    inner: oxc_resolver::Resolver,
}

impl Default for NodeResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeResolver {
    pub fn new() -> Self {
        let inner = oxc_resolver::Resolver::new(oxc_resolver::ResolveOptions {
            extensions: SUPPORTED_EXTS.iter().map(|ext| ext.to_string()).collect(),
            main_fields: MAIN_FIELDS.iter().map(|field| field.to_string()).collect(),
            alias_fields: vec![vec!["browser".into()]],
            condition_names: vec!["import".into(), "module".into(), "browser".into(), "default".into()],
            exports_fields: vec![],
            imports_fields: vec![],
            ..Default::default()
        });
        Self { inner }
    }

    /// Resolve `id` (relative, absolute, or a bare specifier with an
    /// optional subpath) from `basedir`.
    pub fn resolve(&self, basedir: &Path, id: &str) -> Option<PathBuf> {
        match self.inner.resolve(basedir, id) {
            Ok(resolution) => Some(resolution.into_path_buf()),
            Err(err) => {
                tracing::trace!(specifier = id, basedir = %basedir.display(), error = %err, "node resolution failed");
                None
            }
        }
    }

    /// Locate `<id>/package.json` through the `node_modules` directories
    /// above `basedir`.
    pub fn find_manifest(&self, basedir: &Path, id: &str) -> Option<PathBuf> {
        self.resolve(basedir, &format!("{id}/package.json"))
            .filter(|manifest| is_file(manifest))
    }

    /// Forget cached directory listings and manifests.
    pub fn clear(&self) {
        self.inner.clear_cache();
    }
}

/// Resolve the package entry for `id` from `basedir`.
pub fn resolve_entry(
    node: &NodeResolver,
    basedir: &Path,
    id: &str,
) -> Result<PackageEntryInfo, PackageError> {
    let manifest_path = node
        .find_manifest(basedir, id)
        .ok_or_else(|| PackageError::NotFound(id.to_string()))?;
    let manifest = read_manifest(&manifest_path)?;
    let package_dir = manifest_path.parent().unwrap_or(basedir).to_path_buf();

    let mut entry = manifest_entry(&manifest);
    let mut entry_file = package_dir.join(&entry);
    if let Some(postfix) = fuzzy_postfix(&entry_file) {
        entry.push_str(&postfix);
        entry_file = package_dir.join(&entry);
    }
    if !is_file(&entry_file) {
        return Err(PackageError::MissingEntryFile {
            package: id.to_string(),
            entry: entry_file,
        });
    }

    Ok(PackageEntryInfo {
        entry_specifier: posix_normalize(&format!("{id}/{entry}")),
        entry_file,
        manifest_path,
        manifest: Arc::new(manifest),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn entry_field_priority() {
        assert_eq!(manifest_entry(&json!({"main": "cjs.js", "module": "esm.js"})), "esm.js");
        assert_eq!(manifest_entry(&json!({"jsnext:main": "next.js", "main": "m.js"})), "next.js");
        assert_eq!(manifest_entry(&json!({"name": "x"})), "index.js");
    }

    #[test]
    fn browser_object_remaps_entry() {
        let manifest = json!({
            "main": "./lib/node.js",
            "browser": { "./lib/node.js": "./lib/browser.js" }
        });
        assert_eq!(manifest_entry(&manifest), "lib/browser.js");
    }

    #[test]
    fn browser_string_is_an_entry_field() {
        let manifest = json!({ "browser": "dist/browser.js", "main": "index.js" });
        assert_eq!(manifest_entry(&manifest), "dist/browser.js");
    }

    #[test]
    fn resolves_entry_with_missing_extension() {
        let root = tempfile::tempdir().unwrap();
        let pkg = root.path().join("node_modules/foo");
        write(&pkg.join("package.json"), r#"{"module": "dist/foo"}"#);
        write(&pkg.join("dist/foo.mjs"), "export default 1");

        let info = resolve_entry(&NodeResolver::new(), &root.path().join("src"), "foo").unwrap();
        assert_eq!(info.entry_specifier, "foo/dist/foo.mjs");
        assert_eq!(info.entry_file, pkg.join("dist/foo.mjs"));
        assert_eq!(info.package_dir(), pkg.as_path());
    }

    #[test]
    fn missing_package_and_entry() {
        let root = tempfile::tempdir().unwrap();
        let node = NodeResolver::new();
        assert_eq!(
            resolve_entry(&node, root.path(), "nope").unwrap_err(),
            PackageError::NotFound("nope".into())
        );

        write(&root.path().join("node_modules/bad/package.json"), r#"{"main": "gone.js"}"#);
        assert!(matches!(
            resolve_entry(&node, root.path(), "bad"),
            Err(PackageError::MissingEntryFile { .. })
        ));
    }

    #[test]
    fn node_file_resolution_walks_up() {
        let root = tempfile::tempdir().unwrap();
        write(&root.path().join("node_modules/lodash-es/debounce.js"), "");
        write(&root.path().join("node_modules/pkg/package.json"), r#"{"main": "lib/main"}"#);
        write(&root.path().join("node_modules/pkg/lib/main.js"), "");

        let node = NodeResolver::new();
        let nested = root.path().join("src/deep/dir");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(
            node.resolve(&nested, "lodash-es/debounce"),
            Some(root.path().join("node_modules/lodash-es/debounce.js"))
        );
        assert_eq!(
            node.resolve(&nested, "pkg"),
            Some(root.path().join("node_modules/pkg/lib/main.js"))
        );
        assert_eq!(node.resolve(&nested, "missing"), None);
        assert_eq!(
            node.find_manifest(&nested, "pkg"),
            Some(root.path().join("node_modules/pkg/package.json"))
        );
    }

    #[test]
    fn node_resolution_prefers_module_and_applies_the_browser_map() {
        let root = tempfile::tempdir().unwrap();
        let pkg = root.path().join("node_modules/dual");
        write(
            &pkg.join("package.json"),
            r#"{
                "main": "cjs/index.js",
                "module": "esm/index.js",
                "browser": { "./esm/fs.js": "./esm/fs-browser.js" }
            }"#,
        );
        write(&pkg.join("cjs/index.js"), "");
        write(&pkg.join("esm/index.js"), "");
        write(&pkg.join("esm/fs.js"), "");
        write(&pkg.join("esm/fs-browser.js"), "");
        write(&pkg.join("esm/util.ts"), "");

        let node = NodeResolver::new();
        assert_eq!(node.resolve(root.path(), "dual"), Some(pkg.join("esm/index.js")));
        assert_eq!(node.resolve(&pkg.join("esm"), "./fs.js"), Some(pkg.join("esm/fs-browser.js")));
        assert_eq!(node.resolve(&pkg.join("esm"), "./util"), Some(pkg.join("esm/util.ts")));
    }

    #[test]
    fn cleared_resolver_sees_new_files() {
        let root = tempfile::tempdir().unwrap();
        let node = NodeResolver::new();
        assert_eq!(node.resolve(root.path(), "late"), None);

        write(&root.path().join("node_modules/late/index.js"), "");
        node.clear();
        assert_eq!(
            node.resolve(root.path(), "late"),
            Some(root.path().join("node_modules/late/index.js"))
        );
    }
}
