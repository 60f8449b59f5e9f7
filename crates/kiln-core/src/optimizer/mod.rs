//! Dependency pre-bundling.
//!
//! Third-party packages that would otherwise cost the browser dozens of
//! requests (CommonJS entries, packages with relative imports, packages
//! importing their own dependencies) are bundled once into the cache
//! directory and served from there.
//!
//! ```text
//! hash ─┬─ matches <cache>/hash ──────────────────────────▶ UpToDate
//!       └─ differs ─▶ qualify ─┬─ nothing ─▶ write hash ──▶ NothingToBundle
//!                              └─ bundle ─▶ staging dir ─▶ swap ─▶ Bundled
//! ```
//!
//! A build failure leaves the previous cache directory and hash untouched,
//! so the next run retries. Builds are serialized per cache directory.

mod builtins;
mod bundler;
mod qualify;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde_json::Value;

pub use builtins::{NODE_BUILTINS, find_node_builtin_import};
pub use bundler::{RolldownBundler, code_frame};
pub use qualify::{Qualification, resolve_qualified_deps};

use crate::paths::lookup_file;
use crate::resolver::Resolver;

/// Cache directory relative to the directory holding `package.json`.
pub const CACHE_DIR: &str = "node_modules/.kiln";

/// File inside the cache directory holding the dependency hash.
pub const HASH_FILE: &str = "hash";

/// Packages that are never pre-bundled.
pub const IGNORE_LIST: [&str; 7] = [
    "kiln",
    "vite",
    "vitepress",
    "tailwindcss",
    "@tailwindcss/ui",
    "@pika/react",
    "@pika/react-dom",
];

/// Lockfiles folded into the dependency hash, first found wins.
pub const LOCKFILES: [&str; 3] = ["package-lock.json", "yarn.lock", "pnpm-lock.yaml"];

const NODE_BUILTIN_TIP: &str = "Make sure your \"dependencies\" only include packages that you \
intend to use in the browser. If it's a Node.js package, it should be in \"devDependencies\". \
If you do intend to use this dependency in the browser and it does not actually use these \
Node built-ins there, add the dependency (not the built-in) to \"optimizeDeps.allowNodeBuiltins\".";

/// Pre-bundle cache directory for the project at `root`.
pub fn resolve_cache_dir(root: &Path) -> Option<PathBuf> {
    let manifest = lookup_file(root, &["package.json"])?;
    Some(manifest.parent()?.join(CACHE_DIR))
}

#[derive(Debug, Clone, Default)]
pub struct OptimizeOptions {
    pub root: PathBuf,
    /// Force-included ids; deep paths are allowed.
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Linked monorepo packages whose own dependencies are classified too.
    pub link: Vec<String>,
    pub allow_node_builtins: Vec<String>,
    /// Config file folded into the hash.
    pub config_path: Option<PathBuf>,
    /// Rebuild even when the hash matches.
    pub force: bool,
}

/// What an optimize run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizeOutcome {
    /// No `package.json` above the root.
    NoManifest,
    /// Stored hash matches; nothing was touched.
    UpToDate,
    /// No dependency qualified; the hash was stored.
    NothingToBundle,
    /// Packages that were bundled into the cache.
    Bundled(Vec<String>),
}

#[derive(Debug, thiserror::Error)]
pub enum OptimizeError {
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid package.json at {}: {message}", .path.display())]
    Manifest { path: PathBuf, message: String },

    #[error("failed to parse {file}:{line}:{column}: {message}\n{frame}")]
    Parse {
        /// File relative to the project root.
        file: String,
        line: u32,
        column: u32,
        message: String,
        frame: String,
    },

    #[error(
        "dependency \"{package}\" imports the Node built-in module \"{builtin}\" (in {importer})"
    )]
    NodeBuiltin {
        package: String,
        builtin: String,
        importer: String,
    },

    #[error("dependency pre-bundling failed: {message}")]
    Bundle { message: String },
}

impl OptimizeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Remediation text for errors that have one.
    pub fn tip(&self) -> Option<&'static str> {
        match self {
            Self::NodeBuiltin { .. } => Some(NODE_BUILTIN_TIP),
            _ => None,
        }
    }
}

/// Inputs of one bundling run.
#[derive(Debug, Clone)]
pub struct BundleRequest {
    pub root: PathBuf,
    /// Output name (package id) to entry file.
    pub entries: IndexMap<String, PathBuf>,
    pub external: Vec<String>,
}

/// A file produced by the bundler, relative to the cache directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub file_name: String,
    pub contents: Vec<u8>,
}

/// The bundling collaborator.
#[async_trait]
pub trait DepBundler: Send + Sync {
    async fn bundle(&self, request: BundleRequest) -> Result<Vec<OutputFile>, OptimizeError>;
}

static BUILD_LOCKS: Lazy<DashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>> = Lazy::new(DashMap::new);

fn build_lock(cache_dir: &Path) -> Arc<tokio::sync::Mutex<()>> {
    Arc::clone(
        BUILD_LOCKS
            .entry(cache_dir.to_path_buf())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
    )
}

/// Digest over the lockfile, the manifest's `dependencies` and the config
/// file.
pub fn dep_hash(root: &Path, config_path: Option<&Path>) -> Result<String, OptimizeError> {
    let mut hasher = blake3::Hasher::new();
    if let Some(lockfile) = lookup_file(root, &LOCKFILES) {
        let content = std::fs::read(&lockfile).map_err(|err| OptimizeError::io(&lockfile, err))?;
        hasher.update(&content);
    }
    if let Some(manifest_path) = lookup_file(root, &["package.json"]) {
        let manifest = read_manifest(&manifest_path)?;
        let deps = manifest.get("dependencies").cloned().unwrap_or(Value::Null);
        hasher.update(deps.to_string().as_bytes());
    }
    if let Some(config) = config_path {
        let content = std::fs::read(config).map_err(|err| OptimizeError::io(config, err))?;
        hasher.update(&content);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

pub(crate) fn read_manifest(path: &Path) -> Result<Value, OptimizeError> {
    crate::resolver::read_manifest(path).map_err(|err| OptimizeError::Manifest {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

/// Bring the pre-bundle cache up to date.
///
/// Concurrent calls for the same cache directory run one after another; the
/// later one finds the fresh hash and returns [`OptimizeOutcome::UpToDate`].
pub async fn optimize_deps(
    options: &OptimizeOptions,
    resolver: &Resolver,
    bundler: &dyn DepBundler,
) -> Result<OptimizeOutcome, OptimizeError> {
    let root = options.root.as_path();
    let Some(cache_dir) = resolve_cache_dir(root) else {
        tracing::info!("package.json not found, skipping dependency pre-bundling");
        return Ok(OptimizeOutcome::NoManifest);
    };

    let lock = build_lock(&cache_dir);
    let _guard = lock.lock().await;

    let hash_path = cache_dir.join(HASH_FILE);
    let hash = dep_hash(root, options.config_path.as_deref())?;
    if !options.force {
        let previous = tokio::fs::read_to_string(&hash_path).await.ok();
        if previous.as_deref() == Some(hash.as_str()) {
            tracing::debug!("dependency hash is consistent, skipping (use --force to override)");
            return Ok(OptimizeOutcome::UpToDate);
        }
    }

    let mut qualification = resolve_qualified_deps(root, options, resolver)?;
    for linked in &options.link {
        let Some(manifest) = resolver.node().find_manifest(root, linked) else {
            tracing::warn!("cannot resolve linked dependency {linked}");
            continue;
        };
        let linked_root = manifest.parent().unwrap_or(root);
        qualification.merge(resolve_qualified_deps(linked_root, options, resolver)?);
    }
    for id in &options.include {
        let entry = match resolver.resolve_package_entry(root, id) {
            Ok(info) => Some(info.entry_file.clone()),
            Err(_) => resolver.resolve_node_module_file(root, id),
        };
        match entry {
            Some(entry) => {
                qualification.qualified.insert(id.clone(), entry);
            }
            None => tracing::warn!("cannot resolve included dependency {id}"),
        }
    }
    let qualified = &qualification.qualified;
    qualification
        .external
        .retain(|id| !qualified.contains_key(id));

    if qualification.qualified.is_empty() {
        replace_dir(&cache_dir, None).await?;
        write_hash(&hash_path, &hash).await?;
        tracing::debug!("no listed dependency requires optimization, skipping");
        return Ok(OptimizeOutcome::NothingToBundle);
    }

    let ids: Vec<String> = qualification.qualified.keys().cloned().collect();
    tracing::info!(dependencies = %ids.join(", "), "pre-bundling dependencies");

    for (id, entry) in &qualification.qualified {
        if options.allow_node_builtins.iter().any(|allowed| allowed == id) {
            continue;
        }
        if let Some((importer, builtin)) = find_node_builtin_import(resolver.node(), entry) {
            return Err(OptimizeError::NodeBuiltin {
                package: id.clone(),
                builtin,
                importer: crate::paths::relative_slash(root, &importer)
                    .unwrap_or_else(|| importer.display().to_string()),
            });
        }
    }

    let outputs = bundler
        .bundle(BundleRequest {
            root: root.to_path_buf(),
            entries: qualification.qualified,
            external: qualification.external,
        })
        .await?;

    let staging = staging_dir(&cache_dir);
    replace_dir(&staging, None).await?;
    for output in &outputs {
        let target = staging.join(&output.file_name);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| OptimizeError::io(parent, err))?;
        }
        tokio::fs::write(&target, &output.contents)
            .await
            .map_err(|err| OptimizeError::io(&target, err))?;
    }
    replace_dir(&cache_dir, Some(&staging)).await?;
    write_hash(&hash_path, &hash).await?;

    resolver.clear_caches();
    tracing::info!(count = ids.len(), "dependencies pre-bundled");
    Ok(OptimizeOutcome::Bundled(ids))
}

fn staging_dir(cache_dir: &Path) -> PathBuf {
    let mut name = cache_dir
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push("-staging");
    cache_dir.with_file_name(name)
}

/// Remove `dir` and either recreate it empty or move `from` into its place.
async fn replace_dir(dir: &Path, from: Option<&Path>) -> Result<(), OptimizeError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(OptimizeError::io(dir, err)),
    }
    match from {
        Some(from) => tokio::fs::rename(from, dir)
            .await
            .map_err(|err| OptimizeError::io(dir, err)),
        None => tokio::fs::create_dir_all(dir)
            .await
            .map_err(|err| OptimizeError::io(dir, err)),
    }
}

async fn write_hash(path: &Path, hash: &str) -> Result<(), OptimizeError> {
    tokio::fs::write(path, hash)
        .await
        .map_err(|err| OptimizeError::io(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn hash_tracks_dependencies_lockfile_and_config() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "package.json", r#"{"dependencies": {"a": "1.0.0"}}"#);
        let first = dep_hash(root, None).unwrap();
        assert_eq!(first, dep_hash(root, None).unwrap());

        write(root, "package.json", r#"{"dependencies": {"a": "1.0.1"}}"#);
        let second = dep_hash(root, None).unwrap();
        assert_ne!(first, second);

        write(root, "yarn.lock", "a@1.0.1");
        let third = dep_hash(root, None).unwrap();
        assert_ne!(second, third);

        write(root, "kiln.toml", "mode = \"development\"");
        assert_ne!(third, dep_hash(root, Some(&root.join("kiln.toml"))).unwrap());
    }

    #[test]
    fn dev_dependency_changes_do_not_affect_the_hash() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "package.json", r#"{"dependencies": {"a": "1"}, "devDependencies": {"b": "1"}}"#);
        let before = dep_hash(root, None).unwrap();
        write(root, "package.json", r#"{"dependencies": {"a": "1"}, "devDependencies": {"b": "2"}}"#);
        assert_eq!(before, dep_hash(root, None).unwrap());
    }

    #[test]
    fn cache_dir_sits_next_to_the_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "package.json", "{}");
        std::fs::create_dir_all(dir.path().join("packages/app")).unwrap();
        assert_eq!(
            resolve_cache_dir(&dir.path().join("packages/app")),
            Some(dir.path().join(CACHE_DIR))
        );
        assert_eq!(
            staging_dir(&dir.path().join(CACHE_DIR)),
            dir.path().join("node_modules/.kiln-staging")
        );
    }

    #[test]
    fn builtin_errors_carry_a_tip() {
        let err = OptimizeError::NodeBuiltin {
            package: "fs-extra".into(),
            builtin: "fs".into(),
            importer: "node_modules/fs-extra/lib/index.js".into(),
        };
        assert!(err.tip().is_some());
        assert!(err.to_string().contains("\"fs\""));
        assert!(OptimizeError::Bundle { message: "x".into() }.tip().is_none());
    }
}
