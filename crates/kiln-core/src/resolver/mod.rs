//! Request path resolution.
//!
//! Maps public request paths to files and back. Resolution order for
//! [`Resolver::request_to_file`]:
//!
//! 1. directory aliases
//! 2. the `/@modules/` namespace (pre-bundled cache, then node_modules)
//! 3. the public directory
//! 4. the project root
//!
//! followed by fuzzy completion of missing extensions and directory indexes.
//!
//! Every lookup is memoized. File create/remove events must call
//! [`Resolver::invalidate_fuzzy`]; package entries and pre-bundled module
//! lookups live until [`Resolver::clear_caches`].

mod alias;
mod bare;
mod fuzzy;
mod package;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use path_clean::PathClean;
use rustc_hash::FxHashMap;

pub use alias::{AliasTable, DirAlias};
pub use fuzzy::{fuzzy_postfix, resolve_fuzzy};
pub use package::{
    MAIN_FIELDS, NodeResolver, PackageEntryInfo, PackageError, manifest_entry,
    map_with_browser_field, read_manifest,
};

use crate::error::{Error, Result};
use crate::paths::{
    CLIENT_PUBLIC_PATH, ENV_PUBLIC_PATH, MODULES_PREFIX, clean_url, is_file, lookup_file,
    parse_node_module_id, posix_dirname, posix_resolve, relative_slash, split_query, to_slash,
};

/// Construction options for [`Resolver`].
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub root: PathBuf,
    /// Alias rules in priority order.
    pub alias: Vec<(String, String)>,
    /// Defaults to `<root>/public`.
    pub public_dir: Option<PathBuf>,
    /// Pre-bundle cache directory. Defaults to the cache directory next to
    /// the nearest `package.json`.
    pub cache_dir: Option<PathBuf>,
}

impl ResolverOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            alias: Vec::new(),
            public_dir: None,
            cache_dir: None,
        }
    }

    pub fn alias<K: Into<String>, V: Into<String>>(mut self, key: K, target: V) -> Self {
        self.alias.push((key.into(), target.into()));
        self
    }

    pub fn public_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.public_dir = Some(dir.into());
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }
}

/// Result of [`Resolver::resolve_relative_request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativeRequest {
    pub pathname: String,
    /// Query string including the leading `?`, or empty.
    pub query: String,
}

type PackageKey = (PathBuf, String);

/// Path resolver owned by one server instance.
#[derive(Debug)]
pub struct Resolver {
    root: PathBuf,
    public_dir: PathBuf,
    cache_dir: Option<PathBuf>,
    aliases: AliasTable,
    node: NodeResolver,
    request_files: RwLock<FxHashMap<String, PathBuf>>,
    file_requests: RwLock<FxHashMap<PathBuf, String>>,
    module_files: RwLock<FxHashMap<String, PathBuf>>,
    module_requests: RwLock<FxHashMap<PathBuf, String>>,
    packages: RwLock<FxHashMap<PackageKey, Arc<PackageEntryInfo>>>,
    node_files: RwLock<FxHashMap<PackageKey, PathBuf>>,
    optimized: RwLock<FxHashMap<String, PathBuf>>,
}

impl Resolver {
    pub fn new(options: ResolverOptions) -> Self {
        let root = options.root.clean();
        let public_dir = options
            .public_dir
            .map(|dir| root.join(dir).clean())
            .unwrap_or_else(|| root.join("public"));
        let cache_dir = options
            .cache_dir
            .or_else(|| crate::optimizer::resolve_cache_dir(&root));
        let aliases = AliasTable::new(&root, options.alias);

        Self {
            root,
            public_dir,
            cache_dir,
            aliases,
            node: NodeResolver::new(),
            request_files: RwLock::default(),
            file_requests: RwLock::default(),
            module_files: RwLock::default(),
            module_requests: RwLock::default(),
            packages: RwLock::default(),
            node_files: RwLock::default(),
            optimized: RwLock::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn public_dir(&self) -> &Path {
        &self.public_dir
    }

    /// Node module resolution behind `/@modules/` lookups.
    pub fn node(&self) -> &NodeResolver {
        &self.node
    }

    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    /// Map a request path to a file. Queries are ignored. The returned
    /// path may not exist; callers decide whether that is a 404.
    pub fn request_to_file(&self, request: &str) -> PathBuf {
        let request = clean_url(request);
        if let Some(file) = self.request_files.read().get(request) {
            return file.clone();
        }

        let resolved = resolve_fuzzy(self.unfuzzed_file(request));
        tracing::trace!(request, file = %resolved.display(), "request to file");
        self.request_files
            .write()
            .insert(request.to_string(), resolved.clone());
        resolved
    }

    fn unfuzzed_file(&self, request: &str) -> PathBuf {
        if let Some(file) = self.aliases.request_to_file(request) {
            return file;
        }

        if let Some(id) = request.strip_prefix(MODULES_PREFIX) {
            if let Some(file) = self.module_file(id) {
                return file;
            }
            if let Some(file) = self.resolve_optimized_module(id) {
                return file;
            }
            if let Some(file) = self.resolve_node_module_file(&self.root, id) {
                self.module_files.write().insert(id.to_string(), file.clone());
                return file;
            }
        }

        let relative = request.trim_start_matches('/');
        let public = self.public_dir.join(relative);
        if !relative.is_empty() && public.exists() {
            return public;
        }
        self.root.join(relative)
    }

    /// Map a file back to its request path.
    pub fn file_to_request(&self, file: &Path) -> String {
        if let Some(request) = self.file_requests.read().get(file) {
            return request.clone();
        }
        if let Some(request) = self.module_requests.read().get(file) {
            return request.clone();
        }
        if let Some(request) = self.aliases.file_to_request(file) {
            return request;
        }

        let relative = relative_slash(&self.root, file).unwrap_or_else(|| to_slash(file));
        let request = format!("/{}", relative.strip_prefix("public/").unwrap_or(&relative));
        self.file_requests
            .write()
            .insert(file.to_path_buf(), request.clone());
        request
    }

    /// Canonical, extension-complete form of `request`, preserving its
    /// query. A `/@modules/` request with no file behind it is a
    /// [`Error::Resolution`]. [`Error::GraphInconsistency`] means the
    /// canonical form resolves to a different file than `request`.
    pub fn normalize_public_path(&self, request: &str) -> Result<String> {
        if request == CLIENT_PUBLIC_PATH || request == ENV_PUBLIC_PATH {
            return Ok(request.to_string());
        }

        let (path, query) = split_query(request);
        let finalize = |normalized: String| -> Result<String> {
            let normalized = format!("{normalized}{query}");
            let normalized_file = self.request_to_file(&normalized);
            let request_file = self.request_to_file(request);
            if normalized_file != request_file {
                return Err(Error::GraphInconsistency {
                    request: request.to_string(),
                    normalized,
                    request_file,
                    normalized_file,
                });
            }
            Ok(normalized)
        };

        if !path.starts_with(MODULES_PREFIX) {
            return finalize(self.file_to_request(&self.request_to_file(path)));
        }

        let file = self.request_to_file(path);
        let cached = self
            .cache_dir
            .as_ref()
            .and_then(|cache_dir| file.strip_prefix(cache_dir).ok());
        if let Some(relative) = cached {
            return finalize(format!("{MODULES_PREFIX}{}", to_slash(relative)));
        }

        // Rebuild the id from the owning manifest so symlinked installs keep
        // their /@modules/ form.
        let id = &path[MODULES_PREFIX.len()..];
        let parsed = parse_node_module_id(id);
        if parsed.in_pkg_path.is_empty() {
            return Ok(request.to_string());
        }
        if !is_file(&file) {
            return Err(unresolved(request));
        }

        let mut postfix = String::new();
        let mut search_from = file.clone();
        while !postfix.starts_with(parsed.in_pkg_path) {
            let manifest =
                lookup_file(&search_from, &["package.json"]).ok_or_else(|| unresolved(request))?;
            let package_dir = manifest.parent().unwrap_or(&self.root);
            postfix = relative_slash(package_dir, &file).unwrap_or_default();
            search_from = match package_dir.parent() {
                Some(parent) => parent.to_path_buf(),
                None => return Err(unresolved(request)),
            };
        }

        let mut segments = vec!["/@modules"];
        segments.extend(parsed.scope);
        segments.push(parsed.name);
        segments.push(&postfix);
        finalize(segments.join("/"))
    }

    /// Resolve `importee` against `importer`. Relative imports from inside a
    /// directory alias that step outside of it are re-expressed from the
    /// real file path.
    pub fn resolve_relative_request(&self, importer: &str, importee: &str) -> RelativeRequest {
        let (_, query) = split_query(importee);
        let mut resolved = importee.to_string();

        if importee.starts_with('.') {
            resolved = posix_resolve(posix_dirname(clean_url(importer)), importee);
            let escaped = self
                .aliases
                .dir_for_request(importer)
                .is_some_and(|alias| !resolved.starts_with(&alias.prefix));
            if escaped {
                let importer_file = self.request_to_file(importer);
                let importee_file = importer_file
                    .parent()
                    .unwrap_or(&self.root)
                    .join(clean_url(importee))
                    .clean();
                resolved = self.file_to_request(&importee_file);
            }
        }

        let mut pathname = clean_url(&resolved).to_string();
        if importee.ends_with('/') && !pathname.ends_with('/') {
            pathname.push('/');
        }
        RelativeRequest {
            pathname,
            query: query.to_string(),
        }
    }

    /// Exact alias for `id`.
    pub fn alias(&self, id: &str) -> Option<String> {
        self.aliases.exact(id).map(String::from)
    }

    /// Whether `request` is served from the public directory.
    pub fn is_public_request(&self, request: &str) -> bool {
        self.request_to_file(request).starts_with(&self.public_dir)
    }

    /// Remember where a `/@modules/` id was found so that later requests and
    /// [`file_to_request`](Self::file_to_request) agree on it.
    pub fn record_module_file(&self, id: &str, file: &Path) {
        self.module_files
            .write()
            .insert(id.to_string(), file.to_path_buf());
        self.module_requests
            .write()
            .insert(file.to_path_buf(), format!("{MODULES_PREFIX}{id}"));
    }

    pub fn module_file(&self, id: &str) -> Option<PathBuf> {
        self.module_files.read().get(id).cloned()
    }

    /// Node-style resolution of `id` from `basedir`, memoized.
    pub fn resolve_node_module_file(&self, basedir: &Path, id: &str) -> Option<PathBuf> {
        let key = (basedir.to_path_buf(), id.to_string());
        if let Some(file) = self.node_files.read().get(&key) {
            return Some(file.clone());
        }
        let file = self.node.resolve(basedir, id)?;
        self.node_files.write().insert(key, file.clone());
        Some(file)
    }

    /// Package entry for `id`, memoized per `(basedir, id)`. An exact alias
    /// of `id` to another specifier redirects the entry file.
    pub fn resolve_package_entry(
        &self,
        basedir: &Path,
        id: &str,
    ) -> std::result::Result<Arc<PackageEntryInfo>, PackageError> {
        let key = (basedir.to_path_buf(), id.to_string());
        if let Some(info) = self.packages.read().get(&key) {
            return Ok(Arc::clone(info));
        }

        let mut info = package::resolve_entry(&self.node, basedir, id)?;
        let aliased_file = self
            .alias(id)
            .filter(|aliased| aliased != id)
            .and_then(|aliased| self.resolve_node_module_file(basedir, &aliased));
        if let Some(file) = aliased_file {
            info.entry_file = file;
        }
        tracing::debug!(package = id, entry = %info.entry_specifier, "package entry");

        let info = Arc::new(info);
        self.node_files.write().insert(
            (basedir.to_path_buf(), info.entry_specifier.clone()),
            info.entry_file.clone(),
        );
        self.packages.write().insert(key, Arc::clone(&info));
        Ok(info)
    }

    /// File of a pre-bundled module `id` (or `id.js`), if the cache holds one.
    pub fn resolve_optimized_module(&self, id: &str) -> Option<PathBuf> {
        if let Some(file) = self.optimized.read().get(id) {
            return Some(file.clone());
        }
        let cache_dir = self.cache_dir.as_ref()?;
        let file = [cache_dir.join(id), cache_dir.join(format!("{id}.js"))]
            .into_iter()
            .find(|candidate| is_file(candidate))?;
        self.optimized.write().insert(id.to_string(), file.clone());
        Some(file)
    }

    /// Drop request/file memos after files appeared or disappeared.
    pub fn invalidate_fuzzy(&self) {
        self.request_files.write().clear();
        self.file_requests.write().clear();
        self.node.clear();
    }

    /// Drop every memo, including package entries and pre-bundled lookups.
    pub fn clear_caches(&self) {
        self.invalidate_fuzzy();
        self.module_files.write().clear();
        self.module_requests.write().clear();
        self.packages.write().clear();
        self.node_files.write().clear();
        self.optimized.write().clear();
    }
}

/// A `/@modules/` request with no file behind it. The caller names the
/// importer through [`Error::imported_by`].
fn unresolved(request: &str) -> Error {
    Error::Resolution {
        specifier: request.to_string(),
        importer: String::new(),
    }
}
