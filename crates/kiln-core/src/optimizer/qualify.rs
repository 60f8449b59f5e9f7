//! Which dependencies are worth pre-bundling.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::Value;

use super::{IGNORE_LIST, OptimizeError, OptimizeOptions, read_manifest};
use crate::paths::{SUPPORTED_EXTS, lookup_file};
use crate::resolver::{PackageError, Resolver};
use crate::scan::{ImportKind, scan_module};

/// Classification of a manifest's `dependencies`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Qualification {
    /// Package id to entry file, in manifest order.
    pub qualified: IndexMap<String, PathBuf>,
    /// Dependencies left to the resolver, mapped through exact aliases.
    pub external: Vec<String>,
}

impl Qualification {
    /// Fold in the classification of a linked package. Existing entries win.
    pub fn merge(&mut self, other: Qualification) {
        for (id, entry) in other.qualified {
            self.qualified.entry(id).or_insert(entry);
        }
        for id in other.external {
            if !self.external.contains(&id) {
                self.external.push(id);
            }
        }
    }
}

/// Classify the dependencies declared by the nearest `package.json` above
/// `root`.
///
/// A dependency qualifies when its entry has no exports and no `export *`
/// (most likely CommonJS), imports a relative file, or imports a package
/// that is not itself a direct dependency. The first test is a heuristic:
/// an ES module that only runs side effects qualifies too.
pub fn resolve_qualified_deps(
    root: &Path,
    options: &OptimizeOptions,
    resolver: &Resolver,
) -> Result<Qualification, OptimizeError> {
    let Some(manifest_path) = lookup_file(root, &["package.json"]) else {
        return Ok(Qualification::default());
    };
    let manifest = read_manifest(&manifest_path)?;
    let deps: Vec<String> = manifest
        .get("dependencies")
        .and_then(Value::as_object)
        .map(|deps| deps.keys().cloned().collect())
        .unwrap_or_default();

    let mut qualification = Qualification::default();
    for id in &deps {
        if let Some(entry) = qualify(root, id, &deps, options, resolver) {
            qualification.qualified.insert(id.clone(), entry);
        }
    }
    qualification.external = deps
        .iter()
        .filter(|id| !qualification.qualified.contains_key(*id))
        .map(|id| resolver.alias(id).unwrap_or_else(|| id.clone()))
        .collect();
    Ok(qualification)
}

fn qualify(
    root: &Path,
    id: &str,
    deps: &[String],
    options: &OptimizeOptions,
    resolver: &Resolver,
) -> Option<PathBuf> {
    let listed = |list: &[String]| list.iter().any(|entry| entry == id);
    if listed(&options.include) {
        return None;
    }
    if listed(&options.exclude) {
        tracing::debug!("skipping {id} (excluded)");
        return None;
    }
    if listed(&options.link) {
        tracing::debug!("skipping {id} (link)");
        return None;
    }
    if IGNORE_LIST.contains(&id) {
        tracing::debug!("skipping {id} (internal excluded)");
        return None;
    }

    let info = match resolver.resolve_package_entry(root, id) {
        Ok(info) => info,
        Err(PackageError::MissingEntryFile { entry, .. }) => {
            tracing::warn!(
                "dependency {id} declares non-existent entry file {}",
                entry.display()
            );
            return None;
        }
        Err(err) => {
            tracing::warn!("cannot resolve entry for dependency {id}: {err}");
            return None;
        }
    };

    let entry = info.entry_file.clone();
    let supported = entry
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTS.iter().any(|supported| supported[1..] == *ext));
    if !supported {
        tracing::debug!("skipping {id} (entry is not js)");
        return None;
    }

    let content = match std::fs::read_to_string(&entry) {
        Ok(content) => content,
        Err(err) => {
            tracing::warn!("cannot read entry of dependency {id}: {err}");
            return None;
        }
    };
    let scan = match scan_module(&content) {
        Ok(scan) => scan,
        Err(err) => {
            tracing::debug!("optimizing {id} (entry could not be scanned: {err})");
            return Some(entry);
        }
    };

    if scan.export_count == 0 && !scan.has_star_reexport {
        tracing::debug!("optimizing {id} (no exports, likely commonjs)");
        return Some(entry);
    }
    for import in scan
        .imports
        .iter()
        .filter(|import| import.kind != ImportKind::DynamicExpr)
    {
        let specifier = import.value.trim();
        let specifier = resolver
            .alias(specifier)
            .unwrap_or_else(|| specifier.to_string());
        if specifier.starts_with('.') {
            tracing::debug!("optimizing {id} (contains relative imports)");
            return Some(entry);
        }
        if !deps.contains(&specifier) {
            tracing::debug!("optimizing {id} (imports sub dependencies)");
            return Some(entry);
        }
    }

    tracing::debug!("skipping {id} (single esm file, doesn't need optimization)");
    None
}
