//! Bare specifier resolution.

use super::{PackageError, Resolver};
use crate::paths::{append_query, is_asset, is_js_src, split_deep_import, to_slash};

impl Resolver {
    /// Rewrite a bare specifier (`vue`, `lodash-es/debounce`) into the id
    /// served under `/@modules/`.
    ///
    /// Pre-bundled packages always map to `<id>.js`. Everything else goes
    /// through the package entry, or Node-style file lookup for deep
    /// imports. Ids that are not script source get an `import` marker.
    pub fn resolve_bare_specifier(&self, id: &str, importer: &str) -> String {
        if self.resolve_optimized_module(id).is_some() {
            return if id.ends_with(".js") {
                id.to_string()
            } else {
                format!("{id}.js")
            };
        }

        let importer_file = self.request_to_file(importer);
        let basedir = importer_file.parent().unwrap_or(self.root()).to_path_buf();

        let mut resolved = id.to_string();
        match self.resolve_package_entry(&basedir, id) {
            Ok(info) => {
                self.record_module_file(&info.entry_specifier, &info.entry_file);
                resolved = info.entry_specifier.clone();
            }
            Err(err) => {
                match &err {
                    PackageError::NotFound(_) => {
                        tracing::trace!(specifier = id, error = %err, "no package entry");
                    }
                    _ => tracing::warn!(
                        "dependency {id} does not have default entry defined \
                         (imported by {importer}): {err}"
                    ),
                }
                if let Some((dep, subpath)) = split_deep_import(id) {
                    if self.resolve_optimized_module(dep).is_some() {
                        if self.alias(dep).as_deref() == Some(id) {
                            return self.resolve_bare_specifier(dep, importer);
                        }
                        if !is_asset(id) {
                            tracing::warn!(
                                "Avoid deep import \"{id}\" (imported by {importer}) because \
                                 \"{dep}\" has been pre-optimized. Prefer importing directly \
                                 from the module entry, or add the deep path to \
                                 optimizeDeps.include."
                            );
                        }
                    }
                    if let Some(file) = self.resolve_node_module_file(self.root(), id) {
                        let slashed = to_slash(&file);
                        if let Some(index) = slashed.rfind(subpath) {
                            resolved.push_str(&slashed[index + subpath.len()..]);
                        }
                    }
                }
            }
        }

        if !is_js_src(&resolved) {
            resolved = append_query(&resolved, "import");
        }
        resolved
    }
}
