//! Module rewrite pipeline.
//!
//! One scan per served module drives three things: specifier rewriting
//! (byte-range overwrites, the rest of the text is untouched), hot-handle
//! bookkeeping and graph recording. Output is cached per
//! `(importer, content digest)` unless the request carries a `t` timestamp.

use std::num::NonZeroUsize;
use std::sync::Arc;

use kiln_graph::ModuleRecord;
use lru::LruCache;
use parking_lot::Mutex;

use crate::error::Result;
use crate::hmr::HotEngine;
use crate::paths::{
    CLIENT_PUBLIC_PATH, ENV_PUBLIC_PATH, MODULES_PREFIX, append_query, clean_url, extension,
    is_bare, is_component, is_external_url, is_js_src, is_style_request, query_param,
    strip_hmr_query,
};
use crate::resolver::{RelativeRequest, Resolver};
use crate::scan::{HotArg, HotCall, HotContext, HotMethod, ImportKind, LiteralDep, scan_module};

/// Number of rewritten modules kept in memory.
pub const REWRITE_CACHE_CAPACITY: usize = 1024;

type CacheKey = (String, blake3::Hash);

/// Rewrites served module text and records what it imports.
#[derive(Debug)]
pub struct Rewriter {
    resolver: Arc<Resolver>,
    hot: Arc<HotEngine>,
    cache: Mutex<LruCache<CacheKey, Arc<str>>>,
}

impl Rewriter {
    pub fn new(resolver: Arc<Resolver>, hot: Arc<HotEngine>) -> Self {
        Self {
            resolver,
            hot,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(REWRITE_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// Whether a response for `url` goes through [`rewrite`](Self::rewrite).
    /// Source maps, stylesheets, public files, the client script and
    /// component style blocks are served as they are.
    pub fn should_rewrite(&self, url: &str) -> bool {
        let path = clean_url(url);
        if url.ends_with(".map") || is_style_request(path) || path == CLIENT_PUBLIC_PATH {
            return false;
        }
        if is_component(path) && query_param(url, "type") == Some("style") {
            return false;
        }
        !self.resolver.is_public_request(path)
    }

    /// Rewrite `source`, served at `url`.
    ///
    /// Fails on imports that resolve to nothing and on resolver invariant
    /// violations. A module the scanner cannot lex is logged and returned
    /// unchanged.
    pub fn rewrite(&self, url: &str, source: &str) -> Result<String> {
        let timestamp = query_param(url, "t").filter(|t| !t.is_empty());
        let importer = self
            .resolver
            .normalize_public_path(url)
            .map_err(|err| err.imported_by(url))?;
        let importer = strip_hmr_query(&importer);
        let key = (importer.clone(), blake3::hash(source.as_bytes()));

        if timestamp.is_none() {
            let cached = self.cache.lock().get(&key).cloned();
            if let Some(cached) = cached {
                tracing::debug!(url, "rewrite cache hit");
                return Ok(cached.to_string());
            }
        }

        let rewritten = self.rewrite_imports(source, &importer, timestamp)?;
        if timestamp.is_none() {
            self.cache.lock().put(key, Arc::from(rewritten.as_str()));
        }
        Ok(rewritten)
    }

    /// Drop cached output for the module served at `path`.
    pub fn evict(&self, path: &str) {
        tracing::debug!(path, "rewrite cache busted");
        let mut cache = self.cache.lock();
        let stale: Vec<CacheKey> = cache
            .iter()
            .filter(|((importer, _), _)| clean_url(importer) == path)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            cache.pop(key);
        }
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    /// Resolve specifier `id` imported by `importer` into the request the
    /// browser should fetch.
    pub fn resolve_import(&self, importer: &str, id: &str, timestamp: Option<&str>) -> Result<String> {
        let id = self.resolver.alias(id).unwrap_or_else(|| id.to_string());
        let mut resolved = if is_bare(&id) {
            format!(
                "{MODULES_PREFIX}{}",
                self.resolver.resolve_bare_specifier(&id, importer)
            )
        } else {
            let RelativeRequest { pathname, mut query } =
                self.resolver.resolve_relative_request(importer, &id);
            let pathname = self
                .resolver
                .normalize_public_path(&pathname)
                .map_err(|err| err.imported_by(importer))?;
            if query.is_empty() && extension(&pathname).is_some() && !is_js_src(&pathname) {
                query.push_str("?import");
            }
            format!("{pathname}{query}")
        };

        if let Some(timestamp) = timestamp {
            let clean = clean_url(&resolved).to_string();
            if self.hot.is_dirty(timestamp, &clean) {
                resolved = append_query(&resolved, &format!("t={timestamp}"));
            } else if let Some(version) = self.hot.latest_version(&clean) {
                resolved = append_query(&resolved, &format!("t={version}"));
            }
        }
        Ok(resolved)
    }

    fn rewrite_imports(&self, source: &str, importer: &str, timestamp: Option<&str>) -> Result<String> {
        let scan = match scan_module(source) {
            Ok(scan) => scan,
            Err(err) => {
                tracing::warn!(
                    "failed to parse {importer} for import rewrite ({err}). If you are using \
                     JSX, make sure to name the file with the .jsx extension."
                );
                return Ok(source.to_string());
            }
        };

        let mut patch = Patch::default();
        let mut record = ModuleRecord::default();

        for import in &scan.imports {
            if import.kind == ImportKind::DynamicExpr {
                tracing::warn!("ignored dynamic import({}) in {importer}", import.value);
                continue;
            }
            let id = import.value.as_str();
            if is_external_url(id) {
                continue;
            }

            let resolved = self.resolve_import(importer, id, timestamp)?;
            if resolved != id {
                tracing::debug!(importer, "\"{id}\" --> \"{resolved}\"");
                let replacement = if import.kind == ImportKind::DynamicLiteral {
                    format!("'{resolved}'")
                } else {
                    resolved.clone()
                };
                patch.overwrite(import.start, import.end, replacement);
            }

            let importee = clean_url(&resolved);
            if importee != importer && importee != CLIENT_PUBLIC_PATH {
                record.importees.insert(importee.to_string());
            }
        }

        if scan.has_hot {
            for call in &scan.hot_calls {
                self.check_hot_call(source, importer, call, &mut record, &mut patch)?;
            }
            patch.prepend(&format!(
                "import {{ createHotContext }} from \"{CLIENT_PUBLIC_PATH}\"; \
                 import.meta.hot = createHotContext(\"{importer}\"); "
            ));
        }
        if scan.has_env {
            patch.prepend(&format!(
                "import __KILN_ENV__ from \"{ENV_PUBLIC_PATH}\"; import.meta.env = __KILN_ENV__; "
            ));
        }

        self.hot.record_module(importer, record);
        Ok(patch.apply(source))
    }

    fn check_hot_call(
        &self,
        source: &str,
        importer: &str,
        call: &HotCall,
        record: &mut ModuleRecord,
        patch: &mut Patch,
    ) -> Result<()> {
        let method = call.method;
        let line = line_of(source, call.start);

        if call.context == HotContext::TopLevel {
            tracing::warn!(
                line,
                "HMR syntax error in {importer}: import.meta.hot.{method}() should be wrapped in \
                 `if (import.meta.hot) {{}}` conditional blocks so that they can be tree-shaken \
                 in production."
            );
        }

        if method == HotMethod::Decline {
            record.declined = true;
            return Ok(());
        }

        if call.context != HotContext::Guarded {
            tracing::warn!(
                line,
                "HMR syntax error in {importer}: import.meta.hot.{method}() cannot be conditional \
                 except for `if (import.meta.hot)` check because the server relies on static \
                 analysis to construct the HMR graph."
            );
        }

        let single_callback = || {
            if method != HotMethod::AcceptDeps {
                tracing::warn!(
                    line,
                    "HMR syntax error in {importer}: hot.accept() only accepts a single \
                     callback. Use hot.acceptDeps() to handle dep updates."
                );
            }
        };

        match &call.arg {
            HotArg::Array { deps, non_literal } => {
                single_callback();
                if *non_literal {
                    tracing::warn!(
                        line,
                        "HMR syntax error in {importer}: hot.accept() deps list can only contain \
                         string literals."
                    );
                }
                for dep in deps {
                    self.register_dep(importer, dep, record, patch)?;
                }
            }
            HotArg::Str(dep) => {
                single_callback();
                self.register_dep(importer, dep, record, patch)?;
            }
            HotArg::None | HotArg::Callback => {
                if method != HotMethod::Accept {
                    tracing::warn!(
                        line,
                        "HMR syntax error in {importer}: hot.acceptDeps() expects a dependency \
                         or an array of dependencies. Use hot.accept() for handling self updates."
                    );
                }
                tracing::debug!(importer, "self accepts");
                record.accept_self = true;
            }
            HotArg::Invalid => {
                tracing::warn!(
                    line,
                    "HMR syntax error in {importer}: import.meta.hot.accept() expects a dep \
                     string, an array of deps, or a callback."
                );
            }
        }
        Ok(())
    }

    fn register_dep(
        &self,
        importer: &str,
        dep: &LiteralDep,
        record: &mut ModuleRecord,
        patch: &mut Patch,
    ) -> Result<()> {
        let resolved = self.resolve_import(importer, &dep.value, None)?;
        tracing::debug!(importer, "accepts {resolved}");
        let literal = serde_json::to_string(&resolved).unwrap_or_else(|_| format!("\"{resolved}\""));
        patch.overwrite(dep.start, dep.end, literal);
        record.accepted_deps.insert(clean_url(&resolved).to_string());
        Ok(())
    }
}

/// 1-based line of byte `offset`.
fn line_of(source: &str, offset: usize) -> usize {
    let end = offset.min(source.len());
    memchr::memchr_iter(b'\n', &source.as_bytes()[..end]).count() + 1
}

/// Pending edits against the original text.
#[derive(Debug, Default)]
struct Patch {
    prefix: Vec<String>,
    spans: Vec<(usize, usize, String)>,
}

impl Patch {
    fn overwrite(&mut self, start: usize, end: usize, text: String) {
        self.spans.push((start, end, text));
    }

    /// Later prepends end up in front of earlier ones.
    fn prepend(&mut self, text: &str) {
        self.prefix.push(text.to_string());
    }

    fn apply(mut self, source: &str) -> String {
        if self.prefix.is_empty() && self.spans.is_empty() {
            return source.to_string();
        }
        self.spans.sort_by_key(|(start, _, _)| *start);

        let mut out = String::with_capacity(source.len() + 128);
        for text in self.prefix.iter().rev() {
            out.push_str(text);
        }
        let mut cursor = 0;
        for (start, end, text) in &self.spans {
            if *start < cursor {
                continue;
            }
            out.push_str(&source[cursor..*start]);
            out.push_str(text);
            cursor = *end;
        }
        out.push_str(&source[cursor..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_applies_spans_in_order_after_prefixes() {
        let mut patch = Patch::default();
        patch.overwrite(7, 8, "/b.js".into());
        patch.overwrite(0, 1, "X".into());
        patch.prepend("first;");
        patch.prepend("second;");
        assert_eq!(patch.apply("a = 1; b c"), "second;first;X = 1; /b.js c");
    }

    #[test]
    fn lines_are_one_based() {
        assert_eq!(line_of("a\nb\nc", 0), 1);
        assert_eq!(line_of("a\nb\nc", 4), 3);
        assert_eq!(line_of("abc", 99), 1);
    }
}
