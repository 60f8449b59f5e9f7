//! Request-path and filesystem-path helpers.
//!
//! Request paths are always posix (`/`-separated) strings; filesystem paths
//! are `Path`s. Everything here is pure except [`lookup_file`] and
//! [`is_file`].

use std::path::{Path, PathBuf};

/// Prefix of requests that address third-party modules.
pub const MODULES_PREFIX: &str = "/@modules/";

/// Request path of the browser hot-update client.
pub const CLIENT_PUBLIC_PATH: &str = "/@kiln/client";

/// Request path of the environment snapshot module.
pub const ENV_PUBLIC_PATH: &str = "/@kiln/env";

/// Extensions probed by fuzzy resolution, in priority order.
pub const SUPPORTED_EXTS: [&str; 6] = [".mjs", ".js", ".ts", ".jsx", ".tsx", ".json"];

const JS_SRC_EXTS: [&str; 6] = ["js", "ts", "jsx", "tsx", "mjs", "vue"];

const STYLE_EXTS: [&str; 8] = [
    "css", "scss", "sass", "less", "styl", "stylus", "pcss", "postcss",
];

/// Strip the query string and fragment from a url.
pub fn clean_url(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Split `url` into its path and query. The query keeps its leading `?`
/// and drops any fragment.
pub fn split_query(url: &str) -> (&str, &str) {
    let without_hash = url.find('#').map_or(url, |index| &url[..index]);
    match without_hash.find('?') {
        Some(index) => (&without_hash[..index], &without_hash[index..]),
        None => (without_hash, ""),
    }
}

/// Value of query parameter `key`, if present. A bare `?key` yields `""`.
pub fn query_param<'a>(url: &'a str, key: &str) -> Option<&'a str> {
    let (_, query) = split_query(url);
    query
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .find_map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (name == key).then_some(value)
        })
}

/// Append `param` (for example `t=123` or `import`) with `?` or `&`.
pub fn append_query(url: &str, param: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{param}")
}

/// Drop the `t` and `import` query parameters, keeping the rest.
pub fn strip_hmr_query(url: &str) -> String {
    let (path, query) = split_query(url);
    let kept: Vec<&str> = query
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| {
            let name = pair.split_once('=').map_or(*pair, |(name, _)| name);
            !pair.is_empty() && name != "t" && name != "import"
        })
        .collect();
    if kept.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{}", kept.join("&"))
    }
}

/// `^[^/.]`: a package name rather than a path.
pub fn is_bare(id: &str) -> bool {
    id.chars().next().is_some_and(|c| c != '/' && c != '.')
}

/// `^(https?:)?//`
pub fn is_external_url(url: &str) -> bool {
    url.starts_with("//") || url.starts_with("http://") || url.starts_with("https://")
}

/// Extension of the last path segment without the dot.
pub fn extension(path: &str) -> Option<&str> {
    let clean = clean_url(path);
    let segment = clean.rsplit('/').next().unwrap_or(clean);
    match segment.rfind('.') {
        Some(0) | None => None,
        Some(index) => Some(&segment[index + 1..]),
    }
}

/// Script source that is served as a module without the `import` marker.
pub fn is_js_src(path: &str) -> bool {
    extension(path).is_some_and(|ext| JS_SRC_EXTS.contains(&ext))
}

pub fn is_style_request(path: &str) -> bool {
    extension(path).is_some_and(|ext| STYLE_EXTS.contains(&ext))
}

const STATIC_ASSET_EXTS: [&str; 20] = [
    "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "mp4", "webm", "ogg", "mp3", "wav", "flac",
    "aac", "woff", "woff2", "eot", "ttf", "otf", "avif",
];

/// Image, media or font file.
pub fn is_static_asset(path: &str) -> bool {
    extension(path).is_some_and(|ext| {
        let lower = ext.to_ascii_lowercase();
        STATIC_ASSET_EXTS.contains(&lower.as_str())
    })
}

/// Style or static asset, as opposed to script source.
pub fn is_asset(path: &str) -> bool {
    is_style_request(path) || is_static_asset(path)
}

/// Template-component module.
pub fn is_component(path: &str) -> bool {
    clean_url(path).ends_with(".vue")
}

pub fn is_html(path: &str) -> bool {
    clean_url(path).ends_with(".html")
}

/// Components of a module id such as `@scope/name/in/pkg.js`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeModuleId<'a> {
    pub scope: Option<&'a str>,
    pub name: &'a str,
    pub in_pkg_path: &'a str,
}

impl NodeModuleId<'_> {
    /// `name` or `@scope/name`.
    pub fn package(&self) -> String {
        match self.scope {
            Some(scope) => format!("{scope}/{}", self.name),
            None => self.name.to_string(),
        }
    }
}

pub fn parse_node_module_id(id: &str) -> NodeModuleId<'_> {
    let (scope, rest) = if id.starts_with('@') {
        match id.split_once('/') {
            Some((scope, rest)) => (Some(scope), rest),
            None => (Some(id), ""),
        }
    } else {
        (None, id)
    };
    let (name, in_pkg_path) = rest.split_once('/').unwrap_or((rest, ""));
    NodeModuleId {
        scope,
        name,
        in_pkg_path,
    }
}

/// Split a deep import (`pkg/sub` or `@scope/pkg/sub`) into package id and
/// the remaining subpath.
pub fn split_deep_import(id: &str) -> Option<(&str, &str)> {
    if id.starts_with('@') {
        let first = id.find('/')?;
        let second = first + 1 + id[first + 1..].find('/')?;
        if first == 1 || second == first + 1 {
            return None;
        }
        Some((&id[..second], &id[second + 1..]))
    } else {
        let slash = id.find('/')?;
        (slash > 0).then(|| (&id[..slash], &id[slash + 1..]))
    }
}

/// Posix normalization: collapses `.`, `..` and duplicate slashes. A
/// trailing slash is preserved.
pub fn posix_normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let mut out = parts.join("/");
    if absolute {
        out.insert(0, '/');
    }
    if path.ends_with('/') && !out.ends_with('/') && !out.is_empty() {
        out.push('/');
    }
    if out.is_empty() {
        out.push_str(if absolute { "/" } else { "." });
    }
    out
}

/// Posix directory name of a request path.
pub fn posix_dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(index) => &path[..index],
        None => ".",
    }
}

/// Resolve `to` against directory `from` using posix semantics. Trailing
/// slashes are dropped.
pub fn posix_resolve(from: &str, to: &str) -> String {
    let joined = if to.starts_with('/') {
        to.to_string()
    } else {
        format!("{from}/{to}")
    };
    let normalized = posix_normalize(&joined);
    if normalized.len() > 1 {
        normalized.trim_end_matches('/').to_string()
    } else {
        normalized
    }
}

/// Forward-slash rendering of a filesystem path.
pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Relative path from `base` to `path` with forward slashes.
pub fn relative_slash(base: &Path, path: &Path) -> Option<String> {
    pathdiff::diff_paths(path, base).map(|relative| to_slash(&relative))
}

/// `true` when `path` lies inside `dir` (or equals it).
pub fn is_within(dir: &Path, path: &Path) -> bool {
    path.starts_with(dir)
}

pub fn is_file(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|meta| meta.is_file())
}

pub fn is_dir(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|meta| meta.is_dir())
}

/// Walk up from `dir` and return the first existing file named one of
/// `names`, trying names in order within each directory.
pub fn lookup_file(dir: &Path, names: &[&str]) -> Option<PathBuf> {
    dir.ancestors()
        .flat_map(|ancestor| names.iter().map(move |name| ancestor.join(name)))
        .find(|candidate| is_file(candidate))
}
