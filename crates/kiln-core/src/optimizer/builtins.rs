use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use memchr::memmem;
use rustc_hash::FxHashSet;

use crate::resolver::NodeResolver;
use crate::scan::{ImportKind, scan_module};

/// Node.js core modules that have no browser counterpart.
pub const NODE_BUILTINS: [&str; 41] = [
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "worker_threads",
    "zlib",
];

/// Walk the relative-import closure of `entry` and return the first file
/// importing a Node.js core module, with the module name.
///
/// Both ES imports and `require("...")` calls are considered. A builtin name
/// that is also installed as a package (a browser polyfill such as `events`
/// or `buffer`) is not reported.
pub fn find_node_builtin_import(node: &NodeResolver, entry: &Path) -> Option<(PathBuf, String)> {
    let mut queue = VecDeque::from([entry.to_path_buf()]);
    let mut seen = FxHashSet::default();

    while let Some(file) = queue.pop_front() {
        if !seen.insert(file.clone()) {
            continue;
        }
        let Ok(source) = std::fs::read_to_string(&file) else {
            continue;
        };
        let dir = file.parent().unwrap_or(Path::new("/"));

        for specifier in specifiers(&source) {
            if specifier.starts_with('.') {
                if let Some(next) = node.resolve(dir, &specifier) {
                    queue.push_back(next);
                }
                continue;
            }
            if let Some(builtin) = builtin_name(&specifier) {
                if specifier.starts_with("node:") || node.find_manifest(dir, builtin).is_none() {
                    return Some((file, builtin.to_string()));
                }
            }
        }
    }
    None
}

fn builtin_name(specifier: &str) -> Option<&'static str> {
    let name = specifier.strip_prefix("node:").unwrap_or(specifier);
    let name = name.split('/').next().unwrap_or(name);
    NODE_BUILTINS.iter().copied().find(|builtin| *builtin == name)
}

fn specifiers(source: &str) -> Vec<String> {
    let mut found: Vec<String> = match scan_module(source) {
        Ok(scan) => scan
            .imports
            .into_iter()
            .filter(|import| import.kind != ImportKind::DynamicExpr)
            .map(|import| import.value)
            .collect(),
        Err(_) => Vec::new(),
    };
    found.extend(require_calls(source).map(str::to_string));
    found
}

/// String arguments of `require(...)` calls.
fn require_calls(source: &str) -> impl Iterator<Item = &str> {
    let bytes = source.as_bytes();
    memmem::find_iter(bytes, b"require(").filter_map(move |at| {
        let preceded_by_ident = at > 0
            && bytes
                .get(at - 1)
                .is_some_and(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$' | b'.'));
        if preceded_by_ident {
            return None;
        }
        let mut cursor = at + "require(".len();
        while bytes.get(cursor).is_some_and(u8::is_ascii_whitespace) {
            cursor += 1;
        }
        let quote = *bytes.get(cursor)?;
        if quote != b'"' && quote != b'\'' {
            return None;
        }
        let start = cursor + 1;
        let len = memchr::memchr2(quote, b'\n', &bytes[start..])?;
        if bytes[start + len] != quote {
            return None;
        }
        source.get(start..start + len)
    })
}
