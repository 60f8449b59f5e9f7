//! Extension and directory-index completion.

use std::path::{Path, PathBuf};

use crate::paths::{SUPPORTED_EXTS, is_file};

/// Postfix that turns `path` into an existing file, such as `.ts` or
/// `/index.js`. `None` when `path` already is a file or nothing matches.
pub fn fuzzy_postfix(path: &Path) -> Option<String> {
    if is_file(path) {
        return None;
    }
    let base = path.as_os_str().to_string_lossy();
    for ext in SUPPORTED_EXTS {
        if is_file(Path::new(&format!("{base}{ext}"))) {
            return Some(ext.to_string());
        }
        if is_file(&path.join(format!("index{ext}"))) {
            return Some(format!("/index{ext}"));
        }
    }
    None
}

/// Apply [`fuzzy_postfix`] to `path`.
pub fn resolve_fuzzy(path: PathBuf) -> PathBuf {
    match fuzzy_postfix(&path) {
        Some(postfix) if postfix.starts_with('/') => path.join(&postfix[1..]),
        Some(postfix) => {
            let mut joined = path.into_os_string();
            joined.push(&postfix);
            PathBuf::from(joined)
        }
        None => path,
    }
}
