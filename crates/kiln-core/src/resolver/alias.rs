//! Alias rules.
//!
//! A key of the form `/prefix/` whose target is an absolute path names a
//! directory alias: requests under `/prefix/` map into that directory. The
//! target is tried relative to the project root first, then as an absolute
//! filesystem path; a directory alias whose target exists in neither place
//! is dropped. Every other key is an exact specifier replacement.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::paths::{is_dir, to_slash};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirAlias {
    /// Request prefix, with leading and trailing slash.
    pub prefix: String,
    /// Absolute directory the prefix maps to.
    pub target: PathBuf,
}

/// Ordered alias rules. Earlier entries win.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    dirs: Vec<DirAlias>,
    exact: IndexMap<String, String>,
}

impl AliasTable {
    pub fn new<I, K, V>(root: &Path, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut table = Self::default();
        for (key, target) in entries {
            table.push(root, key.into(), target.into());
        }
        table
    }

    fn push(&mut self, root: &Path, key: String, target: String) {
        let is_dir_key = key.starts_with('/') && key.ends_with('/');
        if is_dir_key && Path::new(&target).is_absolute() {
            let from_root = root.join(target.trim_start_matches('/'));
            let dir = if is_dir(&from_root) {
                from_root
            } else if is_dir(Path::new(&target)) {
                PathBuf::from(&target)
            } else {
                tracing::warn!(alias = %key, target = %target, "alias directory does not exist");
                return;
            };
            if !self.dirs.iter().any(|existing| existing.prefix == key) {
                self.dirs.push(DirAlias {
                    prefix: key,
                    target: dir,
                });
            }
        } else {
            self.exact.entry(key).or_insert(target);
        }
    }

    pub fn dirs(&self) -> &[DirAlias] {
        &self.dirs
    }

    /// Exact replacement for `id`.
    pub fn exact(&self, id: &str) -> Option<&str> {
        self.exact.get(id).map(String::as_str)
    }

    /// Directory alias covering `request`.
    pub fn dir_for_request(&self, request: &str) -> Option<&DirAlias> {
        self.dirs
            .iter()
            .find(|alias| request.starts_with(&alias.prefix))
    }

    pub fn request_to_file(&self, request: &str) -> Option<PathBuf> {
        let alias = self.dir_for_request(request)?;
        Some(alias.target.join(&request[alias.prefix.len()..]))
    }

    pub fn file_to_request(&self, file: &Path) -> Option<String> {
        self.dirs.iter().find_map(|alias| {
            let relative = file.strip_prefix(&alias.target).ok()?;
            if relative.as_os_str().is_empty() {
                return None;
            }
            Some(format!("{}{}", alias.prefix, to_slash(relative)))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty() && self.exact.is_empty()
    }
}
