//! Error taxonomy shared by the resolver, rewrite pipeline and content cache.
//!
//! Recovery happens at the request boundary: the dev server turns
//! [`Error::Resolution`] into a 404, logs [`Error::Parse`] and serves the
//! original text, and treats [`Error::GraphInconsistency`] as fatal.

use std::path::PathBuf;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving modules.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A request or bare specifier could not be mapped to a file.
    #[error("failed to resolve \"{specifier}\" (imported by {importer})")]
    Resolution {
        /// The specifier or request path that failed.
        specifier: String,
        /// Request path of the importing module.
        importer: String,
    },

    /// The import scanner could not lex a module.
    #[error("failed to parse {path} for import rewrite: {source}")]
    Parse {
        /// Request path of the module.
        path: String,
        /// Underlying scanner error.
        #[source]
        source: crate::scan::ScanError,
    },

    /// Path normalization produced a request that resolves to a different
    /// file than the original request.
    #[error(
        "normalized request \"{normalized}\" resolves to {}, but \"{request}\" resolves to {}",
        .normalized_file.display(),
        .request_file.display()
    )]
    GraphInconsistency {
        /// Request as received.
        request: String,
        /// Normalized request.
        normalized: String,
        /// File the original request resolves to.
        request_file: PathBuf,
        /// File the normalized request resolves to.
        normalized_file: PathBuf,
    },

    /// I/O error with the path that caused it.
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Attribute a resolution failure to `importer`. Other errors pass
    /// through untouched.
    pub fn imported_by(self, importer: &str) -> Self {
        match self {
            Self::Resolution { specifier, .. } => Self::Resolution {
                specifier,
                importer: importer.to_string(),
            },
            other => other,
        }
    }

    /// Whether the server must stop after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::GraphInconsistency { .. })
    }

    /// Whether this error should surface as a 404.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Resolution { .. } => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
