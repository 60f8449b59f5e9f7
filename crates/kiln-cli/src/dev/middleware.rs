//! Request pipeline for module and file requests.
//!
//! A request is first mapped to a file (`/@modules/` ids, the public
//! directory or the project root) and read through the content cache. The
//! body then runs through [`TRANSFORMS`] in order. Transforms are
//! synchronous: every await happens before the first one runs, so graph
//! updates made while rewriting never straddle a suspension point.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use axum::http::StatusCode;
use kiln_core::compile::{Severity, asset_module, inject_client, json_module, style_module};
use kiln_core::paths::{
    MODULES_PREFIX, clean_url, extension, is_html, is_js_src, is_style_request, query_param,
};
use kiln_core::CompileOptions;

use crate::dev::state::DevState;

/// What the browser asked for.
#[derive(Debug, Clone, Default)]
pub struct ModuleRequest {
    /// Path plus query, as received.
    pub url: String,
    pub if_none_match: Option<String>,
    pub referer: Option<String>,
}

impl ModuleRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn path(&self) -> &str {
        clean_url(&self.url)
    }
}

/// Response produced by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub status: StatusCode,
    pub content_type: Cow<'static, str>,
    pub body: Vec<u8>,
    pub etag: Option<String>,
}

impl Served {
    fn text(status: StatusCode, body: String) -> Self {
        Self {
            status,
            content_type: Cow::Borrowed("text/plain; charset=utf-8"),
            body: body.into_bytes(),
            etag: None,
        }
    }

    fn not_modified(etag: String) -> Self {
        Self {
            status: StatusCode::NOT_MODIFIED,
            content_type: Cow::Borrowed(""),
            body: Vec::new(),
            etag: Some(etag),
        }
    }

    fn is_javascript(&self) -> bool {
        self.content_type == JAVASCRIPT
    }

    fn source(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    fn replace_js(mut self, code: String) -> Self {
        self.body = code.into_bytes();
        self.content_type = Cow::Borrowed(JAVASCRIPT);
        self
    }
}

const JAVASCRIPT: &str = "application/javascript";

/// A transform step that could not produce a body.
#[derive(Debug)]
pub struct TransformError {
    pub status: StatusCode,
    pub message: String,
    /// The server must shut down.
    pub fatal: bool,
}

impl TransformError {
    fn internal(message: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
            fatal: false,
        }
    }
}

/// The file being served and the request it answers.
pub struct Context<'a> {
    pub request: &'a ModuleRequest,
    /// Request path without query; `/` is already expanded to `/index.html`.
    pub path: &'a str,
    pub file: &'a Path,
}

pub type Transform = fn(&DevState, &Context<'_>, Served) -> Result<Served, TransformError>;

/// Body transforms, applied in order.
pub const TRANSFORMS: [Transform; 4] = [asset_import, html_entry, compile, rewrite_imports];

/// Run the whole pipeline for `request`.
pub async fn serve(state: &DevState, request: &ModuleRequest) -> Served {
    let url = request.url.as_str();
    if let Some(timestamp) = query_param(url, "t").filter(|t| !t.is_empty()) {
        state.hot.record_version(url, timestamp);
    }

    let path = match request.path() {
        "" => Cow::Borrowed("/index.html"),
        dir if dir.ends_with('/') => Cow::Owned(format!("{dir}index.html")),
        path => Cow::Borrowed(path),
    };

    let file = match path.strip_prefix(MODULES_PREFIX) {
        Some(id) => match locate_module(state, id, request.referer.as_deref()) {
            Ok(file) => file,
            Err(importer) => {
                let message =
                    format!("Failed to resolve module import \"{id}\" (imported by {importer})");
                tracing::warn!("{message}");
                return Served::text(StatusCode::NOT_FOUND, message);
            }
        },
        None => state.resolver.request_to_file(&path),
    };

    let read = match state.content.read(&file).await {
        Ok(read) => read,
        Err(err) if err.is_not_found() => {
            tracing::debug!(url, "not found");
            return Served::text(StatusCode::NOT_FOUND, format!("File not found: {path}"));
        }
        Err(err) => {
            tracing::warn!("{err}");
            return Served::text(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
        }
    };

    let etag = read.file.etag.clone();
    let unchanged = request.if_none_match.as_deref() == Some(etag.as_str());
    if read.not_modified && unchanged && state.was_served(url) {
        return Served::not_modified(etag);
    }

    let mut served = Served {
        status: StatusCode::OK,
        content_type: Cow::Borrowed(content_type(&file)),
        body: read.file.content.to_vec(),
        etag: Some(etag),
    };
    let context = Context {
        request,
        path: &path,
        file: &file,
    };
    for transform in TRANSFORMS {
        served = match transform(state, &context, served) {
            Ok(served) => served,
            Err(err) => {
                if err.fatal {
                    state.report_fatal(err.message.clone());
                }
                return Served::text(err.status, err.message);
            }
        };
    }

    state.mark_served(url);
    served
}

/// File behind a `/@modules/` id: known ids first, then the pre-bundle
/// cache, then Node resolution from the importer's directory (taken from
/// the `Referer`) and finally from the root. Returns the importer for the
/// error message when nothing matches.
fn locate_module(state: &DevState, id: &str, referer: Option<&str>) -> Result<PathBuf, String> {
    let resolver = &state.resolver;
    if let Some(file) = resolver.module_file(id) {
        return Ok(file);
    }
    if let Some(file) = resolver.resolve_optimized_module(id) {
        return Ok(file);
    }

    let importer = referer.and_then(referer_path);
    let importer_dir = importer.as_deref().and_then(|importer| {
        resolver
            .request_to_file(importer)
            .parent()
            .map(Path::to_path_buf)
    });
    let found = importer_dir
        .and_then(|dir| resolver.resolve_node_module_file(&dir, id))
        .or_else(|| resolver.resolve_node_module_file(resolver.root(), id));

    match found {
        Some(file) => {
            resolver.record_module_file(id, &file);
            Ok(file)
        }
        None => Err(importer.unwrap_or_else(|| "unknown".to_string())),
    }
}

/// Request path of a `Referer` header value.
fn referer_path(referer: &str) -> Option<String> {
    let path = match referer.find("://") {
        Some(scheme_end) => {
            let rest = &referer[scheme_end + 3..];
            &rest[rest.find('/')?..]
        }
        None if referer.starts_with('/') => referer,
        None => return None,
    };
    Some(clean_url(path).to_string())
}

/// `?import` requests for non-script files become JavaScript modules.
fn asset_import(
    _state: &DevState,
    context: &Context<'_>,
    served: Served,
) -> Result<Served, TransformError> {
    let url = context.request.url.as_str();
    if query_param(url, "import").is_none() || is_js_src(context.path) {
        return Ok(served);
    }

    let code = if extension(context.path) == Some("json") {
        json_module(&served.source()).map_err(|err| {
            TransformError::internal(format!("invalid JSON in {}: {err}", context.path))
        })?
    } else if is_style_request(context.path) {
        style_module(context.path, &served.source())
    } else {
        asset_module(context.path)
    };
    Ok(served.replace_js(code))
}

fn html_entry(
    _state: &DevState,
    context: &Context<'_>,
    mut served: Served,
) -> Result<Served, TransformError> {
    if is_html(context.path) {
        served.body = inject_client(&served.source()).into_bytes();
    }
    Ok(served)
}

/// Transpile sources the configured compiler claims (`.ts`, `.tsx`, `.jsx`).
fn compile(
    state: &DevState,
    context: &Context<'_>,
    served: Served,
) -> Result<Served, TransformError> {
    if !state.compiler.handles(context.file) {
        return Ok(served);
    }

    let output = state
        .compiler
        .compile(&served.source(), context.file, &CompileOptions::default())
        .map_err(|err| {
            for diagnostic in &err.diagnostics {
                tracing::error!("{}: {diagnostic}", err.path);
            }
            TransformError::internal(err.to_string())
        })?;
    for diagnostic in &output.diagnostics {
        if diagnostic.severity == Severity::Warning {
            tracing::warn!("{}: {diagnostic}", context.path);
        }
    }
    Ok(served.replace_js(output.code))
}

fn rewrite_imports(
    state: &DevState,
    context: &Context<'_>,
    served: Served,
) -> Result<Served, TransformError> {
    let url = context.request.url.as_str();
    if !served.is_javascript() || !state.rewriter.should_rewrite(url) {
        return Ok(served);
    }

    let rewritten = state
        .rewriter
        .rewrite(url, &served.source())
        .map_err(|err| {
            let status = if err.is_not_found() {
                tracing::warn!("{err}");
                StatusCode::NOT_FOUND
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            TransformError {
                status,
                fatal: err.is_fatal(),
                message: err.to_string(),
            }
        })?;
    Ok(served.replace_js(rewritten))
}

/// Content type by file extension.
pub fn content_type(file: &Path) -> &'static str {
    let extension = file
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx" | "vue" => JAVASCRIPT,
        "json" | "map" => "application/json",
        "html" => "text/html; charset=utf-8",
        "css" => "text/css",
        "wasm" => "application/wasm",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
