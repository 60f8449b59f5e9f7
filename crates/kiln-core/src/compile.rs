//! Source transforms applied before rewriting.
//!
//! Syntax transpilation sits behind [`Compiler`]; the dev server ships with
//! [`OxcCompiler`], which strips TypeScript and lowers JSX. The helpers below
//! it wrap non-script resources (JSON, stylesheets, other assets, the
//! environment snapshot) into ES modules and inject the client into HTML.

use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{TransformOptions, Transformer};
use serde_json::Value;

use crate::paths::CLIENT_PUBLIC_PATH;

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub sourcemap: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(f, "{line}:{column}: {}", self.message),
            (Some(line), None) => write!(f, "{line}: {}", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    pub code: String,
    pub map: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, thiserror::Error)]
#[error("failed to compile {path}: {message}")]
pub struct CompileError {
    pub path: String,
    pub message: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// External transpiler.
pub trait Compiler: Send + Sync + fmt::Debug {
    /// Whether `path` needs compiling before it can be served as a module.
    fn handles(&self, path: &Path) -> bool;

    fn compile(
        &self,
        source: &str,
        path: &Path,
        options: &CompileOptions,
    ) -> Result<CompileOutput, CompileError>;
}

/// TypeScript and JSX transpiler built on oxc.
///
/// Types are erased and JSX is lowered with the automatic runtime; newer
/// syntax is left for the browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct OxcCompiler;

impl Compiler for OxcCompiler {
    fn handles(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| matches!(ext, "ts" | "tsx" | "jsx" | "mts" | "cts"))
    }

    fn compile(
        &self,
        source: &str,
        path: &Path,
        options: &CompileOptions,
    ) -> Result<CompileOutput, CompileError> {
        let failure = |message: String, diagnostics: Vec<Diagnostic>| CompileError {
            path: path.display().to_string(),
            message,
            diagnostics,
        };
        let source_type =
            SourceType::from_path(path).map_err(|err| failure(err.to_string(), Vec::new()))?;

        let allocator = Allocator::default();
        let parsed = Parser::new(&allocator, source, source_type).parse();
        if parsed.panicked || !parsed.errors.is_empty() {
            let diagnostics: Vec<Diagnostic> = parsed
                .errors
                .iter()
                .map(|error| {
                    let offset = error.labels.as_ref().and_then(|labels| labels.first());
                    error_at(source, error.to_string(), offset.map(|label| label.offset()))
                })
                .collect();
            let message = diagnostics
                .first()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unrecoverable syntax error".to_string());
            return Err(failure(message, diagnostics));
        }
        let mut program = parsed.program;

        let scoping = SemanticBuilder::new()
            .with_excess_capacity(2.0)
            .build(&program)
            .semantic
            .into_scoping();
        let transformed = Transformer::new(&allocator, path, &TransformOptions::default())
            .build_with_scoping(scoping, &mut program);
        if !transformed.errors.is_empty() {
            let diagnostics: Vec<Diagnostic> = transformed
                .errors
                .iter()
                .map(|error| {
                    let offset = error.labels.as_ref().and_then(|labels| labels.first());
                    error_at(source, error.to_string(), offset.map(|label| label.offset()))
                })
                .collect();
            let message = diagnostics
                .first()
                .map(ToString::to_string)
                .unwrap_or_default();
            return Err(failure(message, diagnostics));
        }

        let codegen_options = CodegenOptions {
            source_map_path: options.sourcemap.then(|| path.to_path_buf()),
            ..CodegenOptions::default()
        };
        let generated = Codegen::new().with_options(codegen_options).build(&program);
        tracing::trace!(path = %path.display(), "transpiled");

        Ok(CompileOutput {
            code: generated.code,
            map: generated.map.map(|map| map.to_json_string()),
            diagnostics: Vec::new(),
        })
    }
}

/// Error diagnostic at byte `offset` of `source`.
fn error_at(source: &str, message: String, offset: Option<usize>) -> Diagnostic {
    let position = offset.map(|offset| line_column(source, offset));
    Diagnostic {
        severity: Severity::Error,
        message,
        line: position.map(|(line, _)| line),
        column: position.map(|(_, column)| column),
    }
}

/// 1-based line and column of byte `offset`.
fn line_column(source: &str, offset: usize) -> (u32, u32) {
    let before = &source.as_bytes()[..offset.min(source.len())];
    let line = memchr::memchr_iter(b'\n', before).count() + 1;
    let line_start = memchr::memrchr(b'\n', before).map_or(0, |at| at + 1);
    (line as u32, (before.len() - line_start + 1) as u32)
}

/// `export default <json>`. Invalid JSON is an error.
pub fn json_module(source: &str) -> Result<String, serde_json::Error> {
    let value: Value = serde_json::from_str(source)?;
    Ok(format!("export default {value}"))
}

/// Module that installs `css` through the client and exports the text.
pub fn style_module(id: &str, css: &str) -> String {
    let id = Value::from(id);
    let css = Value::from(css);
    format!(
        "import {{ updateStyle }} from \"{CLIENT_PUBLIC_PATH}\"\n\
         const css = {css}\n\
         updateStyle({id}, css)\n\
         export default css\n"
    )
}

/// Module whose default export is the asset's public URL.
pub fn asset_module(request: &str) -> String {
    format!("export default {}", Value::from(request))
}

/// Environment snapshot module.
///
/// `env` entries are exposed as-is; `BASE_URL`, `MODE`, `DEV` and `PROD`
/// are always present and win over user entries.
pub fn env_module(env: &IndexMap<String, String>, mode: &str) -> String {
    let mut map = serde_json::Map::new();
    for (key, value) in env {
        map.insert(key.clone(), Value::from(value.as_str()));
    }
    let production = mode == "production";
    map.insert("BASE_URL".into(), Value::from("/"));
    map.insert("MODE".into(), Value::from(mode));
    map.insert("DEV".into(), Value::from(!production));
    map.insert("PROD".into(), Value::from(production));
    format!("export default {}", Value::Object(map))
}

/// Inject the client import at the start of `<head>`, or at the start of
/// the document when there is none.
pub fn inject_client(html: &str) -> String {
    let tag = format!("<script type=\"module\">import \"{CLIENT_PUBLIC_PATH}\"</script>");
    let lower = html.to_ascii_lowercase();
    let head = memchr::memmem::find_iter(lower.as_bytes(), b"<head")
        .find(|&at| matches!(lower.as_bytes().get(at + 5), Some(b'>' | b' ' | b'\t' | b'\n')));
    let insert_at = head
        .and_then(|at| lower[at..].find('>').map(|close| at + close + 1))
        .unwrap_or(0);

    let mut out = String::with_capacity(html.len() + tag.len());
    out.push_str(&html[..insert_at]);
    out.push_str(&tag);
    out.push_str(&html[insert_at..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_becomes_default_export() {
        assert_eq!(json_module(r#"{ "a": [1, 2] }"#).unwrap(), r#"export default {"a":[1,2]}"#);
        assert!(json_module("{ nope").is_err());
    }

    #[test]
    fn style_module_escapes_css() {
        let module = style_module("/src/a.css", "a::after { content: \"x\" }");
        assert!(module.contains(r#"const css = "a::after { content: \"x\" }""#));
        assert!(module.contains(r#"updateStyle("/src/a.css", css)"#));
        assert!(module.starts_with("import { updateStyle } from \"/@kiln/client\""));
    }

    #[test]
    fn env_module_flags_follow_mode() {
        let mut env = IndexMap::new();
        env.insert("KILN_API".to_string(), "https://api".to_string());
        env.insert("MODE".to_string(), "ignored".to_string());

        let module = env_module(&env, "development");
        let json: Value = serde_json::from_str(module.trim_start_matches("export default ")).unwrap();
        assert_eq!(json["KILN_API"], "https://api");
        assert_eq!(json["MODE"], "development");
        assert_eq!(json["DEV"], true);
        assert_eq!(json["PROD"], false);
        assert_eq!(json["BASE_URL"], "/");
    }

    #[test]
    fn client_goes_into_head() {
        let html = "<!DOCTYPE html><html><head><title>x</title></head></html>";
        let injected = inject_client(html);
        assert!(injected.contains(
            "<head><script type=\"module\">import \"/@kiln/client\"</script><title>"
        ));

        let bare = inject_client("<div></div>");
        assert!(bare.starts_with("<script type=\"module\">"));

        let header = inject_client("<header></header>");
        assert!(header.starts_with("<script"));
    }

    #[test]
    fn typescript_loses_its_types() {
        let source = "import type { Props } from './types'\n\
                      interface Point { x: number }\n\
                      export const origin: Point = { x: 0 }\n\
                      export function scale(p: Point, by: number): Point {\n\
                        return { x: p.x * by }\n\
                      }\n";
        let output = OxcCompiler
            .compile(source, Path::new("/src/point.ts"), &CompileOptions::default())
            .unwrap();

        assert!(!output.code.contains("interface"));
        assert!(!output.code.contains(": number"));
        assert!(!output.code.contains(": Point"));
        assert!(!output.code.contains("./types"));
        assert!(output.code.contains("export const origin = { x: 0 }"));
        assert!(output.code.contains("export function scale(p, by)"));
        assert!(output.map.is_none());
    }

    #[test]
    fn jsx_is_lowered() {
        let output = OxcCompiler
            .compile(
                "export const App = () => <div class=\"app\">hi</div>\n",
                Path::new("/src/App.jsx"),
                &CompileOptions { sourcemap: true },
            )
            .unwrap();

        assert!(!output.code.contains("<div"));
        assert!(output.code.contains("react/jsx-runtime"));
        assert!(output.map.is_some_and(|map| map.contains("\"mappings\"")));
    }

    #[test]
    fn syntax_errors_carry_a_position() {
        let err = OxcCompiler
            .compile("let a: = 1\n", Path::new("/src/bad.ts"), &CompileOptions::default())
            .unwrap_err();

        assert_eq!(err.path, "/src/bad.ts");
        let first = &err.diagnostics[0];
        assert_eq!(first.severity, Severity::Error);
        assert_eq!(first.line, Some(1));
        assert!(first.column.is_some());
    }

    #[test]
    fn only_typed_and_jsx_sources_are_claimed() {
        assert!(OxcCompiler.handles(Path::new("a.ts")));
        assert!(OxcCompiler.handles(Path::new("a.tsx")));
        assert!(OxcCompiler.handles(Path::new("a.jsx")));
        assert!(!OxcCompiler.handles(Path::new("a.js")));
        assert!(!OxcCompiler.handles(Path::new("a.vue")));
    }

    #[test]
    fn line_column_is_one_based() {
        assert_eq!(line_column("ab\ncd", 0), (1, 1));
        assert_eq!(line_column("ab\ncd", 4), (2, 2));
    }
}
