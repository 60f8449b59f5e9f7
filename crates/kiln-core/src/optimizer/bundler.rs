//! Rolldown-backed [`DepBundler`].

use std::path::Path;

use async_trait::async_trait;
use rolldown::{
    BundlerBuilder as RolldownBundlerBuilder, BundlerOptions, InputItem, IsExternal, OutputFormat,
    Platform,
};
use rolldown_common::Output;

use super::{BundleRequest, DepBundler, OptimizeError, OutputFile};
use crate::paths::relative_slash;

/// Bundles each qualified dependency into `<id>.js`, sharing common code
/// between them through chunks.
#[derive(Debug, Clone, Copy, Default)]
pub struct RolldownBundler;

#[async_trait]
impl DepBundler for RolldownBundler {
    async fn bundle(&self, request: BundleRequest) -> Result<Vec<OutputFile>, OptimizeError> {
        let options = BundlerOptions {
            input: Some(
                request
                    .entries
                    .iter()
                    .map(|(id, entry)| InputItem {
                        name: Some(id.clone()),
                        import: entry.to_string_lossy().into_owned(),
                    })
                    .collect(),
            ),
            cwd: Some(request.root.clone()),
            external: Some(IsExternal::from(request.external.clone())),
            format: Some(OutputFormat::Esm),
            platform: Some(Platform::Browser),
            ..Default::default()
        };

        let mut bundler = RolldownBundlerBuilder::default()
            .with_options(options)
            .build()
            .map_err(|err| classify_error(&request.root, &format!("{err:?}")))?;
        let output = bundler
            .generate()
            .await
            .map_err(|err| classify_error(&request.root, &format!("{err:?}")))?;

        let files = output
            .assets
            .iter()
            .map(|output| match output {
                Output::Asset(asset) => OutputFile {
                    file_name: asset.filename.to_string(),
                    contents: asset.source.as_bytes().to_vec(),
                },
                Output::Chunk(chunk) => OutputFile {
                    file_name: chunk.filename.to_string(),
                    contents: chunk.code.as_bytes().to_vec(),
                },
            })
            .collect::<Vec<_>>();
        tracing::debug!(files = files.len(), "rolldown finished");
        Ok(files)
    }
}

/// Turn a rolldown diagnostic dump into an [`OptimizeError`]. Parse errors
/// with a recoverable location get a code frame.
fn classify_error(root: &Path, text: &str) -> OptimizeError {
    let is_parse =
        text.contains("Parse error") || text.contains("Syntax") || text.contains("Expected");
    if is_parse {
        if let Some(file) = file_path(text) {
            let line = number_after(text, &["line ", ":"]).unwrap_or(1);
            let column = number_after(text, &["column ", "col "]).unwrap_or(1);
            let absolute = root.join(&file);
            let frame = std::fs::read_to_string(&absolute)
                .map(|source| code_frame(&source, line, column))
                .unwrap_or_default();
            let file = relative_slash(root, &absolute).unwrap_or(file);
            return OptimizeError::Parse {
                file,
                line,
                column,
                message: first_line(text),
                frame,
            };
        }
    }
    OptimizeError::Bundle {
        message: first_line(text),
    }
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or(text).trim().to_string()
}

fn file_path(text: &str) -> Option<String> {
    for ext in [".mjs", ".cjs", ".jsx", ".tsx", ".js", ".ts"] {
        let Some(pos) = text.find(ext) else {
            continue;
        };
        let before = &text[..pos + ext.len()];
        let start = before
            .rfind(['"', '\'', ' ', '(', '\n'])
            .map(|at| at + 1)
            .unwrap_or(0);
        let path = before[start..].trim();
        if !path.is_empty() {
            return Some(path.to_string());
        }
    }
    None
}

fn number_after(text: &str, patterns: &[&str]) -> Option<u32> {
    patterns.iter().find_map(|pattern| {
        text.match_indices(pattern).find_map(|(at, _)| {
            let digits: String = text[at + pattern.len()..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            digits.parse().ok()
        })
    })
}

/// Source excerpt around `line` (1-based) with a caret under `column`
/// (1-based).
pub fn code_frame(source: &str, line: u32, column: u32) -> String {
    const CONTEXT: usize = 2;

    let lines: Vec<&str> = source.lines().collect();
    if lines.is_empty() {
        return String::new();
    }
    let target = (line.max(1) as usize).min(lines.len());
    let first = target.saturating_sub(CONTEXT).max(1);
    let last = (target + CONTEXT).min(lines.len());
    let width = last.to_string().len();

    let mut frame = String::new();
    for number in first..=last {
        let marker = if number == target { '>' } else { ' ' };
        frame.push_str(&format!("{marker} {number:>width$} | {}\n", lines[number - 1]));
        if number == target {
            let pad = " ".repeat(column.max(1) as usize - 1);
            frame.push_str(&format!("  {:>width$} | {pad}^\n", ""));
        }
    }
    frame
}
