//! Positional import scanner.
//!
//! A single pass over module text that reports import/export specifiers with
//! byte spans, whether the module touches `import.meta.hot` or
//! `import.meta.env`, and every `import.meta.hot.accept/acceptDeps/decline`
//! call together with its argument shape and enclosing context. It is not a
//! parser: anything it does not recognise is skipped, and only unterminated
//! strings, comments, templates and regular expressions are errors.
//!
//! Callers that only need specifiers use [`scan_specifiers`]; the rewrite
//! pipeline uses the full [`ModuleScan`] so graph recording and rewriting
//! share one pass.

mod lexer;

use std::fmt;

/// How a specifier was referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// `import x from "x"` / `import "x"`; span excludes the quotes.
    Static,
    /// `export ... from "x"`; span excludes the quotes.
    ExportFrom,
    /// `import("x")`; span includes the quotes.
    DynamicLiteral,
    /// `import(expr)`; span covers the expression text.
    DynamicExpr,
}

/// A specifier occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpan {
    pub start: usize,
    pub end: usize,
    /// Specifier text without quotes, or the raw expression.
    pub value: String,
    pub kind: ImportKind,
}

impl ImportSpan {
    pub fn is_dynamic(&self) -> bool {
        matches!(self.kind, ImportKind::DynamicLiteral | ImportKind::DynamicExpr)
    }
}

/// Hot handle method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotMethod {
    Accept,
    AcceptDeps,
    Decline,
}

impl fmt::Display for HotMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Accept => "accept",
            Self::AcceptDeps => "acceptDeps",
            Self::Decline => "decline",
        })
    }
}

/// String literal inside a hot call; span includes the quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralDep {
    pub start: usize,
    pub end: usize,
    pub value: String,
}

/// Shape of the first argument of a hot call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotArg {
    None,
    Str(LiteralDep),
    Array {
        deps: Vec<LiteralDep>,
        /// At least one element was not a string literal.
        non_literal: bool,
    },
    Callback,
    Invalid,
}

/// Where a hot call sits relative to `if (import.meta.hot)` guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotContext {
    /// Unconditional statement at module level.
    TopLevel,
    /// Inside `if (import.meta.hot)` and no other conditional.
    Guarded,
    /// Inside some other block or conditional.
    Conditional,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotCall {
    pub method: HotMethod,
    pub arg: HotArg,
    pub context: HotContext,
    /// Offset of the `import` keyword starting the call.
    pub start: usize,
}

/// Everything one scan of a module yields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleScan {
    pub imports: Vec<ImportSpan>,
    /// Number of `export` statements.
    pub export_count: usize,
    /// `export * from "..."` without a namespace binding.
    pub has_star_reexport: bool,
    pub has_hot: bool,
    pub has_env: bool,
    pub hot_calls: Vec<HotCall>,
}

/// Unterminated construct.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unterminated {construct} starting at byte {offset}")]
pub struct ScanError {
    pub construct: &'static str,
    pub offset: usize,
}

/// Narrow specifier view of a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
    pub start: usize,
    pub end: usize,
    pub value: String,
    pub is_dynamic: bool,
}

/// Scan `source` in full.
pub fn scan_module(source: &str) -> Result<ModuleScan, ScanError> {
    lexer::Lexer::new(source).run()
}

/// Import and re-export specifiers of `source`.
pub fn scan_specifiers(source: &str) -> Result<Vec<Specifier>, ScanError> {
    Ok(scan_module(source)?
        .imports
        .into_iter()
        .map(|import| Specifier {
            is_dynamic: import.is_dynamic(),
            start: import.start,
            end: import.end,
            value: import.value,
        })
        .collect())
}

#[cfg(test)]
mod tests;
