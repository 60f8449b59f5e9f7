//! Byte-level lexer behind [`scan_module`](super::scan_module).

use memchr::{memchr, memchr3, memmem};

use super::{
    HotArg, HotCall, HotContext, HotMethod, ImportKind, ImportSpan, LiteralDep, ModuleScan,
    ScanError,
};

const REGEX_KEYWORDS: [&str; 14] = [
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    /// Body of `if (import.meta.hot) { ... }`.
    Guard,
    Other,
    /// `${ ... }` inside a template literal, with the offset of `${`.
    Template(usize),
}

#[derive(Debug, Clone, Copy)]
enum Paren {
    /// Condition of an `if`, starting at the given offset.
    IfCond(usize),
    Plain,
}

/// Brace-less `if` body currently being scanned.
#[derive(Debug, Clone, Copy)]
struct Inline {
    guard: bool,
    blocks: usize,
    parens: usize,
}

/// Whether the previous token ends an operand; decides `/` as division
/// versus the start of a regular expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prev {
    Operand,
    Operator,
}

pub(super) struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    scan: ModuleScan,
    blocks: Vec<Block>,
    parens: Vec<Paren>,
    inline: Vec<Inline>,
    after_if: bool,
    pending_if: Option<bool>,
    prev: Prev,
}

impl<'a> Lexer<'a> {
    pub(super) fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            scan: ModuleScan::default(),
            blocks: Vec::new(),
            parens: Vec::new(),
            inline: Vec::new(),
            after_if: false,
            pending_if: None,
            prev: Prev::Operator,
        }
    }

    pub(super) fn run(mut self) -> Result<ModuleScan, ScanError> {
        if self.src.starts_with("#!") {
            self.pos = memchr(b'\n', self.bytes).unwrap_or(self.bytes.len());
        }

        while let Some(&byte) = self.bytes.get(self.pos) {
            match byte {
                b' ' | b'\t' | b'\r' | 0x0b | 0x0c => self.pos += 1,
                b'\n' => {
                    self.end_inline_at_newline();
                    self.pos += 1;
                }
                b'/' if self.peek(1) == Some(b'/') => {
                    self.pos = self.line_comment_end(self.pos);
                }
                b'/' if self.peek(1) == Some(b'*') => {
                    self.pos = self.block_comment_end(self.pos)?;
                }
                _ => {
                    let pending = self.pending_if.take();
                    match pending {
                        Some(guard) if byte != b'{' => self.inline.push(Inline {
                            guard,
                            blocks: self.blocks.len(),
                            parens: self.parens.len(),
                        }),
                        _ => {}
                    }
                    self.token(byte, pending)?;
                }
            }
        }

        if let Some(Block::Template(offset)) = self
            .blocks
            .iter()
            .find(|block| matches!(block, Block::Template(_)))
        {
            return Err(ScanError {
                construct: "template literal",
                offset: *offset,
            });
        }

        Ok(self.scan)
    }

    fn token(&mut self, byte: u8, pending: Option<bool>) -> Result<(), ScanError> {
        let after_if = std::mem::take(&mut self.after_if);

        match byte {
            b'\'' | b'"' => {
                self.pos = self.string_end(self.pos)?;
                self.prev = Prev::Operand;
            }
            b'`' => {
                self.pos += 1;
                self.template()?;
            }
            b'/' => {
                if self.prev == Prev::Operand {
                    self.pos += 1;
                    self.prev = Prev::Operator;
                } else {
                    self.pos = self.regex_end(self.pos)?;
                    self.prev = Prev::Operand;
                }
            }
            b'{' => {
                self.blocks.push(match pending {
                    Some(true) => Block::Guard,
                    _ => Block::Other,
                });
                self.pos += 1;
                self.prev = Prev::Operator;
            }
            b'}' => {
                self.pos += 1;
                if let Some(Block::Template(_)) = self.blocks.pop() {
                    self.template()?;
                } else {
                    let depth = self.blocks.len();
                    self.inline.retain(|inline| inline.blocks <= depth);
                    self.prev = Prev::Operator;
                }
            }
            b'(' => {
                self.parens.push(if after_if {
                    Paren::IfCond(self.pos + 1)
                } else {
                    Paren::Plain
                });
                self.pos += 1;
                self.prev = Prev::Operator;
            }
            b')' => {
                self.pos += 1;
                if let Some(Paren::IfCond(start)) = self.parens.pop() {
                    let condition = self.src[start..self.pos - 1].trim();
                    self.pending_if = Some(condition == "import.meta.hot");
                    self.prev = Prev::Operator;
                } else {
                    let depth = self.parens.len();
                    self.inline.retain(|inline| inline.parens <= depth);
                    self.prev = Prev::Operand;
                }
            }
            b';' => {
                self.pos += 1;
                let (blocks, parens) = (self.blocks.len(), self.parens.len());
                self.inline
                    .retain(|inline| inline.blocks != blocks || inline.parens != parens);
                self.prev = Prev::Operator;
            }
            b']' => {
                self.pos += 1;
                self.prev = Prev::Operand;
            }
            b if b.is_ascii_digit() => {
                while self
                    .bytes
                    .get(self.pos)
                    .is_some_and(|&b| is_ident_byte(b) || b == b'.')
                {
                    self.pos += 1;
                }
                self.prev = Prev::Operand;
            }
            b if is_ident_start(b) => self.word()?,
            _ => {
                self.pos += 1;
                self.prev = Prev::Operator;
            }
        }
        Ok(())
    }

    fn word(&mut self) -> Result<(), ScanError> {
        let src = self.src;
        let start = self.pos;
        self.pos = self.ident_end(start);

        if self.is_property(start) {
            self.prev = Prev::Operand;
            return Ok(());
        }

        match &src[start..self.pos] {
            "import" => self.import_keyword(start)?,
            "export" => self.export_keyword()?,
            "if" => {
                self.after_if = true;
                self.prev = Prev::Operator;
            }
            word if REGEX_KEYWORDS.contains(&word) => self.prev = Prev::Operator,
            _ => self.prev = Prev::Operand,
        }
        Ok(())
    }

    fn import_keyword(&mut self, start: usize) -> Result<(), ScanError> {
        let next = self.skip_trivia(self.pos);
        match self.bytes.get(next) {
            Some(b'.') => {
                self.import_meta(start, next)?;
                self.prev = Prev::Operand;
            }
            Some(b'(') => {
                self.dynamic_import(next)?;
                self.prev = Prev::Operand;
            }
            _ => self.static_import(next)?,
        }
        Ok(())
    }

    fn import_meta(&mut self, start: usize, dot: usize) -> Result<(), ScanError> {
        let Some(after_meta) = self.member(dot, "meta") else {
            return Ok(());
        };
        if let Some(after_hot) = self.member(after_meta, "hot") {
            self.scan.has_hot = true;
            self.hot_call(start, after_hot)?;
        } else if self.member(after_meta, "env").is_some() {
            self.scan.has_env = true;
        }
        Ok(())
    }

    /// If `.name` follows at `at`, the offset after it.
    fn member(&self, at: usize, name: &str) -> Option<usize> {
        let rest = self.src.get(at..)?.strip_prefix('.')?;
        let end = at + 1 + name.len();
        (rest.starts_with(name) && !self.bytes.get(end).is_some_and(|&b| is_ident_byte(b)))
            .then_some(end)
    }

    fn hot_call(&mut self, start: usize, at: usize) -> Result<(), ScanError> {
        if self.bytes.get(at) != Some(&b'.') {
            return Ok(());
        }
        let name_end = self.ident_end(at + 1);
        let method = match &self.src[at + 1..name_end] {
            "accept" => HotMethod::Accept,
            "acceptDeps" => HotMethod::AcceptDeps,
            "decline" => HotMethod::Decline,
            _ => return Ok(()),
        };
        let open = self.skip_trivia(name_end);
        if self.bytes.get(open) != Some(&b'(') {
            return Ok(());
        }

        let arg = match method {
            HotMethod::Decline => HotArg::None,
            _ => self.hot_arg(open + 1)?,
        };
        self.scan.hot_calls.push(HotCall {
            method,
            arg,
            context: self.context(),
            start,
        });
        Ok(())
    }

    fn hot_arg(&self, at: usize) -> Result<HotArg, ScanError> {
        let at = self.skip_trivia(at);
        let arg = match self.bytes.get(at) {
            None | Some(b')') => HotArg::None,
            Some(b'\'' | b'"') => HotArg::Str(self.literal(at)?),
            Some(b'[') => self.hot_array(at + 1)?,
            Some(b'(') => {
                let close = self.balanced_end(at + 1, b")");
                if self.arrow_at(close + 1) {
                    HotArg::Callback
                } else {
                    HotArg::Invalid
                }
            }
            Some(&b) if is_ident_start(b) => {
                let end = self.ident_end(at);
                match &self.src[at..end] {
                    "function" | "async" => HotArg::Callback,
                    _ if self.arrow_at(end) => HotArg::Callback,
                    _ => HotArg::Invalid,
                }
            }
            Some(_) => HotArg::Invalid,
        };
        Ok(arg)
    }

    fn hot_array(&self, mut at: usize) -> Result<HotArg, ScanError> {
        let mut deps = Vec::new();
        let mut non_literal = false;
        loop {
            at = self.skip_trivia(at);
            match self.bytes.get(at) {
                None | Some(b']') => break,
                Some(b',') => at += 1,
                Some(b'\'' | b'"') => {
                    let literal = self.literal(at)?;
                    let next = self.skip_trivia(literal.end);
                    if matches!(self.bytes.get(next), Some(b',' | b']')) {
                        at = literal.end;
                        deps.push(literal);
                    } else {
                        non_literal = true;
                        at = self.balanced_end(at, b",]");
                    }
                }
                Some(_) => {
                    non_literal = true;
                    at = self.balanced_end(at, b",]");
                }
            }
        }
        Ok(HotArg::Array { deps, non_literal })
    }

    fn dynamic_import(&mut self, open: usize) -> Result<(), ScanError> {
        let arg = self.skip_trivia(open + 1);
        if let Some(b'\'' | b'"') = self.bytes.get(arg) {
            let literal = self.literal(arg)?;
            let next = self.skip_trivia(literal.end);
            if matches!(self.bytes.get(next), Some(b')' | b',')) {
                self.scan.imports.push(ImportSpan {
                    start: literal.start,
                    end: literal.end,
                    value: literal.value,
                    kind: ImportKind::DynamicLiteral,
                });
                return Ok(());
            }
        }

        let close = self.balanced_end(open + 1, b")");
        let expr = self.src[arg.min(close)..close].trim_end();
        self.scan.imports.push(ImportSpan {
            start: arg.min(close),
            end: arg.min(close) + expr.len(),
            value: expr.to_string(),
            kind: ImportKind::DynamicExpr,
        });
        Ok(())
    }

    fn static_import(&mut self, mut at: usize) -> Result<(), ScanError> {
        loop {
            at = self.skip_trivia(at);
            match self.bytes.get(at) {
                Some(b'\'' | b'"') => {
                    let end = self.string_end(at)?;
                    self.push_import(at + 1, end - 1, ImportKind::Static);
                    self.pos = end;
                    self.prev = Prev::Operand;
                    return Ok(());
                }
                Some(b'{') => at = self.balanced_end(at + 1, b"}") + 1,
                Some(b'*' | b',') => at += 1,
                Some(&b) if is_ident_start(b) => at = self.ident_end(at),
                _ => {
                    self.prev = Prev::Operator;
                    return Ok(());
                }
            }
        }
    }

    fn export_keyword(&mut self) -> Result<(), ScanError> {
        self.scan.export_count += 1;
        self.prev = Prev::Operator;

        let mut at = self.skip_trivia(self.pos);
        let star = match self.bytes.get(at) {
            Some(b'*') => {
                at = self.skip_trivia(at + 1);
                if self.word_at(at) == "as" {
                    at = self.skip_trivia(self.ident_end(at));
                    at = self.skip_trivia(self.ident_end(at));
                    false
                } else {
                    true
                }
            }
            Some(b'{') => {
                at = self.skip_trivia(self.balanced_end(at + 1, b"}") + 1);
                false
            }
            _ => return Ok(()),
        };

        if self.word_at(at) != "from" {
            return Ok(());
        }
        at = self.skip_trivia(at + "from".len());
        if let Some(b'\'' | b'"') = self.bytes.get(at) {
            let end = self.string_end(at)?;
            self.push_import(at + 1, end - 1, ImportKind::ExportFrom);
            self.scan.has_star_reexport |= star;
            self.pos = end;
            self.prev = Prev::Operand;
        }
        Ok(())
    }

    fn push_import(&mut self, start: usize, end: usize, kind: ImportKind) {
        self.scan.imports.push(ImportSpan {
            start,
            end,
            value: self.src[start..end].to_string(),
            kind,
        });
    }

    fn context(&self) -> HotContext {
        let frames = self
            .blocks
            .iter()
            .map(|block| *block == Block::Guard)
            .chain(self.inline.iter().map(|inline| inline.guard));

        let mut guarded = false;
        for guard in frames {
            if !guard {
                return HotContext::Conditional;
            }
            guarded = true;
        }
        if guarded {
            HotContext::Guarded
        } else {
            HotContext::TopLevel
        }
    }

    fn end_inline_at_newline(&mut self) {
        if self.prev != Prev::Operand {
            return;
        }
        let (blocks, parens) = (self.blocks.len(), self.parens.len());
        self.inline
            .retain(|inline| inline.blocks != blocks || inline.parens != parens);
    }

    fn template(&mut self) -> Result<(), ScanError> {
        let start = self.pos.saturating_sub(1);
        loop {
            let Some(rest) = self.bytes.get(self.pos..) else {
                break;
            };
            let Some(offset) = memchr3(b'`', b'\\', b'$', rest) else {
                break;
            };
            let at = self.pos + offset;
            match self.bytes[at] {
                b'\\' => self.pos = at + 2,
                b'`' => {
                    self.pos = at + 1;
                    self.prev = Prev::Operand;
                    return Ok(());
                }
                _ if self.bytes.get(at + 1) == Some(&b'{') => {
                    self.blocks.push(Block::Template(at));
                    self.pos = at + 2;
                    self.prev = Prev::Operator;
                    return Ok(());
                }
                _ => self.pos = at + 1,
            }
        }
        Err(ScanError {
            construct: "template literal",
            offset: start,
        })
    }

    fn string_end(&self, start: usize) -> Result<usize, ScanError> {
        let quote = self.bytes[start];
        let mut at = start + 1;
        while let Some(rest) = self.bytes.get(at..) {
            let Some(offset) = memchr3(quote, b'\\', b'\n', rest) else {
                break;
            };
            let hit = at + offset;
            match self.bytes[hit] {
                b'\\' => at = hit + 2,
                b'\n' => break,
                _ => return Ok(hit + 1),
            }
        }
        Err(ScanError {
            construct: "string literal",
            offset: start,
        })
    }

    fn literal(&self, start: usize) -> Result<LiteralDep, ScanError> {
        let end = self.string_end(start)?;
        Ok(LiteralDep {
            start,
            end,
            value: self.src[start + 1..end - 1].to_string(),
        })
    }

    fn regex_end(&self, start: usize) -> Result<usize, ScanError> {
        let mut at = start + 1;
        let mut in_class = false;
        loop {
            match self.bytes.get(at) {
                None | Some(b'\n') => {
                    return Err(ScanError {
                        construct: "regular expression",
                        offset: start,
                    });
                }
                Some(b'\\') => at += 2,
                Some(b'[') => {
                    in_class = true;
                    at += 1;
                }
                Some(b']') => {
                    in_class = false;
                    at += 1;
                }
                Some(b'/') if !in_class => {
                    at += 1;
                    break;
                }
                Some(_) => at += 1,
            }
        }
        Ok(self.ident_end(at))
    }

    fn line_comment_end(&self, start: usize) -> usize {
        memchr(b'\n', &self.bytes[start..]).map_or(self.bytes.len(), |offset| start + offset)
    }

    fn block_comment_end(&self, start: usize) -> Result<usize, ScanError> {
        memmem::find(&self.bytes[start + 2..], b"*/")
            .map(|offset| start + 2 + offset + 2)
            .ok_or(ScanError {
                construct: "block comment",
                offset: start,
            })
    }

    /// Skip whitespace and comments without failing.
    fn skip_trivia(&self, mut at: usize) -> usize {
        loop {
            match self.bytes.get(at) {
                Some(b) if b.is_ascii_whitespace() => at += 1,
                Some(b'/') if self.bytes.get(at + 1) == Some(&b'/') => {
                    at = self.line_comment_end(at);
                }
                Some(b'/') if self.bytes.get(at + 1) == Some(&b'*') => {
                    at = self.block_comment_end(at).unwrap_or(self.bytes.len());
                }
                _ => return at,
            }
        }
    }

    /// Offset of the first `stops` byte at nesting depth zero, or the end of
    /// input. Strings, templates and comments are skipped without failing.
    fn balanced_end(&self, mut at: usize, stops: &[u8]) -> usize {
        let mut depth = 0usize;
        while let Some(&b) = self.bytes.get(at) {
            if depth == 0 && stops.contains(&b) {
                return at;
            }
            match b {
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => {
                    if depth == 0 {
                        return at;
                    }
                    depth -= 1;
                }
                b'\'' | b'"' => {
                    at = self.string_end(at).unwrap_or(self.bytes.len());
                    continue;
                }
                b'`' => {
                    at = memchr(b'`', &self.bytes[at + 1..])
                        .map_or(self.bytes.len(), |offset| at + 1 + offset + 1);
                    continue;
                }
                b'/' if matches!(self.bytes.get(at + 1), Some(b'/' | b'*')) => {
                    at = self.skip_trivia(at);
                    continue;
                }
                _ => {}
            }
            at += 1;
        }
        self.bytes.len()
    }

    fn arrow_at(&self, at: usize) -> bool {
        let at = self.skip_trivia(at);
        self.src.get(at..).is_some_and(|rest| rest.starts_with("=>"))
    }

    fn word_at(&self, at: usize) -> &'a str {
        match self.bytes.get(at) {
            Some(&b) if is_ident_start(b) => &self.src[at..self.ident_end(at)],
            _ => "",
        }
    }

    fn ident_end(&self, mut at: usize) -> usize {
        while self.bytes.get(at).is_some_and(|&b| is_ident_byte(b)) {
            at += 1;
        }
        at
    }

    /// `obj.import` style member access, as opposed to a keyword.
    fn is_property(&self, start: usize) -> bool {
        start > 0
            && self.bytes[start - 1] == b'.'
            && !(start >= 3 && &self.bytes[start - 3..start] == b"...")
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$' || b >= 0x80
}

fn is_ident_byte(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}
