//! Line-oriented, error-tolerant parser for recipes, classes and config files.
//!
//! Statements begin at the start of a logical line (physical lines joined by
//! trailing backslashes). Task bodies are kept as opaque content leaves and
//! end at a line that is exactly `}`; `def` blocks end at the first line that
//! is neither blank, indented nor a comment. Input that matches no rule turns
//! into an [`NodeKind::Error`] leaf and parsing resumes on the next line.

use std::ops::Range as ByteRange;
use std::sync::Arc;

use thiserror::Error;

use super::node::{NodeKind, SyntaxNode, SyntaxTree};
use super::position::LineIndex;

pub const DEFAULT_MAX_SOURCE_LEN: usize = 8 * 1024 * 1024;

/// Longest first, so `??=` is not read as `?=` followed by garbage.
const OPERATORS: [&str; 8] = ["??=", "?=", ":=", "+=", "=+", ".=", "=.", "="];

const DIRECTIVES: [(&str, NodeKind, Arguments); 8] = [
    ("inherit", NodeKind::InheritDirective, Arguments::Paths),
    ("inherit_defer", NodeKind::InheritDirective, Arguments::Paths),
    ("include", NodeKind::IncludeDirective, Arguments::Path),
    ("require", NodeKind::RequireDirective, Arguments::Path),
    ("unset", NodeKind::UnsetStatement, Arguments::Unset),
    ("addtask", NodeKind::AddTaskStatement, Arguments::Task),
    ("deltask", NodeKind::DelTaskStatement, Arguments::Names),
    ("addhandler", NodeKind::AddHandlerStatement, Arguments::Names),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    /// Inputs longer than this many bytes are refused.
    pub max_source_len: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_source_len: DEFAULT_MAX_SOURCE_LEN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("source is {len} bytes, above the {limit} byte parse limit")]
    SourceTooLarge { len: usize, limit: usize },
}

#[derive(Debug, Clone, Default)]
pub struct Parser {
    config: ParserConfig,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn parse(&self, text: &str) -> Result<SyntaxTree, ParseError> {
        if text.len() > self.config.max_source_len {
            return Err(ParseError::SourceTooLarge {
                len: text.len(),
                limit: self.config.max_source_len,
            });
        }
        let index = LineIndex::new(text);
        let root = RecipeParser::new(text, &index).parse();
        Ok(SyntaxTree::from_parts(Arc::from(text), index, Some(root)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arguments {
    /// Whitespace separated paths (`inherit`).
    Paths,
    /// Everything after the keyword as one path (`include`, `require`).
    Path,
    /// Whitespace separated identifiers.
    Names,
    /// A task name followed by `before`/`after` clauses.
    Task,
    /// A variable name with an optional flag.
    Unset,
}

#[derive(Clone, Copy)]
struct Builder<'a> {
    text: &'a str,
    index: &'a LineIndex,
}

impl<'a> Builder<'a> {
    fn leaf(&self, kind: NodeKind, span: ByteRange<usize>) -> SyntaxNode {
        let text = self.text.get(span.clone()).unwrap_or_default();
        SyntaxNode::leaf(kind, self.index.range(span), text)
    }

    fn branch(&self, kind: NodeKind, children: Vec<SyntaxNode>) -> SyntaxNode {
        let start = children.first().map(|c| c.range().span.start).unwrap_or(0);
        let end = children.last().map(|c| c.range().span.end).unwrap_or(start);
        SyntaxNode::branch(kind, self.index.range(start..end), children)
    }

    fn error(&self, span: ByteRange<usize>) -> SyntaxNode {
        self.leaf(NodeKind::Error, span)
    }

    fn trimmed(&self, span: ByteRange<usize>) -> Option<ByteRange<usize>> {
        trim_span(self.text, span)
    }
}

/// The same span with surrounding whitespace removed, or `None` when it holds
/// nothing but whitespace.
fn trim_span(text: &str, span: ByteRange<usize>) -> Option<ByteRange<usize>> {
    let slice = text.get(span.clone())?;
    let trimmed_start = slice.trim_start();
    if trimmed_start.is_empty() {
        return None;
    }
    let start = span.start + (slice.len() - trimmed_start.len());
    let end = span.start + slice.trim_end().len();
    Some(start..end)
}

struct RecipeParser<'a> {
    build: Builder<'a>,
    lines: Vec<ByteRange<usize>>,
    line: usize,
}

impl<'a> RecipeParser<'a> {
    fn new(text: &'a str, index: &'a LineIndex) -> Self {
        let lines = (0..index.line_count())
            .filter_map(|line| index.line_span(line))
            .map(|span| match text.get(span.clone()) {
                Some(line) if line.ends_with('\r') => span.start..span.end - 1,
                _ => span,
            })
            .collect();
        Self {
            build: Builder { text, index },
            lines,
            line: 0,
        }
    }

    fn text(&self) -> &'a str {
        self.build.text
    }

    fn line_text(&self, line: usize) -> &'a str {
        self.text().get(self.lines[line].clone()).unwrap_or_default()
    }

    fn parse(mut self) -> SyntaxNode {
        let mut statements = Vec::new();
        while self.line < self.lines.len() {
            let span = self.lines[self.line].clone();
            let Some(trimmed) = self.build.trimmed(span) else {
                self.line += 1;
                continue;
            };
            if self.text()[trimmed.clone()].starts_with('#') {
                statements.push(self.build.leaf(NodeKind::Comment, trimmed));
                self.line += 1;
                continue;
            }
            if let Some(header) = FunctionHeader::scan(self.text(), trimmed.clone()) {
                statements.push(self.function(header));
                continue;
            }
            if let Some(header) = DefHeader::scan(self.text(), trimmed.clone()) {
                statements.push(self.python_definition(header));
                continue;
            }
            let end = self.logical_line_end();
            statements.push(StatementParser::new(self.build, trimmed.start, end).parse());
        }
        let len = self.text().len();
        SyntaxNode::branch(
            NodeKind::SourceFile,
            self.build.index.range(0..len),
            statements,
        )
    }

    /// Consumes the current line and every line joined to it by a trailing
    /// backslash; returns the trimmed end offset of the logical line.
    fn logical_line_end(&mut self) -> usize {
        loop {
            let span = self.lines[self.line].clone();
            let content = self.line_text(self.line).trim_end();
            self.line += 1;
            if !(content.ends_with('\\') && self.line < self.lines.len()) {
                return span.start + content.len();
            }
        }
    }

    fn function(&mut self, header: FunctionHeader) -> SyntaxNode {
        let b = self.build;
        let kind = if header.python {
            NodeKind::PythonFunctionDefinition
        } else {
            NodeKind::FunctionDefinition
        };
        let content_kind = if header.python {
            NodeKind::PythonContent
        } else {
            NodeKind::ShellContent
        };

        let mut children: Vec<SyntaxNode> = header
            .keywords
            .iter()
            .map(|span| b.leaf(NodeKind::Keyword, span.clone()))
            .collect();
        if let Some(name) = header.name.clone() {
            children.push(b.leaf(NodeKind::Identifier, name));
        }
        children.push(b.leaf(NodeKind::Punctuation, header.open_paren.clone()));
        children.push(b.leaf(NodeKind::Punctuation, header.close_paren.clone()));

        let body_first = self.line + 1;
        let closing = (body_first..self.lines.len())
            .find(|&line| self.line_text(line).trim_end() == "}");
        match closing {
            Some(closing) => {
                children.push(b.leaf(NodeKind::Punctuation, header.open_brace.clone()));
                if closing > body_first {
                    let body = self.lines[body_first].start..self.lines[closing - 1].end;
                    if let Some(content) = b.trimmed(body) {
                        children.push(b.leaf(content_kind, content));
                    }
                }
                let brace = self.lines[closing].start;
                children.push(b.leaf(NodeKind::Punctuation, brace..brace + 1));
                self.line = closing + 1;
            }
            None => {
                children.push(b.error(header.open_brace.clone()));
                if body_first < self.lines.len() {
                    let body = self.lines[body_first].start..self.text().len();
                    if let Some(content) = b.trimmed(body) {
                        children.push(b.leaf(content_kind, content));
                    }
                }
                self.line = self.lines.len();
            }
        }
        b.branch(kind, children)
    }

    fn python_definition(&mut self, header: DefHeader) -> SyntaxNode {
        let b = self.build;
        let mut children = vec![
            b.leaf(NodeKind::Keyword, header.keyword),
            b.leaf(NodeKind::Identifier, header.name),
            b.leaf(NodeKind::PythonContent, header.parameters),
            b.leaf(NodeKind::Punctuation, header.colon),
        ];

        let body_first = self.line + 1;
        let mut last_body_line = None;
        for line in body_first..self.lines.len() {
            let content = self.line_text(line);
            if content.trim().is_empty() {
                continue;
            }
            if content.starts_with([' ', '\t', '#']) {
                last_body_line = Some(line);
            } else {
                break;
            }
        }

        match last_body_line {
            Some(last) => {
                let body = self.lines[body_first].start..self.lines[last].end;
                if let Some(content) = b.trimmed(body) {
                    children.push(b.leaf(NodeKind::PythonContent, content));
                }
                self.line = last + 1;
            }
            None => self.line = body_first,
        }
        b.branch(NodeKind::PythonDefinition, children)
    }
}

/// `[python] [fakeroot] [NAME] () {` on a single line.
struct FunctionHeader {
    keywords: Vec<ByteRange<usize>>,
    name: Option<ByteRange<usize>>,
    open_paren: ByteRange<usize>,
    close_paren: ByteRange<usize>,
    open_brace: ByteRange<usize>,
    python: bool,
}

impl FunctionHeader {
    fn scan(text: &str, span: ByteRange<usize>) -> Option<Self> {
        let mut s = Scanner::new(text, span.start, span.end);
        let mut keywords = Vec::new();
        let mut python = false;
        loop {
            s.skip_inline_ws();
            if let Some(keyword) = s.eat_keyword("python") {
                python = true;
                keywords.push(keyword);
            } else if let Some(keyword) = s.eat_keyword("fakeroot") {
                keywords.push(keyword);
            } else {
                break;
            }
        }
        let name = s.scan_while(is_function_name_byte);
        if name.is_empty() && !python {
            return None;
        }
        s.skip_inline_ws();
        let open_paren = s.eat("(")?;
        s.skip_inline_ws();
        let close_paren = s.eat(")")?;
        s.skip_inline_ws();
        let open_brace = s.eat("{")?;
        s.skip_inline_ws();
        if !s.at_end() {
            return None;
        }
        Some(Self {
            keywords,
            name: (!name.is_empty()).then_some(name),
            open_paren,
            close_paren,
            open_brace,
            python,
        })
    }
}

/// `def NAME(params):` on a single line.
struct DefHeader {
    keyword: ByteRange<usize>,
    name: ByteRange<usize>,
    parameters: ByteRange<usize>,
    colon: ByteRange<usize>,
}

impl DefHeader {
    fn scan(text: &str, span: ByteRange<usize>) -> Option<Self> {
        let mut s = Scanner::new(text, span.start, span.end);
        let keyword = s.eat_keyword("def")?;
        s.skip_inline_ws();
        let name = s.scan_while(|b| b.is_ascii_alphanumeric() || b == b'_');
        if name.is_empty() || text.as_bytes().get(span.end - 1) != Some(&b':') {
            return None;
        }
        let colon = span.end - 1..span.end;
        let parameters = trim_span(text, name.end..colon.start)?;
        if text.as_bytes().get(parameters.start) != Some(&b'(') {
            return None;
        }
        Some(Self {
            keyword,
            name,
            parameters,
            colon,
        })
    }
}

struct StatementParser<'a> {
    build: Builder<'a>,
    s: Scanner<'a>,
    start: usize,
    end: usize,
}

impl<'a> StatementParser<'a> {
    fn new(build: Builder<'a>, start: usize, end: usize) -> Self {
        Self {
            build,
            s: Scanner::new(build.text, start, end),
            start,
            end,
        }
    }

    fn whole_line_error(&self) -> SyntaxNode {
        self.build.error(self.start..self.end)
    }

    fn parse(mut self) -> SyntaxNode {
        if let Some(keyword) = self.s.eat_keyword("export") {
            return self.export(keyword);
        }
        if let Some(keyword) = self.s.eat_keyword("EXPORT_FUNCTIONS") {
            return self.directive(keyword, NodeKind::ExportFunctionsStatement, Arguments::Names);
        }
        for (word, kind, arguments) in DIRECTIVES {
            let checkpoint = self.s.pos;
            if let Some(keyword) = self.s.eat_keyword(word) {
                self.s.skip_ws();
                if self.s.at_operator() {
                    // A variable that happens to share the keyword's name.
                    self.s.pos = checkpoint;
                    break;
                }
                return self.directive(keyword, kind, arguments);
            }
        }
        self.assignment().unwrap_or_else(|| self.whole_line_error())
    }

    fn export(&mut self, keyword: ByteRange<usize>) -> SyntaxNode {
        let b = self.build;
        self.s.skip_ws();
        let checkpoint = self.s.pos;
        let name = self.s.scan_name();
        self.s.skip_ws();
        if !name.is_empty() && self.s.at_operator() {
            self.s.pos = checkpoint;
            let Some(assignment) = self.assignment() else {
                return self.whole_line_error();
            };
            return b.branch(
                NodeKind::ExportStatement,
                vec![b.leaf(NodeKind::Keyword, keyword), assignment],
            );
        }
        if !name.is_empty() && self.s.at_end() {
            return b.branch(
                NodeKind::ExportStatement,
                vec![
                    b.leaf(NodeKind::Keyword, keyword),
                    b.leaf(NodeKind::Identifier, name),
                ],
            );
        }
        self.whole_line_error()
    }

    fn directive(
        &mut self,
        keyword: ByteRange<usize>,
        kind: NodeKind,
        arguments: Arguments,
    ) -> SyntaxNode {
        let b = self.build;
        let mut children = vec![b.leaf(NodeKind::Keyword, keyword)];
        self.s.skip_ws();
        match arguments {
            Arguments::Path => {
                if let Some(path) = b.trimmed(self.s.pos..self.end) {
                    children.push(b.leaf(NodeKind::Path, path));
                }
                self.s.pos = self.end;
            }
            Arguments::Paths | Arguments::Names | Arguments::Task => {
                let word_kind = if arguments == Arguments::Paths {
                    NodeKind::Path
                } else {
                    NodeKind::Identifier
                };
                while !self.s.at_end() {
                    let word = self.s.scan_word();
                    if word.is_empty() {
                        break;
                    }
                    let text = &b.text[word.clone()];
                    let is_clause = arguments == Arguments::Task
                        && children.len() > 1
                        && (text == "after" || text == "before");
                    let kind = if is_clause { NodeKind::Keyword } else { word_kind };
                    children.push(b.leaf(kind, word));
                    self.s.skip_ws();
                }
            }
            Arguments::Unset => {
                let name = self.s.scan_name();
                if !name.is_empty() {
                    children.push(b.leaf(NodeKind::Identifier, name));
                    if self.s.peek() == Some(b'[') {
                        match self.flag() {
                            Some(flag) => children.push(flag),
                            None => return self.whole_line_error(),
                        }
                    }
                }
                self.s.skip_ws();
            }
        }
        if children.len() == 1 {
            return self.whole_line_error();
        }
        if !self.s.at_end() {
            children.push(b.error(self.s.pos..self.end));
        }
        b.branch(kind, children)
    }

    fn flag(&mut self) -> Option<SyntaxNode> {
        let b = self.build;
        let open = self.s.eat("[")?;
        let name = self.s.scan_while(|byte| {
            byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-' | b'+' | b'.' | b'@' | b'/')
        });
        let close = self.s.eat("]")?;
        let mut children = vec![b.leaf(NodeKind::Punctuation, open)];
        if !name.is_empty() {
            children.push(b.leaf(NodeKind::Identifier, name));
        }
        children.push(b.leaf(NodeKind::Punctuation, close));
        Some(b.branch(NodeKind::VariableFlag, children))
    }

    /// `NAME[:override]*[flag] OP VALUE`. `None` when the line does not even
    /// look like an assignment.
    fn assignment(&mut self) -> Option<SyntaxNode> {
        let b = self.build;
        let name = self.s.scan_base_name();
        if name.is_empty() {
            return None;
        }
        let mut children = vec![b.leaf(NodeKind::Identifier, name)];

        while self.s.peek() == Some(b':') && self.s.peek_at(1).is_some_and(starts_name) {
            let colon = self.s.eat(":")?;
            let name = self.s.scan_base_name();
            children.push(b.branch(
                NodeKind::Override,
                vec![
                    b.leaf(NodeKind::Punctuation, colon),
                    b.leaf(NodeKind::Identifier, name),
                ],
            ));
        }
        if self.s.peek() == Some(b'[') {
            children.push(self.flag()?);
        }

        self.s.skip_ws();
        let operator = self.s.eat_operator()?;
        self.s.skip_ws();
        match self.s.peek() {
            None => children.push(b.error(operator)),
            Some(quote @ (b'"' | b'\'')) => {
                children.push(b.leaf(NodeKind::Operator, operator));
                children.push(self.string(quote));
                self.s.skip_ws();
                if !self.s.at_end() {
                    children.push(b.error(self.s.pos..self.end));
                }
            }
            Some(_) => {
                children.push(b.leaf(NodeKind::Operator, operator));
                children.push(b.error(self.s.pos..self.end));
            }
        }
        Some(b.branch(NodeKind::VariableAssignment, children))
    }

    /// A quoted value, or an error leaf from the opening quote to the end of
    /// the logical line when the closing quote is missing.
    fn string(&mut self, quote: u8) -> SyntaxNode {
        let b = self.build;
        let open = self.s.pos;
        self.s.bump();
        let mut children = vec![b.leaf(NodeKind::Punctuation, open..open + 1)];
        let mut content_start = self.s.pos;

        loop {
            let Some(byte) = self.s.peek() else {
                self.s.pos = self.end;
                return b.error(open..self.end);
            };
            if byte == quote {
                if self.s.pos > content_start {
                    children.push(b.leaf(NodeKind::StringContent, content_start..self.s.pos));
                }
                children.push(b.leaf(NodeKind::Punctuation, self.s.pos..self.s.pos + 1));
                self.s.bump();
                break;
            }
            match byte {
                b'\\' => {
                    self.s.bump();
                    self.s.bump_char();
                }
                b'$' if self.s.peek_at(1) == Some(b'{') => match self.s.expansion_end(quote) {
                    Some(close) => {
                        if self.s.pos > content_start {
                            children
                                .push(b.leaf(NodeKind::StringContent, content_start..self.s.pos));
                        }
                        children.push(self.expansion(self.s.pos, close));
                        self.s.pos = close + 1;
                        content_start = self.s.pos;
                    }
                    None => self.s.bump(),
                },
                _ => self.s.bump_char(),
            }
        }
        b.branch(NodeKind::String, children)
    }

    /// `${NAME}` or `${@ python }` spanning `start..=close`.
    fn expansion(&self, start: usize, close: usize) -> SyntaxNode {
        let b = self.build;
        let inline_python = b.text.as_bytes().get(start + 2) == Some(&b'@');
        let (kind, content_kind, opener) = if inline_python {
            (NodeKind::InlinePython, NodeKind::PythonContent, 3)
        } else {
            (NodeKind::VariableExpansion, NodeKind::Identifier, 2)
        };
        let mut children = vec![b.leaf(NodeKind::Punctuation, start..start + opener)];
        if close > start + opener {
            children.push(b.leaf(content_kind, start + opener..close));
        }
        children.push(b.leaf(NodeKind::Punctuation, close..close + 1));
        b.branch(kind, children)
    }
}

fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-' | b'.' | b'+' | b'/' | b'~')
}

fn starts_name(byte: u8) -> bool {
    is_name_byte(byte) || byte == b'$'
}

fn is_function_name_byte(byte: u8) -> bool {
    is_name_byte(byte) || matches!(byte, b'$' | b'{' | b'}' | b':')
}

fn is_inline_ws(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r')
}

/// Byte cursor over `pos..end` of a text. Every position it stops at is a
/// char boundary.
struct Scanner<'a> {
    text: &'a str,
    pos: usize,
    end: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str, start: usize, end: usize) -> Self {
        Self {
            text,
            pos: start,
            end,
        }
    }

    fn bytes(&self) -> &'a [u8] {
        self.text.as_bytes()
    }

    fn peek(&self) -> Option<u8> {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        let idx = self.pos + ahead;
        (idx < self.end).then(|| self.bytes()[idx])
    }

    fn at_end(&self) -> bool {
        self.pos >= self.end
    }

    fn bump(&mut self) {
        if !self.at_end() {
            self.pos += 1;
        }
    }

    fn bump_char(&mut self) {
        let width = self
            .text
            .get(self.pos..)
            .and_then(|rest| rest.chars().next())
            .map(char::len_utf8)
            .unwrap_or(1);
        self.pos = (self.pos + width).min(self.end);
    }

    fn starts_with(&self, literal: &str) -> bool {
        self.bytes()[self.pos.min(self.end)..self.end].starts_with(literal.as_bytes())
    }

    fn eat(&mut self, literal: &str) -> Option<ByteRange<usize>> {
        if !self.starts_with(literal) {
            return None;
        }
        let start = self.pos;
        self.pos += literal.len();
        Some(start..self.pos)
    }

    /// Consumes `word` when it is not immediately followed by a name byte.
    fn eat_keyword(&mut self, word: &str) -> Option<ByteRange<usize>> {
        if !self.starts_with(word) {
            return None;
        }
        let after = self.pos + word.len();
        if after < self.end && is_name_byte(self.bytes()[after]) {
            return None;
        }
        self.eat(word)
    }

    fn at_operator(&self) -> bool {
        OPERATORS.iter().any(|op| self.starts_with(op))
    }

    fn eat_operator(&mut self) -> Option<ByteRange<usize>> {
        let op = OPERATORS.iter().find(|op| self.starts_with(op))?;
        self.eat(op)
    }

    /// A backslash that joins the next physical line, or one that ends the
    /// statement.
    fn at_continuation(&self) -> bool {
        if self.peek() != Some(b'\\') {
            return false;
        }
        match (self.peek_at(1), self.peek_at(2)) {
            (None, _) | (Some(b'\n'), _) => true,
            (Some(b'\r'), None) | (Some(b'\r'), Some(b'\n')) => true,
            _ => false,
        }
    }

    fn skip_inline_ws(&mut self) {
        while self.peek().is_some_and(is_inline_ws) {
            self.pos += 1;
        }
    }

    /// Whitespace, newlines and line continuations.
    fn skip_ws(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => self.pos += 1,
                Some(b'\\') if self.at_continuation() => self.pos += 1,
                _ => return,
            }
        }
    }

    fn scan_while(&mut self, mut accept: impl FnMut(u8) -> bool) -> ByteRange<usize> {
        let start = self.pos;
        while self.peek().is_some_and(&mut accept) {
            self.pos += 1;
        }
        start..self.pos
    }

    fn scan_word(&mut self) -> ByteRange<usize> {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if byte.is_ascii_whitespace() || self.at_continuation() {
                break;
            }
            self.bump_char();
        }
        start..self.pos
    }

    /// Name bytes and `${...}` groups, stopping before `:` overrides.
    fn scan_base_name(&mut self) -> ByteRange<usize> {
        let start = self.pos;
        loop {
            match self.peek() {
                Some(b'.' | b'+') if self.peek_at(1) == Some(b'=') => break,
                Some(byte) if is_name_byte(byte) => self.pos += 1,
                Some(b'$') if self.peek_at(1) == Some(b'{') => match self.brace_end(self.pos + 2) {
                    Some(close) => self.pos = close + 1,
                    None => break,
                },
                _ => break,
            }
        }
        start..self.pos
    }

    /// A full variable name including overrides, as used after `export`.
    fn scan_name(&mut self) -> ByteRange<usize> {
        let start = self.pos;
        self.scan_base_name();
        while self.peek() == Some(b':') && self.peek_at(1).is_some_and(starts_name) {
            self.pos += 1;
            self.scan_base_name();
        }
        start..self.pos
    }

    fn brace_end(&self, from: usize) -> Option<usize> {
        let mut depth = 1usize;
        for idx in from..self.end {
            match self.bytes()[idx] {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(idx);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Closing brace of the `${` at the cursor, unless the enclosing quote
    /// comes first.
    fn expansion_end(&self, quote: u8) -> Option<usize> {
        let mut depth = 1usize;
        for idx in self.pos + 2..self.end {
            match self.bytes()[idx] {
                byte if byte == quote => return None,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(idx);
                    }
                }
                _ => {}
            }
        }
        None
    }
}
