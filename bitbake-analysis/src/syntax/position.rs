use std::ops::Range as ByteRange;

/// Zero-based location in a document. `column` counts bytes from the start
/// of the line, the way tree-sitter reports points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// A byte span together with its start and end positions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Range {
    pub span: ByteRange<usize>,
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(span: ByteRange<usize>, start: Position, end: Position) -> Self {
        Self { span, start, end }
    }

    /// Start-inclusive, end-exclusive membership.
    pub fn contains(&self, position: Position) -> bool {
        self.start <= position && position < self.end
    }

    /// Like [`Range::contains`] but also accepts the end position, which is
    /// where an editor cursor sits after the last character.
    pub fn contains_inclusive(&self, position: Position) -> bool {
        self.start <= position && position <= self.end
    }

    pub fn overlaps(&self, other: &Range) -> bool {
        self.span.start < other.span.end && other.span.start < self.span.end
    }

    pub fn is_empty(&self) -> bool {
        self.span.is_empty()
    }
}

/// Line start offsets of a text, for converting between byte offsets and
/// positions. Out-of-range inputs are clamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(idx, _)| idx + 1));
        Self {
            line_starts,
            len: text.len(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte span of a line, without its terminating newline.
    pub fn line_span(&self, line: usize) -> Option<ByteRange<usize>> {
        let start = *self.line_starts.get(line)?;
        let end = self
            .line_starts
            .get(line + 1)
            .map(|next| next - 1)
            .unwrap_or(self.len);
        Some(start..end)
    }

    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.len);
        let line = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        Position::new(line, offset - self.line_starts[line])
    }

    pub fn offset(&self, position: Position) -> usize {
        match self.line_span(position.line) {
            Some(span) => (span.start + position.column).min(span.end),
            None => self.len,
        }
    }

    pub fn range(&self, span: ByteRange<usize>) -> Range {
        let start = self.position(span.start);
        let end = self.position(span.end);
        Range::new(span, start, end)
    }

    /// UTF-16 code units before `position` on its line. A byte column inside
    /// a character counts that whole character.
    pub fn utf16_column(&self, text: &str, position: Position) -> usize {
        let Some(line) = self.line_text(text, position.line) else {
            return position.column;
        };
        let mut units = 0;
        for (idx, ch) in line.char_indices() {
            if idx >= position.column {
                return units;
            }
            units += ch.len_utf16();
        }
        units + position.column.saturating_sub(line.len())
    }

    /// Byte column of a UTF-16 column, clamped to the line end.
    pub fn column_from_utf16(&self, text: &str, line: usize, utf16: usize) -> usize {
        let Some(line) = self.line_text(text, line) else {
            return utf16;
        };
        let mut units = 0;
        for (idx, ch) in line.char_indices() {
            if units >= utf16 {
                return idx;
            }
            units += ch.len_utf16();
        }
        line.len()
    }

    fn line_text<'a>(&self, text: &'a str, line: usize) -> Option<&'a str> {
        text.get(self.line_span(line)?)
    }
}
