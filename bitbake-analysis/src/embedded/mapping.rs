use crate::regions::EmbeddedRegion;
use crate::syntax::Position;

/// Line and column translation between a host region and its synthetic
/// document. Embedded line `n` is host line `start.line + n`, shifted left by
/// the number of bytes stripped from that host line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionMapping {
    start: Position,
    stripped: Vec<usize>,
}

impl PositionMapping {
    pub fn start(&self) -> Position {
        self.start
    }

    pub fn line_count(&self) -> usize {
        self.stripped.len()
    }

    /// `None` for host lines outside the region. Columns inside a stripped
    /// prefix clamp to 0.
    pub fn to_embedded(&self, host: Position) -> Option<Position> {
        let line = host.line.checked_sub(self.start.line)?;
        let stripped = *self.stripped.get(line)?;
        Some(Position::new(line, host.column.saturating_sub(stripped)))
    }

    pub fn to_host(&self, embedded: Position) -> Option<Position> {
        let stripped = *self.stripped.get(embedded.line)?;
        Some(Position::new(
            self.start.line + embedded.line,
            embedded.column + stripped,
        ))
    }
}

/// Synthetic document text for `region` of `source`, with its mapping.
pub fn render_region(source: &str, region: &EmbeddedRegion) -> (String, PositionMapping) {
    let body = source.get(region.range.span.clone()).unwrap_or_default();
    let lines: Vec<&str> = body.split('\n').collect();
    let indent = if region.dedent {
        common_indent(lines.iter().skip(1).copied())
    } else {
        0
    };

    let mut text = String::with_capacity(body.len());
    let mut stripped = Vec::with_capacity(lines.len());
    for (idx, line) in lines.iter().enumerate() {
        if idx == 0 {
            stripped.push(region.range.start.column);
            text.push_str(line);
            continue;
        }
        let cut = leading_blanks(line).min(indent);
        stripped.push(cut);
        text.push('\n');
        text.push_str(&line[cut..]);
    }

    let mapping = PositionMapping {
        start: region.range.start,
        stripped,
    };
    (text, mapping)
}

fn leading_blanks(line: &str) -> usize {
    line.bytes().take_while(|b| matches!(b, b' ' | b'\t')).count()
}

fn common_indent<'a>(lines: impl Iterator<Item = &'a str>) -> usize {
    lines
        .filter(|line| !line.trim().is_empty())
        .map(leading_blanks)
        .min()
        .unwrap_or(0)
}
