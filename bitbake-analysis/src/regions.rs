//! Classification of embedded shell and python regions.
//!
//! Task bodies run by the shell (`do_x() { … }`) and by python
//! (`python do_x() { … }`) are regions, as are `def` blocks and inline
//! `${@…}` expressions. Regions never nest: a candidate that starts inside an
//! already open region is ignored.

use std::fmt;

use tracing::debug;

use crate::syntax::{NodeKind, Parser, Position, Range, SyntaxNode, SyntaxTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EmbeddedLanguage {
    Shell,
    Python,
}

impl EmbeddedLanguage {
    /// Every language, in the order region lookups try them.
    pub const ALL: [EmbeddedLanguage; 2] = [EmbeddedLanguage::Shell, EmbeddedLanguage::Python];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddedLanguage::Shell => "shell",
            EmbeddedLanguage::Python => "python",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            EmbeddedLanguage::Shell => "sh",
            EmbeddedLanguage::Python => "py",
        }
    }

    /// Language identifier sent to editors and language servers.
    pub fn language_id(&self) -> &'static str {
        match self {
            EmbeddedLanguage::Shell => "shellscript",
            EmbeddedLanguage::Python => "python",
        }
    }
}

impl fmt::Display for EmbeddedLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedRegion {
    pub language: EmbeddedLanguage,
    /// Host range, from the first to past the last non-blank character.
    pub range: Range,
    /// Ordinal among the document's regions of the same language.
    pub index: usize,
    /// Lines after the first lose their common indentation when rendered.
    pub dedent: bool,
}

impl EmbeddedRegion {
    pub fn contains(&self, position: Position) -> bool {
        self.range.contains_inclusive(position)
    }
}

/// Regions of `tree` ordered by start, with per-language ordinals.
pub fn classify_regions(tree: &SyntaxTree) -> Vec<EmbeddedRegion> {
    let mut candidates: Vec<(EmbeddedLanguage, Range, bool)> = Vec::new();
    for statement in tree.statements() {
        collect_candidates(tree, statement, &mut candidates);
    }
    candidates.sort_by_key(|(_, range, _)| range.span.start);

    let mut regions = Vec::with_capacity(candidates.len());
    let mut counts = [0usize; EmbeddedLanguage::ALL.len()];
    let mut open_end = 0;
    for (language, range, dedent) in candidates {
        if range.span.start < open_end {
            debug!(
                language = language.as_str(),
                start = ?range.start,
                "ignoring region nested in an open region"
            );
            continue;
        }
        open_end = range.span.end;
        let slot = &mut counts[language as usize];
        regions.push(EmbeddedRegion {
            language,
            range,
            index: *slot,
            dedent,
        });
        *slot += 1;
    }
    regions
}

/// Parses `text` with the default parser and classifies it. Text the parser
/// refuses has no regions.
pub fn classify_text(text: &str) -> Vec<EmbeddedRegion> {
    match Parser::new().parse(text) {
        Ok(tree) => classify_regions(&tree),
        Err(err) => {
            debug!(error = %err, "no regions for unparsed text");
            Vec::new()
        }
    }
}

/// Region owning `position`, trying languages in [`EmbeddedLanguage::ALL`]
/// order. `None` means plain recipe syntax.
pub fn region_at(regions: &[EmbeddedRegion], position: Position) -> Option<&EmbeddedRegion> {
    EmbeddedLanguage::ALL.iter().find_map(|language| {
        regions
            .iter()
            .find(|region| region.language == *language && region.contains(position))
    })
}

fn collect_candidates(
    tree: &SyntaxTree,
    statement: &SyntaxNode,
    out: &mut Vec<(EmbeddedLanguage, Range, bool)>,
) {
    match statement.kind() {
        NodeKind::FunctionDefinition => {
            if let Some(body) = statement.child_by_kind(NodeKind::ShellContent) {
                out.push((EmbeddedLanguage::Shell, body.range().clone(), false));
            }
        }
        NodeKind::PythonFunctionDefinition => {
            if let Some(body) = statement.child_by_kind(NodeKind::PythonContent) {
                out.push((EmbeddedLanguage::Python, body.range().clone(), true));
            }
        }
        NodeKind::PythonDefinition => {
            out.push((EmbeddedLanguage::Python, statement.range().clone(), false));
        }
        _ => {
            let inline = statement
                .walk()
                .filter(|node| node.kind() == NodeKind::InlinePython)
                .filter_map(|node| node.child_by_kind(NodeKind::PythonContent))
                .filter_map(|content| trimmed_range(tree, content));
            out.extend(inline.map(|range| (EmbeddedLanguage::Python, range, false)));
        }
    }
}

fn trimmed_range(tree: &SyntaxTree, node: &SyntaxNode) -> Option<Range> {
    let span = node.range().span.clone();
    let text = tree.source().get(span.clone())?;
    let leading = text.len() - text.trim_start().len();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let start = span.start + leading;
    Some(tree.line_index().range(start..start + trimmed.len()))
}
