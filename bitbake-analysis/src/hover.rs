use lsp_types::SymbolKind;

use crate::analyzer::AnalyzedDocument;
use crate::declarations::{declared_name, GlobalSymbol};
use crate::go_to_definition::word_node_at;
use crate::syntax::{Position, Range, SyntaxNode};

#[derive(Debug, Clone, PartialEq)]
pub struct HoverResult {
    pub range: Range,
    pub contents: String,
}

/// Markdown summary of the declaration named at `position`.
pub fn hover(document: &AnalyzedDocument, position: Position) -> Option<HoverResult> {
    let word = word_node_at(document, position)?;
    let symbol = document.declarations().get(word.text()?.trim())?;

    let kind = if symbol.kind == SymbolKind::FUNCTION {
        "function"
    } else {
        "variable"
    };
    let mut lines = vec![format!("**{kind}** `{}`", symbol.name)];
    if let Some(statement) = defining_statement(document, symbol) {
        let text = document.tree().text_of(statement);
        let header = text.lines().next().unwrap_or_default().trim_end();
        lines.push(format!("```bitbake\n{header}\n```"));
    }
    lines.push(format!("Defined on line {}", symbol.range.start.line + 1));

    Some(HoverResult {
        range: word.range().clone(),
        contents: lines.join("\n\n"),
    })
}

fn defining_statement<'a>(
    document: &'a AnalyzedDocument,
    symbol: &GlobalSymbol,
) -> Option<&'a SyntaxNode> {
    document.tree().statements().iter().find(|statement| {
        declared_name(statement).is_some_and(|(name, _)| name.range() == &symbol.range)
    })
}
