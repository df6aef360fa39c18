use crate::analyzer::AnalyzedDocument;
use crate::declarations::GlobalSymbol;
use crate::syntax::{NodeKind, Position, SyntaxNode};

/// Declaration named by the word at `position`. Inside `${NAME}` the whole
/// expansion, braces included, resolves to `NAME`.
pub fn goto_definition(document: &AnalyzedDocument, position: Position) -> Option<GlobalSymbol> {
    let word = word_node_at(document, position)?;
    let name = word.text()?.trim();
    document.declarations().get(name).cloned()
}

/// The leaf a navigation request at `position` is about.
pub(crate) fn word_node_at(document: &AnalyzedDocument, position: Position) -> Option<&SyntaxNode> {
    let root = document.tree().root()?;
    let mut node = root;
    for idx in root.descendant_path_for_position(position) {
        node = node.children().get(idx)?;
        if node.kind() == NodeKind::VariableExpansion {
            return node.child_by_kind(NodeKind::Identifier);
        }
    }
    if node.child_count() > 0 || node.text().is_some_and(|text| text.trim().is_empty()) {
        return None;
    }
    Some(node)
}
