use lsp_types::DiagnosticSeverity;

use crate::syntax::{Range, SyntaxTree};

/// Source tag attached to every syntax diagnostic.
pub const DIAGNOSTIC_SOURCE: &str = "bitbake";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitbakeDiagnostic {
    pub severity: DiagnosticSeverity,
    pub range: Range,
    pub message: String,
    pub source: &'static str,
}

/// One error diagnostic per error-recovery node, in document order, each with
/// the node's exact range.
pub fn collect_diagnostics(tree: &SyntaxTree) -> Vec<BitbakeDiagnostic> {
    tree.error_nodes()
        .into_iter()
        .map(|node| {
            let text = node.text().unwrap_or_else(|| tree.text_of(node));
            BitbakeDiagnostic {
                severity: DiagnosticSeverity::ERROR,
                range: node.range().clone(),
                message: format!("Invalid syntax \"{}\"", text.trim()),
                source: DIAGNOSTIC_SOURCE,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{Parser, Position};
    use pretty_assertions::assert_eq;

    #[test]
    fn clean_source_has_no_diagnostics() {
        let tree = Parser::new()
            .parse("SUMMARY = \"ok\"\ninherit autotools\n")
            .unwrap();
        assert!(collect_diagnostics(&tree).is_empty());
    }

    #[test]
    fn reports_trimmed_error_text() {
        let tree = Parser::new().parse("FOO = \"x\"\n  what is this   \n").unwrap();
        let diagnostics = collect_diagnostics(&tree);
        assert_eq!(diagnostics.len(), 1);
        let diagnostic = &diagnostics[0];
        assert_eq!(diagnostic.message, "Invalid syntax \"what is this\"");
        assert_eq!(diagnostic.severity, DiagnosticSeverity::ERROR);
        assert_eq!(diagnostic.source, DIAGNOSTIC_SOURCE);
        assert_eq!(diagnostic.range.start, Position::new(1, 2));
        assert_eq!(diagnostic.range.end, Position::new(1, 14));
    }

    #[test]
    fn rootless_tree_has_no_diagnostics() {
        let tree = SyntaxTree::without_root("FOO = \"");
        assert!(collect_diagnostics(&tree).is_empty());
    }
}
