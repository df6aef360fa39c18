use lsp_types::SymbolKind;

use crate::declarations::declared_name;
use crate::syntax::{NodeKind, Range, SyntaxNode, SyntaxTree};

#[derive(Debug, Clone, PartialEq)]
pub struct BitbakeDocumentSymbol {
    pub name: String,
    pub detail: Option<String>,
    pub kind: SymbolKind,
    /// Whole statement.
    pub range: Range,
    /// Name of the declaration or path of the directive.
    pub selection_range: Range,
}

/// Outline of the top-level statements, in document order. Unlike
/// [`crate::declarations::GlobalDeclarations`] a name assigned twice shows up
/// twice.
pub fn collect_document_symbols(tree: &SyntaxTree) -> Vec<BitbakeDocumentSymbol> {
    let mut symbols = Vec::new();
    for statement in tree.statements() {
        match statement.kind() {
            NodeKind::InheritDirective => {
                symbols.extend(path_symbols(statement, SymbolKind::MODULE, "inherit"));
            }
            NodeKind::IncludeDirective => {
                symbols.extend(path_symbols(statement, SymbolKind::FILE, "include"));
            }
            NodeKind::RequireDirective => {
                symbols.extend(path_symbols(statement, SymbolKind::FILE, "require"));
            }
            _ => symbols.extend(declaration_symbol(statement)),
        }
    }
    symbols
}

fn declaration_symbol(statement: &SyntaxNode) -> Option<BitbakeDocumentSymbol> {
    let (name, kind) = declared_name(statement)?;
    Some(BitbakeDocumentSymbol {
        name: name.text().unwrap_or_default().to_string(),
        detail: Some(declaration_detail(statement)),
        kind,
        range: statement.range().clone(),
        selection_range: name.range().clone(),
    })
}

fn declaration_detail(statement: &SyntaxNode) -> String {
    match statement.kind() {
        NodeKind::ExportStatement => match statement.child_by_kind(NodeKind::VariableAssignment) {
            Some(assignment) => format!("export {}", declaration_detail(assignment)),
            None => "export".to_string(),
        },
        NodeKind::VariableAssignment => {
            let overrides: String = statement
                .children_of_kind(NodeKind::Override)
                .filter_map(|node| node.child_by_kind(NodeKind::Identifier))
                .filter_map(SyntaxNode::text)
                .map(|name| format!(":{name}"))
                .collect();
            let operator = statement
                .child_by_kind(NodeKind::Operator)
                .and_then(SyntaxNode::text)
                .unwrap_or("=");
            format!("{overrides} {operator}").trim_start().to_string()
        }
        NodeKind::FunctionDefinition => {
            if has_keyword(statement, "fakeroot") {
                "fakeroot shell task".to_string()
            } else {
                "shell task".to_string()
            }
        }
        NodeKind::PythonFunctionDefinition => "python task".to_string(),
        NodeKind::PythonDefinition => "python function".to_string(),
        other => other.as_str().to_string(),
    }
}

fn has_keyword(statement: &SyntaxNode, keyword: &str) -> bool {
    statement
        .children_of_kind(NodeKind::Keyword)
        .any(|node| node.text() == Some(keyword))
}

fn path_symbols<'a>(
    statement: &'a SyntaxNode,
    kind: SymbolKind,
    detail: &'static str,
) -> impl Iterator<Item = BitbakeDocumentSymbol> + 'a {
    statement
        .children_of_kind(NodeKind::Path)
        .map(move |path| BitbakeDocumentSymbol {
            name: path.text().unwrap_or_default().to_string(),
            detail: Some(detail.to_string()),
            kind,
            range: statement.range().clone(),
            selection_range: path.range().clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{Parser, Position};
    use crate::test_support::sample_tree;

    fn find_symbol<'a>(symbols: &'a [BitbakeDocumentSymbol], name: &str) -> &'a BitbakeDocumentSymbol {
        symbols
            .iter()
            .find(|symbol| symbol.name == name)
            .unwrap_or_else(|| panic!("symbol {name} not found"))
    }

    #[test]
    fn outlines_the_sample_recipe() {
        let symbols = collect_document_symbols(sample_tree());
        let names: Vec<_> = symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "SUMMARY",
                "LICENSE",
                "autotools",
                "pkgconfig",
                "hello-common.inc",
                "SRC_URI",
                "SRC_URI",
                "EXTRA_OECONF",
                "do_configure",
                "do_install",
                "do_deploy_info",
                "get_version",
                "CFLAGS",
            ]
        );
        assert_eq!(find_symbol(&symbols, "autotools").kind, SymbolKind::MODULE);
        assert_eq!(find_symbol(&symbols, "hello-common.inc").kind, SymbolKind::FILE);
        assert_eq!(find_symbol(&symbols, "do_install").kind, SymbolKind::FUNCTION);
        assert_eq!(
            find_symbol(&symbols, "do_install").detail.as_deref(),
            Some("fakeroot shell task")
        );
        assert_eq!(
            find_symbol(&symbols, "CFLAGS").detail.as_deref(),
            Some("export +=")
        );
    }

    #[test]
    fn ranges_cover_statement_and_name() {
        let tree = Parser::new()
            .parse("do_compile() {\n    oe_runmake\n}\nRDEPENDS:${PN}:append = \" bash\"\n")
            .unwrap();
        let symbols = collect_document_symbols(&tree);
        let task = &symbols[0];
        assert_eq!(task.range.start, Position::new(0, 0));
        assert_eq!(task.range.end, Position::new(2, 1));
        assert_eq!(task.selection_range.end, Position::new(0, 10));
        assert_eq!(symbols[1].detail.as_deref(), Some(":${PN}:append ="));
    }
}
