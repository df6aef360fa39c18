use std::collections::HashMap;

use lsp_types::{SymbolKind, Url};

use crate::syntax::{NodeKind, Range, SyntaxNode, SyntaxTree};

const ANONYMOUS_FUNCTION: &str = "__anonymous";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalSymbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Range of the declaring name.
    pub range: Range,
    pub uri: Url,
}

/// Top-level variables and functions of one document, keyed by name. A name
/// defined more than once maps to its last definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalDeclarations {
    symbols: HashMap<String, GlobalSymbol>,
}

impl GlobalDeclarations {
    pub fn from_tree(tree: &SyntaxTree, uri: &Url) -> Self {
        let mut symbols = HashMap::new();
        for statement in tree.statements() {
            let Some((name_node, kind)) = declared_name(statement) else {
                continue;
            };
            let name = name_node.text().unwrap_or_default().to_string();
            symbols.insert(
                name.clone(),
                GlobalSymbol {
                    name,
                    kind,
                    range: name_node.range().clone(),
                    uri: uri.clone(),
                },
            );
        }
        Self { symbols }
    }

    pub fn get(&self, name: &str) -> Option<&GlobalSymbol> {
        self.symbols.get(name)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &GlobalSymbol> {
        self.symbols.values()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// The name node and symbol kind a top-level statement declares, if any.
pub fn declared_name(statement: &SyntaxNode) -> Option<(&SyntaxNode, SymbolKind)> {
    match statement.kind() {
        NodeKind::VariableAssignment => statement
            .child_by_kind(NodeKind::Identifier)
            .map(|name| (name, SymbolKind::VARIABLE)),
        NodeKind::ExportStatement => statement
            .child_by_kind(NodeKind::VariableAssignment)
            .and_then(declared_name),
        NodeKind::FunctionDefinition
        | NodeKind::PythonFunctionDefinition
        | NodeKind::PythonDefinition => statement
            .child_by_kind(NodeKind::Identifier)
            .filter(|name| name.text() != Some(ANONYMOUS_FUNCTION))
            .map(|name| (name, SymbolKind::FUNCTION)),
        _ => None,
    }
}
