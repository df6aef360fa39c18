use std::sync::Arc;

use super::position::{LineIndex, Position, Range};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    SourceFile,
    VariableAssignment,
    VariableFlag,
    Override,
    String,
    VariableExpansion,
    InlinePython,
    FunctionDefinition,
    PythonFunctionDefinition,
    PythonDefinition,
    InheritDirective,
    IncludeDirective,
    RequireDirective,
    ExportStatement,
    UnsetStatement,
    AddTaskStatement,
    DelTaskStatement,
    AddHandlerStatement,
    ExportFunctionsStatement,
    Identifier,
    Keyword,
    Operator,
    Punctuation,
    StringContent,
    ShellContent,
    PythonContent,
    Path,
    Comment,
    Error,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::SourceFile => "source_file",
            NodeKind::VariableAssignment => "variable_assignment",
            NodeKind::VariableFlag => "variable_flag",
            NodeKind::Override => "override",
            NodeKind::String => "string",
            NodeKind::VariableExpansion => "variable_expansion",
            NodeKind::InlinePython => "inline_python",
            NodeKind::FunctionDefinition => "function_definition",
            NodeKind::PythonFunctionDefinition => "python_function_definition",
            NodeKind::PythonDefinition => "python_definition",
            NodeKind::InheritDirective => "inherit_directive",
            NodeKind::IncludeDirective => "include_directive",
            NodeKind::RequireDirective => "require_directive",
            NodeKind::ExportStatement => "export_statement",
            NodeKind::UnsetStatement => "unset_statement",
            NodeKind::AddTaskStatement => "addtask_statement",
            NodeKind::DelTaskStatement => "deltask_statement",
            NodeKind::AddHandlerStatement => "addhandler_statement",
            NodeKind::ExportFunctionsStatement => "export_functions_statement",
            NodeKind::Identifier => "identifier",
            NodeKind::Keyword => "keyword",
            NodeKind::Operator => "operator",
            NodeKind::Punctuation => "punctuation",
            NodeKind::StringContent => "string_content",
            NodeKind::ShellContent => "shell_content",
            NodeKind::PythonContent => "python_content",
            NodeKind::Path => "path",
            NodeKind::Comment => "comment",
            NodeKind::Error => "ERROR",
        }
    }
}

/// A node of the concrete syntax tree. Leaves carry their literal text;
/// error-recovery nodes are leaves of kind [`NodeKind::Error`] holding the
/// text the parser could not match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxNode {
    kind: NodeKind,
    range: Range,
    text: Option<String>,
    children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn leaf(kind: NodeKind, range: Range, text: impl Into<String>) -> Self {
        Self {
            kind,
            range,
            text: Some(text.into()),
            children: Vec::new(),
        }
    }

    pub fn branch(kind: NodeKind, range: Range, children: Vec<SyntaxNode>) -> Self {
        Self {
            kind,
            range,
            text: None,
            children,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn range(&self) -> &Range {
        &self.range
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn children(&self) -> &[SyntaxNode] {
        &self.children
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn is_error(&self) -> bool {
        self.kind == NodeKind::Error
    }

    pub fn child_by_kind(&self, kind: NodeKind) -> Option<&SyntaxNode> {
        self.children.iter().find(|child| child.kind == kind)
    }

    pub fn children_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &SyntaxNode> {
        self.children.iter().filter(move |child| child.kind == kind)
    }

    /// Pre-order traversal of this node and all of its descendants.
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }

    /// Child indices leading from this node to the smallest descendant that
    /// contains `position`. A child qualifies when it starts at or before the
    /// position and ends after it; an empty path means no child qualified.
    pub fn descendant_path_for_position(&self, position: Position) -> Vec<usize> {
        let mut path = Vec::new();
        let mut node = self;
        loop {
            let next = node.children.iter().enumerate().find(|(_, child)| {
                child.range.start <= position && position < child.range.end
            });
            match next {
                Some((idx, child)) => {
                    path.push(idx);
                    node = child;
                }
                None => return path,
            }
        }
    }

    pub fn descendant_for_position(&self, position: Position) -> &SyntaxNode {
        let path = self.descendant_path_for_position(position);
        self.node_at_path(&path).unwrap_or(self)
    }

    pub fn node_at_path(&self, path: &[usize]) -> Option<&SyntaxNode> {
        path.iter()
            .try_fold(self, |node, &idx| node.children.get(idx))
    }
}

pub struct Walk<'a> {
    stack: Vec<&'a SyntaxNode>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a SyntaxNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Immutable result of one parse. `root` is absent when the parser refused
/// the input.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    source: Arc<str>,
    index: Arc<LineIndex>,
    root: Option<Arc<SyntaxNode>>,
}

impl SyntaxTree {
    pub(crate) fn from_parts(source: Arc<str>, index: LineIndex, root: Option<SyntaxNode>) -> Self {
        Self {
            source,
            index: Arc::new(index),
            root: root.map(Arc::new),
        }
    }

    pub fn without_root(text: &str) -> Self {
        Self::from_parts(Arc::from(text), LineIndex::new(text), None)
    }

    pub fn root(&self) -> Option<&SyntaxNode> {
        self.root.as_deref()
    }

    /// A handle on the root that outlives this tree value.
    pub fn shared_root(&self) -> Option<Arc<SyntaxNode>> {
        self.root.clone()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn line_index(&self) -> &LineIndex {
        &self.index
    }

    pub fn text_of(&self, node: &SyntaxNode) -> &str {
        self.source
            .get(node.range.span.clone())
            .unwrap_or_default()
    }

    /// Top-level statements, in document order.
    pub fn statements(&self) -> &[SyntaxNode] {
        self.root().map(SyntaxNode::children).unwrap_or_default()
    }

    pub fn error_nodes(&self) -> Vec<&SyntaxNode> {
        match self.root() {
            Some(root) => root.walk().filter(|node| node.is_error()).collect(),
            None => Vec::new(),
        }
    }

    pub fn descendant_for_position(&self, position: Position) -> Option<&SyntaxNode> {
        self.root()
            .map(|root| root.descendant_for_position(position))
    }
}
