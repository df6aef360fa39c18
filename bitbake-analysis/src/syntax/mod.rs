//! Concrete syntax tree for BitBake source files.

mod node;
mod parser;
mod position;

pub use node::{NodeKind, SyntaxNode, SyntaxTree, Walk};
pub use parser::{ParseError, Parser, ParserConfig, DEFAULT_MAX_SOURCE_LEN};
pub use position::{LineIndex, Position, Range};
