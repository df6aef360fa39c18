//! Document analysis and navigation for BitBake
//!
//! This crate turns recipe, class and configuration text into the pieces a
//! language server needs: an error-tolerant syntax tree, a table of global
//! declarations, syntax diagnostics, and synthetic documents for the shell
//! and python code embedded in task bodies.
//!
//! # Architecture
//!
//! - `syntax`: positions, the concrete syntax tree and the parser
//! - `declarations`: top-level variables and functions, last definition wins
//! - `diagnostics`: one diagnostic per error-recovery node
//! - `analyzer`: per-document snapshots with debounced diagnostic passes
//! - `regions`: classification of embedded shell and python regions
//! - `embedded`: synthetic documents per region and position mapping
//! - `document_symbols`, `go_to_definition`, `hover`: navigation features
//!
//! # Design Principles
//!
//! - **Snapshots**: every analysis pass replaces a document's state wholesale;
//!   queries hold an `Arc` to one immutable snapshot
//! - **Degrade, never fail**: missing state answers with `None` or an empty
//!   collection
//! - **Protocol free**: positions and ranges are this crate's own types; the
//!   server converts them
//!
//! # Usage
//!
//! ```rust,ignore
//! use bitbake_analysis::analyzer::{Analyzer, AnalyzerConfig};
//! use bitbake_analysis::syntax::Parser;
//!
//! let analyzer = Analyzer::with_parser(Parser::new(), AnalyzerConfig::default());
//! if let Some(diagnostics) = analyzer.analyze(&uri, "FOO = \"bar\n").await {
//!     publish(diagnostics);
//! }
//! let word = analyzer.word_at_point(&uri, 0, 1);
//! ```

pub mod syntax;

pub mod analyzer;
pub mod declarations;
pub mod diagnostics;
pub mod embedded;
pub mod regions;

// Navigation features
pub mod document_symbols;
pub mod go_to_definition;
pub mod hover;

// Test support (available in tests and as dev-dependency)
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
