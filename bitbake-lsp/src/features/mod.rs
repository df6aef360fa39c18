// LSP-specific features (custom requests and their wire types)
pub mod embedded;

// Re-export analysis features from bitbake-analysis
pub use bitbake_analysis::{document_symbols, go_to_definition, hover};
