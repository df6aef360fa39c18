//! Language Server Protocol (LSP) implementation for BitBake
//!
//!     This crate serves BitBake recipes, classes, include and configuration files over LSP.
//!     It is a thin layer over bitbake-analysis: it owns one analyzer and one embedded
//!     document manager, feeds them document notifications and converts their results
//!     into protocol types.
//!
//! Feature Set
//!
//!     Core Features:
//!
//!         a. Diagnostics
//!
//!             1. Syntax diagnostics (textDocument/publishDiagnostics):
//!                 - One error per recovery node of the parse
//!                 - Published once a document has been quiet for the debounce window
//!                 - Superseded passes publish nothing
//!
//!         b. Navigation
//!
//!             2. Document Symbols (textDocument/documentSymbol):
//!                 - Variables, tasks, python functions, inherited classes, includes
//!             3. Workspace Symbols (workspace/symbol):
//!                 - Global declarations of every open document, filtered by query
//!             4. Go to Definition (textDocument/definition):
//!                 - Jump from a name or `${NAME}` expansion to its last top-level definition
//!             5. Hover Information (textDocument/hover):
//!                 - Kind, defining line and header of the declaration under the cursor
//!
//!         c. Embedded languages
//!
//!             6. bitbake/getEmbeddedLanguageDocInfos:
//!                 - Synthetic shell or python document owning a host position
//!                 - The position mapped into that document
//!                 - Definition and hover inside embedded code answer null so a client-side
//!                   router can forward them to the shell or python server
//!
//! Architecture
//!
//!     LSP Layer (tower-lsp):
//!         - Handles JSON-RPC communication
//!         - Protocol handshaking and capability negotiation
//!         - Request/response routing, including the custom request
//!
//!     Server Layer (this crate):
//!         - Implements LanguageServer trait
//!         - Schedules debounced diagnostic passes on background tasks
//!         - Thin tests asserting the right things are called and returned
//!
//!     Feature Layer (bitbake-analysis):
//!         - Parsing, declarations, regions and navigation over immutable snapshots
//!         - All logic and dense unit tests
//!
//! Configuration
//!
//!     Settings are read from initializationOptions and from the `bitbake` section of
//!     workspace/didChangeConfiguration:
//!
//!         { "diagnostics": true, "embeddedDocuments": true }
//!
//!     Changing them re-checks every open document.
//!
//! Error Handling and Robustness
//!
//!     1. No Panics:
//!         - No `unwrap()` or `expect()` in production code paths.
//!
//!     2. Graceful Degradation:
//!         - Unknown documents, oversized input and malformed settings are logged and
//!           answered with `None` or an empty result.
//!
//!     3. Property-Based Testing:
//!         - `proptest` drives the server with random document text.
//!
//! Usage
//!
//!     Binary:
//!         $ bitbake-lsp
//!         Starts the language server on stdin/stdout. Logs go to stderr, filtered by RUST_LOG.
//!

pub mod features;
pub mod server;

pub use server::BitbakeLanguageServer;
