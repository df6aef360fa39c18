//! Per-document analysis state with debounced diagnostics.
//!
//! Every call to [`Analyzer::analyze`] (or [`Analyzer::update`]) parses
//! immediately and swaps in a new [`AnalyzedDocument`] snapshot. Diagnostics are computed only once the
//! document has been quiet for the configured window: each call installs a
//! pending pass for its document and cancels the previous one, so a burst of
//! edits produces a single result computed from the latest snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lsp_types::Url;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::declarations::{GlobalDeclarations, GlobalSymbol};
use crate::diagnostics::{collect_diagnostics, BitbakeDiagnostic};
use crate::syntax::{ParseError, Parser, Position, SyntaxNode, SyntaxTree};

pub const DEBOUNCE_TIME: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerConfig {
    /// Quiet period a document must see before its diagnostics are computed.
    pub debounce: Duration,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            debounce: DEBOUNCE_TIME,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("the analyzer is not initialized with a parser")]
    Uninitialized,
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Immutable result of one analysis pass.
#[derive(Debug)]
pub struct AnalyzedDocument {
    uri: Url,
    tree: SyntaxTree,
    declarations: GlobalDeclarations,
}

impl AnalyzedDocument {
    pub fn new(uri: Url, tree: SyntaxTree) -> Self {
        let declarations = GlobalDeclarations::from_tree(&tree, &uri);
        Self {
            uri,
            tree,
            declarations,
        }
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn text(&self) -> &str {
        self.tree.source()
    }

    pub fn tree(&self) -> &SyntaxTree {
        &self.tree
    }

    pub fn declarations(&self) -> &GlobalDeclarations {
        &self.declarations
    }

    pub fn node_at(&self, position: Position) -> Option<&SyntaxNode> {
        self.tree.descendant_for_position(position)
    }

    /// Text of the leaf under `position`. Inner nodes and whitespace-only
    /// leaves are not words.
    pub fn word_at(&self, position: Position) -> Option<&str> {
        let node = self.node_at(position)?;
        if node.child_count() > 0 {
            return None;
        }
        let word = node.text()?.trim();
        (!word.is_empty()).then_some(word)
    }
}

/// A node of a stored snapshot, usable after the analyzer's lock is released.
#[derive(Debug, Clone)]
pub struct NodeRef {
    root: Arc<SyntaxNode>,
    path: Vec<usize>,
}

impl NodeRef {
    pub fn node(&self) -> &SyntaxNode {
        self.path
            .iter()
            .fold(&*self.root, |node, &idx| node.children().get(idx).unwrap_or(node))
    }

    /// Child indices from the root to this node.
    pub fn path(&self) -> &[usize] {
        &self.path
    }
}

struct PendingPass {
    generation: u64,
    cancel: oneshot::Sender<()>,
}

#[derive(Default)]
struct DocumentSlot {
    /// Bumped when a pass starts; a pass may only install its snapshot while
    /// it still holds the latest generation.
    generation: u64,
    document: Option<Arc<AnalyzedDocument>>,
    pending: Option<PendingPass>,
}

type Slots = Arc<RwLock<HashMap<Url, DocumentSlot>>>;

/// The debounced half of an analysis pass, detached from the [`Analyzer`]
/// so it can be moved into a background task.
pub struct DiagnosticPass {
    slots: Slots,
    uri: Url,
    generation: u64,
    debounce: Duration,
    cancelled: oneshot::Receiver<()>,
}

impl DiagnosticPass {
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// Waits out the debounce window and returns the diagnostics of the
    /// document's latest snapshot, or `None` when a newer pass for the same
    /// document replaced this one or the document was closed meanwhile.
    pub async fn wait(self) -> Option<Vec<BitbakeDiagnostic>> {
        let Self {
            slots,
            uri,
            generation,
            debounce,
            cancelled,
        } = self;

        tokio::select! {
            _ = tokio::time::sleep(debounce) => {}
            _ = cancelled => {
                debug!(%uri, generation, "diagnostic pass rescheduled");
                return None;
            }
        }

        let document = {
            let mut slots = slots.write();
            let slot = slots.get_mut(&uri)?;
            if slot
                .pending
                .as_ref()
                .is_some_and(|pending| pending.generation == generation)
            {
                slot.pending = None;
            }
            slot.document.clone()?
        };
        debug!(%uri, generation, "running diagnostic pass");
        Some(collect_diagnostics(document.tree()))
    }
}

pub struct Analyzer {
    parser: RwLock<Option<Parser>>,
    config: AnalyzerConfig,
    slots: Slots,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

impl Analyzer {
    /// An analyzer without a parser. Until [`Analyzer::initialize`] is called
    /// every analysis returns no diagnostics.
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            parser: RwLock::new(None),
            config,
            slots: Slots::default(),
        }
    }

    pub fn with_parser(parser: Parser, config: AnalyzerConfig) -> Self {
        let analyzer = Self::new(config);
        analyzer.initialize(parser);
        analyzer
    }

    pub fn initialize(&self, parser: Parser) {
        *self.parser.write() = Some(parser);
    }

    pub fn is_initialized(&self) -> bool {
        self.parser.read().is_some()
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Parses `text`, stores the snapshot and waits out the debounce window.
    ///
    /// Returns the diagnostics of the latest snapshot once the window closes,
    /// or `None` when the pass was superseded. An uninitialized analyzer
    /// logs and returns no diagnostics.
    pub async fn analyze(&self, uri: &Url, text: &str) -> Option<Vec<BitbakeDiagnostic>> {
        match self.update(uri, text) {
            Ok(Some(pass)) => pass.wait().await,
            Ok(None) => None,
            Err(err) => {
                warn!(%uri, "{err}; returning no diagnostics");
                Some(Vec::new())
            }
        }
    }

    /// The synchronous half of [`Analyzer::analyze`]: parses `text` and
    /// installs the snapshot, replacing the document's pending diagnostic
    /// pass. `Ok(None)` when a pass started later already installed its own
    /// snapshot.
    pub fn update(&self, uri: &Url, text: &str) -> Result<Option<DiagnosticPass>, AnalysisError> {
        let parser = self.parser()?;
        let generation = self.begin_pass(uri);
        let tree = match parser.parse(text) {
            Ok(tree) => tree,
            Err(err) => {
                warn!(%uri, error = %AnalysisError::from(err), "storing document without a syntax tree");
                SyntaxTree::without_root(text)
            }
        };
        let document = Arc::new(AnalyzedDocument::new(uri.clone(), tree));

        let Some(cancelled) = self.install(uri, generation, document) else {
            debug!(%uri, generation, "analysis pass superseded before install");
            return Ok(None);
        };
        Ok(Some(DiagnosticPass {
            slots: self.slots.clone(),
            uri: uri.clone(),
            generation,
            debounce: self.config.debounce,
            cancelled,
        }))
    }

    fn parser(&self) -> Result<Parser, AnalysisError> {
        self.parser.read().clone().ok_or(AnalysisError::Uninitialized)
    }

    fn begin_pass(&self, uri: &Url) -> u64 {
        let mut slots = self.slots.write();
        let slot = slots.entry(uri.clone()).or_default();
        slot.generation += 1;
        slot.generation
    }

    /// Swaps in `document` and replaces the pending diagnostic pass. `None`
    /// when a newer pass has started since `generation` was issued.
    fn install(
        &self,
        uri: &Url,
        generation: u64,
        document: Arc<AnalyzedDocument>,
    ) -> Option<oneshot::Receiver<()>> {
        let mut slots = self.slots.write();
        let slot = slots.get_mut(uri)?;
        if slot.generation != generation {
            return None;
        }
        slot.document = Some(document);
        let (cancel, cancelled) = oneshot::channel();
        if let Some(previous) = slot.pending.replace(PendingPass { generation, cancel }) {
            // The receiver may already be gone if that pass finished.
            let _ = previous.cancel.send(());
        }
        Some(cancelled)
    }

    /// Latest snapshot of `uri`, if it was ever analyzed.
    pub fn document(&self, uri: &Url) -> Option<Arc<AnalyzedDocument>> {
        self.slots.read().get(uri)?.document.clone()
    }

    pub fn analyzed_uris(&self) -> Vec<Url> {
        self.slots
            .read()
            .iter()
            .filter(|(_, slot)| slot.document.is_some())
            .map(|(uri, _)| uri.clone())
            .collect()
    }

    /// Smallest node containing the position. `None` when the document was
    /// never analyzed or its parse produced no tree.
    pub fn node_at_point(&self, uri: &Url, line: usize, column: usize) -> Option<NodeRef> {
        let document = self.document(uri)?;
        let root = document.tree().shared_root()?;
        let path = root.descendant_path_for_position(Position::new(line, column));
        Some(NodeRef { root, path })
    }

    pub fn word_at_point(&self, uri: &Url, line: usize, column: usize) -> Option<String> {
        let document = self.document(uri)?;
        document
            .word_at(Position::new(line, column))
            .map(str::to_string)
    }

    /// Every global declaration of `uri`; empty when it was never analyzed.
    pub fn global_declaration_symbols(&self, uri: &Url) -> Vec<GlobalSymbol> {
        match self.document(uri) {
            Some(document) => document.declarations().symbols().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn declaration(&self, uri: &Url, name: &str) -> Option<GlobalSymbol> {
        self.document(uri)?.declarations().get(name).cloned()
    }

    /// Forgets `uri`. A pending diagnostic pass for it resolves to `None`.
    pub fn close(&self, uri: &Url) {
        if self.slots.write().remove(uri).is_some() {
            debug!(%uri, "dropped analysis state");
        }
    }
}
