//! Main language server implementation

use std::sync::Arc;

use crate::features::document_symbols::{collect_document_symbols, BitbakeDocumentSymbol};
use crate::features::embedded::{
    EmbeddedDocumentsChanged, EmbeddedDocumentsChangedParams, EmbeddedLanguageDocInfoParams,
    EmbeddedLanguageDocInfoResponse,
};
use crate::features::go_to_definition::goto_definition;
use crate::features::hover::{hover as compute_hover, HoverResult};
use bitbake_analysis::analyzer::{AnalyzedDocument, Analyzer, AnalyzerConfig};
use bitbake_analysis::declarations::GlobalSymbol;
use bitbake_analysis::diagnostics::BitbakeDiagnostic;
use bitbake_analysis::embedded::{EmbeddedDocumentChanges, EmbeddedDocuments};
use bitbake_analysis::syntax::{
    LineIndex, Parser, ParserConfig, Position as AstPosition, Range as AstRange, SyntaxTree,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tower_lsp::async_trait;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::{
    Diagnostic, DidChangeConfigurationParams, DidChangeTextDocumentParams,
    DidCloseTextDocumentParams, DidOpenTextDocumentParams, DocumentSymbol, DocumentSymbolParams,
    DocumentSymbolResponse, GotoDefinitionParams, GotoDefinitionResponse, Hover, HoverContents,
    HoverParams, HoverProviderCapability, InitializeParams, InitializeResult, InitializedParams,
    Location, MarkupContent, MarkupKind, MessageType, OneOf, Position, PositionEncodingKind, Range,
    ServerCapabilities, ServerInfo, SymbolInformation, TextDocumentItem,
    TextDocumentPositionParams, TextDocumentSyncCapability, TextDocumentSyncKind, Url,
    WorkspaceSymbolParams,
};
use tower_lsp::Client;
use tracing::{debug, info, warn};

#[async_trait]
pub trait LspClient: Send + Sync + Clone + 'static {
    async fn publish_diagnostics(&self, uri: Url, diags: Vec<Diagnostic>, version: Option<i32>);
    async fn show_message(&self, typ: MessageType, message: String);
    async fn embedded_documents_changed(&self, params: EmbeddedDocumentsChangedParams);
}

#[async_trait]
impl LspClient for Client {
    async fn publish_diagnostics(&self, uri: Url, diags: Vec<Diagnostic>, version: Option<i32>) {
        self.publish_diagnostics(uri, diags, version).await;
    }

    async fn show_message(&self, typ: MessageType, message: String) {
        self.show_message(typ, message).await;
    }

    async fn embedded_documents_changed(&self, params: EmbeddedDocumentsChangedParams) {
        self.send_notification::<EmbeddedDocumentsChanged>(params)
            .await;
    }
}

pub trait FeatureProvider: Send + Sync + 'static {
    fn document_symbols(&self, tree: &SyntaxTree) -> Vec<BitbakeDocumentSymbol>;
    fn hover(&self, document: &AnalyzedDocument, position: AstPosition) -> Option<HoverResult>;
    fn goto_definition(
        &self,
        document: &AnalyzedDocument,
        position: AstPosition,
    ) -> Option<GlobalSymbol>;
}

#[derive(Default)]
pub struct DefaultFeatureProvider;

impl DefaultFeatureProvider {
    pub fn new() -> Self {
        Self
    }
}

impl FeatureProvider for DefaultFeatureProvider {
    fn document_symbols(&self, tree: &SyntaxTree) -> Vec<BitbakeDocumentSymbol> {
        collect_document_symbols(tree)
    }

    fn hover(&self, document: &AnalyzedDocument, position: AstPosition) -> Option<HoverResult> {
        compute_hover(document, position)
    }

    fn goto_definition(
        &self,
        document: &AnalyzedDocument,
        position: AstPosition,
    ) -> Option<GlobalSymbol> {
        goto_definition(document, position)
    }
}

/// Client settings, read from `initializationOptions` and from the `bitbake`
/// section of `workspace/didChangeConfiguration`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BitbakeSettings {
    /// Publish syntax diagnostics. When off, passes still run but publish an
    /// empty list so stale results are cleared.
    pub diagnostics: bool,
    /// Maintain synthetic documents for embedded shell and python code.
    pub embedded_documents: bool,
}

impl Default for BitbakeSettings {
    fn default() -> Self {
        Self {
            diagnostics: true,
            embedded_documents: true,
        }
    }
}

impl BitbakeSettings {
    fn from_value(value: &Value) -> Option<Self> {
        match serde_json::from_value(value.clone()) {
            Ok(settings) => Some(settings),
            Err(err) => {
                warn!(error = %err, "ignoring malformed bitbake settings");
                None
            }
        }
    }
}

/// Unit of the `character` field of positions exchanged with the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PositionEncoding {
    Utf8,
    /// Mandatory for every client, so used unless UTF-8 is offered.
    #[default]
    Utf16,
}

impl PositionEncoding {
    pub fn negotiate(params: &InitializeParams) -> Self {
        let offered = params
            .capabilities
            .general
            .as_ref()
            .and_then(|general| general.position_encodings.as_deref())
            .unwrap_or_default();
        if offered.contains(&PositionEncodingKind::UTF8) {
            PositionEncoding::Utf8
        } else {
            PositionEncoding::Utf16
        }
    }

    pub fn kind(self) -> PositionEncodingKind {
        match self {
            PositionEncoding::Utf8 => PositionEncodingKind::UTF8,
            PositionEncoding::Utf16 => PositionEncodingKind::UTF16,
        }
    }
}

/// Converts between the byte columns of one text and client positions.
struct Columns<'a> {
    encoding: PositionEncoding,
    text: &'a str,
    lines: &'a LineIndex,
}

impl<'a> Columns<'a> {
    fn new(encoding: PositionEncoding, text: &'a str, lines: &'a LineIndex) -> Self {
        Self {
            encoding,
            text,
            lines,
        }
    }

    fn of(encoding: PositionEncoding, tree: &'a SyntaxTree) -> Self {
        Self::new(encoding, tree.source(), tree.line_index())
    }

    fn to_lsp_position(&self, position: &AstPosition) -> Position {
        let character = match self.encoding {
            PositionEncoding::Utf8 => position.column,
            PositionEncoding::Utf16 => self.lines.utf16_column(self.text, *position),
        };
        Position::new(position.line as u32, character as u32)
    }

    fn to_lsp_range(&self, range: &AstRange) -> Range {
        Range {
            start: self.to_lsp_position(&range.start),
            end: self.to_lsp_position(&range.end),
        }
    }

    fn to_lsp_location(&self, uri: &Url, range: &AstRange) -> Location {
        Location {
            uri: uri.clone(),
            range: self.to_lsp_range(range),
        }
    }

    fn to_ast_position(&self, position: Position) -> AstPosition {
        let line = position.line as usize;
        let character = position.character as usize;
        let column = match self.encoding {
            PositionEncoding::Utf8 => character,
            PositionEncoding::Utf16 => self.lines.column_from_utf16(self.text, line, character),
        };
        AstPosition::new(line, column)
    }

    fn to_lsp_diagnostic(&self, diagnostic: &BitbakeDiagnostic) -> Diagnostic {
        Diagnostic {
            range: self.to_lsp_range(&diagnostic.range),
            severity: Some(diagnostic.severity),
            source: Some(diagnostic.source.to_string()),
            message: diagnostic.message.clone(),
            ..Diagnostic::default()
        }
    }

    #[allow(deprecated)]
    fn to_document_symbol(&self, symbol: &BitbakeDocumentSymbol) -> DocumentSymbol {
        DocumentSymbol {
            name: symbol.name.clone(),
            detail: symbol.detail.clone(),
            kind: symbol.kind,
            tags: None,
            deprecated: None,
            range: self.to_lsp_range(&symbol.range),
            selection_range: self.to_lsp_range(&symbol.selection_range),
            children: None,
        }
    }

    #[allow(deprecated)]
    fn to_symbol_information(&self, symbol: &GlobalSymbol) -> SymbolInformation {
        SymbolInformation {
            name: symbol.name.clone(),
            kind: symbol.kind,
            tags: None,
            deprecated: None,
            location: self.to_lsp_location(&symbol.uri, &symbol.range),
            container_name: None,
        }
    }
}

pub struct BitbakeLanguageServer<C = Client, P = DefaultFeatureProvider> {
    client: C,
    analyzer: Arc<Analyzer>,
    embedded: Arc<EmbeddedDocuments>,
    features: Arc<P>,
    parser_config: ParserConfig,
    settings: RwLock<BitbakeSettings>,
    encoding: RwLock<PositionEncoding>,
}

impl BitbakeLanguageServer<Client, DefaultFeatureProvider> {
    pub fn new(client: Client) -> Self {
        Self::with_features(client, Arc::new(DefaultFeatureProvider::new()))
    }
}

impl<C, P> BitbakeLanguageServer<C, P>
where
    C: LspClient,
    P: FeatureProvider,
{
    pub fn with_features(client: C, features: Arc<P>) -> Self {
        Self::with_config(
            client,
            features,
            AnalyzerConfig::default(),
            ParserConfig::default(),
        )
    }

    pub fn with_config(
        client: C,
        features: Arc<P>,
        config: AnalyzerConfig,
        parser_config: ParserConfig,
    ) -> Self {
        Self {
            client,
            analyzer: Arc::new(Analyzer::new(config)),
            embedded: Arc::new(EmbeddedDocuments::with_parser(Parser::with_config(
                parser_config.clone(),
            ))),
            features,
            parser_config,
            settings: RwLock::new(BitbakeSettings::default()),
            encoding: RwLock::new(PositionEncoding::default()),
        }
    }

    /// Handler of `bitbake/getEmbeddedLanguageDocInfos`: the synthetic
    /// document owning a host position, or null outside embedded code.
    pub async fn embedded_language_doc_info(
        &self,
        params: EmbeddedLanguageDocInfoParams,
    ) -> Result<Option<EmbeddedLanguageDocInfoResponse>> {
        let encoding = *self.encoding.read().await;
        let Some(host) = self.analyzer.document(&params.uri) else {
            return Ok(None);
        };
        let position = Columns::of(encoding, host.tree()).to_ast_position(params.position);
        let Some(info) = self.embedded.embedded_language_doc_info(&params.uri, position) else {
            return Ok(None);
        };
        let Some(document) = self.embedded.document(&info.uri) else {
            return Ok(None);
        };
        let lines = LineIndex::new(&document.text);
        let position = Columns::new(encoding, &document.text, &lines).to_lsp_position(&info.position);
        Ok(Some(EmbeddedLanguageDocInfoResponse::new(&document, position)))
    }

    /// Stores a new snapshot, regenerates the embedded documents and schedules
    /// the debounced diagnostic pass.
    async fn refresh(&self, uri: Url, version: Option<i32>, text: &str) {
        let settings = self.settings.read().await.clone();
        let was_refused = self.is_refused(&uri);
        let scheduled = self.analyzer.update(&uri, text);
        if !was_refused && self.is_refused(&uri) {
            self.warn_refused(&uri, text.len()).await;
        }

        if settings.embedded_documents {
            self.regenerate_embedded(&uri, text).await;
        } else {
            self.close_embedded(&uri).await;
        }

        match scheduled {
            Ok(Some(pass)) => {
                let client = self.client.clone();
                let analyzer = self.analyzer.clone();
                let encoding = *self.encoding.read().await;
                let publish = settings.diagnostics;
                tokio::spawn(async move {
                    let Some(diagnostics) = pass.wait().await else {
                        return;
                    };
                    let diagnostics = match analyzer.document(&uri) {
                        Some(document) if publish => {
                            let columns = Columns::of(encoding, document.tree());
                            diagnostics.iter().map(|d| columns.to_lsp_diagnostic(d)).collect()
                        }
                        _ => Vec::new(),
                    };
                    client.publish_diagnostics(uri, diagnostics, version).await;
                });
            }
            Ok(None) => {}
            Err(err) => {
                warn!(%uri, "{err}; publishing no diagnostics");
                self.client.publish_diagnostics(uri, Vec::new(), version).await;
            }
        }
    }

    /// Whether the latest snapshot of `uri` was refused by the parser.
    fn is_refused(&self, uri: &Url) -> bool {
        self.analyzer
            .document(uri)
            .is_some_and(|document| document.tree().root().is_none())
    }

    async fn warn_refused(&self, uri: &Url, len: usize) {
        let limit = self.parser_config.max_source_len;
        warn!(%uri, len, limit, "document too large to analyze");
        self.client
            .show_message(
                MessageType::WARNING,
                format!(
                    "{uri} is {len} bytes, above the {limit} byte limit; BitBake analysis is disabled for it"
                ),
            )
            .await;
    }

    async fn regenerate_embedded(&self, uri: &Url, text: &str) {
        let result = match self.analyzer.document(uri) {
            Some(document) => self.embedded.generate_from_tree(uri, document.tree()),
            None => self.embedded.generate_embedded_language_docs(uri, text),
        };
        match result {
            Ok(changes) => self.notify_embedded(uri, &changes).await,
            Err(err) => warn!(%uri, error = %err, "could not generate embedded documents"),
        }
    }

    async fn close_embedded(&self, uri: &Url) {
        let changes = EmbeddedDocumentChanges {
            closed: self.embedded.close(uri),
            ..EmbeddedDocumentChanges::default()
        };
        self.notify_embedded(uri, &changes).await;
    }

    async fn notify_embedded(&self, uri: &Url, changes: &EmbeddedDocumentChanges) {
        if changes.is_empty() {
            return;
        }
        self.client
            .embedded_documents_changed(EmbeddedDocumentsChangedParams::new(uri.clone(), changes))
            .await;
    }

    /// Whether `position` falls in code the embedded backends own.
    fn in_embedded_region(&self, uri: &Url, position: AstPosition) -> bool {
        self.embedded
            .get_embedded_language_doc_uri_on_position(uri, position)
            .is_some()
    }
}

#[async_trait]
impl<C, P> tower_lsp::LanguageServer for BitbakeLanguageServer<C, P>
where
    C: LspClient,
    P: FeatureProvider,
{
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        if let Some(settings) = params
            .initialization_options
            .as_ref()
            .and_then(BitbakeSettings::from_value)
        {
            *self.settings.write().await = settings;
        }
        let encoding = PositionEncoding::negotiate(&params);
        *self.encoding.write().await = encoding;
        self.analyzer
            .initialize(Parser::with_config(self.parser_config.clone()));

        let capabilities = ServerCapabilities {
            position_encoding: Some(encoding.kind()),
            text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL)),
            hover_provider: Some(HoverProviderCapability::Simple(true)),
            document_symbol_provider: Some(OneOf::Left(true)),
            workspace_symbol_provider: Some(OneOf::Left(true)),
            definition_provider: Some(OneOf::Left(true)),
            ..ServerCapabilities::default()
        };

        Ok(InitializeResult {
            capabilities,
            server_info: Some(ServerInfo {
                name: "bitbake-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let encoding = *self.encoding.read().await;
        info!(?encoding, "bitbake language server initialized");
    }

    async fn shutdown(&self) -> Result<()> {
        info!("bitbake language server shutting down");
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let TextDocumentItem {
            uri, version, text, ..
        } = params.text_document;
        self.refresh(uri, Some(version), &text).await;
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let Some(settings) = params
            .settings
            .get("bitbake")
            .and_then(BitbakeSettings::from_value)
        else {
            return;
        };
        {
            let mut current = self.settings.write().await;
            if *current == settings {
                return;
            }
            *current = settings;
        }

        // Re-check all documents with new settings
        for uri in self.analyzer.analyzed_uris() {
            if let Some(document) = self.analyzer.document(&uri) {
                let text = document.text().to_string();
                self.refresh(uri, None, &text).await;
            }
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        if let Some(change) = params.content_changes.into_iter().last() {
            let document = params.text_document;
            self.refresh(document.uri, Some(document.version), &change.text)
                .await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.analyzer.close(&uri);
        self.close_embedded(&uri).await;
        debug!(%uri, "closed document");
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let encoding = *self.encoding.read().await;
        if let Some(document) = self.analyzer.document(&params.text_document.uri) {
            let columns = Columns::of(encoding, document.tree());
            let symbols = self.features.document_symbols(document.tree());
            let converted: Vec<DocumentSymbol> = symbols
                .iter()
                .map(|symbol| columns.to_document_symbol(symbol))
                .collect();
            Ok(Some(DocumentSymbolResponse::Nested(converted)))
        } else {
            Ok(None)
        }
    }

    async fn symbol(&self, params: WorkspaceSymbolParams) -> Result<Option<Vec<SymbolInformation>>> {
        let encoding = *self.encoding.read().await;
        let query = params.query.to_lowercase();
        let mut symbols = Vec::new();
        for uri in self.analyzer.analyzed_uris() {
            let Some(document) = self.analyzer.document(&uri) else {
                continue;
            };
            let columns = Columns::of(encoding, document.tree());
            symbols.extend(
                document
                    .declarations()
                    .symbols()
                    .filter(|symbol| query.is_empty() || symbol.name.to_lowercase().contains(&query))
                    .map(|symbol| columns.to_symbol_information(symbol)),
            );
        }
        symbols.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.location.uri.cmp(&b.location.uri))
        });
        Ok(Some(symbols))
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let TextDocumentPositionParams {
            text_document,
            position,
        } = params.text_document_position_params;
        let encoding = *self.encoding.read().await;
        let Some(document) = self.analyzer.document(&text_document.uri) else {
            return Ok(None);
        };
        let columns = Columns::of(encoding, document.tree());
        let position = columns.to_ast_position(position);
        if self.in_embedded_region(&text_document.uri, position) {
            return Ok(None);
        }
        Ok(self.features.hover(&document, position).map(|result| Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: result.contents,
            }),
            range: Some(columns.to_lsp_range(&result.range)),
        }))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let TextDocumentPositionParams {
            text_document,
            position,
        } = params.text_document_position_params;
        let encoding = *self.encoding.read().await;
        let Some(document) = self.analyzer.document(&text_document.uri) else {
            return Ok(None);
        };
        let position = Columns::of(encoding, document.tree()).to_ast_position(position);
        if self.in_embedded_region(&text_document.uri, position) {
            return Ok(None);
        }
        let Some(symbol) = self.features.goto_definition(&document, position) else {
            return Ok(None);
        };
        let target = self
            .analyzer
            .document(&symbol.uri)
            .unwrap_or_else(|| document.clone());
        let location = Columns::of(encoding, target.tree()).to_lsp_location(&symbol.uri, &symbol.range);
        Ok(Some(GotoDefinitionResponse::Scalar(location)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitbake_analysis::analyzer::DEBOUNCE_TIME;
    use bitbake_analysis::test_support::{position_of, sample_source, sample_uri};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tower_lsp::lsp_types::{
        ClientCapabilities, DiagnosticSeverity, GeneralClientCapabilities, SymbolKind,
        TextDocumentContentChangeEvent, TextDocumentIdentifier, VersionedTextDocumentIdentifier,
    };
    use tower_lsp::LanguageServer;

    type Published = (Url, Vec<Diagnostic>, Option<i32>);

    #[derive(Clone, Default)]
    struct RecordingClient {
        published: Arc<Mutex<Vec<Published>>>,
        messages: Arc<Mutex<Vec<(MessageType, String)>>>,
        embedded: Arc<Mutex<Vec<EmbeddedDocumentsChangedParams>>>,
    }

    impl RecordingClient {
        fn published(&self) -> Vec<Published> {
            self.published.lock().unwrap().clone()
        }

        fn messages(&self) -> Vec<(MessageType, String)> {
            self.messages.lock().unwrap().clone()
        }

        fn embedded(&self) -> Vec<EmbeddedDocumentsChangedParams> {
            self.embedded.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LspClient for RecordingClient {
        async fn publish_diagnostics(&self, uri: Url, diags: Vec<Diagnostic>, version: Option<i32>) {
            self.published.lock().unwrap().push((uri, diags, version));
        }
        async fn show_message(&self, typ: MessageType, message: String) {
            self.messages.lock().unwrap().push((typ, message));
        }
        async fn embedded_documents_changed(&self, params: EmbeddedDocumentsChangedParams) {
            self.embedded.lock().unwrap().push(params);
        }
    }

    #[derive(Default)]
    struct MockFeatureProvider {
        document_symbols_called: AtomicUsize,
        hover_called: AtomicUsize,
        last_hover_position: Mutex<Option<AstPosition>>,
        definition_called: AtomicUsize,
    }

    impl FeatureProvider for MockFeatureProvider {
        fn document_symbols(&self, tree: &SyntaxTree) -> Vec<BitbakeDocumentSymbol> {
            self.document_symbols_called.fetch_add(1, Ordering::SeqCst);
            collect_document_symbols(tree)
        }

        fn hover(&self, document: &AnalyzedDocument, position: AstPosition) -> Option<HoverResult> {
            self.hover_called.fetch_add(1, Ordering::SeqCst);
            *self.last_hover_position.lock().unwrap() = Some(position);
            compute_hover(document, position)
        }

        fn goto_definition(
            &self,
            document: &AnalyzedDocument,
            position: AstPosition,
        ) -> Option<GlobalSymbol> {
            self.definition_called.fetch_add(1, Ordering::SeqCst);
            goto_definition(document, position)
        }
    }

    type TestServer = BitbakeLanguageServer<RecordingClient, MockFeatureProvider>;

    async fn initialized_server(options: Option<Value>) -> (TestServer, RecordingClient, Arc<MockFeatureProvider>) {
        let client = RecordingClient::default();
        let provider = Arc::new(MockFeatureProvider::default());
        let server = BitbakeLanguageServer::with_features(client.clone(), provider.clone());
        server
            .initialize(InitializeParams {
                initialization_options: options,
                ..InitializeParams::default()
            })
            .await
            .unwrap();
        (server, client, provider)
    }

    fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///layer/recipes/{name}.bb")).unwrap()
    }

    async fn open(server: &TestServer, uri: Url, version: i32, text: &str) {
        server
            .did_open(DidOpenTextDocumentParams {
                text_document: TextDocumentItem {
                    uri,
                    language_id: "bitbake".into(),
                    version,
                    text: text.to_string(),
                },
            })
            .await;
    }

    async fn change(server: &TestServer, uri: Url, version: i32, text: &str) {
        server
            .did_change(DidChangeTextDocumentParams {
                text_document: VersionedTextDocumentIdentifier { uri, version },
                content_changes: vec![TextDocumentContentChangeEvent {
                    range: None,
                    range_length: None,
                    text: text.to_string(),
                }],
            })
            .await;
    }

    async fn open_sample(server: &TestServer) {
        open(server, sample_uri(), 1, sample_source()).await;
    }

    fn position_params(uri: Url, position: AstPosition) -> TextDocumentPositionParams {
        TextDocumentPositionParams {
            text_document: TextDocumentIdentifier { uri },
            position: lsp_position(position),
        }
    }

    /// Byte columns of ASCII text are also their UTF-16 columns.
    fn lsp_position(position: AstPosition) -> Position {
        Position::new(position.line as u32, position.column as u32)
    }

    fn hover_params(uri: Url, position: Position) -> HoverParams {
        HoverParams {
            text_document_position_params: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri },
                position,
            },
            work_done_progress_params: Default::default(),
        }
    }

    fn utf8_client() -> InitializeParams {
        InitializeParams {
            capabilities: ClientCapabilities {
                general: Some(GeneralClientCapabilities {
                    position_encodings: Some(vec![
                        PositionEncodingKind::UTF8,
                        PositionEncodingKind::UTF16,
                    ]),
                    ..GeneralClientCapabilities::default()
                }),
                ..ClientCapabilities::default()
            },
            ..InitializeParams::default()
        }
    }

    async fn quiet_window() {
        tokio::time::sleep(DEBOUNCE_TIME + Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn initialize_reports_capabilities() {
        let client = RecordingClient::default();
        let server = BitbakeLanguageServer::with_features(client, Arc::new(DefaultFeatureProvider));
        let result = server.initialize(InitializeParams::default()).await.unwrap();

        assert_eq!(result.server_info.unwrap().name, "bitbake-lsp");
        let capabilities = result.capabilities;
        assert_eq!(
            capabilities.text_document_sync,
            Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL))
        );
        assert_eq!(capabilities.definition_provider, Some(OneOf::Left(true)));
        assert_eq!(capabilities.position_encoding, Some(PositionEncodingKind::UTF16));
        assert_eq!(capabilities.workspace_symbol_provider, Some(OneOf::Left(true)));
        assert!(server.analyzer.is_initialized());
    }

    #[tokio::test(start_paused = true)]
    async fn did_open_publishes_after_the_quiet_window() {
        let (server, client, _) = initialized_server(None).await;
        open(&server, uri("open"), 1, "FOO = \"bar\n").await;
        assert!(client.published().is_empty());

        quiet_window().await;
        let published = client.published();
        assert_eq!(published.len(), 1);
        let (published_uri, diagnostics, version) = &published[0];
        assert_eq!(published_uri, &uri("open"));
        assert_eq!(*version, Some(1));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].source.as_deref(), Some("bitbake"));
        assert_eq!(diagnostics[0].severity, Some(DiagnosticSeverity::ERROR));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_changes_publishes_the_latest_version_once() {
        let (server, client, _) = initialized_server(None).await;
        open(&server, uri("burst"), 1, "A = \"1\n").await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        change(&server, uri("burst"), 2, "A = \"1\"\nB = \"2\n").await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        change(&server, uri("burst"), 3, "A = \"1\"\n???\n").await;
        quiet_window().await;

        let published = client.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].2, Some(3));
        assert_eq!(published[0].1[0].message, "Invalid syntax \"???\"");
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_diagnostics_publish_empty_lists() {
        let (server, client, _) = initialized_server(Some(json!({ "diagnostics": false }))).await;
        open(&server, uri("quiet"), 1, "FOO = \"bar\n").await;
        quiet_window().await;

        let published = client.published();
        assert_eq!(published.len(), 1);
        assert!(published[0].1.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn configuration_change_rechecks_open_documents() {
        let (server, client, _) = initialized_server(None).await;
        open(&server, uri("config"), 1, "FOO = \"bar\n").await;
        quiet_window().await;

        server
            .did_change_configuration(DidChangeConfigurationParams {
                settings: json!({ "bitbake": { "diagnostics": false } }),
            })
            .await;
        quiet_window().await;

        let published = client.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].1.len(), 1);
        assert!(published[1].1.is_empty());
        assert!(!server.settings.read().await.diagnostics);
        assert!(server.settings.read().await.embedded_documents);
    }

    #[tokio::test(start_paused = true)]
    async fn did_close_clears_state_and_diagnostics() {
        let (server, client, _) = initialized_server(None).await;
        open_sample(&server).await;
        let body = position_of(sample_source(), "./bootstrap", 2);
        assert!(server.in_embedded_region(&sample_uri(), body));

        server
            .did_close(DidCloseTextDocumentParams {
                text_document: TextDocumentIdentifier { uri: sample_uri() },
            })
            .await;
        quiet_window().await;

        assert_eq!(client.published(), vec![(sample_uri(), Vec::new(), None)]);
        assert!(server.analyzer.document(&sample_uri()).is_none());
        assert!(!server.in_embedded_region(&sample_uri(), body));
    }

    #[tokio::test]
    async fn document_symbols_call_feature_layer() {
        let (server, _, provider) = initialized_server(None).await;
        open_sample(&server).await;

        let response = server
            .document_symbol(DocumentSymbolParams {
                text_document: TextDocumentIdentifier { uri: sample_uri() },
                work_done_progress_params: Default::default(),
                partial_result_params: Default::default(),
            })
            .await
            .unwrap()
            .unwrap();

        match response {
            DocumentSymbolResponse::Nested(symbols) => {
                let install = symbols.iter().find(|s| s.name == "do_install").unwrap();
                assert_eq!(install.kind, SymbolKind::FUNCTION);
                assert_eq!(install.detail.as_deref(), Some("fakeroot shell task"));
            }
            _ => panic!("unexpected symbol response"),
        }
        assert_eq!(provider.document_symbols_called.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_documents_have_no_symbols() {
        let (server, _, provider) = initialized_server(None).await;
        let response = server
            .document_symbol(DocumentSymbolParams {
                text_document: TextDocumentIdentifier { uri: uri("missing") },
                work_done_progress_params: Default::default(),
                partial_result_params: Default::default(),
            })
            .await
            .unwrap();
        assert!(response.is_none());
        assert_eq!(provider.document_symbols_called.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn hover_uses_feature_provider_position() {
        let (server, _, provider) = initialized_server(None).await;
        open_sample(&server).await;
        let position = position_of(sample_source(), "EXTRA_OECONF", 2);

        let hover = server
            .hover(HoverParams {
                text_document_position_params: position_params(sample_uri(), position),
                work_done_progress_params: Default::default(),
            })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(provider.hover_called.load(Ordering::SeqCst), 1);
        assert_eq!(*provider.last_hover_position.lock().unwrap(), Some(position));
        match hover.contents {
            HoverContents::Markup(markup) => {
                assert_eq!(markup.kind, MarkupKind::Markdown);
                assert!(markup.value.starts_with("**variable** `EXTRA_OECONF`"));
            }
            _ => panic!("expected markdown hover"),
        }
    }

    #[tokio::test]
    async fn embedded_regions_are_left_to_the_router() {
        let (server, _, provider) = initialized_server(None).await;
        open_sample(&server).await;
        let position = position_of(sample_source(), "oe_runconf", 1);

        let hover = server
            .hover(HoverParams {
                text_document_position_params: position_params(sample_uri(), position),
                work_done_progress_params: Default::default(),
            })
            .await
            .unwrap();
        let definition = server
            .goto_definition(GotoDefinitionParams {
                text_document_position_params: position_params(sample_uri(), position),
                work_done_progress_params: Default::default(),
                partial_result_params: Default::default(),
            })
            .await
            .unwrap();

        assert!(hover.is_none());
        assert!(definition.is_none());
        assert_eq!(provider.hover_called.load(Ordering::SeqCst), 0);
        assert_eq!(provider.definition_called.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn goto_definition_returns_declaration_location() {
        let (server, _, provider) = initialized_server(None).await;
        open_sample(&server).await;
        let position = position_of(sample_source(), "after do_install", 8);

        let response = server
            .goto_definition(GotoDefinitionParams {
                text_document_position_params: position_params(sample_uri(), position),
                work_done_progress_params: Default::default(),
                partial_result_params: Default::default(),
            })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(provider.definition_called.load(Ordering::SeqCst), 1);
        match response {
            GotoDefinitionResponse::Scalar(location) => {
                assert_eq!(location.uri, sample_uri());
                assert_eq!(location.range.start, Position::new(17, 9));
            }
            _ => panic!("expected a single location"),
        }
    }

    #[tokio::test]
    async fn workspace_symbols_filter_by_query() {
        let (server, _, _) = initialized_server(None).await;
        open_sample(&server).await;
        open(&server, uri("other"), 1, "SRC_URI_EXTRA = \"x\"\n").await;

        let symbols = server
            .symbol(WorkspaceSymbolParams {
                query: "src_uri".into(),
                work_done_progress_params: Default::default(),
                partial_result_params: Default::default(),
            })
            .await
            .unwrap()
            .unwrap();

        let names: Vec<_> = symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["SRC_URI", "SRC_URI_EXTRA"]);
        assert_eq!(symbols[1].location.uri, uri("other"));
    }

    #[tokio::test]
    async fn embedded_doc_info_maps_into_the_synthetic_document() {
        let (server, _, _) = initialized_server(None).await;
        open_sample(&server).await;

        let inside = server
            .embedded_language_doc_info(EmbeddedLanguageDocInfoParams {
                uri: sample_uri(),
                position: lsp_position(position_of(sample_source(), "./bootstrap", 2)),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inside.language_type, "shell");
        assert_eq!(inside.language_id, "shellscript");
        assert_eq!(inside.position, Position::new(0, 2));
        assert_eq!(inside.version, 1);
        assert!(inside.uri.path().ends_with(".0.sh"));

        let outside = server
            .embedded_language_doc_info(EmbeddedLanguageDocInfoParams {
                uri: sample_uri(),
                position: Position::new(1, 0),
            })
            .await
            .unwrap();
        assert!(outside.is_none());
    }

    #[tokio::test]
    async fn disabled_embedded_documents_skip_generation() {
        let (server, _, _) =
            initialized_server(Some(json!({ "embeddedDocuments": false }))).await;
        open_sample(&server).await;
        let body = position_of(sample_source(), "./bootstrap", 2);
        assert!(!server.in_embedded_region(&sample_uri(), body));
        assert!(server.analyzer.document(&sample_uri()).is_some());
    }

    #[tokio::test]
    async fn embedded_document_lifecycle_reaches_the_client() {
        let (server, client, _) = initialized_server(None).await;
        open_sample(&server).await;
        let notifications = client.embedded();
        assert_eq!(notifications.len(), 1);
        let opened = &notifications[0];
        assert_eq!(opened.host_uri, sample_uri());
        assert_eq!(opened.opened.len(), 5);
        assert!(opened.changed.is_empty() && opened.closed.is_empty());
        assert_eq!(opened.opened[0].language_id, "shellscript");
        assert!(opened.opened[0].uri.path().ends_with(".0.sh"));
        assert!(opened.opened[0].text.starts_with("./bootstrap"));
        assert_eq!(opened.opened[0].version, 1);

        let edited = sample_source().replace("./bootstrap", "./autogen.sh");
        change(&server, sample_uri(), 2, &edited).await;
        let notifications = client.embedded();
        assert_eq!(notifications.len(), 2);
        let changed = &notifications[1];
        assert!(changed.opened.is_empty() && changed.closed.is_empty());
        assert_eq!(changed.changed.len(), 1);
        assert_eq!(changed.changed[0].uri, opened.opened[0].uri);
        assert_eq!(changed.changed[0].version, 2);
        assert!(changed.changed[0].text.starts_with("./autogen.sh"));

        // Same text again: nothing to tell the router.
        change(&server, sample_uri(), 3, &edited).await;
        assert_eq!(client.embedded().len(), 2);

        server
            .did_close(DidCloseTextDocumentParams {
                text_document: TextDocumentIdentifier { uri: sample_uri() },
            })
            .await;
        let notifications = client.embedded();
        assert_eq!(notifications.len(), 3);
        assert_eq!(notifications[2].closed.len(), 5);
        assert!(notifications[2].closed.contains(&opened.opened[0].uri));
    }

    #[tokio::test]
    async fn disabling_embedded_documents_closes_them_on_the_client() {
        let (server, client, _) = initialized_server(None).await;
        open_sample(&server).await;
        server
            .did_change_configuration(DidChangeConfigurationParams {
                settings: json!({ "bitbake": { "embeddedDocuments": false } }),
            })
            .await;

        let notifications = client.embedded();
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[1].closed.len(), 5);
        assert!(notifications[1].opened.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_documents_warn_once() {
        let client = RecordingClient::default();
        let server = BitbakeLanguageServer::with_config(
            client.clone(),
            Arc::new(MockFeatureProvider::default()),
            AnalyzerConfig::default(),
            ParserConfig { max_source_len: 16 },
        );
        server.initialize(InitializeParams::default()).await.unwrap();

        let large = "SUMMARY = \"far too long\"\n";
        open(&server, uri("large"), 1, large).await;
        change(&server, uri("large"), 2, &format!("{large}# more\n")).await;
        quiet_window().await;

        let messages = client.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, MessageType::WARNING);
        assert!(messages[0].1.contains("above the 16 byte limit"));
        assert!(messages[0].1.contains("large.bb"));
        // The refused snapshot still clears its diagnostics.
        assert_eq!(client.published(), vec![(uri("large"), Vec::new(), Some(2))]);

        // Shrinking below the limit and growing again warns anew.
        change(&server, uri("large"), 3, "A = \"1\"\n").await;
        change(&server, uri("large"), 4, large).await;
        assert_eq!(client.messages().len(), 2);
    }

    #[tokio::test]
    async fn small_documents_never_warn() {
        let (server, client, _) = initialized_server(None).await;
        open_sample(&server).await;
        assert!(client.messages().is_empty());
    }

    #[tokio::test]
    async fn negotiates_utf8_when_the_client_offers_it() {
        let client = RecordingClient::default();
        let server = BitbakeLanguageServer::with_features(client, Arc::new(DefaultFeatureProvider));
        let result = server.initialize(utf8_client()).await.unwrap();
        assert_eq!(result.capabilities.position_encoding, Some(PositionEncodingKind::UTF8));
        assert_eq!(*server.encoding.read().await, PositionEncoding::Utf8);
    }

    const NON_ASCII: &str = "FOO = \"é\"\nBAR = \"é${FOO}\"\n";

    #[tokio::test]
    async fn utf16_positions_count_code_units() {
        let (server, _, _) = initialized_server(None).await;
        open(&server, uri("utf16"), 1, NON_ASCII).await;

        // `é` is one UTF-16 unit, so `FOO` in `${FOO}` spans 10..13.
        let hover = server
            .hover(hover_params(uri("utf16"), Position::new(1, 11)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            hover.range,
            Some(Range::new(Position::new(1, 10), Position::new(1, 13)))
        );
    }

    #[tokio::test]
    async fn utf8_positions_count_bytes() {
        let client = RecordingClient::default();
        let server = BitbakeLanguageServer::with_features(
            client,
            Arc::new(MockFeatureProvider::default()),
        );
        server.initialize(utf8_client()).await.unwrap();
        open(&server, uri("utf8"), 1, NON_ASCII).await;

        let hover = server
            .hover(hover_params(uri("utf8"), Position::new(1, 12)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            hover.range,
            Some(Range::new(Position::new(1, 11), Position::new(1, 14)))
        );
    }

    #[tokio::test]
    async fn embedded_doc_info_converts_utf16_columns_on_both_sides() {
        let (server, _, _) = initialized_server(None).await;
        open(&server, uri("inline"), 1, "X = \"é${@d.getVar('é')}\"\n").await;

        // `(` is UTF-16 column 17 of the host and 8 of the synthetic text.
        let info = server
            .embedded_language_doc_info(EmbeddedLanguageDocInfoParams {
                uri: uri("inline"),
                position: Position::new(0, 17),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.language_type, "python");
        assert_eq!(info.position, Position::new(0, 8));

        // The quote after the inner `é`: byte 12 of the synthetic text.
        let info = server
            .embedded_language_doc_info(EmbeddedLanguageDocInfoParams {
                uri: uri("inline"),
                position: Position::new(0, 20),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.position, Position::new(0, 11));
    }
}
