//! `schema-ls` stdio binary: wires the `Workspace` overlay store and the
//! feature providers in `schema-ls-features` to the editor protocol via
//! `tower-lsp`. Kept thin per §6 — this crate owns no analysis logic of its
//! own, only protocol marshalling.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use parking_lot::RwLock;
use tower_lsp::jsonrpc::Result as RpcResult;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};
use tracing_subscriber::EnvFilter;
use url::Url;

use schema_ls_analyzer::markdown::MarkdownAnalysis;
use schema_ls_analyzer::Snapshot;
use schema_ls_config::Config;
use schema_ls_diagnostics::{ByteFallbackPolicy, PositionEncoding, Renderer, RendererConfig};
use schema_ls_registry::SourceRegistry;
use schema_ls_workspace::{AnalysisListener, ChangeEvent, Workspace};

/// Server CLI surface (§6): a single `stdio` mode is mandatory, plus a
/// verbosity knob over `tracing`'s env-filter.
#[derive(Debug, Parser)]
#[command(name = "schema-ls", version, about = "Language Server for the yammm schema definition language")]
struct Cli {
    /// Run in stdio JSON-RPC mode. Currently the only supported transport;
    /// accepted as an explicit flag (clients conventionally pass it) so a
    /// future transport doesn't have to change the default.
    #[arg(long)]
    stdio: bool,

    /// Overrides `RUST_LOG` when set (e.g. `--log-level debug`).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());
    let _ = cli.stdio; // stdio is the only transport; the flag exists for client compatibility.

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(Backend::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}

fn init_tracing(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Publishes `Workspace` analysis results to the client as they land.
/// Diagnostics for Markdown documents carry no byte offsets after
/// coordinate remapping (§4.6), so they render under the lossy
/// `Approximate` fallback policy rather than `Omit`; DSL documents always
/// have exact byte positions and use `Omit`.
struct DiagnosticPublisher {
    client: Client,
    encoding: Arc<RwLock<PositionEncoding>>,
}

impl DiagnosticPublisher {
    fn encoding(&self) -> PositionEncoding {
        *self.encoding.read()
    }
}

impl AnalysisListener for DiagnosticPublisher {
    fn on_dsl_analysis(&self, uri: Url, snapshot: Arc<Snapshot>) {
        let client = self.client.clone();
        let encoding = self.encoding();
        tokio::spawn(async move {
            let config = RendererConfig { position_encoding: encoding, byte_fallback: ByteFallbackPolicy::Omit };
            let renderer = Renderer::new(&snapshot.registry, config);
            let diagnostics = renderer.render_all_for(&snapshot.entry_source_id, &snapshot.diagnostics);
            let version = i32::try_from(snapshot.entry_version).ok();
            client.publish_diagnostics(uri, diagnostics, version).await;
        });
    }

    fn on_markdown_analysis(&self, uri: Url, analysis: Arc<MarkdownAnalysis>) {
        let client = self.client.clone();
        let encoding = self.encoding();
        tokio::spawn(async move {
            let empty_registry = SourceRegistry::new();
            let config = RendererConfig { position_encoding: encoding, byte_fallback: ByteFallbackPolicy::Approximate };
            let renderer = Renderer::new(&empty_registry, config);
            let diagnostics: Vec<lsp_types::Diagnostic> = analysis.diagnostics.iter().filter_map(|d| renderer.render(d)).collect();
            client.publish_diagnostics(uri, diagnostics, None).await;
        });
    }

    fn on_closed(&self, uri: Url) {
        let client = self.client.clone();
        tokio::spawn(async move {
            client.publish_diagnostics(uri, Vec::new(), None).await;
        });
    }
}

struct Backend {
    client: Client,
    workspace: RwLock<Option<Workspace>>,
    encoding: Arc<RwLock<PositionEncoding>>,
}

impl Backend {
    fn new(client: Client) -> Self {
        Self { client, workspace: RwLock::new(None), encoding: Arc::new(RwLock::new(PositionEncoding::Utf16)) }
    }

    fn workspace(&self) -> Option<Workspace> {
        self.workspace.read().clone()
    }

    fn encoding(&self) -> PositionEncoding {
        *self.encoding.read()
    }

    fn is_markdown(uri: &Url) -> bool {
        uri.path().ends_with(".md") || uri.path().ends_with(".markdown")
    }
}

/// Negotiate UTF-16 vs UTF-8 per §6: prefer UTF-16, accept UTF-8 when the
/// client advertises it and doesn't also offer UTF-16.
fn negotiate_encoding(params: &InitializeParams) -> (PositionEncoding, PositionEncodingKind) {
    let offered = params.capabilities.general.as_ref().and_then(|g| g.position_encodings.clone()).unwrap_or_default();
    if offered.is_empty() || offered.contains(&PositionEncodingKind::UTF16) {
        (PositionEncoding::Utf16, PositionEncodingKind::UTF16)
    } else if offered.contains(&PositionEncodingKind::UTF8) {
        (PositionEncoding::Utf8, PositionEncodingKind::UTF8)
    } else {
        (PositionEncoding::Utf16, PositionEncodingKind::UTF16)
    }
}

fn roots_from_params(params: &InitializeParams, config: &Config) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = Vec::new();
    if let Some(folders) = &params.workspace_folders {
        for folder in folders {
            if let Ok(path) = folder.uri.to_file_path() {
                roots.push(dunce::canonicalize(&path).unwrap_or(path));
            }
        }
    }
    #[allow(deprecated)]
    if roots.is_empty() {
        if let Some(root_uri) = &params.root_uri {
            if let Ok(path) = root_uri.to_file_path() {
                roots.push(dunce::canonicalize(&path).unwrap_or(path));
            }
        }
    }
    roots.extend(config.module_roots.iter().cloned());
    if roots.is_empty() {
        roots.push(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    }
    roots
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> RpcResult<InitializeResult> {
        let (encoding, encoding_kind) = negotiate_encoding(&params);
        *self.encoding.write() = encoding;

        let config = Config::load().ok().flatten().unwrap_or_default();
        let roots = roots_from_params(&params, &config);

        let listener = Arc::new(DiagnosticPublisher { client: self.client.clone(), encoding: self.encoding.clone() });
        let workspace = Workspace::new(roots, config, listener);
        *self.workspace.write() = Some(workspace);

        Ok(InitializeResult {
            server_info: Some(ServerInfo { name: "schema-ls".to_string(), version: Some(env!("CARGO_PKG_VERSION").to_string()) }),
            capabilities: ServerCapabilities {
                position_encoding: Some(encoding_kind),
                text_document_sync: Some(TextDocumentSyncCapability::Options(TextDocumentSyncOptions {
                    open_close: Some(true),
                    change: Some(TextDocumentSyncKind::INCREMENTAL),
                    save: Some(TextDocumentSyncSaveOptions::Supported(true)),
                    ..Default::default()
                })),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                completion_provider: Some(CompletionOptions { trigger_characters: Some(vec![".".to_string()]), ..Default::default() }),
                document_symbol_provider: Some(OneOf::Left(true)),
                document_formatting_provider: Some(OneOf::Left(true)),
                ..Default::default()
            },
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        tracing::info!("schema-ls initialized");
    }

    async fn shutdown(&self) -> RpcResult<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let Some(workspace) = self.workspace() else { return };
        let uri = params.text_document.uri;
        let text = params.text_document.text;
        let version = params.text_document.version as i64;
        if Self::is_markdown(&uri) {
            workspace.markdown_opened(uri, version, text);
        } else {
            workspace.document_opened(uri, version, text);
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let Some(workspace) = self.workspace() else { return };
        let uri = params.text_document.uri;
        let version = params.text_document.version as i64;
        let encoding = self.encoding();
        let changes: Vec<ChangeEvent> = params
            .content_changes
            .into_iter()
            .map(|c| ChangeEvent {
                range: c.range.map(|r| ((r.start.line, r.start.character), (r.end.line, r.end.character))),
                text: c.text,
            })
            .collect();
        if Self::is_markdown(&uri) {
            workspace.markdown_changed(uri, version, changes, encoding);
        } else {
            workspace.document_changed(uri, version, changes, encoding);
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let Some(workspace) = self.workspace() else { return };
        let uri = params.text_document.uri;
        if Self::is_markdown(&uri) {
            workspace.markdown_closed(uri);
        } else {
            workspace.document_closed(uri);
        }
    }

    async fn hover(&self, params: HoverParams) -> RpcResult<Option<Hover>> {
        let Some(workspace) = self.workspace() else { return Ok(None) };
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        Ok(schema_ls_features::hover(&workspace, &uri, position, self.encoding()))
    }

    async fn goto_definition(&self, params: GotoDefinitionParams) -> RpcResult<Option<GotoDefinitionResponse>> {
        let Some(workspace) = self.workspace() else { return Ok(None) };
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let location = schema_ls_features::definition(&workspace, &uri, position, self.encoding());
        Ok(location.map(GotoDefinitionResponse::Scalar))
    }

    async fn completion(&self, params: CompletionParams) -> RpcResult<Option<CompletionResponse>> {
        let Some(workspace) = self.workspace() else { return Ok(None) };
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let items = schema_ls_features::completion(&workspace, &uri, position);
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn document_symbol(&self, params: DocumentSymbolParams) -> RpcResult<Option<DocumentSymbolResponse>> {
        let Some(workspace) = self.workspace() else { return Ok(None) };
        let uri = params.text_document.uri;
        let symbols = schema_ls_features::document_symbol(&workspace, &uri, self.encoding());
        Ok(symbols.map(DocumentSymbolResponse::Nested))
    }

    async fn formatting(&self, params: DocumentFormattingParams) -> RpcResult<Option<Vec<TextEdit>>> {
        let Some(workspace) = self.workspace() else { return Ok(None) };
        let uri = params.text_document.uri;
        Ok(schema_ls_features::formatting(&workspace, &uri))
    }
}
