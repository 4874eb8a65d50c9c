//! Overlay-aware document store and debounced re-analysis scheduler (§4.7).
//!
//! `Workspace` owns two parallel overlay maps — one for plain DSL documents,
//! one for Markdown documents with embedded schema blocks — and is the only
//! place that calls into `schema-ls-analyzer`. Feature providers never touch
//! disk or the analyzer directly; they read the latest `Snapshot` this crate
//! last stored.

mod line_state;
mod overlay;
mod text_edit;

pub use line_state::{Context, LineState};
pub use text_edit::{apply_changes, normalize_line_endings, ChangeEvent};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use url::Url;

use schema_ls_analyzer::markdown::{analyze_markdown, MarkdownAnalysis};
use schema_ls_analyzer::{analyze, AnalyzeOptions, Snapshot};
use schema_ls_config::Config;
use schema_ls_diagnostics::PositionEncoding;
use schema_ls_registry::SourceId;

use overlay::{DslDocument, MarkdownDocument};

/// Notified once an analysis (synchronous at open, or debounced after an
/// edit) has produced a fresh result for a URI. The server crate implements
/// this to render `lsp-types::Diagnostic`s and push them to the client;
/// kept out of this crate so it has no protocol dependency.
pub trait AnalysisListener: Send + Sync {
    fn on_dsl_analysis(&self, uri: Url, snapshot: Arc<Snapshot>);
    fn on_markdown_analysis(&self, uri: Url, analysis: Arc<MarkdownAnalysis>);
    /// A document was closed; the listener should publish an empty
    /// diagnostic set for it.
    fn on_closed(&self, uri: Url);
}

struct Inner {
    roots: Vec<PathBuf>,
    config: Config,
    dsl_documents: Mutex<HashMap<Url, DslDocument>>,
    markdown_documents: Mutex<HashMap<Url, MarkdownDocument>>,
    listener: Arc<dyn AnalysisListener>,
    generation_counter: AtomicU64,
}

/// Cheaply cloneable handle; every clone shares the same document maps.
#[derive(Clone)]
pub struct Workspace(Arc<Inner>);

impl Workspace {
    pub fn new(roots: Vec<PathBuf>, config: Config, listener: Arc<dyn AnalysisListener>) -> Self {
        Self(Arc::new(Inner {
            roots,
            config,
            dsl_documents: Mutex::new(HashMap::new()),
            markdown_documents: Mutex::new(HashMap::new()),
            listener,
            generation_counter: AtomicU64::new(0),
        }))
    }

    fn next_generation(&self) -> u64 {
        self.0.generation_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn config(&self) -> Config {
        self.0.config.clone()
    }

    /// Nearest configured root folder containing `path`; falls back to the
    /// file's own directory for files outside every known root (§4.7
    /// multi-root support).
    fn root_for(&self, path: &Path) -> PathBuf {
        self.0
            .roots
            .iter()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.as_os_str().len())
            .cloned()
            .unwrap_or_else(|| path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(".")))
    }

    fn uri_to_path(uri: &Url) -> Option<PathBuf> {
        let raw = uri.to_file_path().ok()?;
        Some(dunce::canonicalize(&raw).unwrap_or(raw))
    }

    // ---- DSL documents -------------------------------------------------

    /// §4.7 `documentOpened`: create or replace the overlay and analyze
    /// synchronously so the very first feature query against it succeeds.
    pub fn document_opened(&self, uri: Url, version: i64, text: String) {
        let Some(path) = Self::uri_to_path(&uri) else { return };
        let text = normalize_line_endings(&text);
        let line_state = LineState::compute(&text);
        let generation = self.next_generation();
        self.0.dsl_documents.lock().insert(uri.clone(), DslDocument { version, text, line_state, latest_snapshot: None, path: path.clone(), generation });
        self.analyze_dsl_and_publish(uri, path, generation);
    }

    /// §4.7 `documentChanged`: drop the change if `version` is stale (any
    /// version strictly less than the stored one, except 0 which is always
    /// accepted), otherwise apply it and schedule a debounced analysis.
    pub fn document_changed(&self, uri: Url, version: i64, changes: Vec<ChangeEvent>, encoding: PositionEncoding) {
        let (path, generation) = {
            let mut docs = self.0.dsl_documents.lock();
            let Some(doc) = docs.get_mut(&uri) else { return };
            if version != 0 && version < doc.version {
                return;
            }
            doc.version = version;
            doc.text = apply_changes(&doc.text, &changes, encoding);
            doc.line_state = LineState::compute(&doc.text);
            doc.generation = self.next_generation();
            (doc.path.clone(), doc.generation)
        };
        self.schedule_debounced_dsl(uri, path, generation);
    }

    /// §4.7 `documentClosed`: drop the overlay and tell the listener to
    /// publish an empty diagnostic list.
    pub fn document_closed(&self, uri: Url) {
        self.0.dsl_documents.lock().remove(&uri);
        self.0.listener.on_closed(uri);
    }

    pub fn dsl_text(&self, uri: &Url) -> Option<String> {
        self.0.dsl_documents.lock().get(uri).map(|d| d.text.clone())
    }

    pub fn dsl_line_state(&self, uri: &Url) -> Option<LineState> {
        self.0.dsl_documents.lock().get(uri).map(|d| d.line_state.clone())
    }

    pub fn dsl_snapshot(&self, uri: &Url) -> Option<Arc<Snapshot>> {
        self.0.dsl_documents.lock().get(uri).and_then(|d| d.latest_snapshot.clone())
    }

    fn schedule_debounced_dsl(&self, uri: Url, path: PathBuf, generation: u64) {
        let workspace = self.clone();
        let delay = Duration::from_millis(self.0.config.debounce_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            workspace.analyze_dsl_and_publish(uri, path, generation);
        });
    }

    /// Runs one analysis and stores it if `generation` is still current —
    /// the version gate from §4.7: a newer edit that landed while this
    /// worker ran makes its result stale, and it's discarded rather than
    /// overwriting a fresher one.
    fn analyze_dsl_and_publish(&self, uri: Url, path: PathBuf, generation: u64) {
        let overlays = self.collect_dsl_overlays();
        let root = self.root_for(&path);
        let version = {
            let docs = self.0.dsl_documents.lock();
            docs.get(&uri).map(|d| d.version).unwrap_or(0)
        };
        let snapshot = analyze(&path, &overlays, &root, version, AnalyzeOptions::default());
        let snapshot = Arc::new(snapshot);

        let stored = {
            let mut docs = self.0.dsl_documents.lock();
            match docs.get_mut(&uri) {
                Some(doc) if doc.generation == generation => {
                    doc.latest_snapshot = Some(snapshot.clone());
                    true
                }
                _ => false,
            }
        };
        if !stored {
            tracing::debug!(%uri, generation, "discarding stale analysis, a newer edit landed first");
            return;
        }
        self.0.listener.on_dsl_analysis(uri.clone(), snapshot.clone());
        self.invalidate_importers_of(&uri, &path);
    }

    fn collect_dsl_overlays(&self) -> HashMap<PathBuf, Vec<u8>> {
        self.0.dsl_documents.lock().values().map(|d| (d.path.clone(), d.text.as_bytes().to_vec())).collect()
    }

    /// §4.7 import fan-out invalidation: when `edited_path` changes, every
    /// other open document whose last snapshot's `imported_paths` included
    /// it gets re-analyzed too.
    fn invalidate_importers_of(&self, edited_uri: &Url, edited_path: &Path) {
        let affected: Vec<(Url, PathBuf, u64)> = {
            let mut docs = self.0.dsl_documents.lock();
            let mut out = Vec::new();
            for (uri, doc) in docs.iter_mut() {
                if uri == edited_uri {
                    continue;
                }
                let imports_it = doc.latest_snapshot.as_ref().map(|s| s.imported_paths.iter().any(|p| p == edited_path)).unwrap_or(false);
                if imports_it {
                    doc.generation = self.next_generation();
                    out.push((uri.clone(), doc.path.clone(), doc.generation));
                }
            }
            out
        };
        if !affected.is_empty() {
            tracing::debug!(%edited_uri, count = affected.len(), "re-scheduling importers after edit");
        }
        for (uri, path, generation) in affected {
            self.schedule_debounced_dsl(uri, path, generation);
        }
    }

    // ---- Markdown documents --------------------------------------------

    pub fn markdown_opened(&self, uri: Url, version: i64, text: String) {
        let Some(path) = Self::uri_to_path(&uri) else { return };
        let text = normalize_line_endings(&text);
        let generation = self.next_generation();
        self.0.markdown_documents.lock().insert(uri.clone(), MarkdownDocument { version, text, path: path.clone(), latest_analysis: None, generation });
        self.analyze_markdown_and_publish(uri, path, generation);
    }

    pub fn markdown_changed(&self, uri: Url, version: i64, changes: Vec<ChangeEvent>, encoding: PositionEncoding) {
        let (path, generation) = {
            let mut docs = self.0.markdown_documents.lock();
            let Some(doc) = docs.get_mut(&uri) else { return };
            if version != 0 && version < doc.version {
                return;
            }
            doc.version = version;
            doc.text = apply_changes(&doc.text, &changes, encoding);
            doc.generation = self.next_generation();
            (doc.path.clone(), doc.generation)
        };
        let workspace = self.clone();
        let delay = Duration::from_millis(self.0.config.debounce_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            workspace.analyze_markdown_and_publish(uri, path, generation);
        });
    }

    pub fn markdown_closed(&self, uri: Url) {
        self.0.markdown_documents.lock().remove(&uri);
        self.0.listener.on_closed(uri);
    }

    pub fn markdown_analysis(&self, uri: &Url) -> Option<Arc<MarkdownAnalysis>> {
        self.0.markdown_documents.lock().get(uri).and_then(|d| d.latest_analysis.clone())
    }

    fn analyze_markdown_and_publish(&self, uri: Url, path: PathBuf, generation: u64) {
        let source_id = SourceId::from_canonical_path(&path);
        let (version, text) = {
            let docs = self.0.markdown_documents.lock();
            let Some(doc) = docs.get(&uri) else { return };
            (doc.version, doc.text.clone())
        };
        let analysis = Arc::new(analyze_markdown(&path, &source_id, &text, version));

        let stored = {
            let mut docs = self.0.markdown_documents.lock();
            match docs.get_mut(&uri) {
                Some(doc) if doc.generation == generation => {
                    doc.latest_analysis = Some(analysis.clone());
                    true
                }
                _ => false,
            }
        };
        if stored {
            self.0.listener.on_markdown_analysis(uri, analysis);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingListener {
        dsl_calls: StdMutex<Vec<Url>>,
        closed_calls: StdMutex<Vec<Url>>,
    }

    impl AnalysisListener for RecordingListener {
        fn on_dsl_analysis(&self, uri: Url, _snapshot: Arc<Snapshot>) {
            self.dsl_calls.lock().unwrap().push(uri);
        }
        fn on_markdown_analysis(&self, _uri: Url, _analysis: Arc<MarkdownAnalysis>) {}
        fn on_closed(&self, uri: Url) {
            self.closed_calls.lock().unwrap().push(uri);
        }
    }

    fn file_uri(path: &Path) -> Url {
        Url::from_file_path(path).unwrap()
    }

    #[tokio::test]
    async fn opening_a_document_analyzes_synchronously() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("main.dsl");
        let uri = file_uri(&path);
        let listener = Arc::new(RecordingListener::default());
        let ws = Workspace::new(vec![dir.path().to_path_buf()], Config::default(), listener.clone());

        ws.document_opened(uri.clone(), 1, "schema \"Demo\"\n\ntype Car {\n  id String key\n}\n".to_string());

        assert_eq!(listener.dsl_calls.lock().unwrap().len(), 1);
        let snapshot = ws.dsl_snapshot(&uri).unwrap();
        assert_eq!(snapshot.schema.name.as_deref(), Some("Demo"));
    }

    #[tokio::test]
    async fn stale_version_change_is_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("main.dsl");
        let uri = file_uri(&path);
        let listener = Arc::new(RecordingListener::default());
        let ws = Workspace::new(vec![dir.path().to_path_buf()], Config::default(), listener);

        ws.document_opened(uri.clone(), 5, "schema \"Demo\"\n".to_string());
        ws.document_changed(uri.clone(), 2, vec![ChangeEvent { range: None, text: "schema \"Changed\"\n".to_string() }], PositionEncoding::Utf16);

        assert_eq!(ws.dsl_text(&uri).unwrap(), "schema \"Demo\"\n");
    }

    #[tokio::test]
    async fn version_zero_change_is_always_accepted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("main.dsl");
        let uri = file_uri(&path);
        let listener = Arc::new(RecordingListener::default());
        let ws = Workspace::new(vec![dir.path().to_path_buf()], Config::default(), listener);

        ws.document_opened(uri.clone(), 5, "schema \"Demo\"\n".to_string());
        ws.document_changed(uri.clone(), 0, vec![ChangeEvent { range: None, text: "schema \"Changed\"\n".to_string() }], PositionEncoding::Utf16);

        assert_eq!(ws.dsl_text(&uri).unwrap(), "schema \"Changed\"\n");
    }

    #[tokio::test]
    async fn closing_a_document_removes_its_overlay_and_notifies() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("main.dsl");
        let uri = file_uri(&path);
        let listener = Arc::new(RecordingListener::default());
        let ws = Workspace::new(vec![dir.path().to_path_buf()], Config::default(), listener.clone());

        ws.document_opened(uri.clone(), 1, "schema \"Demo\"\n".to_string());
        ws.document_closed(uri.clone());

        assert!(ws.dsl_text(&uri).is_none());
        assert_eq!(listener.closed_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn editing_an_imported_file_reanalyzes_its_importer() {
        let dir = tempdir().unwrap();
        let main_path = dir.path().join("main.dsl");
        let parts_path = dir.path().join("parts.dsl");
        std::fs::write(&parts_path, "schema \"Parts\"\n\ntype Wheel {\n  size Int\n}\n").unwrap();

        let main_uri = file_uri(&main_path);
        let parts_uri = file_uri(&parts_path);
        let listener = Arc::new(RecordingListener::default());
        let ws = Workspace::new(vec![dir.path().to_path_buf()], Config { debounce_ms: 10, ..Config::default() }, listener.clone());

        ws.document_opened(main_uri.clone(), 1, "schema \"Main\"\n\nimport \"./parts\" as parts\n\ntype Car {\n  --> wheels (many) parts.Wheel\n}\n".to_string());
        ws.document_opened(parts_uri.clone(), 1, "schema \"Parts\"\n\ntype Wheel {\n  size Int\n}\n".to_string());

        listener.dsl_calls.lock().unwrap().clear();
        ws.document_changed(parts_uri.clone(), 2, vec![ChangeEvent { range: None, text: "schema \"Parts\"\n\ntype Wheel {\n  size Int\n  color String\n}\n".to_string() }], PositionEncoding::Utf16);

        tokio::time::sleep(Duration::from_millis(100)).await;

        let calls = listener.dsl_calls.lock().unwrap();
        assert!(calls.contains(&main_uri), "expected importer {main_uri} to be re-analyzed, got {calls:?}");
    }
}
