//! Shared test scaffolding: a no-op `AnalysisListener` and a helper that
//! opens a single-file workspace synchronously (§4.7's `documentOpened` path
//! analyzes inline, so no tokio runtime is needed for these tests).

use std::path::PathBuf;
use std::sync::Arc;

use url::Url;

use schema_ls_analyzer::markdown::MarkdownAnalysis;
use schema_ls_analyzer::Snapshot;
use schema_ls_config::Config;
use schema_ls_workspace::{AnalysisListener, Workspace};

pub struct NoopListener;

impl AnalysisListener for NoopListener {
    fn on_dsl_analysis(&self, _uri: Url, _snapshot: Arc<Snapshot>) {}
    fn on_markdown_analysis(&self, _uri: Url, _analysis: Arc<MarkdownAnalysis>) {}
    fn on_closed(&self, _uri: Url) {}
}

/// Write `text` to `root/main.dsl`, open it in a fresh `Workspace`, and
/// return the workspace plus the document's URI.
pub fn open_dsl(root: &std::path::Path, text: &str) -> (Workspace, Url) {
    let path = root.join("main.dsl");
    std::fs::write(&path, text).unwrap();
    let uri = Url::from_file_path(&path).unwrap();
    let ws = Workspace::new(vec![root.to_path_buf()], Config::default(), Arc::new(NoopListener));
    ws.document_opened(uri.clone(), 1, text.to_string());
    (ws, uri)
}

pub fn write_sibling(root: &std::path::Path, name: &str, text: &str) -> PathBuf {
    let path = root.join(name);
    std::fs::write(&path, text).unwrap();
    path
}
