//! Orchestrates load → parse → resolve → index into one immutable
//! [`Snapshot`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use schema_ls_diagnostics::Diagnostic;
use schema_ls_registry::{SourceId, SourceRegistry};
use schema_ls_syntax::ast::Schema;

use crate::loader::Loader;
use crate::resolver;
use crate::symbol::SymbolIndex;

/// Tuning knobs that change per call site (the main Workspace analysis vs.
/// a Markdown-embedded block analysis).
#[derive(Debug, Clone, Copy)]
pub struct AnalyzeOptions {
    /// Markdown blocks set this to `false`: §4.6 rejects block-local
    /// imports rather than resolving them relative to the Markdown file.
    pub allow_imports: bool,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self { allow_imports: true }
    }
}

/// The immutable result of one analysis run. Replaced atomically by the
/// Workspace; never mutated after construction.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub entry_source_id: SourceId,
    pub entry_version: i64,
    pub root: PathBuf,
    pub schema: Schema,
    pub registry: SourceRegistry,
    pub symbol_index_by_id: HashMap<SourceId, SymbolIndex>,
    pub schemas_by_id: HashMap<SourceId, Schema>,
    pub imported_paths: Vec<PathBuf>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Snapshot {
    pub fn symbol_index(&self, id: &SourceId) -> Option<&SymbolIndex> {
        self.symbol_index_by_id.get(id)
    }

    pub fn schema_for(&self, id: &SourceId) -> Option<&Schema> {
        self.schemas_by_id.get(id)
    }

    /// Diagnostics for one source only, keyed by matching `span.source`.
    pub fn diagnostics_for(&self, id: &SourceId) -> Vec<&Diagnostic> {
        self.diagnostics.iter().filter(|d| d.span.as_ref().map(|s| &s.source) == Some(id)).collect()
    }
}

/// Run a full analysis from `entry_path`, honoring `overlays` (already
/// canonicalized by the caller) over disk content.
pub fn analyze(
    entry_path: &Path,
    overlays: &HashMap<PathBuf, Vec<u8>>,
    root: &Path,
    entry_version: i64,
    options: AnalyzeOptions,
) -> Snapshot {
    let loader = Loader::new(overlays, options.allow_imports);
    let load_result = loader.load(entry_path);

    // §7: every analysis step funnels into one `DiagnosticCollector` for the
    // whole Snapshot; the collector is flattened to a `Vec` only once
    // analysis finishes, for feature providers to read.
    let mut diagnostics = load_result.diagnostics;
    diagnostics.merge(resolver::resolve(&load_result.sources));
    let diagnostics = diagnostics.into_vec();

    let mut registry = SourceRegistry::new();
    let mut symbol_index_by_id = HashMap::new();
    let mut schemas_by_id = HashMap::new();

    for loaded in &load_result.sources {
        if let Err(err) = registry.register(loaded.source_id.clone(), loaded.bytes.clone()) {
            tracing::warn!(%err, "duplicate source registration during analysis");
        }
        symbol_index_by_id.insert(loaded.source_id.clone(), SymbolIndex::from_schema(&loaded.schema));
        schemas_by_id.insert(loaded.source_id.clone(), loaded.schema.clone());
    }

    let entry_canon = Loader::canonicalize(entry_path);
    let entry_source_id = SourceId::from_canonical_path(&entry_canon);
    let entry_schema = schemas_by_id.get(&entry_source_id).cloned().unwrap_or_else(|| synthesize_orphan_schema(entry_source_id.clone()));

    Snapshot {
        entry_source_id,
        entry_version,
        root: root.to_path_buf(),
        schema: entry_schema,
        registry,
        symbol_index_by_id,
        schemas_by_id,
        imported_paths: load_result.imported_paths,
        diagnostics,
    }
}

fn synthesize_orphan_schema(source_id: SourceId) -> Schema {
    use schema_ls_registry::{Position, Span};
    let point = Span::point(source_id.clone(), Position::without_byte(1, 1));
    Schema { name: None, source_id, span: point, header_span: None, imports: Vec::new(), types: Vec::new(), data_types: Vec::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn analyze_populates_snapshot_for_a_simple_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("main.dsl");
        fs::write(&path, "schema \"Demo\"\n\ntype Car {\n  id String key\n}\n").unwrap();

        let overlays = StdHashMap::new();
        let snapshot = analyze(&path, &overlays, dir.path(), 1, AnalyzeOptions::default());
        assert_eq!(snapshot.schema.name.as_deref(), Some("Demo"));
        assert!(snapshot.diagnostics.is_empty(), "{:?}", snapshot.diagnostics);
        assert!(snapshot.symbol_index(&snapshot.entry_source_id).is_some());
    }

    #[test]
    fn analyze_of_missing_entry_yields_orphan_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.dsl");
        let overlays = StdHashMap::new();
        let snapshot = analyze(&path, &overlays, dir.path(), 1, AnalyzeOptions::default());
        assert!(snapshot.schema.is_orphan());
    }

    #[test]
    fn imported_paths_includes_entry_and_dependency() {
        let dir = tempdir().unwrap();
        let main_path = dir.path().join("main.dsl");
        let parts_path = dir.path().join("parts.dsl");
        fs::write(&main_path, "schema \"Main\"\n\nimport \"./parts\" as parts\n\ntype Car {\n  --> wheels (many) parts.Wheel\n}\n").unwrap();
        fs::write(&parts_path, "schema \"Parts\"\n\ntype Wheel {\n  size Int\n}\n").unwrap();

        let overlays = StdHashMap::new();
        let snapshot = analyze(&main_path, &overlays, dir.path(), 1, AnalyzeOptions::default());
        assert!(snapshot.diagnostics.is_empty(), "{:?}", snapshot.diagnostics);
        assert_eq!(snapshot.imported_paths.len(), 2);
    }
}
