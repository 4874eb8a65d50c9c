//! Walks the import closure from an entry file, applying overlay precedence
//! over disk and tolerating cyclic imports.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use relative_path::RelativePath;
use schema_ls_diagnostics::{Diagnostic, DiagnosticCode, DiagnosticCollector, Severity};
use schema_ls_registry::{SourceId, Span};
use schema_ls_syntax::ast::Schema;

#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub source_id: SourceId,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub schema: Schema,
}

#[derive(Debug, Default)]
pub struct LoadResult {
    pub sources: Vec<LoadedSource>,
    /// Every diagnostic produced while walking the import closure, funneled
    /// into the one collector the whole analysis shares (§7: "a single
    /// diagnostic collector per Snapshot").
    pub diagnostics: DiagnosticCollector,
    pub imported_paths: Vec<PathBuf>,
}

/// Walks the import graph. `overlays` keys must already be canonicalized the
/// same way this loader canonicalizes disk paths (the Workspace crate owns
/// that invariant); `allow_imports = false` is used for Markdown-embedded
/// blocks, where cross-file imports make no sense.
pub struct Loader<'a> {
    overlays: &'a HashMap<PathBuf, Vec<u8>>,
    allow_imports: bool,
}

impl<'a> Loader<'a> {
    pub fn new(overlays: &'a HashMap<PathBuf, Vec<u8>>, allow_imports: bool) -> Self {
        Self { overlays, allow_imports }
    }

    pub fn canonicalize(path: &Path) -> PathBuf {
        if let Ok(real) = dunce::canonicalize(path) {
            return real;
        }
        lexically_normalize(path)
    }

    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        if let Some(bytes) = self.overlays.get(path) {
            return Ok(bytes.clone());
        }
        std::fs::read(path)
    }

    pub fn load(&self, entry_path: &Path) -> LoadResult {
        let mut result = LoadResult::default();
        let mut seen = HashSet::new();
        let mut stack = Vec::new();
        let entry = Self::canonicalize(entry_path);
        self.visit(entry, None, &mut stack, &mut seen, &mut result);
        result
    }

    fn visit(
        &self,
        path: PathBuf,
        importer_span: Option<Span>,
        stack: &mut Vec<PathBuf>,
        seen: &mut HashSet<PathBuf>,
        result: &mut LoadResult,
    ) {
        if stack.contains(&path) {
            if let Some(span) = importer_span {
                result
                    .diagnostics
                    .push(Diagnostic::new(Severity::Warning, DiagnosticCode::ImportCycle, "import cycle detected", span));
            }
            return;
        }
        if !seen.insert(path.clone()) {
            return; // already loaded via another path (diamond dependency), not a cycle
        }

        let bytes = match self.read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                if let Some(span) = importer_span {
                    result.diagnostics.push(Diagnostic::new(
                        Severity::Error,
                        DiagnosticCode::ImportIo,
                        format!("failed to read '{}': {err}", path.display()),
                        span,
                    ));
                }
                // else: the entry file itself is missing; the analyzer
                // synthesizes an orphan schema for this case.
                return;
            }
        };

        let source_id = SourceId::from_canonical_path(&path);
        let text = strip_bom(&String::from_utf8_lossy(&bytes)).to_string();
        let bytes = text.clone().into_bytes();
        let (mut schema, parse_diags) = schema_ls_syntax::parse(source_id.clone(), &text);
        result.diagnostics.extend(parse_diags);
        result.imported_paths.push(path.clone());

        let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        let mut to_recurse = Vec::new();
        for import in schema.imports.iter_mut() {
            if !self.allow_imports {
                result.diagnostics.push(Diagnostic::new(
                    Severity::Hint,
                    DiagnosticCode::ImportNotAllowed,
                    format!("import \"{}\" is not allowed here", import.path),
                    import.span.clone(),
                ));
                continue;
            }
            let target = Self::canonicalize(&resolve_import_path(&dir, &import.path));
            if self.overlays.get(&target).is_none() && !target.exists() {
                result.diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    DiagnosticCode::ImportNotFound,
                    format!("cannot find imported schema \"{}\"", import.path),
                    import.span.clone(),
                ));
                continue;
            }
            import.resolved_source_id = Some(SourceId::from_canonical_path(&target));
            to_recurse.push((target, import.span.clone()));
        }

        result.sources.push(LoadedSource { source_id, path: path.clone(), bytes, schema });

        stack.push(path);
        for (target, span) in to_recurse {
            self.visit(target, Some(span), stack, seen, result);
        }
        stack.pop();
    }
}

/// `./parts` resolves to `parts.dsl` next to the importer; a path that
/// already carries an extension is used as-is. Import strings in source are
/// always forward-slash, platform-independent paths (spec §3), so they're
/// joined via `relative-path` rather than `std::path::Path::join`, which
/// would otherwise interpret `raw` using the host's own separator rules.
fn resolve_import_path(dir: &Path, raw: &str) -> PathBuf {
    let joined = RelativePath::new(raw).to_logical_path(dir);
    if joined.extension().is_some() {
        joined
    } else {
        joined.with_extension("dsl")
    }
}

/// Strip a leading UTF-8 BOM so it doesn't show up as a stray token at
/// byte offset 0; spans are computed from the stripped text, so the BOM
/// never throws off column numbers either.
fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

fn lexically_normalize(path: &Path) -> PathBuf {
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };
    let mut out = PathBuf::new();
    for component in abs.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn overlay_overrides_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("main.dsl");
        fs::write(&path, "schema \"Disk\"\n\ntype DiskType {\n  id String\n}\n").unwrap();
        let canonical = Loader::canonicalize(&path);

        let mut overlays = HashMap::new();
        overlays.insert(canonical.clone(), b"schema \"Overlay\"\n\ntype OverlayType {\n  name String\n}\n".to_vec());

        let loader = Loader::new(&overlays, true);
        let result = loader.load(&path);
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].schema.name.as_deref(), Some("Overlay"));
    }

    #[test]
    fn leading_bom_is_stripped_before_parsing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("main.dsl");
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"schema \"Demo\"\n\ntype Car {\n  id String\n}\n");
        fs::write(&path, bytes).unwrap();

        let overlays = HashMap::new();
        let loader = Loader::new(&overlays, true);
        let result = loader.load(&path);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        assert_eq!(result.sources[0].schema.name.as_deref(), Some("Demo"));
        assert_eq!(result.sources[0].schema.header_span.as_ref().unwrap().start.column, 1);
    }

    #[test]
    fn follows_disk_imports_and_records_imported_paths() {
        let dir = tempdir().unwrap();
        let main_path = dir.path().join("main.dsl");
        let parts_path = dir.path().join("parts.dsl");
        fs::write(&main_path, "schema \"Main\"\n\nimport \"./parts\" as parts\n\ntype Car {\n  --> wheels (many) parts.Wheel\n}\n").unwrap();
        fs::write(&parts_path, "schema \"Parts\"\n\ntype Wheel {\n  size Int\n}\n").unwrap();

        let overlays = HashMap::new();
        let loader = Loader::new(&overlays, true);
        let result = loader.load(&main_path);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        assert_eq!(result.sources.len(), 2);
        assert_eq!(result.imported_paths.len(), 2);
        let main_schema = &result.sources.iter().find(|s| s.path == Loader::canonicalize(&main_path)).unwrap().schema;
        assert!(main_schema.imports[0].resolved_source_id.is_some());
    }

    #[test]
    fn missing_import_reports_not_found() {
        let dir = tempdir().unwrap();
        let main_path = dir.path().join("main.dsl");
        fs::write(&main_path, "schema \"Main\"\n\nimport \"./missing\"\n").unwrap();

        let overlays = HashMap::new();
        let loader = Loader::new(&overlays, true);
        let result = loader.load(&main_path);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].code.as_str(), "E_IMPORT_NOT_FOUND");
    }

    #[test]
    fn cyclic_imports_are_tolerated_with_a_warning() {
        let dir = tempdir().unwrap();
        let a_path = dir.path().join("a.dsl");
        let b_path = dir.path().join("b.dsl");
        fs::write(&a_path, "schema \"A\"\n\nimport \"./b\"\n\ntype A {\n  id String\n}\n").unwrap();
        fs::write(&b_path, "schema \"B\"\n\nimport \"./a\"\n\ntype B {\n  id String\n}\n").unwrap();

        let overlays = HashMap::new();
        let loader = Loader::new(&overlays, true);
        let result = loader.load(&a_path);
        assert_eq!(result.sources.len(), 2);
        assert!(result.diagnostics.iter().any(|d| d.code.as_str() == "W_IMPORT_CYCLE"));
    }

    #[test]
    fn imports_are_rejected_when_disallowed() {
        let dir = tempdir().unwrap();
        let main_path = dir.path().join("main.dsl");
        let parts_path = dir.path().join("parts.dsl");
        fs::write(&main_path, "schema \"Main\"\n\nimport \"./parts\"\n").unwrap();
        fs::write(&parts_path, "schema \"Parts\"\n").unwrap();

        let overlays = HashMap::new();
        let loader = Loader::new(&overlays, false);
        let result = loader.load(&main_path);
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].code.as_str(), "E_IMPORT_NOT_ALLOWED");
        assert_eq!(result.diagnostics[0].severity, schema_ls_diagnostics::Severity::Hint);
    }
}
