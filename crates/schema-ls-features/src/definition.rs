//! `textDocument/definition` (§4.8): jumps from a reference (extends clause,
//! relation target, data-type alias use) to its declaring symbol, following
//! an import alias when the reference is qualified.

use lsp_types::{Location, Position as LspPosition};
use url::Url;

use schema_ls_analyzer::{Snapshot, SymbolKind};
use schema_ls_diagnostics::{build_uri, PositionEncoding};
use schema_ls_registry::SourceId;
use schema_ls_workspace::Workspace;

use crate::position::{resolve_position, span_to_range};

pub fn definition(workspace: &Workspace, uri: &Url, position: LspPosition, encoding: PositionEncoding) -> Option<Location> {
    let resolved = resolve_position(workspace, uri, position, encoding)?;
    let snapshot = &*resolved.snapshot;
    let index = snapshot.symbol_index(&resolved.source_id)?;
    let reference = index.reference_at_position(&resolved.byte_position)?;

    let target_source_id = match &reference.qualifier {
        Some(alias) => resolve_alias(snapshot, &resolved.source_id, alias)?,
        None => resolved.source_id.clone(),
    };
    let target_index = snapshot.symbol_index(&target_source_id)?;
    let wanted_kind = match reference.kind {
        schema_ls_analyzer::ReferenceKind::DataType => SymbolKind::DataType,
        _ => SymbolKind::Type,
    };
    let target = target_index.symbols.iter().find(|s| s.kind == wanted_kind && s.name == reference.target_name)?;

    // A cross-file jump lands in a different source than the one we
    // resolved the reference against, so compute its range with no line
    // offset (imported schemas are never Markdown-embedded blocks).
    let range = if target_source_id == resolved.source_id {
        span_to_range(&target.selection_range, snapshot, encoding, resolved.line_offset)?
    } else {
        span_to_range(&target.selection_range, snapshot, encoding, 0)?
    };
    Some(Location { uri: build_uri(&target_source_id), range })
}

fn resolve_alias(snapshot: &Snapshot, from: &SourceId, alias: &str) -> Option<SourceId> {
    let schema = snapshot.schema_for(from)?;
    let import = schema.imports.iter().find(|i| i.alias.as_deref() == Some(alias))?;
    import.resolved_source_id.clone()
}
