//! Shared position resolution: turns an incoming protocol position into a
//! byte position against the right `Snapshot`, routing Markdown URIs
//! through the projection layer first (§4.6, §4.8).

use std::sync::Arc;

use lsp_types::{Position as LspPosition, Range as LspRange};
use url::Url;

use schema_ls_analyzer::markdown::{markdown_to_block, MarkdownPos};
use schema_ls_analyzer::Snapshot;
use schema_ls_diagnostics::PositionEncoding;
use schema_ls_registry::{CodeUnitEncoding, SourceId, Span};
use schema_ls_workspace::Workspace;

pub struct ResolvedPosition {
    pub snapshot: Arc<Snapshot>,
    pub source_id: SourceId,
    pub byte_position: schema_ls_registry::Position,
    /// Added back to any 0-based output line to remap into the owning
    /// document's coordinates; 0 for plain DSL documents, the block's
    /// `start_line` for a Markdown-embedded block.
    pub line_offset: u32,
}

fn to_code_unit(encoding: PositionEncoding) -> CodeUnitEncoding {
    match encoding {
        PositionEncoding::Utf16 => CodeUnitEncoding::Utf16,
        PositionEncoding::Utf8 => CodeUnitEncoding::Utf8,
    }
}

pub fn resolve_position(workspace: &Workspace, uri: &Url, position: LspPosition, encoding: PositionEncoding) -> Option<ResolvedPosition> {
    if let Some(snapshot) = workspace.dsl_snapshot(uri) {
        let source_id = snapshot.entry_source_id.clone();
        let byte_position = snapshot.registry.byte_offset_for_position(&source_id, position.line, position.character, to_code_unit(encoding))?;
        return Some(ResolvedPosition { snapshot, source_id, byte_position, line_offset: 0 });
    }

    let analysis = workspace.markdown_analysis(uri)?;
    let block_pos = markdown_to_block(&analysis.blocks, MarkdownPos { line: position.line, column: position.character })?;
    let block = analysis.blocks.get(block_pos.block_index)?;
    let snapshot = analysis.per_block_snapshots.get(block_pos.block_index)?.as_ref()?;
    let source_id = block.virtual_source_id.clone();
    let byte_position = snapshot.registry.byte_offset_for_position(&source_id, block_pos.line, block_pos.column, to_code_unit(encoding))?;
    Some(ResolvedPosition { snapshot: Arc::new(snapshot.clone()), source_id, byte_position, line_offset: block.start_line })
}

/// Convert a `Span` into a protocol range, using whichever registry holds
/// its source (always `snapshot.registry`, since every source a query can
/// reach — including imported ones — got loaded into the same Snapshot).
pub fn span_to_range(span: &Span, snapshot: &Snapshot, encoding: PositionEncoding, line_offset: u32) -> Option<LspRange> {
    let start = convert(snapshot, &span.source, span.start, encoding)?;
    let end = convert(snapshot, &span.source, span.end, encoding)?;
    Some(LspRange {
        start: LspPosition { line: start.0 + line_offset, character: start.1 },
        end: LspPosition { line: end.0 + line_offset, character: end.1 },
    })
}

fn convert(snapshot: &Snapshot, source: &SourceId, pos: schema_ls_registry::Position, encoding: PositionEncoding) -> Option<(u32, u32)> {
    let byte = pos.byte_offset()?;
    let character = match encoding {
        PositionEncoding::Utf16 => snapshot.registry.utf16_offset_in_line(source, pos.line, byte)?,
        PositionEncoding::Utf8 => snapshot.registry.utf8_offset_in_line(source, pos.line, byte)?,
    };
    Some((pos.line.saturating_sub(1), character))
}
