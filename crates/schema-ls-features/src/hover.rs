//! `textDocument/hover` (§4.8): resolves the symbol or reference under the
//! cursor and surfaces its declaration-site documentation.

use lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind};
use url::Url;

use schema_ls_analyzer::{Snapshot, Symbol, SymbolKind};
use schema_ls_diagnostics::PositionEncoding;
use schema_ls_syntax::ast::Schema;
use schema_ls_workspace::Workspace;

use crate::position::{resolve_position, span_to_range};

pub fn hover(workspace: &Workspace, uri: &Url, position: lsp_types::Position, encoding: PositionEncoding) -> Option<Hover> {
    let resolved = resolve_position(workspace, uri, position, encoding)?;
    let snapshot = &*resolved.snapshot;
    let index = snapshot.symbol_index(&resolved.source_id)?;

    // A reference (e.g. an `extends` clause or relation target) hovers the
    // *target* symbol's documentation but keeps the *reference*'s own range,
    // so the highlighted span in the editor still matches what's under the
    // cursor.
    if let Some(reference) = index.reference_at_position(&resolved.byte_position) {
        let target_index = match &reference.qualifier {
            Some(alias) => resolve_qualified_index(snapshot, &resolved.source_id, alias)?,
            None => index,
        };
        let target = target_index.symbols.iter().find(|s| s.name == reference.target_name && is_type_like(s.kind))?;
        let schema = snapshot.schema_for(&target.source_id)?;
        let contents = render_symbol(schema, target);
        let range = span_to_range(&reference.span, snapshot, encoding, resolved.line_offset);
        return Some(Hover { contents: HoverContents::Markup(contents), range });
    }

    let symbol = index.symbol_at_position(&resolved.byte_position)?;
    let schema = snapshot.schema_for(&resolved.source_id)?;
    let contents = render_symbol(schema, symbol);
    let range = span_to_range(&symbol.selection_range, snapshot, encoding, resolved.line_offset);
    Some(Hover { contents: HoverContents::Markup(contents), range })
}

fn is_type_like(kind: SymbolKind) -> bool {
    matches!(kind, SymbolKind::Type | SymbolKind::DataType)
}

fn resolve_qualified_index<'a>(snapshot: &'a Snapshot, from: &schema_ls_registry::SourceId, alias: &str) -> Option<&'a schema_ls_analyzer::SymbolIndex> {
    let schema = snapshot.schema_for(from)?;
    let import = schema.imports.iter().find(|i| i.alias.as_deref() == Some(alias))?;
    let target_id = import.resolved_source_id.as_ref()?;
    snapshot.symbol_index(target_id)
}

fn render_symbol(schema: &Schema, symbol: &Symbol) -> MarkupContent {
    let mut value = format!("```yammm\n{}\n```", symbol.detail);
    if let Some(doc) = find_documentation(schema, symbol) {
        value.push_str("\n\n");
        value.push_str(&doc);
    }
    MarkupContent { kind: MarkupKind::Markdown, value }
}

/// `Symbol` only carries a one-line `detail`; the doc comment itself lives
/// on the matching AST node, found back by kind + name (+ parent for
/// properties nested inside a relation's edge-property block).
fn find_documentation(schema: &Schema, symbol: &Symbol) -> Option<String> {
    match symbol.kind {
        SymbolKind::Type => schema.types.iter().find(|t| t.name == symbol.name).and_then(|t| t.documentation.clone()),
        SymbolKind::DataType => schema.data_types.iter().find(|d| d.name == symbol.name).and_then(|d| d.documentation.clone()),
        SymbolKind::Property => schema.types.iter().find(|t| t.name.as_str() == symbol.parent_name.as_deref().unwrap_or_default()).and_then(|t| t.properties.iter().find(|p| p.name == symbol.name)).and_then(|p| p.documentation.clone()).or_else(|| {
            // Property nested under an association/composition's edge block.
            schema.types.iter().flat_map(|t| t.associations.iter().chain(t.compositions.iter())).find(|r| r.field_name.as_str() == symbol.parent_name.as_deref().unwrap_or_default()).and_then(|r| r.properties.iter().find(|p| p.name == symbol.name)).and_then(|p| p.documentation.clone())
        }),
        SymbolKind::Association | SymbolKind::Composition => schema
            .types
            .iter()
            .find(|t| t.name.as_str() == symbol.parent_name.as_deref().unwrap_or_default())
            .and_then(|t| t.associations.iter().chain(t.compositions.iter()).find(|r| r.field_name == symbol.name))
            .and_then(|r| r.documentation.clone()),
        SymbolKind::Invariant | SymbolKind::Schema | SymbolKind::Import => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::open_dsl;
    use lsp_types::Position as LspPos;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn hovering_a_property_name_shows_its_detail() {
        let dir = tempdir().unwrap();
        let (ws, uri) = open_dsl(dir.path(), "schema \"Demo\"\n\ntype Car {\n\tname String required\n}\n");
        let hover = hover(&ws, &uri, LspPos { line: 3, character: 2 }, PositionEncoding::Utf16).unwrap();
        match hover.contents {
            HoverContents::Markup(m) => assert!(m.value.contains("name String required")),
            _ => panic!("expected markup"),
        }
    }

    #[test]
    fn hovering_a_relation_target_shows_the_target_types_detail() {
        let dir = tempdir().unwrap();
        let text = "schema \"Demo\"\n\ntype Car {\n\t--> wheels (many) Wheel\n}\n\ntype Wheel {\n\tsize Int\n}\n";
        let (ws, uri) = open_dsl(dir.path(), text);
        let hover = hover(&ws, &uri, LspPos { line: 3, character: 20 }, PositionEncoding::Utf16).unwrap();
        match hover.contents {
            HoverContents::Markup(m) => assert!(m.value.contains("type Wheel")),
            _ => panic!("expected markup"),
        }
    }

    #[test]
    fn hovering_whitespace_returns_nothing() {
        let dir = tempdir().unwrap();
        let (ws, uri) = open_dsl(dir.path(), "schema \"Demo\"\n\ntype Car {\n\tname String\n}\n");
        assert!(hover(&ws, &uri, LspPos { line: 1, character: 0 }, PositionEncoding::Utf16).is_none());
    }
}
