//! `textDocument/documentSymbol` (§4.8). Built strictly from kind bucket +
//! parent-name identity, never by a generic name lookup: a schema whose name
//! collides with one of its own type names must not recurse into itself.

use lsp_types::{DocumentSymbol, Position as LspPosition, Range as LspRange};
use url::Url;

use schema_ls_analyzer::{Snapshot, Symbol, SymbolIndex, SymbolKind};
use schema_ls_diagnostics::PositionEncoding;
use schema_ls_workspace::Workspace;

use crate::position::span_to_range;

pub fn document_symbol(workspace: &Workspace, uri: &Url, encoding: PositionEncoding) -> Option<Vec<DocumentSymbol>> {
    let snapshot = workspace.dsl_snapshot(uri)?;
    let index = snapshot.symbol_index(&snapshot.entry_source_id)?;
    let root = index.symbols.iter().find(|s| s.kind == SymbolKind::Schema)?;
    Some(vec![build_node(&snapshot, index, root, encoding)])
}

fn build_node(snapshot: &Snapshot, index: &SymbolIndex, symbol: &Symbol, encoding: PositionEncoding) -> DocumentSymbol {
    let children = match symbol.kind {
        SymbolKind::Schema => children_of(index, &symbol.name, &[SymbolKind::Import, SymbolKind::Type, SymbolKind::DataType]),
        SymbolKind::Type => children_of(index, &symbol.name, &[SymbolKind::Property, SymbolKind::Association, SymbolKind::Composition, SymbolKind::Invariant]),
        SymbolKind::Association | SymbolKind::Composition => children_of(index, &symbol.name, &[SymbolKind::Property]),
        SymbolKind::Import | SymbolKind::DataType | SymbolKind::Property | SymbolKind::Invariant => Vec::new(),
    };

    let built_children: Vec<DocumentSymbol> = children.into_iter().map(|child| build_node(snapshot, index, child, encoding)).collect();

    let full_range = safe_range(snapshot, symbol, encoding);
    let selection_range = span_to_range(&symbol.selection_range, snapshot, encoding, 0).unwrap_or(full_range);

    #[allow(deprecated)]
    DocumentSymbol {
        name: symbol.name.clone(),
        detail: Some(symbol.detail.clone()),
        kind: map_kind(symbol.kind),
        tags: None,
        deprecated: None,
        range: full_range,
        selection_range,
        children: if built_children.is_empty() { None } else { Some(built_children) },
    }
}

fn safe_range(snapshot: &Snapshot, symbol: &Symbol, encoding: PositionEncoding) -> LspRange {
    span_to_range(&symbol.full_range, snapshot, encoding, 0).unwrap_or(LspRange { start: LspPosition { line: 0, character: 0 }, end: LspPosition { line: 0, character: 0 } })
}

fn children_of<'a>(index: &'a SymbolIndex, parent_name: &str, kinds: &[SymbolKind]) -> Vec<&'a Symbol> {
    index.symbols.iter().filter(|s| kinds.contains(&s.kind) && s.parent_name.as_deref() == Some(parent_name)).collect()
}

fn map_kind(kind: SymbolKind) -> lsp_types::SymbolKind {
    match kind {
        SymbolKind::Schema => lsp_types::SymbolKind::MODULE,
        SymbolKind::Import => lsp_types::SymbolKind::NAMESPACE,
        SymbolKind::Type => lsp_types::SymbolKind::CLASS,
        SymbolKind::DataType => lsp_types::SymbolKind::STRUCT,
        SymbolKind::Property => lsp_types::SymbolKind::FIELD,
        SymbolKind::Association | SymbolKind::Composition => lsp_types::SymbolKind::FIELD,
        SymbolKind::Invariant => lsp_types::SymbolKind::EVENT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::open_dsl;
    use tempfile::tempdir;

    #[test]
    fn builds_a_tree_rooted_at_the_schema_with_nested_types() {
        let dir = tempdir().unwrap();
        let text = "schema \"Demo\"\n\ntype Car {\n\tname String\n\t--> wheels (many) Wheel {\n\t\tinstalledAt DateTime\n\t}\n}\n\ntype Wheel {\n\tsize Int\n}\n";
        let (ws, uri) = open_dsl(dir.path(), text);
        let symbols = document_symbol(&ws, &uri, PositionEncoding::Utf16).unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "Demo");
        let car = symbols[0].children.as_ref().unwrap().iter().find(|s| s.name == "Car").unwrap();
        let wheels = car.children.as_ref().unwrap().iter().find(|s| s.name == "wheels").unwrap();
        assert!(wheels.children.as_ref().unwrap().iter().any(|c| c.name == "installedAt"));
    }

    #[test]
    fn a_schema_named_like_one_of_its_own_types_does_not_recurse() {
        let dir = tempdir().unwrap();
        let text = "schema \"Car\"\n\ntype Car {\n\tname String\n}\n";
        let (ws, uri) = open_dsl(dir.path(), text);
        let symbols = document_symbol(&ws, &uri, PositionEncoding::Utf16).unwrap();
        assert_eq!(symbols[0].name, "Car");
        let children = symbols[0].children.as_ref().unwrap();
        assert_eq!(children.iter().filter(|s| s.name == "Car").count(), 1);
    }
}
