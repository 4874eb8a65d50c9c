//! `textDocument/completion` (§4.8): keyword/snippet completion gated by
//! brace-depth context, enriched with dynamic items (visible type names,
//! datatype aliases, built-in constraint heads) when a Snapshot exists.

use lsp_types::{CompletionItem, CompletionItemKind, InsertTextFormat, Position as LspPosition};
use url::Url;

use schema_ls_analyzer::SymbolKind;
use schema_ls_syntax::BUILTIN_CONSTRAINT_HEADS;
use schema_ls_workspace::{Context, Workspace};

pub fn completion(workspace: &Workspace, uri: &Url, position: LspPosition) -> Vec<CompletionItem> {
    let context = workspace.dsl_line_state(uri).map(|ls| ls.context_at(position.line)).unwrap_or(Context::TopLevel);

    let mut items = static_items(context);
    if let Some(snapshot) = workspace.dsl_snapshot(uri) {
        items.extend(dynamic_items(&snapshot, context));
    }
    items
}

fn keyword(label: &str) -> CompletionItem {
    CompletionItem { label: label.to_string(), kind: Some(CompletionItemKind::KEYWORD), ..Default::default() }
}

fn snippet(label: &str, insert_text: &str, detail: &str) -> CompletionItem {
    CompletionItem {
        label: label.to_string(),
        kind: Some(CompletionItemKind::SNIPPET),
        detail: Some(detail.to_string()),
        insert_text: Some(insert_text.to_string()),
        insert_text_format: Some(InsertTextFormat::SNIPPET),
        ..Default::default()
    }
}

fn static_items(context: Context) -> Vec<CompletionItem> {
    match context {
        Context::TopLevel => vec![
            keyword("schema"),
            keyword("import"),
            keyword("type"),
            keyword("abstract"),
            keyword("part"),
            snippet("type", "type ${1:Name} {\n\t$0\n}", "type declaration"),
            snippet("schema", "schema \"${1:Name}\"", "schema header"),
            snippet("import", "import \"./${1:path}\" as ${2:alias}", "import statement"),
        ],
        Context::TypeBody => vec![
            keyword("extends"),
            keyword("optional"),
            keyword("key"),
            snippet("association", "--> ${1:field} (${2:one|many}) ${3:Target}", "association relation"),
            snippet("composition", "*--> ${1:field} (${2:one|many}) ${3:Target}", "composition relation"),
            snippet("invariant", "invariant ${1:name} {\n\t$0\n}", "invariant declaration"),
        ],
        Context::EdgePropertyBlock => vec![keyword("optional"), keyword("key")],
        Context::ConstraintBracket => Vec::new(),
    }
}

fn dynamic_items(snapshot: &schema_ls_analyzer::Snapshot, context: Context) -> Vec<CompletionItem> {
    let mut items = Vec::new();
    match context {
        Context::TopLevel => {}
        Context::TypeBody | Context::EdgePropertyBlock => {
            for head in BUILTIN_CONSTRAINT_HEADS {
                items.push(CompletionItem { label: head.to_string(), kind: Some(CompletionItemKind::KEYWORD), ..Default::default() });
            }
            items.extend(visible_type_names(snapshot));
            items.extend(visible_datatype_names(snapshot));
        }
        Context::ConstraintBracket => {}
    }
    items
}

fn visible_type_names(snapshot: &schema_ls_analyzer::Snapshot) -> Vec<CompletionItem> {
    let mut items = Vec::new();
    if let Some(index) = snapshot.symbol_index(&snapshot.entry_source_id) {
        for symbol in index.symbols.iter().filter(|s| s.kind == SymbolKind::Type) {
            items.push(CompletionItem { label: symbol.name.clone(), kind: Some(CompletionItemKind::CLASS), detail: Some(symbol.detail.clone()), ..Default::default() });
        }
    }
    if let Some(schema) = snapshot.schema_for(&snapshot.entry_source_id) {
        for import in &schema.imports {
            let Some(alias) = &import.alias else { continue };
            let Some(target_id) = &import.resolved_source_id else { continue };
            let Some(target_index) = snapshot.symbol_index(target_id) else { continue };
            for symbol in target_index.symbols.iter().filter(|s| s.kind == SymbolKind::Type) {
                items.push(CompletionItem { label: format!("{alias}.{}", symbol.name), kind: Some(CompletionItemKind::CLASS), detail: Some(symbol.detail.clone()), ..Default::default() });
            }
        }
    }
    items
}

fn visible_datatype_names(snapshot: &schema_ls_analyzer::Snapshot) -> Vec<CompletionItem> {
    let Some(index) = snapshot.symbol_index(&snapshot.entry_source_id) else { return Vec::new() };
    index
        .symbols
        .iter()
        .filter(|s| s.kind == SymbolKind::DataType)
        .map(|symbol| CompletionItem { label: symbol.name.clone(), kind: Some(CompletionItemKind::STRUCT), detail: Some(symbol.detail.clone()), ..Default::default() })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::open_dsl;
    use tempfile::tempdir;

    #[test]
    fn top_level_offers_keywords_but_no_builtin_heads() {
        let dir = tempdir().unwrap();
        let (ws, uri) = open_dsl(dir.path(), "schema \"Demo\"\n\n");
        let items = completion(&ws, &uri, LspPosition { line: 2, character: 0 });
        assert!(items.iter().any(|i| i.label == "type"));
        assert!(!items.iter().any(|i| i.label == "String"));
    }

    #[test]
    fn type_body_offers_builtin_heads_and_sibling_types() {
        let dir = tempdir().unwrap();
        let text = "schema \"Demo\"\n\ntype Wheel {\n\tsize Int\n}\n\ntype Car {\n\tname String\n}\n";
        let (ws, uri) = open_dsl(dir.path(), text);
        let items = completion(&ws, &uri, LspPosition { line: 7, character: 1 });
        assert!(items.iter().any(|i| i.label == "String"));
        assert!(items.iter().any(|i| i.label == "Wheel"));
    }

    #[rstest::rstest]
    #[case(Context::TopLevel, "schema")]
    #[case(Context::TypeBody, "extends")]
    #[case(Context::EdgePropertyBlock, "optional")]
    fn static_items_offers_the_expected_keyword_per_context(#[case] context: Context, #[case] expected_label: &str) {
        let items = static_items(context);
        assert!(items.iter().any(|i| i.label == expected_label), "{context:?} missing {expected_label}: {items:?}");
    }

    #[test]
    fn constraint_bracket_context_offers_nothing_static() {
        assert!(static_items(Context::ConstraintBracket).is_empty());
    }

    #[test]
    fn missing_snapshot_still_returns_the_static_keyword_set() {
        let dir = tempdir().unwrap();
        let (ws, uri) = open_dsl(dir.path(), "schema \"Demo\"\n\n");
        let missing = Url::parse("file:///does/not/exist.dsl").unwrap();
        let items = completion(&ws, &missing, LspPosition { line: 0, character: 0 });
        assert!(items.iter().any(|i| i.label == "schema"));
        let _ = uri;
    }
}
