//! `textDocument/formatting` (§4.9): runs the canonical AST-driven reflow
//! over the live overlay text and reports the result as a single
//! whole-document edit, or none at all when the document has syntax errors
//! or is already formatted.

use lsp_types::{Position as LspPosition, Range as LspRange, TextEdit};
use url::Url;

use schema_ls_diagnostics::Category;
use schema_ls_formatter::{format_token_stream, WrapConfig};
use schema_ls_workspace::Workspace;

pub fn formatting(workspace: &Workspace, uri: &Url) -> Option<Vec<TextEdit>> {
    let text = workspace.dsl_text(uri)?;
    let snapshot = workspace.dsl_snapshot(uri);
    if let Some(snapshot) = &snapshot {
        let has_syntax_error = snapshot.diagnostics_for(&snapshot.entry_source_id).iter().any(|d| d.category() == Category::Syntax);
        if has_syntax_error {
            return None;
        }
    }

    let config = workspace.config();
    let wrap = WrapConfig { max_width: config.max_line_width as usize, tab_width: config.tab_width as usize };
    let source_id = snapshot.map(|s| s.entry_source_id.clone()).unwrap_or_else(|| schema_ls_registry::SourceId::synthetic("schema-ls://formatting-scratch"));
    let formatted = format_token_stream(source_id, &text, wrap)?;

    if formatted == text {
        return Some(Vec::new());
    }

    Some(vec![TextEdit { range: whole_document_range(&text), new_text: formatted }])
}

fn whole_document_range(text: &str) -> LspRange {
    let mut last_line = 0u32;
    let mut last_line_units = 0u32;
    for (i, line) in text.split('\n').enumerate() {
        last_line = i as u32;
        last_line_units = line.encode_utf16().count() as u32;
    }
    LspRange {
        start: LspPosition { line: 0, character: 0 },
        end: LspPosition { line: last_line, character: last_line_units },
    }
}
