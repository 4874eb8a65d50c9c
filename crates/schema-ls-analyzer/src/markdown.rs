//! Fenced-code-block extraction and bidirectional coordinate remapping for
//! schemas embedded in Markdown documents.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use pulldown_cmark::{Event, Parser as MdParser, Tag, TagEnd};

use schema_ls_diagnostics::{Diagnostic, RelatedInfo};
use schema_ls_registry::{Position, SourceId, Span};

use crate::analyzer::{analyze, AnalyzeOptions, Snapshot};

/// Language tag fenced blocks must carry to be treated as schema source.
pub const LANGUAGE_TAG: &str = "yammm";

#[derive(Debug, Clone)]
pub struct CodeBlock {
    pub content: String,
    /// 0-based line in the Markdown document where the block's content
    /// starts (the line right after the opening fence).
    pub start_line: u32,
    /// 0-based line one past the block's last content line.
    pub end_line: u32,
    pub fence_char: char,
    pub virtual_source_id: SourceId,
}

/// Extract every fenced code block tagged `yammm` whose content is
/// non-empty. Uses `pulldown-cmark`'s event stream rather than a hand
/// written fence scanner, so nested/indented-code edge cases follow the
/// same CommonMark rules the rest of the Markdown tooling already commits to.
pub fn extract_blocks(markdown_path: &std::path::Path, text: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let line_starts = line_start_offsets(text);
    let parser = MdParser::new(text).into_offset_iter();
    let mut pending_fence_char: Option<char> = None;

    for (event, range) in parser {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                pending_fence_char = match &kind {
                    pulldown_cmark::CodeBlockKind::Fenced(info) if is_language_match(info) => {
                        Some(guess_fence_char(text, range.start))
                    }
                    _ => None,
                };
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some(fence_char) = pending_fence_char.take() {
                    if let Some(block) = build_block(markdown_path, text, &line_starts, range.start, range.end, fence_char, blocks.len()) {
                        blocks.push(block);
                    }
                }
            }
            _ => {}
        }
    }

    blocks
}

fn is_language_match(info: &str) -> bool {
    info.split_whitespace().count() == 1 && info.trim().eq_ignore_ascii_case(LANGUAGE_TAG)
}

fn guess_fence_char(text: &str, start_byte: usize) -> char {
    text[start_byte..].trim_start().chars().next().unwrap_or('`')
}

fn build_block(
    markdown_path: &std::path::Path,
    text: &str,
    line_starts: &[usize],
    start_byte: usize,
    end_byte: usize,
    fence_char: char,
    index: usize,
) -> Option<CodeBlock> {
    let raw = &text[start_byte..end_byte];
    // `pulldown-cmark` hands back the whole fenced region including both
    // fence lines; strip the first and last line to get pure content.
    let mut lines: Vec<&str> = raw.lines().collect();
    if lines.first().map(|l| l.trim_start().starts_with(fence_char)).unwrap_or(false) {
        lines.remove(0);
    }
    if lines.last().map(|l| l.trim().chars().all(|c| c == fence_char)).unwrap_or(false) {
        lines.pop();
    }
    let content = lines.join("\n");
    if content.trim().is_empty() {
        return None;
    }

    let content_start_line = byte_to_line(line_starts, start_byte) + 1; // skip the opening fence line
    let content_end_line = content_start_line + lines.len() as u32;

    Some(CodeBlock {
        content,
        start_line: content_start_line,
        end_line: content_end_line,
        fence_char,
        virtual_source_id: SourceId::markdown_block(markdown_path, index),
    })
}

fn line_start_offsets(text: &str) -> Vec<usize> {
    let mut starts = vec![0usize];
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

fn byte_to_line(line_starts: &[usize], byte: usize) -> u32 {
    match line_starts.binary_search(&byte) {
        Ok(i) => i as u32,
        Err(i) => i.saturating_sub(1) as u32,
    }
}

/// A position inside the Markdown document, 0-based line/column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkdownPos {
    pub line: u32,
    pub column: u32,
}

/// A position inside one block's own content, 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPos {
    pub block_index: usize,
    pub line: u32,
    pub column: u32,
}

/// Find which block (if any) a Markdown position lands in and convert to
/// block-local coordinates. Positions on the fence lines or in prose return
/// `None`.
pub fn markdown_to_block(blocks: &[CodeBlock], pos: MarkdownPos) -> Option<BlockPos> {
    for (index, block) in blocks.iter().enumerate() {
        if pos.line >= block.start_line && pos.line < block.end_line {
            return Some(BlockPos { block_index: index, line: pos.line - block.start_line, column: pos.column });
        }
    }
    None
}

pub fn block_to_markdown(blocks: &[CodeBlock], pos: BlockPos) -> Option<MarkdownPos> {
    let block = blocks.get(pos.block_index)?;
    Some(MarkdownPos { line: block.start_line + pos.line, column: pos.column })
}

/// The outcome of projecting and independently analyzing every fenced
/// schema block in one Markdown document.
pub struct MarkdownAnalysis {
    pub blocks: Vec<CodeBlock>,
    /// Positionally aligned with `blocks`; `None` if a block's analysis
    /// failed outright rather than merely producing diagnostics.
    pub per_block_snapshots: Vec<Option<Snapshot>>,
    /// Diagnostics from every block, remapped to the Markdown document's
    /// own coordinates and `SourceId`.
    pub diagnostics: Vec<Diagnostic>,
}

/// Extract and analyze every schema block in `text`, remapping results back
/// to `markdown_source_id`'s coordinate space. Each block is analyzed with
/// imports disallowed (§4.6): a Markdown snippet has no directory of its
/// own to resolve relative imports against.
pub fn analyze_markdown(markdown_path: &Path, markdown_source_id: &SourceId, text: &str, version: i64) -> MarkdownAnalysis {
    let blocks = extract_blocks(markdown_path, text);
    let mut per_block_snapshots = Vec::with_capacity(blocks.len());
    let mut diagnostics = Vec::new();

    for block in &blocks {
        let virtual_path = PathBuf::from(block.virtual_source_id.as_str());
        let mut overlays = HashMap::new();
        overlays.insert(virtual_path.clone(), block.content.as_bytes().to_vec());

        let snapshot = analyze(&virtual_path, &overlays, markdown_path, version, AnalyzeOptions { allow_imports: false });
        for diag in snapshot.diagnostics_for(&block.virtual_source_id) {
            diagnostics.push(remap_diagnostic(diag, block, markdown_source_id));
        }
        per_block_snapshots.push(Some(snapshot));
    }

    MarkdownAnalysis { blocks, per_block_snapshots, diagnostics }
}

fn remap_diagnostic(diag: &Diagnostic, block: &CodeBlock, markdown_source_id: &SourceId) -> Diagnostic {
    let mut out = diag.clone();
    if let Some(span) = &diag.span {
        out.span = Some(Span::new(markdown_source_id.clone(), remap_position(span.start, block), remap_position(span.end, block)));
    }
    out.related = diag
        .related
        .iter()
        .map(|r| RelatedInfo {
            span: Span::new(markdown_source_id.clone(), remap_position(r.span.start, block), remap_position(r.span.end, block)),
            message: r.message.clone(),
        })
        .collect();
    out
}

fn remap_position(pos: Position, block: &CodeBlock) -> Position {
    Position::without_byte(pos.line + block.start_line, pos.column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_a_single_tagged_block() {
        let text = "# Test\n\n```yammm\nschema \"Demo\"\n```\n";
        let blocks = extract_blocks(Path::new("/docs/readme.md"), text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content, "schema \"Demo\"");
        assert_eq!(blocks[0].virtual_source_id.as_str(), "/docs/readme.md#block-0");
    }

    #[test]
    fn ignores_blocks_with_other_languages() {
        let text = "```rust\nfn main() {}\n```\n";
        let blocks = extract_blocks(Path::new("/docs/readme.md"), text);
        assert!(blocks.is_empty());
    }

    #[test]
    fn drops_blank_blocks() {
        let text = "```yammm\n\n   \n```\n";
        let blocks = extract_blocks(Path::new("/docs/readme.md"), text);
        assert!(blocks.is_empty());
    }

    #[test]
    fn markdown_to_block_round_trips() {
        let text = "# Test\n\n```yammm\nschema \"Demo\"\n\ntype Car {\n  id String\n}\n```\n";
        let blocks = extract_blocks(Path::new("/docs/readme.md"), text);
        let original = MarkdownPos { line: 5, column: 2 };
        let block_pos = markdown_to_block(&blocks, original).unwrap();
        let back = block_to_markdown(&blocks, block_pos).unwrap();
        assert_eq!(original, back);
    }

    #[test]
    fn position_on_fence_line_has_no_block() {
        let text = "```yammm\nschema \"Demo\"\n```\n";
        let blocks = extract_blocks(Path::new("/docs/readme.md"), text);
        assert!(markdown_to_block(&blocks, MarkdownPos { line: 0, column: 0 }).is_none());
    }

    #[test]
    fn invalid_block_content_yields_diagnostics_in_markdown_coordinates() {
        let text = "# Test\n\n```yammm\nnot valid schema!!!\n```\n";
        let markdown_id = SourceId::from_canonical_path(Path::new("/docs/readme.md"));
        let analysis = analyze_markdown(Path::new("/docs/readme.md"), &markdown_id, text, 1);
        assert_eq!(analysis.blocks.len(), 1);
        assert!(!analysis.diagnostics.is_empty());
        let diag = &analysis.diagnostics[0];
        assert_eq!(diag.span.as_ref().unwrap().source, markdown_id);
        assert!(diag.span.as_ref().unwrap().start.line >= 3);
    }

    #[test]
    fn imports_inside_a_block_are_rejected_as_hints() {
        let text = "```yammm\nschema \"Demo\"\n\nimport \"./parts\"\n\ntype Car {\n  id String\n}\n```\n";
        let markdown_id = SourceId::from_canonical_path(Path::new("/docs/readme.md"));
        let analysis = analyze_markdown(Path::new("/docs/readme.md"), &markdown_id, text, 1);
        assert!(analysis.diagnostics.iter().any(|d| d.code.as_str() == "E_IMPORT_NOT_ALLOWED"));
    }
}
