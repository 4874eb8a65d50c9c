//! `formatDocument`: conservative line-by-line normalization that never
//! requires a syntactically valid source. Safe to run even on a document
//! mid-edit.

/// Normalize line endings, trailing whitespace and leading-indent style
/// without touching token spacing or content. See §4.9.
pub fn format_document(text: &str) -> String {
    let normalized = normalize_line_endings(text);
    let mut lines: Vec<String> = normalized.split('\n').map(convert_leading_indent).map(trim_trailing_whitespace).collect();

    // `split('\n')` on a trailing-newline-terminated string yields a final
    // empty element; drop it before trimming trailing blank lines so we
    // don't double-count it.
    if lines.last().map(|l| l.is_empty()).unwrap_or(false) {
        lines.pop();
    }
    while lines.last().map(|l| l.is_empty()).unwrap_or(false) {
        lines.pop();
    }

    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn trim_trailing_whitespace(line: String) -> String {
    line.trim_end_matches([' ', '\t']).to_string()
}

/// Convert each run of 4 leading spaces to a tab, preserving a residual
/// 1-3 space remainder so indentation depth is never lost.
fn convert_leading_indent(line: &str) -> String {
    let stripped = line.trim_start_matches(' ');
    let space_count = line.len() - stripped.len();
    if space_count == 0 {
        return line.to_string();
    }
    let tabs = "\t".repeat(space_count / 4);
    let residual = " ".repeat(space_count % 4);
    format!("{tabs}{residual}{stripped}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalizes_crlf_and_cr_line_endings() {
        let input = "a\r\nb\rc\n";
        assert_eq!(format_document(input), "a\nb\nc\n");
    }

    #[test]
    fn trims_trailing_whitespace_per_line() {
        let input = "type Foo {   \n  name String  \t\n}\n";
        assert_eq!(format_document(input), "type Foo {\n  name String\n}\n");
    }

    #[test]
    fn converts_four_space_indents_to_tabs_preserving_residual() {
        let input = "type Foo {\n      name String\n}\n";
        // 6 spaces -> one tab + 2 residual spaces
        assert_eq!(format_document(input), "type Foo {\n\t  name String\n}\n");
    }

    #[test]
    fn removes_trailing_blank_lines_and_ensures_single_final_newline() {
        let input = "type Foo {\n}\n\n\n";
        assert_eq!(format_document(input), "type Foo {\n}\n");
    }

    #[test]
    fn preserves_interior_blank_lines_and_comments() {
        let input = "schema \"Demo\"\n\n// a comment\n\ntype Foo {\n}\n";
        assert_eq!(format_document(input), input);
    }

    #[test]
    fn empty_input_formats_to_empty_output() {
        assert_eq!(format_document(""), "");
    }

    #[test]
    fn whitespace_only_input_formats_to_empty_output() {
        assert_eq!(format_document("   \n\t\n  \n"), "");
    }

    #[test]
    fn is_idempotent() {
        let input = "type Foo {   \r\n      name String\r\n}\r\n\r\n\r\n";
        let once = format_document(input);
        let twice = format_document(&once);
        assert_eq!(once, twice);
    }
}
