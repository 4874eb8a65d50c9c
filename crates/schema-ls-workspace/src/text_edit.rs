//! Applies one protocol text-document change to an in-memory buffer.
//!
//! This duplicates a slice of `SourceRegistry`'s code-unit math rather than
//! reusing it, because overlay text is mutated on every keystroke — it is
//! never registered (registration is for immutable, analyzed content) — so
//! there's no `SourceRegistry` to query against while editing is in flight.

use schema_ls_diagnostics::PositionEncoding;

/// A single incremental change: `range = None` means "replace the whole
/// document"; otherwise `start`/`end` are `(line, character)` pairs in the
/// negotiated encoding, 0-based.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub range: Option<((u32, u32), (u32, u32))>,
    pub text: String,
}

pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Apply `changes` in order, as the protocol requires: each change is
/// computed against the result of the previous one. A full-text
/// replacement discards everything before it in the same batch.
pub fn apply_changes(text: &str, changes: &[ChangeEvent], encoding: PositionEncoding) -> String {
    let mut current = text.to_string();
    for (i, change) in changes.iter().enumerate() {
        if change.range.is_none() {
            current = normalize_line_endings(&change.text);
            continue;
        }
        current = apply_one(&current, change, encoding);
        let _ = i;
    }
    current
}

fn apply_one(text: &str, change: &ChangeEvent, encoding: PositionEncoding) -> String {
    let Some((start, end)) = change.range else {
        return normalize_line_endings(&change.text);
    };
    let line_starts = line_start_offsets(text);
    let start_byte = byte_offset_for_position(text, &line_starts, start.0, start.1, encoding);
    let end_byte = byte_offset_for_position(text, &line_starts, end.0, end.1, encoding);
    let (lo, hi) = if start_byte <= end_byte { (start_byte, end_byte) } else { (end_byte, start_byte) };
    let mut out = String::with_capacity(text.len() - (hi - lo) + change.text.len());
    out.push_str(&text[..lo]);
    out.push_str(&normalize_line_endings(&change.text));
    out.push_str(&text[hi..]);
    out
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

fn byte_offset_for_position(text: &str, line_starts: &[usize], line: u32, character: u32, encoding: PositionEncoding) -> usize {
    let Some(&line_start) = line_starts.get(line as usize) else {
        return text.len();
    };
    let line_end = line_starts.get(line as usize + 1).copied().unwrap_or(text.len());
    let slice = &text[line_start..line_end];

    let mut units = 0u32;
    let mut byte = line_start;
    for ch in slice.chars() {
        if units >= character {
            break;
        }
        units += match encoding {
            PositionEncoding::Utf16 => {
                if ch.len_utf16() > 1 {
                    2
                } else {
                    1
                }
            }
            PositionEncoding::Utf8 => ch.len_utf8() as u32,
        };
        byte += ch.len_utf8();
    }
    byte.min(line_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn full_replacement_ignores_prior_text() {
        let out = apply_changes("old", &[ChangeEvent { range: None, text: "new".into() }], PositionEncoding::Utf16);
        assert_eq!(out, "new");
    }

    #[test]
    fn ranged_insert_at_end_of_line() {
        let text = "type Car {\n}\n";
        let change = ChangeEvent { range: Some(((0, 10), (0, 10))), text: "\n  id String".into() };
        let out = apply_changes(text, &[change], PositionEncoding::Utf16);
        assert_eq!(out, "type Car {\n  id String\n}\n");
    }

    #[test]
    fn ranged_delete_removes_span() {
        let text = "type Car {\n  id String\n}\n";
        let change = ChangeEvent { range: Some(((1, 2), (1, 4))), text: String::new() };
        let out = apply_changes(text, &[change], PositionEncoding::Utf16);
        assert_eq!(out, "type Car {\nString\n}\n");
    }

    #[test]
    fn multiple_changes_apply_sequentially() {
        let text = "abc";
        let changes = vec![
            ChangeEvent { range: Some(((0, 0), (0, 0))), text: "X".into() },
            ChangeEvent { range: Some(((0, 4), (0, 4))), text: "Y".into() },
        ];
        let out = apply_changes(text, &changes, PositionEncoding::Utf16);
        assert_eq!(out, "XabcY");
    }

    #[test]
    fn only_last_full_replacement_in_a_batch_wins() {
        let changes = vec![
            ChangeEvent { range: None, text: "first".into() },
            ChangeEvent { range: None, text: "second".into() },
        ];
        let out = apply_changes("anything", &changes, PositionEncoding::Utf16);
        assert_eq!(out, "second");
    }

    #[test]
    fn crlf_input_is_normalized_to_lf() {
        let out = apply_changes("a\r\nb", &[ChangeEvent { range: None, text: "x\r\ny".into() }], PositionEncoding::Utf16);
        assert_eq!(out, "x\ny");
    }

    #[test]
    fn surrogate_pair_characters_count_as_two_utf16_units() {
        let text = "a\u{1F600}b";
        let change = ChangeEvent { range: Some(((0, 3), (0, 3))), text: "X".into() };
        let out = apply_changes(text, &[change], PositionEncoding::Utf16);
        assert_eq!(out, "a\u{1F600}Xb");
    }
}
