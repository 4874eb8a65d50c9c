use std::collections::HashMap;

use crate::position::Position;
use crate::source_id::SourceId;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("source {0} was registered twice with different content")]
    ContentMismatch(SourceId),
}

#[derive(Clone)]
struct SourceEntry {
    bytes: Vec<u8>,
    /// Byte offset of the start of each line (1-based line N is
    /// `line_starts[N - 1]`). A trailing sentinel equal to `bytes.len()` is
    /// always present so "line = lineCount + 1" resolves to an empty
    /// trailing line instead of panicking.
    line_starts: Vec<usize>,
}

fn compute_line_starts(bytes: &[u8]) -> Vec<usize> {
    let mut starts = vec![0usize];
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'\n' {
            starts.push(i + 1);
        }
    }
    if *starts.last().unwrap() != bytes.len() {
        starts.push(bytes.len());
    }
    starts
}

/// Holds the exact bytes used by one analysis and answers position queries
/// against them. Immutable within a single `Snapshot`; a new analysis
/// produces a new registry.
#[derive(Default, Clone)]
pub struct SourceRegistry {
    sources: HashMap<SourceId, SourceEntry>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source's bytes. Idempotent: registering the same id with
    /// identical bytes again is a no-op. Registering the same id with
    /// different bytes is a programming error and returns
    /// `RegistryError::ContentMismatch`.
    pub fn register(&mut self, id: SourceId, bytes: Vec<u8>) -> Result<(), RegistryError> {
        if let Some(existing) = self.sources.get(&id) {
            if existing.bytes == bytes {
                return Ok(());
            }
            return Err(RegistryError::ContentMismatch(id));
        }
        let line_starts = compute_line_starts(&bytes);
        self.sources.insert(id, SourceEntry { bytes, line_starts });
        Ok(())
    }

    pub fn has(&self, id: &SourceId) -> bool {
        self.sources.contains_key(id)
    }

    pub fn bytes(&self, id: &SourceId) -> Option<&[u8]> {
        self.sources.get(id).map(|e| e.bytes.as_slice())
    }

    pub fn text(&self, id: &SourceId) -> Option<&str> {
        self.bytes(id).and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn line_count(&self, id: &SourceId) -> Option<u32> {
        let entry = self.sources.get(id)?;
        Some((entry.line_starts.len() - 1) as u32)
    }

    /// Byte offset of the start of `line` (1-based). `line == lineCount + 1`
    /// returns `bytes.len()` (the empty trailing line).
    pub fn line_start_byte(&self, id: &SourceId, line: u32) -> Option<usize> {
        let entry = self.sources.get(id)?;
        let idx = line.checked_sub(1)? as usize;
        entry.line_starts.get(idx).copied()
    }

    fn line_end_byte(&self, id: &SourceId, line: u32) -> Option<usize> {
        let entry = self.sources.get(id)?;
        let idx = line as usize; // line_starts[line] is the start of the *next* line
        entry.line_starts.get(idx).copied()
    }

    /// Convert a byte position (absolute offset into the source) into a
    /// 1-based `Position`. Returns `None` if `byte` is out of range or the
    /// source is not registered.
    pub fn position_for_byte(&self, id: &SourceId, byte: usize) -> Option<Position> {
        let entry = self.sources.get(id)?;
        if byte > entry.bytes.len() {
            return None;
        }
        // Binary search for the line whose start is <= byte.
        let line_idx = match entry.line_starts.binary_search(&byte) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let line_start = entry.line_starts[line_idx];
        let column = utf8_code_units(&entry.bytes, line_start, byte) + 1;
        Some(Position::new((line_idx + 1) as u32, column, byte))
    }

    /// UTF-16 code-unit offset of `target_byte` from the start of `line`,
    /// flooring to the containing code point when `target_byte` falls
    /// strictly inside a multi-byte rune.
    pub fn utf16_offset_in_line(&self, id: &SourceId, line: u32, target_byte: usize) -> Option<u32> {
        let line_start = self.line_start_byte(id, line)?;
        let line_end = self.line_end_byte(id, line).unwrap_or(line_start);
        let entry = self.sources.get(id)?;
        let clamp = target_byte.min(line_end).max(line_start);
        let text = std::str::from_utf8(&entry.bytes[line_start..]).ok()?;
        let mut units = 0u32;
        for (rel_idx, ch) in text.char_indices() {
            let abs_idx = line_start + rel_idx;
            let char_end = abs_idx + ch.len_utf8();
            if char_end <= clamp {
                units += if ch.len_utf16() > 1 { 2 } else { 1 };
            } else {
                break;
            }
        }
        Some(units)
    }

    /// UTF-8 code-unit (byte) offset of `target_byte` from the start of
    /// `line`, flooring to the containing code point.
    pub fn utf8_offset_in_line(&self, id: &SourceId, line: u32, target_byte: usize) -> Option<u32> {
        let line_start = self.line_start_byte(id, line)?;
        let line_end = self.line_end_byte(id, line).unwrap_or(line_start);
        let entry = self.sources.get(id)?;
        let clamp = target_byte.min(line_end).max(line_start);
        Some(utf8_code_units(&entry.bytes, line_start, clamp))
    }

    /// Inverse of [`Self::utf16_offset_in_line`]/[`Self::utf8_offset_in_line`]:
    /// given a protocol position (0-based `line`, code-unit `character` in
    /// `encoding`) find the byte offset it refers to. Used by feature
    /// providers to turn an incoming hover/definition/completion position
    /// into a byte position they can hand to `symbolAtPosition`. Clamps a
    /// `character` past the end of the line to the line's length.
    pub fn byte_offset_for_position(&self, id: &SourceId, zero_based_line: u32, character: u32, encoding: CodeUnitEncoding) -> Option<Position> {
        let line = zero_based_line + 1;
        let line_start = self.line_start_byte(id, line)?;
        let line_end = self.line_end_byte(id, line).unwrap_or(line_start);
        let entry = self.sources.get(id)?;
        let text = std::str::from_utf8(&entry.bytes[line_start..line_end]).ok()?;

        let mut units = 0u32;
        let mut byte = line_start;
        for ch in text.chars() {
            if units >= character {
                break;
            }
            units += match encoding {
                CodeUnitEncoding::Utf16 => {
                    if ch.len_utf16() > 1 {
                        2
                    } else {
                        1
                    }
                }
                CodeUnitEncoding::Utf8 => ch.len_utf8() as u32,
            };
            byte += ch.len_utf8();
        }
        let byte = byte.min(line_end);
        let column = utf8_code_units(&entry.bytes, line_start, byte) + 1;
        Some(Position::new(line, column, byte))
    }
}

/// Which code-unit width a protocol `character` field counts in. Mirrors
/// `schema-ls-diagnostics::PositionEncoding`, kept as a separate type here so
/// this crate has no dependency on the diagnostics crate (the dependency
/// runs the other way).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeUnitEncoding {
    Utf16,
    Utf8,
}

fn utf8_code_units(bytes: &[u8], line_start: usize, target_byte: usize) -> u32 {
    let text = match std::str::from_utf8(&bytes[line_start..]) {
        Ok(t) => t,
        Err(_) => return (target_byte - line_start) as u32,
    };
    let mut last_boundary = 0usize;
    for (rel_idx, ch) in text.char_indices() {
        let abs_idx = line_start + rel_idx;
        let char_end = abs_idx + ch.len_utf8();
        if char_end <= target_byte {
            last_boundary = char_end - line_start;
        } else {
            break;
        }
    }
    last_boundary as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn registry_with(text: &str) -> (SourceRegistry, SourceId) {
        let mut reg = SourceRegistry::new();
        let id = SourceId::synthetic("test://doc");
        reg.register(id.clone(), text.as_bytes().to_vec()).unwrap();
        (reg, id)
    }

    #[test]
    fn re_registering_identical_bytes_is_ok() {
        let (mut reg, id) = registry_with("hello\n");
        assert!(reg.register(id, b"hello\n".to_vec()).is_ok());
    }

    #[test]
    fn re_registering_different_bytes_errors() {
        let (mut reg, id) = registry_with("hello\n");
        let err = reg.register(id, b"goodbye\n".to_vec()).unwrap_err();
        assert!(matches!(err, RegistryError::ContentMismatch(_)));
    }

    #[test]
    fn line_start_byte_covers_trailing_empty_line() {
        let (reg, id) = registry_with("a\nb\n");
        assert_eq!(reg.line_start_byte(&id, 1), Some(0));
        assert_eq!(reg.line_start_byte(&id, 2), Some(2));
        assert_eq!(reg.line_start_byte(&id, 3), Some(4));
        assert_eq!(reg.line_count(&id), Some(2));
    }

    #[test]
    fn utf16_offset_is_exact_for_bmp_and_supplementary() {
        let (reg, id) = registry_with("hélloé\n");
        // byte offset right after "héllo"
        let after_hello = "h\u{00e9}llo".len();
        assert_eq!(reg.utf16_offset_in_line(&id, 1, after_hello), Some(5));
    }

    #[test]
    fn utf16_offset_counts_surrogate_pairs_as_two() {
        let (reg, id) = registry_with("a\u{00e9}b\u{1F600}c\n");
        let after_emoji = "a\u{00e9}b\u{1F600}".len();
        assert_eq!(reg.utf16_offset_in_line(&id, 1, after_emoji), Some(5));
    }

    #[test]
    fn utf16_offset_floors_mid_rune_targets() {
        let (reg, id) = registry_with("a\u{1F600}b\n");
        // target_byte lands one byte inside the 4-byte emoji
        let mid_rune = "a".len() + 1;
        assert_eq!(reg.utf16_offset_in_line(&id, 1, mid_rune), Some(1));
    }

    #[test]
    fn utf16_offset_is_monotone_non_decreasing() {
        let (reg, id) = registry_with("a\u{00e9}b\u{1F600}c\n");
        let bytes = reg.bytes(&id).unwrap().len();
        let mut prev = 0u32;
        for b in 0..=bytes {
            let v = reg.utf16_offset_in_line(&id, 1, b).unwrap();
            assert!(v >= prev);
            prev = v;
        }
    }

    #[test]
    fn position_for_byte_reports_line_and_column() {
        let (reg, id) = registry_with("ab\ncd\n");
        let pos = reg.position_for_byte(&id, 4).unwrap();
        assert_eq!((pos.line, pos.column), (2, 2));
    }

    #[test]
    fn byte_offset_for_position_round_trips_ascii() {
        let (reg, id) = registry_with("ab\ncd\n");
        let pos = reg.byte_offset_for_position(&id, 1, 1, CodeUnitEncoding::Utf16).unwrap();
        assert_eq!(pos.byte_offset(), Some(4));
    }

    #[test]
    fn byte_offset_for_position_accounts_for_surrogate_pairs() {
        let (reg, id) = registry_with("a\u{1F600}b\n");
        let pos = reg.byte_offset_for_position(&id, 0, 3, CodeUnitEncoding::Utf16).unwrap();
        // 'a' (1 unit) + emoji (2 units) = 3 units -> byte offset right before 'b'
        assert_eq!(pos.byte_offset(), Some("a\u{1F600}".len()));
    }

    #[test]
    fn byte_offset_for_position_clamps_character_past_line_end() {
        let (reg, id) = registry_with("ab\n");
        let pos = reg.byte_offset_for_position(&id, 0, 100, CodeUnitEncoding::Utf16).unwrap();
        assert_eq!(pos.byte_offset(), Some(2));
    }

    #[rstest::rstest]
    #[case("ascii", 5)]
    #[case("h\u{00e9}llo", 5)]
    #[case("a\u{1F600}b", 4)]
    fn utf16_offset_at_line_end_counts_one_unit_per_bmp_char_and_two_per_surrogate_pair(#[case] line: &str, #[case] expected_utf16: u32) {
        let (reg, id) = registry_with(&format!("{line}\n"));
        let end_of_line = line.len();
        assert_eq!(reg.utf16_offset_in_line(&id, 1, end_of_line), Some(expected_utf16));
    }
}
