use lsp_types::{
    DiagnosticRelatedInformation, DiagnosticSeverity, Location, NumberOrString, Position as LspPosition, Range as LspRange,
};
use url::Url;

use schema_ls_registry::{Position, SourceId, SourceRegistry};

use crate::model::{Diagnostic, Severity};

/// Negotiated position encoding, fixed at `initialize` time. See §6 of the
/// design: UTF-16 is preferred, UTF-8 is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionEncoding {
    Utf16,
    Utf8,
}

/// What to do when a diagnostic's span carries an unknown byte offset
/// (`Position::byte == -1`, e.g. a recovery-path diagnostic that only has a
/// textual line/column estimate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteFallbackPolicy {
    /// Drop the diagnostic rather than publish an inexact range.
    Omit,
    /// Use `column - 1` as the code-unit offset. Lossy for non-ASCII lines
    /// preceding the position, but keeps the diagnostic visible.
    Approximate,
}

#[derive(Debug, Clone, Copy)]
pub struct RendererConfig {
    pub position_encoding: PositionEncoding,
    pub byte_fallback: ByteFallbackPolicy,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            position_encoding: PositionEncoding::Utf16,
            byte_fallback: ByteFallbackPolicy::Omit,
        }
    }
}

/// Converts analyzer diagnostics into protocol-shaped ones, using exact
/// UTF-16/UTF-8 code-unit math from the `SourceRegistry` wherever a byte
/// offset is known.
pub struct Renderer<'a> {
    registry: &'a SourceRegistry,
    config: RendererConfig,
}

impl<'a> Renderer<'a> {
    pub fn new(registry: &'a SourceRegistry, config: RendererConfig) -> Self {
        Self { registry, config }
    }

    /// Render one diagnostic. Returns `None` if it has no span, or its span
    /// has an unknown byte offset under `ByteFallbackPolicy::Omit`.
    pub fn render(&self, diagnostic: &Diagnostic) -> Option<lsp_types::Diagnostic> {
        let span = diagnostic.span.as_ref()?;
        let range = LspRange {
            start: self.convert_position(&span.source, span.start)?,
            end: self.convert_position(&span.source, span.end)?,
        };

        let related_information = if diagnostic.related.is_empty() {
            None
        } else {
            let mut out = Vec::with_capacity(diagnostic.related.len());
            for r in &diagnostic.related {
                let Some(start) = self.convert_position(&r.span.source, r.span.start) else {
                    continue;
                };
                let Some(end) = self.convert_position(&r.span.source, r.span.end) else {
                    continue;
                };
                out.push(DiagnosticRelatedInformation {
                    location: Location {
                        uri: self.build_uri(&r.span.source),
                        range: LspRange { start, end },
                    },
                    message: r.message.clone(),
                });
            }
            Some(out)
        };

        Some(lsp_types::Diagnostic {
            range,
            severity: Some(map_severity(diagnostic.severity)),
            code: Some(NumberOrString::String(diagnostic.code.as_str().to_string())),
            code_description: None,
            source: Some("schema-ls".to_string()),
            message: diagnostic.message.clone(),
            related_information,
            tags: None,
            data: None,
        })
    }

    /// Render every diagnostic addressed at `source`, dropping any that fail
    /// the byte-fallback policy.
    pub fn render_all_for(&self, source: &SourceId, diagnostics: &[Diagnostic]) -> Vec<lsp_types::Diagnostic> {
        diagnostics
            .iter()
            .filter(|d| d.span.as_ref().map(|s| &s.source) == Some(source))
            .filter_map(|d| self.render(d))
            .collect()
    }

    fn convert_position(&self, source: &SourceId, pos: Position) -> Option<LspPosition> {
        if let Some(byte) = pos.byte_offset() {
            let character = match self.config.position_encoding {
                PositionEncoding::Utf16 => self.registry.utf16_offset_in_line(source, pos.line, byte)?,
                PositionEncoding::Utf8 => self.registry.utf8_offset_in_line(source, pos.line, byte)?,
            };
            return Some(LspPosition {
                line: pos.line.saturating_sub(1),
                character,
            });
        }
        match self.config.byte_fallback {
            ByteFallbackPolicy::Omit => None,
            ByteFallbackPolicy::Approximate => Some(LspPosition {
                line: pos.line.saturating_sub(1),
                character: pos.column.saturating_sub(1),
            }),
        }
    }

    /// Build the protocol URI for a `SourceId`. File-backed ids become
    /// `file://` URIs with percent-encoding of non-unreserved characters;
    /// synthetic ids pass through their string form.
    pub fn build_uri(&self, source: &SourceId) -> Url {
        build_uri(source)
    }
}

pub fn build_uri(source: &SourceId) -> Url {
    match source {
        SourceId::File(path) => {
            Url::from_file_path(path).unwrap_or_else(|_| Url::parse("file:///invalid").unwrap())
        }
        SourceId::Synthetic(s) => {
            Url::parse(s).unwrap_or_else(|_| {
                Url::parse(&format!("urn:schema-ls:{}", utf8_percent_encode(s))).unwrap()
            })
        }
    }
}

fn utf8_percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        let is_unreserved = b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~' | b'/' | b'#' | b':');
        if is_unreserved {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

fn map_severity(severity: Severity) -> DiagnosticSeverity {
    match severity {
        Severity::Fatal | Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Info => DiagnosticSeverity::INFORMATION,
        Severity::Hint => DiagnosticSeverity::HINT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DiagnosticCode;
    use schema_ls_registry::Span;

    fn registry_with(text: &str) -> (SourceRegistry, SourceId) {
        let mut reg = SourceRegistry::new();
        let id = SourceId::synthetic("test://doc.dsl");
        reg.register(id.clone(), text.as_bytes().to_vec()).unwrap();
        (reg, id)
    }

    #[test]
    fn diagnostic_without_span_is_omitted() {
        let (reg, _id) = registry_with("abc\n");
        let renderer = Renderer::new(&reg, RendererConfig::default());
        let d = Diagnostic {
            severity: Severity::Error,
            code: DiagnosticCode::Syntax,
            message: "oops".into(),
            span: None,
            related: vec![],
        };
        assert!(renderer.render(&d).is_none());
    }

    #[test]
    fn known_byte_position_renders_exact_range() {
        let (reg, id) = registry_with("type Foo {}\n");
        let renderer = Renderer::new(&reg, RendererConfig::default());
        let span = Span::new(
            id,
            Position::new(1, 1, 0),
            Position::new(1, 9, 8),
        );
        let d = Diagnostic::new(Severity::Warning, DiagnosticCode::SemanticDuplicateName, "dup", span);
        let rendered = renderer.render(&d).unwrap();
        assert_eq!(rendered.range.start, LspPosition { line: 0, character: 0 });
        assert_eq!(rendered.range.end, LspPosition { line: 0, character: 8 });
        assert_eq!(rendered.severity, Some(DiagnosticSeverity::WARNING));
    }

    #[test]
    fn unknown_byte_omit_policy_drops_diagnostic() {
        let (reg, id) = registry_with("abc\n");
        let renderer = Renderer::new(
            &reg,
            RendererConfig { position_encoding: PositionEncoding::Utf16, byte_fallback: ByteFallbackPolicy::Omit },
        );
        let span = Span::new(id, Position::without_byte(1, 3), Position::without_byte(1, 4));
        let d = Diagnostic::new(Severity::Error, DiagnosticCode::Syntax, "x", span);
        assert!(renderer.render(&d).is_none());
    }

    #[test]
    fn unknown_byte_approximate_policy_uses_column_minus_one() {
        let (reg, id) = registry_with("abc\n");
        let renderer = Renderer::new(
            &reg,
            RendererConfig {
                position_encoding: PositionEncoding::Utf16,
                byte_fallback: ByteFallbackPolicy::Approximate,
            },
        );
        let span = Span::new(id, Position::without_byte(1, 3), Position::without_byte(1, 4));
        let d = Diagnostic::new(Severity::Error, DiagnosticCode::Syntax, "x", span);
        let rendered = renderer.render(&d).unwrap();
        assert_eq!(rendered.range.start.character, 2);
        assert_eq!(rendered.range.end.character, 3);
    }

    #[test]
    fn synthetic_source_uri_passes_through() {
        let id = SourceId::synthetic("file:///tmp/readme.md%23block-0");
        let uri = build_uri(&id);
        assert_eq!(uri.scheme(), "file");
    }
}
