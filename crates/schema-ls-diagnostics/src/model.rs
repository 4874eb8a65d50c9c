use schema_ls_registry::Span;

/// Severity of a diagnostic, independent of how the protocol renders it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Error,
    Warning,
    Info,
    Hint,
}

/// Broad grouping used to decide ancillary behavior (e.g. whether a
/// diagnostic suppresses token-stream formatting).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Syntax,
    Import,
    Resolution,
    Semantic,
    Invariant,
}

/// A stable, symbolic diagnostic code clients can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCode {
    Syntax,
    ImportNotFound,
    ImportNotAllowed,
    ImportIo,
    ImportCycle,
    ResolveUnknownType,
    ResolveUnknownDataType,
    ResolveAmbiguousQualifier,
    SemanticDuplicateName,
    SemanticInvalidInheritance,
    SemanticMultiplicityConflict,
    InvariantMalformed,
}

impl DiagnosticCode {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticCode::Syntax => "E_SYNTAX",
            DiagnosticCode::ImportNotFound => "E_IMPORT_NOT_FOUND",
            DiagnosticCode::ImportNotAllowed => "E_IMPORT_NOT_ALLOWED",
            DiagnosticCode::ImportIo => "E_IMPORT_IO",
            DiagnosticCode::ImportCycle => "W_IMPORT_CYCLE",
            DiagnosticCode::ResolveUnknownType => "E_RESOLVE_UNKNOWN_TYPE",
            DiagnosticCode::ResolveUnknownDataType => "E_RESOLVE_UNKNOWN_DATATYPE",
            DiagnosticCode::ResolveAmbiguousQualifier => "E_RESOLVE_AMBIGUOUS_QUALIFIER",
            DiagnosticCode::SemanticDuplicateName => "E_TYPE_COLLISION",
            DiagnosticCode::SemanticInvalidInheritance => "E_SEMANTIC_INVALID_INHERITANCE",
            DiagnosticCode::SemanticMultiplicityConflict => "E_SEMANTIC_MULTIPLICITY_CONFLICT",
            DiagnosticCode::InvariantMalformed => "E_INVARIANT_MALFORMED",
        }
    }

    pub fn category(self) -> Category {
        match self {
            DiagnosticCode::Syntax => Category::Syntax,
            DiagnosticCode::ImportNotFound
            | DiagnosticCode::ImportNotAllowed
            | DiagnosticCode::ImportIo
            | DiagnosticCode::ImportCycle => Category::Import,
            DiagnosticCode::ResolveUnknownType
            | DiagnosticCode::ResolveUnknownDataType
            | DiagnosticCode::ResolveAmbiguousQualifier => Category::Resolution,
            DiagnosticCode::SemanticDuplicateName
            | DiagnosticCode::SemanticInvalidInheritance
            | DiagnosticCode::SemanticMultiplicityConflict => Category::Semantic,
            DiagnosticCode::InvariantMalformed => Category::Invariant,
        }
    }
}

/// Extra location attached to a diagnostic (e.g. "previous declaration here").
#[derive(Debug, Clone)]
pub struct RelatedInfo {
    pub span: Span,
    pub message: String,
}

/// One analyzer-produced diagnostic. Diagnostics without a `span` are
/// dropped by the renderer (no "file-level" banner) — see §7 of the design.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub span: Option<Span>,
    pub related: Vec<RelatedInfo>,
}

impl Diagnostic {
    pub fn new(severity: Severity, code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            span: Some(span),
            related: Vec::new(),
        }
    }

    pub fn category(&self) -> Category {
        self.code.category()
    }

    pub fn with_related(mut self, related: Vec<RelatedInfo>) -> Self {
        self.related = related;
        self
    }
}

/// Accumulates diagnostics across one analysis step. No step aborts the
/// whole analysis on a recoverable error — everything funnels through here.
#[derive(Debug, Default, Clone)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, other: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(other);
    }

    pub fn merge(&mut self, other: DiagnosticCollector) {
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.diagnostics.iter()
    }
}

impl std::ops::Index<usize> for DiagnosticCollector {
    type Output = Diagnostic;

    fn index(&self, index: usize) -> &Diagnostic {
        &self.diagnostics[index]
    }
}

impl<'a> IntoIterator for &'a DiagnosticCollector {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    #[case(DiagnosticCode::Syntax, "E_SYNTAX", Category::Syntax)]
    #[case(DiagnosticCode::ImportNotFound, "E_IMPORT_NOT_FOUND", Category::Import)]
    #[case(DiagnosticCode::ImportCycle, "W_IMPORT_CYCLE", Category::Import)]
    #[case(DiagnosticCode::ResolveUnknownType, "E_RESOLVE_UNKNOWN_TYPE", Category::Resolution)]
    #[case(DiagnosticCode::SemanticDuplicateName, "E_TYPE_COLLISION", Category::Semantic)]
    #[case(DiagnosticCode::InvariantMalformed, "E_INVARIANT_MALFORMED", Category::Invariant)]
    fn code_reports_its_stable_string_and_category(#[case] code: DiagnosticCode, #[case] expected_str: &str, #[case] expected_category: Category) {
        assert_eq!(code.as_str(), expected_str);
        assert_eq!(code.category(), expected_category);
    }
}
