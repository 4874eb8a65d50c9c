//! Recursive-descent parser: token stream → typed [`Schema`] AST.
//!
//! Unlike the teacher's Markdown grammar, the schema DSL's AST is not a
//! lossless CST — §3 of the design specifies typed nodes carrying spans, not
//! a tree every byte must round-trip through. So instead of the teacher's
//! event/marker/Rowan machinery (built for exactly that round-trip
//! guarantee), this is a plain hand-written descent parser: easier to read,
//! and sufficient because nothing downstream needs to reconstruct source
//! text from the tree — the formatter re-tokenizes the raw text separately.

use schema_ls_diagnostics::{Diagnostic, DiagnosticCode, Severity};
use schema_ls_registry::{Position, SourceId, Span};

use crate::ast::*;
use crate::lexer::{lex, Token, TokenKind};

struct Item<'a> {
    token: Token<'a>,
    doc: Option<String>,
}

fn attach_docs<'a>(tokens: &[Token<'a>]) -> Vec<Item<'a>> {
    let mut out = Vec::new();
    let mut doc_buf: Vec<String> = Vec::new();
    let mut blank_run = 0u32;
    for tok in tokens {
        match tok.kind {
            TokenKind::Whitespace | TokenKind::LineComment => {}
            TokenKind::Newline => {
                blank_run += 1;
                if blank_run >= 2 {
                    doc_buf.clear();
                }
            }
            TokenKind::DocComment => {
                blank_run = 0;
                let text = tok.text.trim_start_matches('/').trim_start();
                doc_buf.push(text.to_string());
            }
            _ => {
                blank_run = 0;
                let doc = if doc_buf.is_empty() {
                    None
                } else {
                    Some(doc_buf.join("\n"))
                };
                doc_buf.clear();
                out.push(Item { token: *tok, doc });
            }
        }
    }
    out
}

/// Byte offset → 1-based (line, column), computed once for the whole file
/// being parsed (this parser has no access to a shared `SourceRegistry` —
/// it is handed raw text and produces spans the analyzer later registers).
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let mut starts = vec![0usize];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                starts.push(i + 1);
            }
        }
        Self { starts }
    }

    fn position(&self, byte: usize) -> Position {
        let line_idx = match self.starts.binary_search(&byte) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line_start = self.starts[line_idx];
        let column = (byte - line_start + 1) as u32;
        Position::new((line_idx + 1) as u32, column, byte)
    }
}

pub struct Parser<'a> {
    source_id: SourceId,
    text: &'a str,
    lines: LineIndex,
    items: Vec<Item<'a>>,
    idx: usize,
    diagnostics: Vec<Diagnostic>,
}

const TOP_LEVEL_KEYWORDS: &[&str] = &["schema", "import", "type"];

impl<'a> Parser<'a> {
    fn new(source_id: SourceId, text: &'a str) -> Self {
        let tokens = lex(text);
        Self {
            lines: LineIndex::new(text),
            items: attach_docs(&tokens),
            idx: 0,
            source_id,
            text,
            diagnostics: Vec::new(),
        }
    }

    fn span(&self, start: usize, end: usize) -> Span {
        Span::new(self.source_id.clone(), self.lines.position(start), self.lines.position(end))
    }

    fn cur(&self) -> &Token<'a> {
        &self.items[self.idx.min(self.items.len() - 1)].token
    }

    fn cur_doc(&self) -> Option<String> {
        self.items[self.idx.min(self.items.len() - 1)].doc.clone()
    }

    fn at_eof(&self) -> bool {
        self.cur().kind == TokenKind::Eof
    }

    fn at_kind(&self, kind: TokenKind) -> bool {
        self.cur().kind == kind
    }

    fn at_kw(&self, kw: &str) -> bool {
        self.cur().kind == TokenKind::Ident && self.cur().text == kw
    }

    fn bump(&mut self) -> Token<'a> {
        let tok = *self.cur();
        if self.idx < self.items.len() - 1 {
            self.idx += 1;
        }
        tok
    }

    fn error(&mut self, message: impl Into<String>) {
        let tok = *self.cur();
        self.diagnostics.push(Diagnostic::new(
            Severity::Error,
            DiagnosticCode::Syntax,
            message,
            self.span(tok.start, tok.end),
        ));
    }

    fn expect_kind(&mut self, kind: TokenKind, what: &str) -> Option<Token<'a>> {
        if self.at_kind(kind) {
            Some(self.bump())
        } else {
            self.error(format!("expected {what}, found '{}'", self.cur().text));
            None
        }
    }

    fn expect_kw(&mut self, kw: &str) -> bool {
        if self.at_kw(kw) {
            self.bump();
            true
        } else {
            self.error(format!("expected '{kw}', found '{}'", self.cur().text));
            false
        }
    }

    /// Skip tokens until a likely recovery point: a top-level keyword, a
    /// closing brace, or EOF. Keeps one malformed declaration from
    /// cascading into spurious errors for the rest of the file.
    fn recover_to_top_level(&mut self) {
        while !self.at_eof() {
            if self.at_kind(TokenKind::RBrace) {
                self.bump();
                return;
            }
            if TOP_LEVEL_KEYWORDS.iter().any(|kw| self.at_kw(kw)) {
                return;
            }
            self.bump();
        }
    }

    fn string_literal(&mut self) -> Option<(String, Span)> {
        let tok = self.expect_kind(TokenKind::StringLit, "a string literal")?;
        let span = self.span(tok.start, tok.end);
        let inner = &tok.text[1..tok.text.len() - 1];
        let unescaped = inner.replace("\\\"", "\"").replace("\\\\", "\\");
        Some((unescaped, span))
    }

    fn ident(&mut self) -> Option<(String, Span)> {
        let tok = self.expect_kind(TokenKind::Ident, "an identifier")?;
        Some((tok.text.to_string(), self.span(tok.start, tok.end)))
    }

    fn parse_type_ref(&mut self) -> Option<TypeRef> {
        let (first, first_span) = self.ident()?;
        if self.at_kind(TokenKind::Dot) {
            self.bump();
            let (second, second_span) = self.ident()?;
            Some(TypeRef {
                qualifier: Some(first),
                name: second,
                span: Span::new(self.source_id.clone(), first_span.start, second_span.end),
            })
        } else {
            Some(TypeRef { qualifier: None, name: first, span: first_span })
        }
    }

    fn parse_data_type_ref(&mut self) -> Option<DataTypeRef> {
        self.parse_type_ref().map(|t| DataTypeRef { qualifier: t.qualifier, name: t.name, span: t.span })
    }

    /// A constraint head: either a bare identifier (`String`) or an
    /// identifier followed by a bracketed literal list (`Enum["a","b"]`).
    fn parse_constraint(&mut self) -> Option<Constraint> {
        let start = self.cur().start;
        let (head, _) = self.ident()?;
        let mut values = Vec::new();
        if self.at_kind(TokenKind::LBracket) {
            self.bump();
            while !self.at_kind(TokenKind::RBracket) && !self.at_eof() {
                if let Some((v, _)) = self.string_literal() {
                    values.push(v);
                }
                if self.at_kind(TokenKind::Comma) {
                    self.bump();
                } else {
                    break;
                }
            }
            self.expect_kind(TokenKind::RBracket, "']'");
        }
        let end = self.items[self.idx.saturating_sub(1).min(self.items.len() - 1)].token.end;
        Some(Constraint { head, values, span: self.span(start, end.max(start)) })
    }

    fn parse_modifiers(&mut self) -> (bool, bool) {
        let mut optional = false;
        let mut primary_key = false;
        loop {
            if self.at_kw("optional") {
                self.bump();
                optional = true;
            } else if self.at_kw("required") {
                self.bump();
                optional = false;
            } else if self.at_kw("key") {
                self.bump();
                primary_key = true;
            } else {
                break;
            }
        }
        (optional, primary_key)
    }

    fn parse_relation(&mut self, kind: RelationKind) -> Option<Relation> {
        let start = self.cur().start;
        let doc = self.cur_doc();
        self.bump(); // arrow token already peeked by caller before dispatch
        let (field_name, name_span) = self.ident()?;
        self.expect_kind(TokenKind::LParen, "'('")?;
        let multiplicity = if self.at_kw("many") {
            self.bump();
            Multiplicity::Many
        } else if self.at_kw("one") {
            self.bump();
            Multiplicity::One
        } else {
            self.error("expected 'one' or 'many'");
            Multiplicity::One
        };
        self.expect_kind(TokenKind::RParen, "')'")?;
        let target = self.parse_type_ref()?;
        let (optional, _) = self.parse_modifiers();
        let mut properties = Vec::new();
        if self.at_kind(TokenKind::LBrace) {
            self.bump();
            while !self.at_kind(TokenKind::RBrace) && !self.at_eof() {
                if let Some(p) = self.parse_property() {
                    properties.push(p);
                } else {
                    self.recover_to_top_level();
                    break;
                }
            }
            self.expect_kind(TokenKind::RBrace, "'}'");
        }
        let end = self.items[self.idx.saturating_sub(1).min(self.items.len() - 1)].token.end;
        Some(Relation {
            kind,
            field_name,
            target,
            multiplicity,
            optional,
            span: self.span(start, end.max(start)),
            name_span,
            documentation: doc,
            properties,
        })
    }

    fn parse_property(&mut self) -> Option<Property> {
        let start = self.cur().start;
        let doc = self.cur_doc();
        let (name, name_span) = self.ident()?;
        let (constraint, data_type_ref) = if self.at_kind(TokenKind::Ident) {
            // Heuristic: a bare capitalized-looking head that isn't a known
            // built-in constraint name is treated as a data type alias
            // reference rather than an inline constraint.
            let head_text = self.cur().text.to_string();
            if is_builtin_constraint_head(&head_text) {
                (self.parse_constraint(), None)
            } else {
                (None, self.parse_data_type_ref())
            }
        } else {
            self.error("expected a constraint or data type reference");
            (None, None)
        };
        let (optional, primary_key) = self.parse_modifiers();
        let end = self.items[self.idx.saturating_sub(1).min(self.items.len() - 1)].token.end;
        Some(Property {
            name,
            constraint,
            data_type_ref,
            optional,
            primary_key,
            span: self.span(start, end.max(start)),
            name_span,
            documentation: doc,
        })
    }

    fn parse_invariant(&mut self) -> Option<Invariant> {
        let start = self.cur().start;
        let doc = self.cur_doc();
        self.bump(); // 'invariant'
        let (name, name_span) = self.ident()?;
        self.expect_kind(TokenKind::LBrace, "'{'")?;
        let body_start = self.cur().start;
        let mut depth = 1u32;
        let mut body_end = body_start;
        while depth > 0 && !self.at_eof() {
            match self.cur().kind {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => depth -= 1,
                _ => {}
            }
            if depth == 0 {
                break;
            }
            body_end = self.cur().end;
            self.bump();
        }
        self.expect_kind(TokenKind::RBrace, "'}'");
        let end = self.items[self.idx.saturating_sub(1).min(self.items.len() - 1)].token.end;
        let body = self.text.get(body_start..body_end).unwrap_or("").trim().to_string();
        Some(Invariant { name, span: self.span(start, end.max(start)), name_span, documentation: doc, body })
    }

    fn parse_type(&mut self) -> Option<Type> {
        let start = self.cur().start;
        let doc = self.cur_doc();
        let mut abstract_ = false;
        let mut part = false;
        loop {
            if self.at_kw("abstract") {
                self.bump();
                abstract_ = true;
            } else if self.at_kw("part") {
                self.bump();
                part = true;
            } else {
                break;
            }
        }
        if !self.expect_kw("type") {
            self.recover_to_top_level();
            return None;
        }
        let (name, name_span) = self.ident()?;
        let mut inherits = Vec::new();
        if self.at_kw("extends") {
            self.bump();
            loop {
                if let Some(r) = self.parse_type_ref() {
                    inherits.push(r);
                }
                if self.at_kind(TokenKind::Comma) {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect_kind(TokenKind::LBrace, "'{'")?;
        let mut properties = Vec::new();
        let mut associations = Vec::new();
        let mut compositions = Vec::new();
        let mut invariants = Vec::new();
        while !self.at_kind(TokenKind::RBrace) && !self.at_eof() {
            if self.at_kind(TokenKind::AssocArrow) {
                if let Some(r) = self.parse_relation(RelationKind::Association) {
                    associations.push(r);
                } else {
                    self.recover_to_top_level();
                }
            } else if self.at_kind(TokenKind::CompArrow) {
                if let Some(r) = self.parse_relation(RelationKind::Composition) {
                    compositions.push(r);
                } else {
                    self.recover_to_top_level();
                }
            } else if self.at_kw("invariant") {
                if let Some(i) = self.parse_invariant() {
                    invariants.push(i);
                } else {
                    self.recover_to_top_level();
                }
            } else if self.at_kind(TokenKind::Ident) {
                if let Some(p) = self.parse_property() {
                    properties.push(p);
                } else {
                    self.recover_to_top_level();
                }
            } else {
                self.error("expected a property, relation, or invariant");
                self.recover_to_top_level();
            }
        }
        self.expect_kind(TokenKind::RBrace, "'}'");
        let end = self.items[self.idx.saturating_sub(1).min(self.items.len() - 1)].token.end;
        Some(Type {
            name,
            span: self.span(start, end.max(start)),
            name_span,
            abstract_,
            part,
            documentation: doc,
            inherits,
            properties,
            associations,
            compositions,
            invariants,
        })
    }

    fn parse_data_type_alias(&mut self) -> Option<DataType> {
        let start = self.cur().start;
        let doc = self.cur_doc();
        self.bump(); // 'type'
        let (name, name_span) = self.ident()?;
        self.expect_kind(TokenKind::Eq, "'='")?;
        let constraint = self.parse_constraint()?;
        let end = self.items[self.idx.saturating_sub(1).min(self.items.len() - 1)].token.end;
        Some(DataType { name, constraint, span: self.span(start, end.max(start)), name_span, documentation: doc })
    }

    fn parse_import(&mut self) -> Option<Import> {
        let start = self.cur().start;
        self.bump(); // 'import'
        let (path, _) = self.string_literal()?;
        let alias = if self.at_kw("as") {
            self.bump();
            Some(self.ident()?.0)
        } else {
            None
        };
        let end = self.items[self.idx.saturating_sub(1).min(self.items.len() - 1)].token.end;
        Some(Import { path, alias, resolved_source_id: None, span: self.span(start, end.max(start)) })
    }

    /// `type X = Constraint` vs. a full type declaration both start with
    /// `type`; peek past the name for `=` to disambiguate.
    fn type_decl_is_alias(&self) -> bool {
        let mut j = self.idx + 1; // past 'type'
        if j < self.items.len() && self.items[j].token.kind == TokenKind::Ident {
            j += 1;
        }
        self.items.get(j).map(|i| i.token.kind) == Some(TokenKind::Eq)
    }

    pub fn parse_schema(mut self) -> (Schema, Vec<Diagnostic>) {
        let file_span = self.span(0, self.text.len());
        let mut name = None;
        let mut header_span = None;
        let mut imports = Vec::new();
        let mut types = Vec::new();
        let mut data_types = Vec::new();

        while !self.at_eof() {
            if self.at_kw("schema") {
                let start = self.cur().start;
                self.bump();
                if let Some((n, _)) = self.string_literal() {
                    if name.is_some() {
                        self.error("duplicate 'schema' declaration");
                    } else {
                        name = Some(n);
                    }
                }
                let end = self.items[self.idx.saturating_sub(1).min(self.items.len() - 1)].token.end;
                header_span = Some(self.span(start, end.max(start)));
            } else if self.at_kw("import") {
                if let Some(i) = self.parse_import() {
                    imports.push(i);
                } else {
                    self.recover_to_top_level();
                }
            } else if self.at_kw("abstract") || self.at_kw("part") {
                if let Some(t) = self.parse_type() {
                    types.push(t);
                } else {
                    self.recover_to_top_level();
                }
            } else if self.at_kw("type") {
                if self.type_decl_is_alias() {
                    if let Some(d) = self.parse_data_type_alias() {
                        data_types.push(d);
                    } else {
                        self.recover_to_top_level();
                    }
                } else if let Some(t) = self.parse_type() {
                    types.push(t);
                } else {
                    self.recover_to_top_level();
                }
            } else {
                self.error(format!("unexpected token '{}'", self.cur().text));
                self.recover_to_top_level();
            }
        }

        let schema = Schema {
            name,
            source_id: self.source_id.clone(),
            span: file_span,
            header_span,
            imports,
            types,
            data_types,
        };
        (schema, self.diagnostics)
    }
}

/// Every built-in constraint head the parser recognizes. Exposed so
/// completion can offer them without duplicating this list.
pub const BUILTIN_CONSTRAINT_HEADS: &[&str] = &["String", "Int", "Float", "Bool", "Boolean", "Date", "DateTime", "UUID", "Enum", "Pattern"];

fn is_builtin_constraint_head(head: &str) -> bool {
    BUILTIN_CONSTRAINT_HEADS.contains(&head)
}

/// Parse one source's text into a [`Schema`] and its syntax diagnostics.
pub fn parse(source_id: SourceId, text: &str) -> (Schema, Vec<Diagnostic>) {
    Parser::new(source_id, text).parse_schema()
}
