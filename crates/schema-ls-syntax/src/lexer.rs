//! # Lexer — tokenizing schema source
//!
//! This is the first stage of parsing: breaking source text into tokens
//! using the [Logos] lexer generator.
//!
//! [Logos]: https://docs.rs/logos
//!
//! ## The lossless guarantee
//!
//! Every byte in the input appears in exactly one token, including
//! whitespace, newlines and comments — the parser decides what is
//! significant and what is trivia, the lexer never discards bytes. This
//! keeps byte offsets trivially recoverable from the token stream, which is
//! what lets every AST node carry an exact `Span`.
//!
//! ## Token design philosophy
//!
//! Tokens are minimal and context-free: the lexer doesn't know that `type`
//! is a keyword or that `Enum` heads a constraint — it only knows "this is
//! an identifier". Keyword/constraint-head recognition is the parser's job,
//! done by comparing identifier text. This mirrors the teacher's own
//! Markdown lexer, which likewise keeps `*`/`-`/`+` meaning-free until the
//! parser decides whether they start a list, emphasis, or a thematic break.

use logos::Logos;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"")]
pub enum TokenKind {
    #[regex(r"[ \t]+")]
    Whitespace,

    #[regex(r"\r?\n")]
    Newline,

    /// `///` doc comment line (content after the slashes, trivia to the
    /// lexer but attached to the following declaration by the parser).
    #[regex(r"///[^\n]*")]
    DocComment,

    /// `//` plain comment line.
    #[regex(r"//[^\n]*")]
    LineComment,

    /// A double-quoted string literal. Supports `\"` and `\\` escapes only;
    /// anything else passes through verbatim.
    #[regex(r#""([^"\\]|\\.)*""#)]
    StringLit,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,

    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("=")]
    Eq,

    /// `-->` association arrow.
    #[token("-->")]
    AssocArrow,
    /// `*-->` composition arrow.
    #[token("*-->")]
    CompArrow,

    Eof,
}

impl TokenKind {
    pub fn is_trivia(self) -> bool {
        matches!(self, TokenKind::Whitespace | TokenKind::DocComment | TokenKind::LineComment)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte offset of the token's first byte within the source.
    pub start: usize,
    /// Byte offset one past the token's last byte.
    pub end: usize,
}

/// Tokenize `input`, returning every token including trivia (whitespace,
/// comments, newlines) plus a trailing synthetic EOF token. Concatenating
/// every `token.text` (excluding the synthetic EOF) reproduces `input`
/// exactly.
pub fn lex(input: &str) -> Vec<Token<'_>> {
    let mut lexer = TokenKind::lexer(input);
    let mut tokens = Vec::new();
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(kind) => tokens.push(Token {
                kind,
                text: &input[span.clone()],
                start: span.start,
                end: span.end,
            }),
            Err(()) => tokens.push(Token {
                kind: TokenKind::Ident, // unknown byte run; parser treats as opaque text
                text: &input[span.clone()],
                start: span.start,
                end: span.end,
            }),
        }
    }
    tokens.push(Token {
        kind: TokenKind::Eof,
        text: "",
        start: input.len(),
        end: input.len(),
    });
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexing_is_lossless() {
        let input = "type Foo {\n  name String required\n}\n";
        let tokens = lex(input);
        let reconstructed: String = tokens.iter().map(|t| t.text).collect();
        assert_eq!(input, reconstructed);
    }

    #[test]
    fn doc_comments_are_their_own_kind() {
        let tokens = lex("/// hello\ntype Foo {}\n");
        assert_eq!(tokens[0].kind, TokenKind::DocComment);
        assert_eq!(tokens[0].text, "/// hello");
    }

    #[test]
    fn arrows_are_single_tokens() {
        let tokens = lex("--> *-->");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert!(kinds.contains(&TokenKind::AssocArrow));
        assert!(kinds.contains(&TokenKind::CompArrow));
    }
}
