//! Lexing and parsing for the schema definition language.
//!
//! [`parse`] is the single entry point: given a [`SourceId`] (for span
//! attribution) and the raw text of one source, it returns a typed
//! [`ast::Schema`] plus any syntax diagnostics encountered. Parsing never
//! fails outright — malformed input recovers at the next top-level
//! declaration and keeps going, so a single typo doesn't blank out
//! diagnostics for the rest of the file.

pub mod ast;
mod lexer;
mod parser;

pub use lexer::{lex, Token, TokenKind};
pub use parser::{parse, BUILTIN_CONSTRAINT_HEADS};
