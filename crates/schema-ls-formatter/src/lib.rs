//! Two formatting modes for the schema definition language: a conservative
//! line-based pass that tolerates invalid syntax, and a canonical
//! AST-driven reflow that requires a clean parse. See spec §4.9.

mod document;
mod token_stream;
mod wrap;

pub use document::format_document;
pub use token_stream::format_token_stream;
pub use wrap::WrapConfig;
