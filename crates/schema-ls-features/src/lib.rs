//! Hover, definition, completion, document-symbol and formatting providers
//! (§4.8, §4.9). Each provider reads the latest `Snapshot`/overlay the
//! `schema-ls-workspace` crate holds for a URI; none of them touch disk or
//! the analyzer directly.

mod completion;
mod definition;
mod document_symbol;
mod formatting;
mod hover;
mod position;
#[cfg(test)]
mod test_support;

pub use completion::completion;
pub use definition::definition;
pub use document_symbol::document_symbol;
pub use formatting::formatting;
pub use hover::hover;
pub use position::{resolve_position, span_to_range, ResolvedPosition};
