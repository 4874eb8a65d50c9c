//! Canonical source identifiers, byte storage and position-encoding
//! conversion for the schema language server.
//!
//! This is the one piece of the analyzer pipeline every other crate depends
//! on: a `SourceRegistry` owns the exact bytes of every file/overlay/virtual
//! source used by one analysis, and is the only component allowed to answer
//! "what line/column is byte N" or "what UTF-16 offset is byte N".

mod position;
mod registry;
mod source_id;

pub use position::{Position, Span};
pub use registry::{CodeUnitEncoding, RegistryError, SourceRegistry};
pub use source_id::SourceId;
