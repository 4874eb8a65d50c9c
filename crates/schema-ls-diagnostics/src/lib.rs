//! Diagnostic model and protocol renderer.
//!
//! Every analysis step in `schema-ls-analyzer` accumulates `Diagnostic`s
//! into a shared `DiagnosticCollector`; nothing aborts the analysis on a
//! recoverable error. The `Renderer` is the only place that knows how to
//! turn one into an `lsp_types::Diagnostic`.

mod model;
mod renderer;

pub use model::{Category, Diagnostic, DiagnosticCode, DiagnosticCollector, RelatedInfo, Severity};
pub use renderer::{build_uri, ByteFallbackPolicy, PositionEncoding, Renderer, RendererConfig};
