use std::path::PathBuf;
use std::sync::Arc;

use schema_ls_analyzer::markdown::MarkdownAnalysis;
use schema_ls_analyzer::Snapshot;

use crate::line_state::LineState;

/// `URI → (Version, Text, LineState, LatestSnapshot?)`, per §4.7.
pub(crate) struct DslDocument {
    pub version: i64,
    pub text: String,
    pub line_state: LineState,
    pub latest_snapshot: Option<Arc<Snapshot>>,
    pub path: PathBuf,
    /// Bumped on every open/edit; a completing worker discards its result if
    /// the document's generation has moved past the one it started with —
    /// the race-protection half of the version gate described in §4.7 (the
    /// other half, rejecting stale *incoming* versions, happens at the
    /// `document_changed` call site using `version` above).
    pub generation: u64,
}

/// `URI → (Version, Text, Blocks[], PerBlockSnapshots[])`, per §4.7.
pub(crate) struct MarkdownDocument {
    pub version: i64,
    pub text: String,
    pub path: PathBuf,
    pub latest_analysis: Option<Arc<MarkdownAnalysis>>,
    pub generation: u64,
}
