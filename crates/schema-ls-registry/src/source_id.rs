use std::fmt;
use std::path::{Path, PathBuf};

/// Canonical identifier for a source consumed by the analyzer.
///
/// Two variants: a file-backed source carries an absolute, symlink-resolved,
/// forward-slash-normalized path; a synthetic source carries an opaque
/// scheme-qualified string, used for tests and for Markdown virtual sources
/// (`<path>#block-<n>`). Two `SourceId`s are equal iff they refer to
/// identical content bytes within a single analysis.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceId {
    File(String),
    Synthetic(String),
}

impl SourceId {
    /// Build a file-backed id from an already-canonicalized absolute path.
    ///
    /// Callers are responsible for symlink resolution (see
    /// `schema-ls-analyzer`'s loader, which is the only place paths are
    /// canonicalized against the filesystem); this just normalizes the
    /// separator so the same file never produces two distinct ids on
    /// Windows vs. Unix.
    pub fn from_canonical_path(path: &Path) -> Self {
        SourceId::File(normalize_separators(&path.to_string_lossy()))
    }

    pub fn synthetic(scheme_qualified: impl Into<String>) -> Self {
        SourceId::Synthetic(scheme_qualified.into())
    }

    /// Build the virtual id for the `n`th fenced code block of a Markdown file.
    pub fn markdown_block(markdown_path: &Path, block_index: usize) -> Self {
        let base = normalize_separators(&markdown_path.to_string_lossy());
        SourceId::Synthetic(format!("{base}#block-{block_index}"))
    }

    pub fn as_file_path(&self) -> Option<PathBuf> {
        match self {
            SourceId::File(p) => Some(PathBuf::from(p)),
            SourceId::Synthetic(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SourceId::File(s) | SourceId::Synthetic(s) => s,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, SourceId::File(_))
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_ids_normalize_backslashes() {
        let id = SourceId::from_canonical_path(Path::new(r"C:\repo\main.dsl"));
        assert_eq!(id.as_str(), "C:/repo/main.dsl");
    }

    #[test]
    fn markdown_block_id_has_expected_shape() {
        let id = SourceId::markdown_block(Path::new("/docs/readme.md"), 2);
        assert_eq!(id.as_str(), "/docs/readme.md#block-2");
        assert!(!id.is_file());
    }

    #[test]
    fn equal_ids_compare_equal() {
        let a = SourceId::from_canonical_path(Path::new("/a/b.dsl"));
        let b = SourceId::from_canonical_path(Path::new("/a/b.dsl"));
        assert_eq!(a, b);
    }
}
