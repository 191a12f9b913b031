//! Domain models for window snapshots, repository context, and line ranges.

use std::path::PathBuf;

/// State read from an editor window: the file it shows, its text, and the selection.
///
/// Offsets count Unicode scalar values from the start of `body`, and
/// `selection_end >= selection_start` holds for every snapshot handed out by the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub path: PathBuf,
    pub body: Vec<u8>,
    pub selection_start: usize,
    pub selection_end: usize,
}

/// Repository coordinates of a file at the current commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoContext {
    /// `owner/name` as derived from the origin remote.
    pub slug: String,
    /// Slash-separated path from the repository root.
    pub relative_path: String,
    pub commit: String,
}

/// 1-based inclusive line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn is_single_line(&self) -> bool {
        self.end == self.start
    }
}
