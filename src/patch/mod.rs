//! Unified-diff patch engine.
//!
//! Parses textual unified diffs into an immutable [`Patch`] model and applies
//! them to files on disk without shelling out to an external diff/patch
//! utility. Application tolerates context drift: when a hunk's context no
//! longer matches at its nominal line, the applier searches a bounded window
//! around that position and relocates the hunk to the first offset where the
//! context lines up.
//!
//! Parsing and application are split: [`parser`] tokenizes the diff text into
//! typed line records and folds them into the AST; [`apply`] mutates files.
//! A failure in one file never aborts the other files of the same patch.

pub mod apply;
pub mod parser;

pub use apply::{apply, apply_with_options, ApplyOptions, ApplyReport, FileOutcome};
pub use parser::{parse, parse_with_root};

/// Kind of a single diff body line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLineKind {
    Context,
    Add,
    Remove,
}

/// One body line of a hunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: DiffLineKind,
    pub text: String,
}

/// One contiguous block of changes at a specific location in a file.
///
/// Invariant (checked by the parser): the number of Context+Remove lines
/// equals `old_count`, and Context+Add lines equal `new_count`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// 1-based start line in the original file (0 for pure insertions).
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<DiffLine>,
}

impl Hunk {
    /// Lines this hunk expects to find in the original file.
    pub fn old_lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .filter(|l| matches!(l.kind, DiffLineKind::Context | DiffLineKind::Remove))
            .map(|l| l.text.as_str())
    }

    /// Lines this hunk produces in the patched file.
    pub fn new_lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .filter(|l| matches!(l.kind, DiffLineKind::Context | DiffLineKind::Add))
            .map(|l| l.text.as_str())
    }
}

/// All hunks targeting one file. Hunks are ordered by ascending `old_start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub from_path: String,
    pub to_path: String,
    pub hunks: Vec<Hunk>,
}

/// An immutable parsed patch document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Patch {
    pub files: Vec<FileDiff>,
}

impl Patch {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
