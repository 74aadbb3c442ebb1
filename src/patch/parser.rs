//! Two-phase unified-diff parser.
//!
//! Phase one tokenizes each input line into a typed record; phase two folds
//! the token stream into the immutable [`Patch`] AST, validating hunk line
//! counts and ordering along the way. Keeping the phases separate means the
//! line classification and the folding invariants are testable on their own,
//! with no mutable "current file / current hunk" variables leaking between
//! concerns.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::PatchError;

use super::{DiffLine, DiffLineKind, FileDiff, Hunk, Patch};

// @@ -<n>[,<m>] +<n2>[,<m2>] @@ with counts defaulting to 1 when omitted.
static HUNK_HEADER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("Invalid hunk header regex")
});

/// One classified input line. Line numbers are kept for error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LineToken {
    /// `--- <path>` — opens a new file diff. The raw line is kept because
    /// inside an incomplete hunk the same shape is a removed line whose
    /// content starts with `-- `.
    OldFile { path: String, raw: String },
    /// `+++ <path>` — destination path of the current file diff.
    NewFile { path: String, raw: String },
    /// `@@ -a[,b] +c[,d] @@`
    HunkHeader {
        old_start: usize,
        old_count: usize,
        new_start: usize,
        new_count: usize,
    },
    Body(DiffLine),
    /// Anything else: `diff --git` lines, `index` lines, mode lines,
    /// `\ No newline at end of file`, blank separators.
    Other(String),
}

/// Strip the `a/` or `b/` VCS prefix and an optional pipeline root segment.
fn strip_path_prefix(raw: &str, root: Option<&str>) -> String {
    let mut path = raw.trim();
    // `--- a/x.c\t2024-01-01` style timestamps
    if let Some(tab) = path.find('\t') {
        path = &path[..tab];
    }
    for vcs in ["a/", "b/"] {
        if let Some(rest) = path.strip_prefix(vcs) {
            path = rest;
            break;
        }
    }
    if let Some(root) = root {
        let with_slash = format!("{}/", root.trim_end_matches('/'));
        if let Some(rest) = path.strip_prefix(&with_slash) {
            path = rest;
        }
    }
    path.to_string()
}

/// Phase one: classify every line of the patch text.
pub(crate) fn tokenize(text: &str, root: Option<&str>) -> Vec<(usize, LineToken)> {
    let mut tokens = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let lineno = idx + 1;
        let token = if let Some(path) = line.strip_prefix("--- ") {
            LineToken::OldFile {
                path: strip_path_prefix(path, root),
                raw: line.to_string(),
            }
        } else if let Some(path) = line.strip_prefix("+++ ") {
            LineToken::NewFile {
                path: strip_path_prefix(path, root),
                raw: line.to_string(),
            }
        } else if let Some(caps) = HUNK_HEADER_REGEX.captures(line) {
            let parse = |i: usize, default: usize| -> usize {
                caps.get(i)
                    .map(|m| m.as_str().parse().unwrap_or(default))
                    .unwrap_or(default)
            };
            LineToken::HunkHeader {
                old_start: parse(1, 0),
                old_count: parse(2, 1),
                new_start: parse(3, 0),
                new_count: parse(4, 1),
            }
        } else if let Some(text) = line.strip_prefix('+') {
            LineToken::Body(DiffLine {
                kind: DiffLineKind::Add,
                text: text.to_string(),
            })
        } else if let Some(text) = line.strip_prefix('-') {
            LineToken::Body(DiffLine {
                kind: DiffLineKind::Remove,
                text: text.to_string(),
            })
        } else if let Some(text) = line.strip_prefix(' ') {
            LineToken::Body(DiffLine {
                kind: DiffLineKind::Context,
                text: text.to_string(),
            })
        } else {
            LineToken::Other(line.to_string())
        };
        tokens.push((lineno, token));
    }
    tokens
}

/// Parse a unified-diff document into a [`Patch`].
///
/// A malformed header or a hunk whose body does not add up to its declared
/// counts aborts parsing of this one document with
/// [`PatchError::Malformed`]; whether that is fatal for the whole run is the
/// caller's decision.
pub fn parse(text: &str) -> Result<Patch, PatchError> {
    parse_with_root(text, None)
}

/// Like [`parse`], additionally stripping a fixed leading path segment
/// (e.g. the archive's root directory) from every file path.
pub fn parse_with_root(text: &str, root: Option<&str>) -> Result<Patch, PatchError> {
    fold(tokenize(text, root))
}

struct OpenHunk {
    hunk: Hunk,
    header_line: usize,
}

impl OpenHunk {
    fn seen_old(&self) -> usize {
        self.hunk
            .lines
            .iter()
            .filter(|l| matches!(l.kind, DiffLineKind::Context | DiffLineKind::Remove))
            .count()
    }

    fn seen_new(&self) -> usize {
        self.hunk
            .lines
            .iter()
            .filter(|l| matches!(l.kind, DiffLineKind::Context | DiffLineKind::Add))
            .count()
    }

    fn complete(&self) -> bool {
        self.seen_old() >= self.hunk.old_count && self.seen_new() >= self.hunk.new_count
    }

    fn close(self) -> Result<Hunk, PatchError> {
        if self.seen_old() != self.hunk.old_count || self.seen_new() != self.hunk.new_count {
            return Err(PatchError::Malformed {
                line: self.header_line,
                reason: format!(
                    "hunk body does not match declared counts (-{} +{}, saw -{} +{})",
                    self.hunk.old_count,
                    self.hunk.new_count,
                    self.seen_old(),
                    self.seen_new()
                ),
            });
        }
        Ok(self.hunk)
    }
}

struct OpenFile {
    diff: FileDiff,
    header_line: usize,
}

/// Phase two: fold tokens into the AST.
fn fold(tokens: Vec<(usize, LineToken)>) -> Result<Patch, PatchError> {
    let mut files: Vec<FileDiff> = Vec::new();
    let mut current_file: Option<OpenFile> = None;
    let mut current_hunk: Option<OpenHunk> = None;

    fn close_hunk(
        hunk: Option<OpenHunk>,
        file: &mut Option<OpenFile>,
    ) -> Result<(), PatchError> {
        if let Some(open) = hunk {
            let header_line = open.header_line;
            let hunk = open.close()?;
            let file = file.as_mut().ok_or(PatchError::Malformed {
                line: header_line,
                reason: "hunk outside of a file diff".to_string(),
            })?;
            if let Some(prev) = file.diff.hunks.last() {
                // Strictly ascending: two hunks anchored at the same line
                // overlap and cannot both apply.
                if hunk.old_start <= prev.old_start {
                    return Err(PatchError::Malformed {
                        line: header_line,
                        reason: "hunks are not ordered by ascending old_start".to_string(),
                    });
                }
            }
            file.diff.hunks.push(hunk);
        }
        Ok(())
    }

    for (lineno, token) in tokens {
        match token {
            LineToken::OldFile { path, raw } => {
                // Inside a hunk that still owes body lines this is not a
                // header: it is a removed line whose content starts with
                // `-- ` (the leading `-` is the diff marker).
                if let Some(open) = current_hunk.as_mut() {
                    if !open.complete() {
                        open.hunk.lines.push(DiffLine {
                            kind: DiffLineKind::Remove,
                            text: raw[1..].to_string(),
                        });
                        continue;
                    }
                }
                close_hunk(current_hunk.take(), &mut current_file)?;
                if let Some(open) = current_file.take() {
                    files.push(open.diff);
                }
                current_file = Some(OpenFile {
                    diff: FileDiff {
                        from_path: path,
                        to_path: String::new(),
                        hunks: Vec::new(),
                    },
                    header_line: lineno,
                });
            }
            LineToken::NewFile { path, raw } => {
                if let Some(open) = current_hunk.as_mut() {
                    if !open.complete() {
                        open.hunk.lines.push(DiffLine {
                            kind: DiffLineKind::Add,
                            text: raw[1..].to_string(),
                        });
                        continue;
                    }
                }
                let file = current_file.as_mut().ok_or(PatchError::Malformed {
                    line: lineno,
                    reason: "'+++' header without preceding '---' header".to_string(),
                })?;
                file.diff.to_path = path;
            }
            LineToken::HunkHeader {
                old_start,
                old_count,
                new_start,
                new_count,
            } => {
                close_hunk(current_hunk.take(), &mut current_file)?;
                let file = current_file.as_ref().ok_or(PatchError::Malformed {
                    line: lineno,
                    reason: "hunk header outside of a file diff".to_string(),
                })?;
                if file.diff.to_path.is_empty() {
                    return Err(PatchError::Malformed {
                        line: lineno,
                        reason: "hunk header before '+++' destination header".to_string(),
                    });
                }
                current_hunk = Some(OpenHunk {
                    hunk: Hunk {
                        old_start,
                        old_count,
                        new_start,
                        new_count,
                        lines: Vec::new(),
                    },
                    header_line: lineno,
                });
            }
            LineToken::Body(line) => {
                // Body lines only belong to an open, still-incomplete hunk;
                // anywhere else they are preamble noise (e.g. commit message
                // lines that happen to start with a space).
                if let Some(open) = current_hunk.as_mut() {
                    if !open.complete() {
                        open.hunk.lines.push(line);
                    }
                }
            }
            LineToken::Other(text) => {
                // A truly empty line inside an incomplete hunk is an empty
                // context line that lost its leading space in transit.
                if text.is_empty() {
                    if let Some(open) = current_hunk.as_mut() {
                        if !open.complete() {
                            open.hunk.lines.push(DiffLine {
                                kind: DiffLineKind::Context,
                                text: String::new(),
                            });
                        }
                    }
                }
            }
        }
    }

    close_hunk(current_hunk.take(), &mut current_file)?;
    if let Some(open) = current_file.take() {
        files.push(open.diff);
    }

    // A file diff with no destination path never saw its '+++' header.
    if let Some(bad) = files.iter().find(|f| f.to_path.is_empty()) {
        return Err(PatchError::Malformed {
            line: 0,
            reason: format!("file diff for '{}' has no '+++' header", bad.from_path),
        });
    }

    Ok(Patch { files })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = "\
--- a/src/hello.c
+++ b/src/hello.c
@@ -1,3 +1,4 @@
 #include <stdio.h>
+#include <stdlib.h>
 int main(void) {
   return 0;
";

    #[test]
    fn parses_single_hunk() {
        let patch = parse(SIMPLE).unwrap();
        assert_eq!(patch.files.len(), 1);
        let file = &patch.files[0];
        assert_eq!(file.from_path, "src/hello.c");
        assert_eq!(file.to_path, "src/hello.c");
        assert_eq!(file.hunks.len(), 1);
        let hunk = &file.hunks[0];
        assert_eq!((hunk.old_start, hunk.old_count), (1, 3));
        assert_eq!((hunk.new_start, hunk.new_count), (1, 4));
        assert_eq!(hunk.lines.len(), 4);
        assert_eq!(hunk.lines[1].kind, DiffLineKind::Add);
    }

    #[test]
    fn omitted_counts_default_to_one() {
        let text = "\
--- a/f
+++ b/f
@@ -3 +3 @@
-old
+new
";
        let patch = parse(text).unwrap();
        let hunk = &patch.files[0].hunks[0];
        assert_eq!(hunk.old_count, 1);
        assert_eq!(hunk.new_count, 1);
    }

    #[test]
    fn strips_root_segment() {
        let text = "\
--- a/node/src/env.cc
+++ b/node/src/env.cc
@@ -1 +1 @@
-x
+y
";
        let patch = parse_with_root(text, Some("node")).unwrap();
        assert_eq!(patch.files[0].to_path, "src/env.cc");
    }

    #[test]
    fn git_preamble_is_ignored() {
        let text = "\
diff --git a/f b/f
index e69de29..4b825dc 100644
--- a/f
+++ b/f
@@ -1 +1 @@
-x
+y
";
        let patch = parse(text).unwrap();
        assert_eq!(patch.files.len(), 1);
        assert_eq!(patch.files[0].hunks.len(), 1);
    }

    #[test]
    fn multiple_files_fold_in_order() {
        let text = "\
--- a/one
+++ b/one
@@ -1 +1 @@
-a
+b
--- a/two
+++ b/two
@@ -2,2 +2,2 @@
 keep
-c
+d
";
        let patch = parse(text).unwrap();
        assert_eq!(patch.files.len(), 2);
        assert_eq!(patch.files[1].to_path, "two");
        assert_eq!(patch.files[1].hunks[0].old_count, 2);
    }

    #[test]
    fn count_mismatch_is_malformed() {
        let text = "\
--- a/f
+++ b/f
@@ -1,3 +1,3 @@
 only one line
";
        match parse(text) {
            Err(PatchError::Malformed { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected malformed error, got {:?}", other),
        }
    }

    #[test]
    fn hunk_without_file_is_malformed() {
        let text = "@@ -1 +1 @@\n-x\n+y\n";
        assert!(matches!(parse(text), Err(PatchError::Malformed { .. })));
    }

    #[test]
    fn dash_prefixed_body_lines_stay_in_the_hunk() {
        // A removed line whose content starts with `-- ` looks like a file
        // header to the tokenizer; while the hunk still owes body lines it
        // must be folded as a Remove line instead.
        let text = "\
--- a/f
+++ b/f
@@ -1,3 +1,3 @@
 keep
--- separator line
+++ replacement line
 tail
";
        let patch = parse(text).unwrap();
        assert_eq!(patch.files.len(), 1);
        let hunk = &patch.files[0].hunks[0];
        assert_eq!(hunk.lines.len(), 4);
        assert_eq!(hunk.lines[1].kind, DiffLineKind::Remove);
        assert_eq!(hunk.lines[1].text, "-- separator line");
        assert_eq!(hunk.lines[2].kind, DiffLineKind::Add);
        assert_eq!(hunk.lines[2].text, "++ replacement line");
    }

    #[test]
    fn header_after_complete_hunk_still_opens_a_file() {
        // Once the hunk's counts are satisfied a `--- ` line is a real file
        // header again.
        let text = "\
--- a/one
+++ b/one
@@ -1 +1 @@
-x
+y
--- a/two
+++ b/two
@@ -1 +1 @@
-p
+q
";
        let patch = parse(text).unwrap();
        assert_eq!(patch.files.len(), 2);
        assert_eq!(patch.files[1].from_path, "two");
    }

    #[test]
    fn equal_old_start_hunks_are_malformed() {
        let text = "\
--- a/f
+++ b/f
@@ -2 +2 @@
-x
+y
@@ -2 +2 @@
-p
+q
";
        assert!(matches!(parse(text), Err(PatchError::Malformed { .. })));
    }

    #[test]
    fn unordered_hunks_are_malformed() {
        let text = "\
--- a/f
+++ b/f
@@ -10 +10 @@
-x
+y
@@ -2 +2 @@
-p
+q
";
        assert!(matches!(parse(text), Err(PatchError::Malformed { .. })));
    }

    #[test]
    fn tokenizer_classifies_lines() {
        let tokens = tokenize("--- a/f\n+++ b/f\n@@ -1,2 +1,2 @@\n junk\n", None);
        assert!(matches!(tokens[0].1, LineToken::OldFile { .. }));
        assert!(matches!(tokens[1].1, LineToken::NewFile { .. }));
        assert!(matches!(tokens[2].1, LineToken::HunkHeader { old_count: 2, .. }));
        assert!(matches!(
            tokens[3].1,
            LineToken::Body(DiffLine {
                kind: DiffLineKind::Context,
                ..
            })
        ));
    }
}
