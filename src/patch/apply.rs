//! Hunk application with fuzzy relocation.
//!
//! Applies a parsed [`Patch`] to files under a root directory. Each file is
//! patched against an in-memory copy and written back atomically (temp file
//! plus rename) only when every hunk in that file lands; a file whose context
//! has drifted beyond the search window is reported as fatal for that file
//! alone and the remaining files still get their chance.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::PatchError;
use crate::models::StageResult;

use super::{Hunk, Patch};

/// Tunables for patch application.
#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions {
    /// How far (in lines, each direction) to search for drifted context.
    pub fuzz_window: usize,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        ApplyOptions {
            fuzz_window: crate::context::DEFAULT_FUZZ_WINDOW,
        }
    }
}

/// Application outcome for one target file.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: StageResult,
}

/// Per-file outcomes of applying one patch document.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub files: Vec<FileOutcome>,
}

impl ApplyReport {
    /// Aggregate outcome: `Success` when every file applied, `Fatal` when
    /// none did, `PartialSuccess` in between.
    pub fn overall(&self) -> StageResult {
        let total = self.files.len();
        let applied = self.files.iter().filter(|f| f.result.is_success()).count();
        if applied == total {
            StageResult::Success
        } else if applied == 0 {
            StageResult::Fatal {
                reason: "no file in the patch could be applied".to_string(),
            }
        } else {
            StageResult::PartialSuccess { applied, total }
        }
    }

    pub fn applied_count(&self) -> usize {
        self.files.iter().filter(|f| f.result.is_success()).count()
    }
}

/// Apply `patch` to files under `root` with default options.
pub fn apply(patch: &Patch, root: &Path) -> Result<ApplyReport, PatchError> {
    apply_with_options(patch, root, ApplyOptions::default())
}

/// Apply `patch` to files under `root`.
///
/// Returns `Err` only when the patch targets no files at all; every other
/// failure mode is scoped to one file and reported in the [`ApplyReport`].
pub fn apply_with_options(
    patch: &Patch,
    root: &Path,
    opts: ApplyOptions,
) -> Result<ApplyReport, PatchError> {
    if patch.is_empty() {
        return Err(PatchError::Empty);
    }

    let mut report = ApplyReport::default();
    for file in &patch.files {
        let target = root.join(&file.to_path);
        let result = match apply_file(file, &target, opts) {
            Ok(()) => {
                log::info!("[Patcher] Applied {} hunk(s) to {}", file.hunks.len(), file.to_path);
                StageResult::Success
            }
            Err(reason) => {
                log::warn!("[Patcher] Failed to patch {}: {}", file.to_path, reason);
                StageResult::Fatal { reason }
            }
        };
        report.files.push(FileOutcome {
            path: target,
            result,
        });
    }
    Ok(report)
}

/// Apply all hunks of one file diff, atomically.
///
/// The error string names the first hunk that could not be placed; the file
/// on disk is untouched in that case.
fn apply_file(
    file: &super::FileDiff,
    target: &Path,
    opts: ApplyOptions,
) -> Result<(), String> {
    if !target.is_file() {
        return Err(format!("target file not found: {}", target.display()));
    }
    let content =
        std::fs::read_to_string(target).map_err(|e| format!("read failed: {}", e))?;
    let had_trailing_newline = content.ends_with('\n');
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();

    // Cumulative drift: earlier hunks change the buffer length and may have
    // relocated; later hunks' nominal positions shift by the same amount.
    let mut offset: isize = 0;
    for (idx, hunk) in file.hunks.iter().enumerate() {
        offset = apply_hunk(&mut lines, hunk, offset, opts.fuzz_window)
            .map_err(|e| format!("hunk {} (@@ -{}): {}", idx + 1, hunk.old_start, e))?;
    }

    let mut output = lines.join("\n");
    if had_trailing_newline {
        output.push('\n');
    }
    write_atomic(target, output.as_bytes()).map_err(|e| format!("write failed: {}", e))
}

/// Apply one hunk to the line buffer. Returns the updated cumulative offset.
fn apply_hunk(
    lines: &mut Vec<String>,
    hunk: &Hunk,
    offset: isize,
    window: usize,
) -> Result<isize, String> {
    let old: Vec<&str> = hunk.old_lines().collect();
    let new: Vec<String> = hunk.new_lines().map(str::to_string).collect();

    // For a pure insertion old_start names the line *after which* to insert;
    // for everything else it is the 1-based first line to match.
    let anchor = if hunk.old_count == 0 {
        hunk.old_start as isize
    } else {
        hunk.old_start as isize - 1
    };
    let expected = anchor + offset;

    let pos = locate(lines, &old, expected, window).ok_or_else(|| {
        format!(
            "context mismatch at line {} (searched +/-{} lines)",
            hunk.old_start, window
        )
    })?;

    if pos != clamp(expected, lines.len().saturating_sub(old.len())) {
        log::info!(
            "[Patcher] Relocated hunk @@ -{} by {} line(s)",
            hunk.old_start,
            pos as isize - expected
        );
    }

    lines.splice(pos..pos + old.len(), new.iter().cloned());
    Ok(offset + (pos as isize - expected) + new.len() as isize - old.len() as isize)
}

/// Find the position where the hunk's old lines match, starting at the
/// expected position and spiralling outward one line at a time until the
/// window is exhausted. The first (nearest) match wins.
fn locate(lines: &[String], old: &[&str], expected: isize, window: usize) -> Option<usize> {
    if old.is_empty() {
        // Pure insertion with no context: trust the nominal position.
        return Some(clamp(expected, lines.len()));
    }
    let max_pos = lines.len().checked_sub(old.len())?;
    for delta in 0..=(window as isize) {
        for candidate in [expected - delta, expected + delta] {
            if candidate < 0 || candidate as usize > max_pos {
                continue;
            }
            if matches_at(lines, candidate as usize, old) {
                return Some(candidate as usize);
            }
            if delta == 0 {
                break;
            }
        }
    }
    None
}

fn matches_at(lines: &[String], pos: usize, old: &[&str]) -> bool {
    old.iter()
        .enumerate()
        .all(|(i, expected)| lines[pos + i] == *expected)
}

fn clamp(value: isize, max: usize) -> usize {
    value.clamp(0, max as isize) as usize
}

/// Write via a temp file in the target's directory plus rename, so a reader
/// never sees a half-written file and a failed write leaves the original.
fn write_atomic(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}
