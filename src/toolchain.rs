//! External tool discovery and invocation.
//!
//! Every subprocess the pipeline runs goes through this module: discovery is
//! a PATH scan (no speculative spawning), and invocation returns either a
//! typed [`ToolOutcome`] for short-lived tools or a streamed exit status for
//! long-running builds.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::models::ToolOutcome;

/// Check whether `tool` resolves to an executable on PATH.
pub fn tool_available(tool: &str) -> bool {
    resolve_tool(tool).is_some()
}

/// Resolve a bare tool name against PATH.
///
/// Absolute and relative paths are returned as-is when they exist, so callers
/// can hard-pin a tool location.
pub fn resolve_tool(tool: &str) -> Option<PathBuf> {
    let as_path = Path::new(tool);
    if as_path.components().count() > 1 {
        return as_path.exists().then(|| as_path.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        for name in candidate_names(tool) {
            let candidate = dir.join(&name);
            if is_executable(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

/// Find the first available tool from an ordered candidate list
/// (e.g. `["llvm-strip", "strip"]`).
pub fn find_tool(candidates: &[&str]) -> Option<String> {
    for name in candidates {
        if tool_available(name) {
            log::info!("[Toolchain] Found {}", name);
            return Some((*name).to_string());
        }
    }
    None
}

#[cfg(windows)]
fn candidate_names(tool: &str) -> Vec<String> {
    if tool.contains('.') {
        vec![tool.to_string()]
    } else {
        vec![
            format!("{}.exe", tool),
            format!("{}.bat", tool),
            format!("{}.cmd", tool),
            tool.to_string(),
        ]
    }
}

#[cfg(not(windows))]
fn candidate_names(tool: &str) -> Vec<String> {
    vec![tool.to_string()]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.is_file()
        && path
            .metadata()
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Run a short-lived tool to completion, capturing output.
///
/// Returns `Success` on a zero exit, otherwise `Fatal` carrying the tail of
/// stderr. Callers downgrade to `NonFatalWarning` where their stage policy
/// allows it.
pub async fn run_tool(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    tag: &str,
) -> std::io::Result<ToolOutcome> {
    let mut cmd = Command::new(program);
    cmd.args(args).stdin(Stdio::null());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    log::info!("{} Running: {} {}", tag, program, args.join(" "));

    let output = cmd.output().await?;
    if output.status.success() {
        Ok(ToolOutcome::Success)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr
            .lines()
            .rev()
            .take(5)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join("; ");
        Ok(ToolOutcome::Fatal(format!(
            "{} exited with {}: {}",
            program, output.status, tail
        )))
    }
}

/// Run a long-lived tool, streaming each output line into the log.
///
/// Used for configure/compile where output can run to tens of thousands of
/// lines over tens of minutes. No timeout is enforced; the process either
/// completes, fails, or is killed by the host environment.
pub async fn run_streamed(
    program: &str,
    args: &[&str],
    cwd: &Path,
    tag: &str,
) -> std::io::Result<std::process::ExitStatus> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    log::info!("{} Running: {} {}", tag, program, args.join(" "));

    let mut child = cmd.spawn()?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let tag_out = tag.to_string();
    let tag_err = tag.to_string();

    let out_task = tokio::spawn(async move {
        if let Some(stdout) = stdout {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log::info!("{} {}", tag_out, line);
            }
        }
    });
    let err_task = tokio::spawn(async move {
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log::info!("{} {}", tag_err, line);
            }
        }
    });

    let status = child.wait().await?;
    let _ = out_task.await;
    let _ = err_task.await;
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_a_ubiquitous_tool() {
        // `sh` exists on every POSIX host this pipeline supports.
        #[cfg(unix)]
        assert!(tool_available("sh"));
    }

    #[test]
    fn unknown_tool_is_unavailable() {
        assert!(!tool_available("definitely-not-a-real-tool-xyzzy"));
    }

    #[tokio::test]
    async fn run_tool_reports_nonzero_exit() {
        #[cfg(unix)]
        {
            let outcome = run_tool("sh", &["-c", "echo boom >&2; exit 3"], None, "[Test]")
                .await
                .unwrap();
            match outcome {
                ToolOutcome::Fatal(msg) => assert!(msg.contains("boom")),
                other => panic!("expected fatal outcome, got {:?}", other),
            }
        }
    }
}
