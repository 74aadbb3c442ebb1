//! Core data types for smol-builder.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::BuildError;

/// Target operating system family.
///
/// Input accepts common aliases (`darwin`, `win32`, `windows`); the canonical
/// short names used in cache keys and log output are `linux`, `macos`, `win`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Macos,
    Win,
}

impl Platform {
    /// Parse a platform name, accepting the usual aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "linux" => Some(Platform::Linux),
            "macos" | "darwin" | "osx" => Some(Platform::Macos),
            "win" | "win32" | "windows" => Some(Platform::Win),
            _ => None,
        }
    }

    /// Canonical short name (used in cache keys).
    pub fn canonical_name(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Macos => "macos",
            Platform::Win => "win",
        }
    }

    /// Platform of the host this process is running on.
    pub fn host() -> Self {
        if cfg!(target_os = "macos") {
            Platform::Macos
        } else if cfg!(target_os = "windows") {
            Platform::Win
        } else {
            Platform::Linux
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// Target CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    X64,
    Arm64,
}

impl Arch {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "x64" | "x86_64" | "amd64" => Some(Arch::X64),
            "arm64" | "aarch64" => Some(Arch::Arm64),
            _ => None,
        }
    }

    pub fn canonical_name(&self) -> &'static str {
        match self {
            Arch::X64 => "x64",
            Arch::Arm64 => "arm64",
        }
    }

    pub fn host() -> Self {
        if cfg!(target_arch = "aarch64") {
            Arch::Arm64
        } else {
            Arch::X64
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// One build invocation's target and flags.
///
/// Created once from CLI input and immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    /// Runtime version to build (semver, e.g. "22.12.0").
    pub version: String,
    pub platform: Platform,
    pub arch: Arch,

    /// Reuse an existing source checkout instead of downloading.
    pub skip_download: bool,
    /// Do not apply the upstream patch set.
    pub skip_upstream_patch: bool,
    /// Apply the custom code modification set.
    pub apply_custom_patches: bool,
    /// Skip declarative code mods even when custom patches are enabled.
    pub skip_code_mods: bool,
    /// Minify the payload bundle before blob generation.
    pub minify: bool,
}

impl BuildTarget {
    /// Build a target for the host platform/arch with all flags off.
    pub fn new(version: impl Into<String>) -> Self {
        BuildTarget {
            version: version.into(),
            platform: Platform::host(),
            arch: Arch::host(),
            skip_download: false,
            skip_upstream_patch: false,
            apply_custom_patches: false,
            skip_code_mods: false,
            minify: false,
        }
    }

    /// Minimal semver shape check: three dot-separated numeric fields.
    pub fn validate(&self) -> Result<(), BuildError> {
        let parts: Vec<&str> = self.version.split('.').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit())) {
            return Err(BuildError::InvalidTarget(format!(
                "version '{}' is not a semver triple",
                self.version
            )));
        }
        Ok(())
    }
}

/// Tri-state outcome for one unit of work (a patched file, a code mod entry).
///
/// Lets the patch engine and code mod applier report granular outcomes
/// without aborting unrelated work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResult {
    Success,
    PartialSuccess { applied: usize, total: usize },
    Fatal { reason: String },
}

impl StageResult {
    pub fn is_success(&self) -> bool {
        matches!(self, StageResult::Success)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, StageResult::Fatal { .. })
    }
}

impl fmt::Display for StageResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageResult::Success => write!(f, "success"),
            StageResult::PartialSuccess { applied, total } => {
                write!(f, "partial ({}/{} applied)", applied, total)
            }
            StageResult::Fatal { reason } => write!(f, "fatal: {}", reason),
        }
    }
}

/// Outcome of a signing dispatch.
#[derive(Debug, Clone)]
pub struct SignResult {
    pub success: bool,
    /// Tool that produced the final signature, if any.
    pub tool_used: Option<String>,
    /// Human-readable status or remediation message.
    pub message: String,
}

/// Typed outcome of one external tool invocation.
///
/// Replaces ad hoc exit-code inspection at call sites: callers match on the
/// outcome instead of re-deriving severity from status codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Success,
    NonFatalWarning(String),
    Fatal(String),
}

impl ToolOutcome {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ToolOutcome::Fatal(_))
    }
}
