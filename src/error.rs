//! Unified error type hierarchy for smol-builder
//!
//! Provides structured error handling with AcquisitionError, PatchError,
//! CodeModError, CompileError, PostProcessError, SignError, SyncError,
//! CacheError, and the top-level BuildError aggregate.

use std::io;
use thiserror::Error;

/// Source acquisition errors (download, extraction, pristine reset).
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Source download failed: {0}")]
    DownloadFailed(String),

    #[error("Archive extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Pristine reset failed: {0}")]
    ResetFailed(String),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error during source acquisition: {0}")]
    Io(#[from] io::Error),
}

/// Unified-diff parsing and application errors.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("Malformed patch at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("Patch contains no file diffs")]
    Empty,

    #[error("Patch file not found: {0}")]
    FileNotFound(String),

    #[error("IO error during patch application: {0}")]
    Io(#[from] io::Error),
}

/// Declarative code modification errors.
#[derive(Error, Debug)]
pub enum CodeModError {
    #[error("Code mod config not found: {0}")]
    ConfigNotFound(String),

    #[error("Invalid code mod config: {0}")]
    InvalidConfig(#[from] serde_json::Error),

    #[error("Invalid replacement pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Structured document error in {file}: {reason}")]
    StructuredDocument { file: String, reason: String },

    #[error("Patch mod '{file}' failed: {reason}")]
    PatchModFailed { file: String, reason: String },

    #[error("Required code mod '{0}' failed")]
    RequiredModFailed(String),

    #[error("IO error during code modification: {0}")]
    Io(#[from] io::Error),
}

/// Native toolchain configure/compile errors. Both stages are fatal for the
/// run on non-zero exit.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Configure step failed: {0}")]
    ConfigureFailed(String),

    #[error("Compile step failed: {0}")]
    CompileFailed(String),

    #[error("Build tool not found: {0}")]
    ToolMissing(String),

    #[error("IO error during compilation: {0}")]
    Io(#[from] io::Error),
}

/// Binary post-processing errors (payload bundling, blob generation,
/// injection, verification).
#[derive(Error, Debug)]
pub enum PostProcessError {
    #[error("Payload bundling failed: {0}")]
    BundleFailed(String),

    #[error("Payload blob generation failed: {0}")]
    BlobFailed(String),

    #[error("Payload injection failed: {0}")]
    InjectionFailed(String),

    #[error("Binary stripping failed: {0}")]
    StripFailed(String),

    #[error("Injected binary failed verification: {0}")]
    VerificationFailed(String),

    #[error("IO error during post-processing: {0}")]
    Io(#[from] io::Error),
}

/// Code-signing errors. Whether a signing failure is fatal is a policy
/// decision made by the orchestrator, not here.
#[derive(Error, Debug)]
pub enum SignError {
    #[error("No signing tool available: {0}")]
    NoToolAvailable(String),

    #[error("Signing failed with {tool}: {reason}")]
    ToolFailed { tool: String, reason: String },
}

/// Patch manifest sync errors. These degrade to warnings at the call site;
/// the pipeline proceeds with whatever patches are already on disk.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Manifest fetch failed: {0}")]
    FetchFailed(String),

    #[error("Invalid manifest document: {0}")]
    InvalidManifest(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error during manifest sync: {0}")]
    Io(#[from] io::Error),
}

/// Binary cache errors.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache store failed for key '{key}': {reason}")]
    StoreFailed { key: String, reason: String },

    #[error("IO error during cache operation: {0}")]
    Io(#[from] io::Error),
}

/// Top-level error for the build pipeline.
///
/// Every component error converts into this via `#[from]` so the orchestrator
/// can propagate with `?` and still report which stage went down.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Source acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("Code modification error: {0}")]
    CodeMod(#[from] CodeModError),

    #[error("Compilation error: {0}")]
    Compile(#[from] CompileError),

    #[error("Post-processing error: {0}")]
    PostProcess(#[from] PostProcessError),

    #[error("Signing error: {0}")]
    Sign(#[from] SignError),

    #[error("Manifest sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Smoke test failed: {0}")]
    SmokeTest(String),

    #[error("Invalid build target: {0}")]
    InvalidTarget(String),

    #[error("Invalid stage transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result alias for pipeline-level operations.
pub type Result<T> = std::result::Result<T, BuildError>;
