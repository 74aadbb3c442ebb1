//! smol-builder: build-and-patch pipeline for a self-contained runtime
//! executable.
//!
//! The pipeline acquires versioned runtime source, applies an upstream
//! unified-diff patch set plus declarative code mods, compiles with the
//! native toolchain, post-processes the binary (strip, payload injection,
//! signing, compression), and stores the result in a content-addressed
//! cache. Re-running is safe: an existing checkout is reset to a recorded
//! pristine baseline before patching, and a cache hit skips the build
//! entirely.
//!
//! Module map:
//! - **error**: unified error type hierarchy
//! - **models**: core data types (targets, stage results, tool outcomes)
//! - **context**: per-run paths, endpoints, and memoized state
//! - **patch**: unified-diff parse + fuzzy apply engine
//! - **mods**: declarative code modification registry and applier
//! - **source**: archive download/extraction and pristine git reset
//! - **sync**: TTL-cached upstream patch manifest sync
//! - **compile**: native configure/compile drivers
//! - **postprocess**: strip, payload blob injection, compression
//! - **signing**: per-platform signing strategy dispatch
//! - **cache**: content-addressed binary cache
//! - **orchestrator**: the pipeline state machine tying it all together

pub mod cache;
pub mod cli;
pub mod compile;
pub mod context;
pub mod error;
pub mod logging;
pub mod models;
pub mod mods;
pub mod orchestrator;
pub mod patch;
pub mod postprocess;
pub mod signing;
pub mod source;
pub mod sync;
pub mod toolchain;

pub use cache::BinaryCache;
pub use context::BuildContext;
pub use error::{BuildError, Result};
pub use models::{Arch, BuildTarget, Platform, SignResult, StageResult, ToolOutcome};
pub use orchestrator::{BuildStage, Pipeline, PipelineSummary};
