//! Build orchestration: sequences manifest sync, source acquisition,
//! patching, code mods, compile, smoke test, post-processing, and cache
//! storage into one resumable, idempotent pipeline run.
//!
//! Stages run strictly in sequence; each is awaited to completion because
//! later stages depend on the filesystem state the earlier ones leave
//! behind. Skip flags advance the stage without the side effect. Patch
//! failures aggregate into a partial outcome instead of aborting; toolchain
//! failures are fatal.

pub mod state;

pub use state::BuildStage;

use chrono::Duration;

use crate::cache::BinaryCache;
use crate::compile;
use crate::context::BuildContext;
use crate::error::{BuildError, Result};
use crate::models::{BuildTarget, StageResult};
use crate::mods::{self, CodeModRegistry};
use crate::patch;
use crate::postprocess;
use crate::signing;
use crate::source;
use crate::sync;

/// Manifest TTL: one sync a day is plenty for a patch set that changes a
/// few times a month.
const MANIFEST_TTL_HOURS: i64 = 24;

/// Final report of one pipeline run.
#[derive(Debug)]
pub struct PipelineSummary {
    pub cache_key: String,
    pub cache_hit: bool,
    /// Aggregated upstream patch outcome (Success when skipped or absent).
    pub upstream_patches: StageResult,
    /// Number of code mod entries that modified the tree.
    pub mods_applied: usize,
    pub warnings: Vec<String>,
    /// Stages visited, in order, including the terminal one.
    pub visited: Vec<BuildStage>,
}

impl PipelineSummary {
    pub fn passed(&self) -> bool {
        self.visited.last() == Some(&BuildStage::Done)
    }
}

/// One pipeline run for one build target.
pub struct Pipeline {
    ctx: BuildContext,
    target: BuildTarget,
    stage: BuildStage,
    visited: Vec<BuildStage>,
    warnings: Vec<String>,
}

impl Pipeline {
    pub fn new(ctx: BuildContext, target: BuildTarget) -> Self {
        Pipeline {
            ctx,
            target,
            stage: BuildStage::Idle,
            visited: vec![BuildStage::Idle],
            warnings: Vec::new(),
        }
    }

    pub fn stage(&self) -> BuildStage {
        self.stage
    }

    pub fn visited(&self) -> &[BuildStage] {
        &self.visited
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    fn advance(&mut self, next: BuildStage) -> Result<()> {
        if !self.stage.can_transition_to(next) {
            return Err(BuildError::InvalidTransition {
                from: self.stage.to_string(),
                to: next.to_string(),
            });
        }
        log::info!("[Pipeline] Stage: {} -> {}", self.stage, next);
        self.stage = next;
        self.visited.push(next);
        Ok(())
    }

    fn warn(&mut self, message: String) {
        log::warn!("[Pipeline] {}", message);
        self.warnings.push(message);
    }

    /// Run the pipeline to completion.
    ///
    /// On error the stage is left at `Failed`; the error still carries the
    /// component-level cause.
    pub async fn run(&mut self) -> Result<PipelineSummary> {
        let result = self.run_inner().await;
        if let Err(e) = &result {
            log::error!("[Pipeline] Run failed: {}", e);
            self.stage = BuildStage::Failed;
            self.visited.push(BuildStage::Failed);
        }
        result
    }

    async fn run_inner(&mut self) -> Result<PipelineSummary> {
        self.target.validate()?;
        self.ctx.ensure_dirs()?;

        let cache = BinaryCache::new(self.ctx.cache_dir.clone());
        let cache_key = BinaryCache::key(
            &self.target.version,
            self.target.platform,
            self.target.arch,
        );

        if cache.exists(&cache_key) {
            log::info!(
                "[Pipeline] Cache hit for {}, nothing to build",
                cache_key
            );
            self.advance(BuildStage::Done)?;
            return Ok(self.summary(cache_key, true, StageResult::Success, 0));
        }

        // Manifest sync: failures degrade, the run continues on local state.
        match sync::sync_if_needed(&self.ctx, Duration::hours(MANIFEST_TTL_HOURS), false).await {
            Ok(_) => {}
            Err(e) => self.warn(format!(
                "manifest sync failed ({}), continuing with local patches",
                e
            )),
        }
        self.advance(BuildStage::ManifestSynced)?;

        source::acquire(&self.ctx, &self.target).await?;
        self.advance(BuildStage::SourceReady)?;

        let upstream = self.apply_upstream_patches();
        let upstream_applied = upstream.is_success();
        self.advance(BuildStage::UpstreamPatched)?;

        let mods_applied = self.apply_code_mods(upstream_applied)?;
        self.advance(BuildStage::CustomModsApplied)?;

        compile::configure(&self.ctx, &self.target).await?;
        self.advance(BuildStage::Configured)?;

        compile::compile(&self.ctx, &self.target).await?;
        self.advance(BuildStage::Compiled)?;

        let binary = compile::built_binary_path(&self.ctx, self.target.platform);
        compile::smoke_test(&binary, &self.target.version)
            .await
            .map_err(BuildError::SmokeTest)?;
        self.advance(BuildStage::Tested)?;

        let report = postprocess::post_process(&self.ctx, &self.target, &binary).await?;
        if !report.sign.success {
            if signing::signing_required(self.target.platform, self.target.arch) {
                return Err(BuildError::Sign(crate::error::SignError::NoToolAvailable(
                    report.sign.message,
                )));
            }
            self.warn(format!("binary left unsigned: {}", report.sign.message));
        }
        if let crate::models::ToolOutcome::NonFatalWarning(msg) = &report.stripped {
            self.warn(msg.clone());
        }
        if let crate::models::ToolOutcome::NonFatalWarning(msg) = &report.compressed {
            self.warn(msg.clone());
        }
        self.advance(BuildStage::PostProcessed)?;

        cache.store(&cache_key, &binary)?;
        self.advance(BuildStage::Cached)?;

        self.advance(BuildStage::Done)?;
        Ok(self.summary(cache_key, false, upstream, mods_applied))
    }

    /// Apply the synced upstream patch set for the target version.
    ///
    /// Missing manifest entries and context failures degrade: the aggregated
    /// result is carried into the summary and the stage advances either way.
    fn apply_upstream_patches(&mut self) -> StageResult {
        if self.target.skip_upstream_patch {
            log::info!("[Pipeline] Skipping upstream patches (--skip-upstream-patch)");
            return StageResult::Success;
        }

        let files: Vec<String> = match self
            .ctx
            .manifest()
            .and_then(|m| m.files_for(&self.target.version))
        {
            Some(files) if !files.is_empty() => files.to_vec(),
            _ => {
                self.warn(format!(
                    "no upstream patches for version {}, building unpatched",
                    self.target.version
                ));
                return StageResult::Success;
            }
        };

        let mut applied = 0usize;
        let mut total = 0usize;
        for file in files {
            let path = self.ctx.patch_path(&file);
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(_) => {
                    total += 1;
                    self.warn(format!("upstream patch {} missing on disk", file));
                    continue;
                }
            };
            let parsed = match patch::parse(&text) {
                Ok(parsed) => parsed,
                Err(e) => {
                    total += 1;
                    self.warn(format!("upstream patch {} is malformed: {}", file, e));
                    continue;
                }
            };
            match patch::apply_with_options(
                &parsed,
                &self.ctx.source_dir,
                patch::ApplyOptions {
                    fuzz_window: self.ctx.fuzz_window,
                },
            ) {
                Ok(report) => {
                    for outcome in &report.files {
                        total += 1;
                        if outcome.result.is_success() {
                            applied += 1;
                        }
                    }
                }
                Err(e) => {
                    total += 1;
                    self.warn(format!("upstream patch {} failed: {}", file, e));
                }
            }
        }

        if applied == total {
            StageResult::Success
        } else if applied == 0 {
            StageResult::Fatal {
                reason: "no upstream patch file applied".to_string(),
            }
        } else {
            StageResult::PartialSuccess { applied, total }
        }
    }

    /// Load and apply the custom code mod set, when enabled.
    fn apply_code_mods(&mut self, upstream_applied: bool) -> Result<usize> {
        if !self.target.apply_custom_patches {
            log::info!("[Pipeline] Custom patches not requested, skipping code mods");
            return Ok(0);
        }
        if self.target.skip_code_mods {
            log::info!("[Pipeline] Skipping code mods (--skip-code-mods)");
            return Ok(0);
        }

        let config_path = self.ctx.mods_dir.join("mods.json");
        let registry = match CodeModRegistry::load(&config_path) {
            Ok(registry) => registry,
            Err(crate::error::CodeModError::ConfigNotFound(path)) => {
                self.warn(format!("no code mod config at {}, skipping", path));
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        let applied = mods::apply_all(&registry, &self.target, &self.ctx, upstream_applied)?;
        log::info!(
            "[Pipeline] {} of {} code mod(s) modified the tree",
            applied,
            registry.len()
        );
        Ok(applied)
    }

    fn summary(
        &self,
        cache_key: String,
        cache_hit: bool,
        upstream: StageResult,
        mods_applied: usize,
    ) -> PipelineSummary {
        PipelineSummary {
            cache_key,
            cache_hit,
            upstream_patches: upstream,
            mods_applied,
            warnings: self.warnings.clone(),
            visited: self.visited.clone(),
        }
    }
}

/// Render the pass/fail summary for the console.
pub fn print_summary(summary: &PipelineSummary) {
    log::info!("[Pipeline] ==== Build summary ====");
    log::info!("[Pipeline] Cache key:        {}", summary.cache_key);
    if summary.cache_hit {
        log::info!("[Pipeline] Result:           cache hit, build skipped");
        return;
    }
    log::info!(
        "[Pipeline] Upstream patches: {}",
        summary.upstream_patches
    );
    log::info!("[Pipeline] Code mods:        {} applied", summary.mods_applied);
    for warning in &summary.warnings {
        log::warn!("[Pipeline] Warning: {}", warning);
    }
    log::info!(
        "[Pipeline] Result:           {}",
        if summary.passed() { "PASS" } else { "FAIL" }
    );
}
