//! Pipeline stage tracking.
//!
//! `BuildStage` enumerates the discrete states of one pipeline run. The
//! orchestrator advances strictly through `pipeline_order`; `Failed` is
//! reachable from any non-terminal state. Skip flags advance a stage without
//! its side effect, so the visited sequence is identical whether or not a
//! stage was skipped.

use serde::{Deserialize, Serialize};

/// Discrete states of one build pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildStage {
    Idle,
    ManifestSynced,
    SourceReady,
    UpstreamPatched,
    CustomModsApplied,
    Configured,
    Compiled,
    Tested,
    PostProcessed,
    Cached,
    Done,
    Failed,
}

impl BuildStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStage::Idle => "idle",
            BuildStage::ManifestSynced => "manifest-synced",
            BuildStage::SourceReady => "source-ready",
            BuildStage::UpstreamPatched => "upstream-patched",
            BuildStage::CustomModsApplied => "custom-mods-applied",
            BuildStage::Configured => "configured",
            BuildStage::Compiled => "compiled",
            BuildStage::Tested => "tested",
            BuildStage::PostProcessed => "post-processed",
            BuildStage::Cached => "cached",
            BuildStage::Done => "done",
            BuildStage::Failed => "failed",
        }
    }

    /// The canonical happy-path sequence, `Idle` through `Done`.
    pub fn pipeline_order() -> [BuildStage; 11] {
        [
            BuildStage::Idle,
            BuildStage::ManifestSynced,
            BuildStage::SourceReady,
            BuildStage::UpstreamPatched,
            BuildStage::CustomModsApplied,
            BuildStage::Configured,
            BuildStage::Compiled,
            BuildStage::Tested,
            BuildStage::PostProcessed,
            BuildStage::Cached,
            BuildStage::Done,
        ]
    }

    /// Valid transitions FROM this stage.
    pub fn valid_next_stages(&self) -> Vec<BuildStage> {
        match self {
            // A cache hit short-circuits the run straight to Done.
            BuildStage::Idle => vec![
                BuildStage::ManifestSynced,
                BuildStage::Done,
                BuildStage::Failed,
            ],
            BuildStage::ManifestSynced => vec![BuildStage::SourceReady, BuildStage::Failed],
            BuildStage::SourceReady => vec![BuildStage::UpstreamPatched, BuildStage::Failed],
            BuildStage::UpstreamPatched => {
                vec![BuildStage::CustomModsApplied, BuildStage::Failed]
            }
            BuildStage::CustomModsApplied => vec![BuildStage::Configured, BuildStage::Failed],
            BuildStage::Configured => vec![BuildStage::Compiled, BuildStage::Failed],
            BuildStage::Compiled => vec![BuildStage::Tested, BuildStage::Failed],
            BuildStage::Tested => vec![BuildStage::PostProcessed, BuildStage::Failed],
            BuildStage::PostProcessed => vec![BuildStage::Cached, BuildStage::Failed],
            BuildStage::Cached => vec![BuildStage::Done, BuildStage::Failed],
            BuildStage::Done => vec![],
            BuildStage::Failed => vec![],
        }
    }

    pub fn can_transition_to(&self, next: BuildStage) -> bool {
        self.valid_next_stages().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildStage::Done | BuildStage::Failed)
    }
}

impl std::fmt::Display for BuildStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_a_valid_walk() {
        let order = BuildStage::pipeline_order();
        for pair in order.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be valid",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn failed_is_reachable_from_every_active_stage() {
        for stage in BuildStage::pipeline_order() {
            if !stage.is_terminal() {
                assert!(stage.can_transition_to(BuildStage::Failed), "{}", stage);
            }
        }
    }

    #[test]
    fn no_skipping_stages() {
        assert!(!BuildStage::SourceReady.can_transition_to(BuildStage::Configured));
        assert!(!BuildStage::Compiled.can_transition_to(BuildStage::PostProcessed));
    }

    #[test]
    fn terminal_stages_go_nowhere() {
        assert!(BuildStage::Done.valid_next_stages().is_empty());
        assert!(BuildStage::Failed.valid_next_stages().is_empty());
    }

    #[test]
    fn cache_hit_short_circuit_is_valid() {
        assert!(BuildStage::Idle.can_transition_to(BuildStage::Done));
    }
}
