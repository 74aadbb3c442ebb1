//! Command-line surface of the build pipeline.

use clap::Parser;

use crate::error::BuildError;
use crate::models::{Arch, BuildTarget, Platform};

/// Build a self-contained runtime executable for one platform/arch target.
#[derive(Debug, Parser)]
#[command(name = "smol-builder", about, disable_version_flag = true)]
pub struct Cli {
    /// Runtime version to build (semver, e.g. 22.12.0).
    #[arg(long)]
    pub version: String,

    /// Reuse the existing source checkout instead of downloading.
    #[arg(long)]
    pub skip_download: bool,

    /// Do not apply the upstream patch set.
    #[arg(long)]
    pub skip_upstream_patch: bool,

    /// Apply the custom code modification set.
    #[arg(long)]
    pub custom_patches: bool,

    /// Skip declarative code mods even when custom patches are enabled.
    #[arg(long)]
    pub skip_code_mods: bool,

    /// Target platform (linux, macos, win). Defaults to the host.
    #[arg(long)]
    pub platform: Option<String>,

    /// Target architecture (x64, arm64). Defaults to the host.
    #[arg(long)]
    pub arch: Option<String>,

    /// Re-run the pipeline inside the build container.
    #[arg(long)]
    pub docker: bool,

    /// Minify the payload bundle before blob generation.
    #[arg(long)]
    pub minify: bool,

    /// Only print warnings and errors.
    #[arg(long)]
    pub quiet: bool,
}

impl Cli {
    /// Resolve CLI input into an immutable build target.
    pub fn to_target(&self) -> Result<BuildTarget, BuildError> {
        let platform = match &self.platform {
            Some(name) => Platform::parse(name).ok_or_else(|| {
                BuildError::InvalidTarget(format!("unknown platform '{}'", name))
            })?,
            None => Platform::host(),
        };
        let arch = match &self.arch {
            Some(name) => Arch::parse(name)
                .ok_or_else(|| BuildError::InvalidTarget(format!("unknown arch '{}'", name)))?,
            None => Arch::host(),
        };

        let target = BuildTarget {
            version: self.version.clone(),
            platform,
            arch,
            skip_download: self.skip_download,
            skip_upstream_patch: self.skip_upstream_patch,
            apply_custom_patches: self.custom_patches,
            skip_code_mods: self.skip_code_mods,
            minify: self.minify,
        };
        target.validate()?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_to_target() {
        let cli = Cli::parse_from([
            "smol-builder",
            "--version=22.12.0",
            "--platform=darwin",
            "--arch=arm64",
            "--custom-patches",
            "--minify",
        ]);
        let target = cli.to_target().unwrap();
        assert_eq!(target.version, "22.12.0");
        assert_eq!(target.platform, Platform::Macos);
        assert_eq!(target.arch, Arch::Arm64);
        assert!(target.apply_custom_patches);
        assert!(target.minify);
        assert!(!target.skip_download);
    }

    #[test]
    fn bad_platform_is_rejected() {
        let cli = Cli::parse_from(["smol-builder", "--version=1.2.3", "--platform=beos"]);
        assert!(cli.to_target().is_err());
    }

    #[test]
    fn bad_version_is_rejected() {
        let cli = Cli::parse_from(["smol-builder", "--version=latest"]);
        assert!(cli.to_target().is_err());
    }
}
