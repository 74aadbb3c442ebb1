//! Native toolchain configure and compile drivers.
//!
//! POSIX hosts run the runtime's `./configure` script followed by a parallel
//! `make`; Windows hosts run the vendor `vcbuild.bat`, which performs its own
//! toolchain discovery and covers both steps. Both stages stream their output
//! into the log and are fatal on a non-zero exit. Compilation can run for
//! tens of minutes; no timeout is enforced.

use std::path::{Path, PathBuf};

use crate::context::BuildContext;
use crate::error::CompileError;
use crate::models::{BuildTarget, Platform};
use crate::toolchain;

/// Run the configure step in the source directory.
pub async fn configure(ctx: &BuildContext, _target: &BuildTarget) -> Result<(), CompileError> {
    if cfg!(windows) {
        // vcbuild.bat configures and builds in one invocation; see compile().
        log::info!("[Build] Configure folded into vcbuild on Windows, skipping");
        return Ok(());
    }

    let script = ctx.source_dir.join("configure");
    if !script.is_file() {
        return Err(CompileError::ConfigureFailed(format!(
            "no configure script at {}",
            script.display()
        )));
    }

    let args: Vec<&str> = ctx
        .configure_options
        .iter()
        .map(String::as_str)
        .collect();
    let status =
        toolchain::run_streamed("./configure", &args, &ctx.source_dir, "[Configure]").await?;
    if !status.success() {
        return Err(CompileError::ConfigureFailed(format!(
            "configure exited with {}",
            status
        )));
    }
    log::info!("[Build] ✓ Configure complete");
    Ok(())
}

/// Run the compile step, using all available CPU cores.
pub async fn compile(ctx: &BuildContext, target: &BuildTarget) -> Result<(), CompileError> {
    let status = if cfg!(windows) {
        if !ctx.source_dir.join("vcbuild.bat").is_file() {
            return Err(CompileError::ToolMissing(
                "vcbuild.bat not found in source tree".to_string(),
            ));
        }
        toolchain::run_streamed(
            "vcbuild.bat",
            &[target.arch.canonical_name()],
            &ctx.source_dir,
            "[Compile]",
        )
        .await?
    } else {
        if !toolchain::tool_available("make") {
            return Err(CompileError::ToolMissing(
                "make not found on PATH".to_string(),
            ));
        }
        let jobs = format!("-j{}", num_cpus::get());
        log::info!("[Build] Compiling with {} parallel jobs", num_cpus::get());
        toolchain::run_streamed("make", &[&jobs], &ctx.source_dir, "[Compile]").await?
    };

    if !status.success() {
        return Err(CompileError::CompileFailed(format!(
            "build tool exited with {}",
            status
        )));
    }
    log::info!("[Build] ✓ Compile complete");
    Ok(())
}

/// Location of the compiled runtime binary inside the source tree.
pub fn built_binary_path(ctx: &BuildContext, platform: Platform) -> PathBuf {
    match platform {
        Platform::Win => ctx.source_dir.join("Release").join("node.exe"),
        _ => ctx.source_dir.join("out").join("Release").join("node"),
    }
}

/// Smoke-test the built binary: it must run and report the target version.
pub async fn smoke_test(binary: &Path, version: &str) -> Result<(), String> {
    let output = tokio::process::Command::new(binary)
        .arg("--version")
        .output()
        .await
        .map_err(|e| format!("could not execute {}: {}", binary.display(), e))?;

    if !output.status.success() {
        return Err(format!(
            "{} --version exited with {}",
            binary.display(),
            output.status
        ));
    }
    let reported = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let expected = format!("v{}", version);
    if reported != expected {
        return Err(format!(
            "binary reports {} but target is {}",
            reported, expected
        ));
    }
    log::info!("[Build] ✓ Smoke test passed ({})", reported);
    Ok(())
}
