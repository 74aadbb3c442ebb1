use clap::Parser;

use smol_builder::cli::Cli;
use smol_builder::logging;
use smol_builder::orchestrator::{self, Pipeline};
use smol_builder::toolchain;
use smol_builder::BuildContext;

/// Image used for containerized builds.
const BUILD_IMAGE: &str = "smol-builder/build:latest";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::initialize_logging(cli.quiet);

    let code = match run(cli).await {
        Ok(passed) => {
            if passed {
                0
            } else {
                1
            }
        }
        Err(e) => {
            log::error!("[Main] {}", e);
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    if cli.docker {
        return run_in_container(&cli).await;
    }

    let target = cli.to_target()?;
    let ctx = BuildContext::for_host(&target.version);
    log::info!(
        "[Main] Building runtime v{} for {}/{} (root: {})",
        target.version,
        target.platform,
        target.arch,
        ctx.build_root.display()
    );

    let mut pipeline = Pipeline::new(ctx, target);
    let summary = pipeline.run().await?;
    orchestrator::print_summary(&summary);
    Ok(summary.passed())
}

/// Re-exec the pipeline inside the build container, forwarding every flag
/// except `--docker` itself.
async fn run_in_container(cli: &Cli) -> anyhow::Result<bool> {
    if !toolchain::tool_available("docker") {
        anyhow::bail!("--docker given but docker is not on PATH");
    }

    let mut args: Vec<String> = vec![
        "run".to_string(),
        "--rm".to_string(),
        BUILD_IMAGE.to_string(),
        "smol-builder".to_string(),
        format!("--version={}", cli.version),
    ];
    for (flag, set) in [
        ("--skip-download", cli.skip_download),
        ("--skip-upstream-patch", cli.skip_upstream_patch),
        ("--custom-patches", cli.custom_patches),
        ("--skip-code-mods", cli.skip_code_mods),
        ("--minify", cli.minify),
        ("--quiet", cli.quiet),
    ] {
        if set {
            args.push(flag.to_string());
        }
    }
    if let Some(platform) = &cli.platform {
        args.push(format!("--platform={}", platform));
    }
    if let Some(arch) = &cli.arch {
        args.push(format!("--arch={}", arch));
    }

    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let status = toolchain::run_streamed(
        "docker",
        &arg_refs,
        std::path::Path::new("."),
        "[Docker]",
    )
    .await?;
    Ok(status.success())
}
