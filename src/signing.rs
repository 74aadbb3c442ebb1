//! Per-platform code-signing dispatch.
//!
//! Each platform has an ordered strategy: a primary native tool and, where
//! one exists, a fallback that is tried after removing any partial signature
//! the primary left behind. Tool availability is probed before invocation so
//! the failure message can name exactly what to install. Whether a signing
//! failure is fatal is decided by the orchestrator (macOS arm64 binaries do
//! not run unsigned; everywhere else it is a warning).

use std::path::Path;

use crate::models::{Arch, Platform, SignResult, ToolOutcome};
use crate::toolchain;

/// Sign the binary using the platform's strategy table.
pub async fn sign(binary: &Path, platform: Platform, arch: Arch) -> SignResult {
    log::info!(
        "[Sign] Signing {} for {}/{}",
        binary.display(),
        platform,
        arch
    );
    match platform {
        Platform::Linux => SignResult {
            success: true,
            tool_used: None,
            message: "linux binaries run unsigned, nothing to do".to_string(),
        },
        Platform::Macos => sign_macos(binary).await,
        Platform::Win => sign_windows(binary).await,
    }
}

async fn sign_macos(binary: &Path) -> SignResult {
    let path = binary.to_string_lossy();

    if toolchain::tool_available("codesign") {
        match toolchain::run_tool("codesign", &["--sign", "-", "--force", &path], None, "[Sign]")
            .await
        {
            Ok(ToolOutcome::Success) => {
                return SignResult {
                    success: true,
                    tool_used: Some("codesign".to_string()),
                    message: "ad-hoc signature applied".to_string(),
                };
            }
            Ok(outcome) => {
                log::warn!("[Sign] codesign failed ({:?}), trying ldid", outcome);
                // Drop whatever partial signature codesign left before the
                // fallback re-signs.
                let _ = toolchain::run_tool(
                    "codesign",
                    &["--remove-signature", &path],
                    None,
                    "[Sign]",
                )
                .await;
            }
            Err(e) => log::warn!("[Sign] codesign could not be spawned: {}", e),
        }
    }

    if toolchain::tool_available("ldid") {
        match toolchain::run_tool("ldid", &["-S", &path], None, "[Sign]").await {
            Ok(ToolOutcome::Success) => {
                return SignResult {
                    success: true,
                    tool_used: Some("ldid".to_string()),
                    message: "fallback signature applied with ldid".to_string(),
                };
            }
            Ok(ToolOutcome::Fatal(reason)) | Ok(ToolOutcome::NonFatalWarning(reason)) => {
                return SignResult {
                    success: false,
                    tool_used: Some("ldid".to_string()),
                    message: format!("ldid failed: {}", reason),
                };
            }
            Err(e) => {
                return SignResult {
                    success: false,
                    tool_used: Some("ldid".to_string()),
                    message: format!("ldid could not be spawned: {}", e),
                };
            }
        }
    }

    SignResult {
        success: false,
        tool_used: None,
        message: "no signing tool found; install the Xcode command line tools (codesign) or ldid"
            .to_string(),
    }
}

async fn sign_windows(binary: &Path) -> SignResult {
    let path = binary.to_string_lossy();

    if toolchain::tool_available("signtool") {
        match toolchain::run_tool("signtool", &["sign", "/a", &path], None, "[Sign]").await {
            Ok(ToolOutcome::Success) => {
                return SignResult {
                    success: true,
                    tool_used: Some("signtool".to_string()),
                    message: "signed with the best available certificate".to_string(),
                };
            }
            Ok(outcome) => log::warn!("[Sign] signtool failed ({:?}), trying osslsigncode", outcome),
            Err(e) => log::warn!("[Sign] signtool could not be spawned: {}", e),
        }
    }

    if toolchain::tool_available("osslsigncode") {
        match toolchain::run_tool("osslsigncode", &["sign", "-in", &path], None, "[Sign]").await {
            Ok(ToolOutcome::Success) => {
                return SignResult {
                    success: true,
                    tool_used: Some("osslsigncode".to_string()),
                    message: "fallback signature applied with osslsigncode".to_string(),
                };
            }
            Ok(ToolOutcome::Fatal(reason)) | Ok(ToolOutcome::NonFatalWarning(reason)) => {
                return SignResult {
                    success: false,
                    tool_used: Some("osslsigncode".to_string()),
                    message: format!("osslsigncode failed: {}", reason),
                };
            }
            Err(e) => {
                return SignResult {
                    success: false,
                    tool_used: Some("osslsigncode".to_string()),
                    message: format!("osslsigncode could not be spawned: {}", e),
                };
            }
        }
    }

    SignResult {
        success: false,
        tool_used: None,
        message: "no signing tool found; install the Windows SDK (signtool) or osslsigncode"
            .to_string(),
    }
}

/// Policy: the only combination that cannot execute unsigned.
pub fn signing_required(platform: Platform, arch: Arch) -> bool {
    platform == Platform::Macos && arch == Arch::Arm64
}
