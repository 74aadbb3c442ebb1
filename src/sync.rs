//! Upstream patch manifest sync with TTL gating.
//!
//! The remote manifest maps runtime versions to patch file lists. A local
//! cache record gates re-fetching: within the TTL (and with the manifest
//! present on disk) no network call is made. Sync failures degrade to a
//! warning at the call site — the pipeline runs with whatever patches are
//! already on disk, and a strictly required patch that is missing becomes
//! fatal where it is consumed, not here.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::context::{sanitize_relative, BuildContext};
use crate::error::SyncError;

/// Remote manifest: version → list of patch files, ordered for application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatchManifest(pub BTreeMap<String, Vec<String>>);

impl PatchManifest {
    /// Patch files for one runtime version, in application order.
    pub fn files_for(&self, version: &str) -> Option<&[String]> {
        self.0.get(version).map(|v| v.as_slice())
    }

    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Load the locally synced manifest copy, if any.
    pub fn load(path: &Path) -> Option<Self> {
        let raw = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }
}

/// On-disk sync state, rewritten only after a successful sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCacheRecord {
    /// ISO-8601 timestamp of the last successful sync.
    pub last_sync: DateTime<Utc>,
    pub synced_versions: Vec<String>,
    /// Manifest base URL the record was synced from.
    pub source: String,
}

impl SyncCacheRecord {
    pub fn load(path: &Path) -> Option<Self> {
        let raw = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    pub fn save(&self, path: &Path) -> Result<(), SyncError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut json = serde_json::to_string_pretty(self)
            .map_err(|e| SyncError::InvalidManifest(e.to_string()))?;
        json.push('\n');
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Sync the upstream patch set unless the local copy is still fresh.
///
/// Returns `true` when a network sync actually happened. A cache hit
/// requires all of: `force` unset, a readable record younger than `ttl`,
/// and the manifest file present on disk (a deleted patches directory
/// invalidates the record regardless of its age).
pub async fn sync_if_needed(
    ctx: &BuildContext,
    ttl: Duration,
    force: bool,
) -> Result<bool, SyncError> {
    if !force {
        if let Some(record) = SyncCacheRecord::load(&ctx.sync_record_path) {
            let age = Utc::now() - record.last_sync;
            if age < ttl && ctx.manifest_path().is_file() {
                log::info!(
                    "[Sync] Patch manifest is fresh ({}h old, ttl {}h), skipping sync",
                    age.num_hours(),
                    ttl.num_hours()
                );
                return Ok(false);
            }
        }
    }

    let manifest = fetch_manifest(ctx).await?;
    let patch_count = download_patches(ctx, &manifest).await?;

    let record = SyncCacheRecord {
        last_sync: Utc::now(),
        synced_versions: manifest.versions().map(str::to_string).collect(),
        source: ctx.manifest_base_url.clone(),
    };
    record.save(&ctx.sync_record_path)?;

    log::info!(
        "[Sync] ✓ Synced {} patch file(s) across {} version(s)",
        patch_count,
        record.synced_versions.len()
    );
    Ok(true)
}

async fn fetch_manifest(ctx: &BuildContext) -> Result<PatchManifest, SyncError> {
    let url = format!("{}/manifest.json", ctx.manifest_base_url);
    log::info!("[Sync] Fetching patch manifest from {}", url);

    let response = reqwest::get(&url).await?;
    if !response.status().is_success() {
        return Err(SyncError::FetchFailed(format!(
            "{} returned {}",
            url,
            response.status()
        )));
    }
    let manifest: PatchManifest = response
        .json()
        .await
        .map_err(|e| SyncError::InvalidManifest(e.to_string()))?;

    // Persist the manifest alongside the patches, always overwriting.
    std::fs::create_dir_all(&ctx.patches_dir)?;
    let mut json = serde_json::to_string_pretty(&manifest)
        .map_err(|e| SyncError::InvalidManifest(e.to_string()))?;
    json.push('\n');
    std::fs::write(ctx.manifest_path(), json)?;
    Ok(manifest)
}

/// Download every patch file the manifest lists, overwriting local copies.
/// No partial/merge semantics: the local patch set mirrors the manifest.
async fn download_patches(ctx: &BuildContext, manifest: &PatchManifest) -> Result<usize, SyncError> {
    let mut count = 0usize;
    for (version, files) in &manifest.0 {
        for file in files {
            let rel = sanitize_relative(file).ok_or_else(|| {
                SyncError::InvalidManifest(format!(
                    "manifest for {} lists unsafe path '{}'",
                    version, file
                ))
            })?;
            let url = format!("{}/{}", ctx.manifest_base_url, file);
            let response = reqwest::get(&url).await?;
            if !response.status().is_success() {
                return Err(SyncError::FetchFailed(format!(
                    "{} returned {}",
                    url,
                    response.status()
                )));
            }
            let body = response.bytes().await?;

            let dest = ctx.patches_dir.join(rel);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&dest, &body)?;
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trips_iso8601() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync-cache.json");
        let record = SyncCacheRecord {
            last_sync: Utc::now(),
            synced_versions: vec!["22.12.0".to_string()],
            source: "https://example.com/patches".to_string(),
        };
        record.save(&path).unwrap();

        // The on-disk form is an ISO-8601 string, not an epoch integer.
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("last_sync"));
        assert!(raw.contains('T'));

        let loaded = SyncCacheRecord::load(&path).unwrap();
        assert_eq!(loaded.synced_versions, record.synced_versions);
        assert_eq!(loaded.source, record.source);
    }

    #[test]
    fn manifest_lookup() {
        let manifest = PatchManifest(
            [(
                "22.12.0".to_string(),
                vec!["22.12.0/backport.patch".to_string()],
            )]
            .into_iter()
            .collect(),
        );
        assert_eq!(
            manifest.files_for("22.12.0").unwrap(),
            ["22.12.0/backport.patch"]
        );
        assert!(manifest.files_for("0.0.1").is_none());
    }
}
