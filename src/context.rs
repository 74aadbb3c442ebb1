//! Per-run build context: canonical paths, remote endpoints, and memoized
//! run state.
//!
//! Everything a pipeline stage needs is threaded through this struct; there is
//! no module-level mutable state. Memoization (the parsed patch manifest)
//! lives on the context so two runs in one process cannot observe each
//! other's state.

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;

use crate::sync::PatchManifest;

/// Default location of the remote patch manifest and its patch files.
pub const DEFAULT_MANIFEST_BASE_URL: &str =
    "https://raw.githubusercontent.com/smol-builder/patches/main";

/// Default location of versioned runtime source archives.
pub const DEFAULT_SOURCE_BASE_URL: &str = "https://nodejs.org/dist";

/// Fuzzy relocation window for hunk application, in lines each direction.
pub const DEFAULT_FUZZ_WINDOW: usize = 100;

/// Canonical per-run state threaded through every pipeline component.
#[derive(Debug)]
pub struct BuildContext {
    /// Root of all build state (`~/.cache/smol-builder` by default).
    pub build_root: PathBuf,
    /// Extracted runtime source checkout for the target version.
    pub source_dir: PathBuf,
    /// Scratch area for downloads and intermediate artifacts.
    pub staging_dir: PathBuf,
    /// Synced upstream patch files plus the local manifest copy.
    pub patches_dir: PathBuf,
    /// Custom code mod config and mod-owned patch files.
    pub mods_dir: PathBuf,
    /// Content-addressed binary cache.
    pub cache_dir: PathBuf,
    /// On-disk sync cache record.
    pub sync_record_path: PathBuf,

    pub manifest_base_url: String,
    pub source_base_url: String,

    /// Entry script bundled into the payload blob.
    pub payload_entry: PathBuf,
    /// Extra arguments forwarded to the runtime's configure script.
    pub configure_options: Vec<String>,
    /// Fuzzy relocation window for patch application.
    pub fuzz_window: usize,

    manifest: OnceCell<PatchManifest>,
}

impl BuildContext {
    /// Create a context rooted at `build_root` for one target version.
    pub fn new(build_root: impl Into<PathBuf>, version: &str) -> Self {
        let build_root = build_root.into();
        BuildContext {
            source_dir: build_root.join("src").join(format!("node-v{}", version)),
            staging_dir: build_root.join("staging"),
            patches_dir: build_root.join("patches"),
            mods_dir: build_root.join("mods"),
            cache_dir: build_root.join("cache"),
            sync_record_path: build_root.join("sync-cache.json"),
            manifest_base_url: DEFAULT_MANIFEST_BASE_URL.to_string(),
            source_base_url: DEFAULT_SOURCE_BASE_URL.to_string(),
            payload_entry: build_root.join("payload").join("main.js"),
            configure_options: Vec::new(),
            fuzz_window: DEFAULT_FUZZ_WINDOW,
            manifest: OnceCell::new(),
            build_root,
        }
    }

    /// Context rooted at the user's cache directory.
    pub fn for_host(version: &str) -> Self {
        let root = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("smol-builder");
        Self::new(root, version)
    }

    /// Local path of the synced manifest document.
    pub fn manifest_path(&self) -> PathBuf {
        self.patches_dir.join("manifest.json")
    }

    /// Create every directory the pipeline writes into.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            &self.build_root,
            &self.staging_dir,
            &self.patches_dir,
            &self.mods_dir,
            &self.cache_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Parsed local patch manifest, loaded at most once per run.
    ///
    /// Returns `None` when no manifest has been synced yet; the caller decides
    /// whether that is a warning (upstream patch step) or irrelevant.
    pub fn manifest(&self) -> Option<&PatchManifest> {
        self.manifest
            .get_or_try_init(|| {
                PatchManifest::load(&self.manifest_path()).ok_or(())
            })
            .ok()
    }

    /// Resolve a patch file listed in the manifest to its local path.
    pub fn patch_path(&self, file: &str) -> PathBuf {
        self.patches_dir.join(file)
    }
}

/// Trim a path so it stays inside `root` when joined (no absolute paths, no
/// parent traversal). Used for manifest-listed file names.
pub fn sanitize_relative(path: &str) -> Option<&Path> {
    let p = Path::new(path);
    if p.is_absolute()
        || p.components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return None;
    }
    Some(p)
}
