//! Content-addressed binary cache.
//!
//! Entries are keyed by `built-<version>-<platform>-<arch>`; presence of a
//! file at the derived path is the sole query. Stores write through a temp
//! file and rename into place, so a concurrent reader sees either no entry
//! or a complete one. There is no eviction; cleanup is an operator concern.

use std::path::{Path, PathBuf};

use crate::error::CacheError;
use crate::models::{Arch, Platform};

#[derive(Debug, Clone)]
pub struct BinaryCache {
    dir: PathBuf,
}

impl BinaryCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        BinaryCache { dir: dir.into() }
    }

    /// Deterministic cache key for a build target.
    pub fn key(version: &str, platform: Platform, arch: Arch) -> String {
        format!(
            "built-{}-{}-{}",
            version,
            platform.canonical_name(),
            arch.canonical_name()
        )
    }

    /// Path an entry with this key lives at.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    pub fn exists(&self, key: &str) -> bool {
        self.entry_path(key).is_file()
    }

    /// Copy a built binary into the cache under `key`.
    ///
    /// Returns the entry path. Permissions (notably the executable bit) are
    /// carried over from the source binary.
    pub fn store(&self, key: &str, binary: &Path) -> Result<PathBuf, CacheError> {
        std::fs::create_dir_all(&self.dir)?;

        let entry = self.entry_path(key);
        let tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        std::fs::copy(binary, tmp.path()).map_err(|e| CacheError::StoreFailed {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let perms = std::fs::metadata(binary)?.permissions();
        std::fs::set_permissions(tmp.path(), perms)?;
        tmp.persist(&entry).map_err(|e| CacheError::StoreFailed {
            key: key.to_string(),
            reason: e.error.to_string(),
        })?;

        log::info!("[Cache] ✓ Stored {}", entry.display());
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_uses_canonical_names() {
        assert_eq!(
            BinaryCache::key("1.2.3", Platform::Linux, Arch::X64),
            "built-1.2.3-linux-x64"
        );
        assert_eq!(
            BinaryCache::key("22.12.0", Platform::Macos, Arch::Arm64),
            "built-22.12.0-macos-arm64"
        );
    }

    #[test]
    fn store_then_exists() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BinaryCache::new(dir.path().join("cache"));
        let key = BinaryCache::key("1.2.3", Platform::Linux, Arch::X64);
        assert!(!cache.exists(&key));

        let binary = dir.path().join("node");
        std::fs::write(&binary, b"ELF...").unwrap();
        let entry = cache.store(&key, &binary).unwrap();

        assert!(cache.exists(&key));
        assert_eq!(entry.file_name().unwrap(), "built-1.2.3-linux-x64");
        assert_eq!(std::fs::read(entry).unwrap(), b"ELF...");
    }

    #[cfg(unix)]
    #[test]
    fn store_preserves_executable_bit() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let cache = BinaryCache::new(dir.path().join("cache"));
        let binary = dir.path().join("node");
        std::fs::write(&binary, b"bin").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        let key = BinaryCache::key("1.0.0", Platform::Linux, Arch::X64);
        let entry = cache.store(&key, &binary).unwrap();
        let mode = std::fs::metadata(entry).unwrap().permissions().mode();
        assert_ne!(mode & 0o111, 0);
    }
}
