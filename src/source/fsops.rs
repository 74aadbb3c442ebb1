//! Filesystem operations that must survive hostile build environments.
//!
//! The staging area and the source tree can live on different filesystems
//! (tmpfs staging, disk-backed source dir), so a plain `rename` is not
//! guaranteed to work. `move_dir` falls back to copy-plus-delete on a
//! cross-device error, retried a bounded number of times with a short
//! backoff.

use std::io;
use std::path::Path;
use std::time::Duration;

const MOVE_RETRIES: usize = 3;
const MOVE_BACKOFF: Duration = Duration::from_millis(250);

#[cfg(unix)]
const CROSS_DEVICE_CODE: i32 = 18; // EXDEV
#[cfg(windows)]
const CROSS_DEVICE_CODE: i32 = 17; // ERROR_NOT_SAME_DEVICE

fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(CROSS_DEVICE_CODE)
}

/// Move a directory, falling back to copy+delete across filesystems.
pub fn move_dir(src: &Path, dst: &Path) -> io::Result<()> {
    move_dir_with(src, dst, |s, d| std::fs::rename(s, d))
}

/// `move_dir` with an injectable rename primitive (unit tests simulate a
/// cross-device failure through this seam).
fn move_dir_with<F>(src: &Path, dst: &Path, rename: F) -> io::Result<()>
where
    F: Fn(&Path, &Path) -> io::Result<()>,
{
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }

    match rename(src, dst) {
        Ok(()) => return Ok(()),
        Err(e) if is_cross_device(&e) => {
            log::info!(
                "[Source] Cross-device move detected, falling back to copy: {} -> {}",
                src.display(),
                dst.display()
            );
        }
        Err(e) => return Err(e),
    }

    let mut last_err = None;
    for attempt in 1..=MOVE_RETRIES {
        match copy_then_delete(src, dst) {
            Ok(()) => return Ok(()),
            Err(e) => {
                log::warn!(
                    "[Source] Copy fallback attempt {}/{} failed: {}",
                    attempt,
                    MOVE_RETRIES,
                    e
                );
                last_err = Some(e);
                // Remove a partially copied destination before retrying.
                let _ = std::fs::remove_dir_all(dst);
                std::thread::sleep(MOVE_BACKOFF);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::other("copy fallback exhausted retries")))
}

fn copy_then_delete(src: &Path, dst: &Path) -> io::Result<()> {
    copy_dir_recursive(src, dst)?;
    std::fs::remove_dir_all(src)
}

/// Recursively copy a directory tree, preserving unix permissions.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_dir_recursive(&from, &to)?;
        } else if file_type.is_symlink() {
            copy_symlink(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    let link = std::fs::read_link(from)?;
    std::os::unix::fs::symlink(link, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    // Archive sources rarely carry symlinks on Windows; fall back to a copy.
    std::fs::copy(from, to).map(|_| ())
}
