//! Small filesystem and formatting helpers shared across the engine.

use crate::error::Result;
use std::fs;
use std::path::Path;

/// Read the process umask without changing it.
///
/// The only portable way to read the umask is to set it and set it back;
/// the window is harmless in a single-threaded startup path but callers
/// that care should capture the value once and pass it around.
#[cfg(unix)]
pub(crate) fn process_umask() -> u32 {
    let mask = unsafe { libc::umask(0) };
    unsafe { libc::umask(mask) };
    mask as u32
}

#[cfg(not(unix))]
pub(crate) fn process_umask() -> u32 {
    0o022
}

/// Set the process umask, returning the previous value.
#[cfg(unix)]
pub(crate) fn set_umask(mask: u32) -> u32 {
    unsafe { libc::umask(mask as libc::mode_t) as u32 }
}

#[cfg(not(unix))]
pub(crate) fn set_umask(_mask: u32) -> u32 {
    0o022
}

/// Set Unix permission bits on a path.
#[cfg(unix)]
pub(crate) fn set_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

/// Permission bits beyond read-only cannot be expressed off Unix.
#[cfg(not(unix))]
pub(crate) fn set_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, perms)
}

/// Create a symlink whose target is raw bytes from the store.
#[cfg(unix)]
pub(crate) fn symlink_from_bytes(target: &[u8], link: &Path) -> std::io::Result<()> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    std::os::unix::fs::symlink(OsStr::from_bytes(target), link)
}

#[cfg(windows)]
pub(crate) fn symlink_from_bytes(target: &[u8], link: &Path) -> std::io::Result<()> {
    let target = String::from_utf8_lossy(target).into_owned();
    std::os::windows::fs::symlink_file(target, link)
}

/// Format bytes in human-readable form (binary units).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Probe whether `path/objects` and `path/refs` both exist as directories.
///
/// The presence of both is a reasonable sanity check that `path` is a git
/// directory; symlinked layouts are resolved before checking.
pub(crate) fn has_objects_and_refs(path: &Path) -> Result<bool> {
    Ok(exists_and_is_directory(&path.join("objects"))? && exists_and_is_directory(&path.join("refs"))?)
}

fn exists_and_is_directory(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let real = path.canonicalize()?;
    Ok(fs::metadata(real)?.is_dir())
}
