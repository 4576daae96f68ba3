//! Filesystem helpers for hermit.

use std::path::Path;

use crate::error::UtilError;

/// Create a directory and all parent directories if they do not exist.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> Result<(), UtilError> {
    std::fs::create_dir_all(path).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Copy `src` to `dest`, preferring a hard link for speed.
///
/// Falls back to a regular copy if hard linking fails (e.g. cross-device).
/// Any existing file at `dest` is replaced.
///
/// # Errors
/// Returns an error if both hard linking and copying fail.
pub fn materialize(src: &Path, dest: &Path) -> Result<(), UtilError> {
    if let Some(parent) = dest.parent() {
        ensure_dir(parent)?;
    }

    // Remove existing destination so hard_link doesn't fail.
    if dest.exists() {
        std::fs::remove_file(dest).map_err(|source| UtilError::Io {
            path: dest.display().to_string(),
            source,
        })?;
    }

    if std::fs::hard_link(src, dest).is_err() {
        std::fs::copy(src, dest).map_err(|source| UtilError::Io {
            path: dest.display().to_string(),
            source,
        })?;
    }

    Ok(())
}

/// Rename `from` to `to`.
///
/// # Errors
/// Returns an error if the rename fails.
pub fn rename(from: &Path, to: &Path) -> Result<(), UtilError> {
    std::fs::rename(from, to).map_err(|source| UtilError::Io {
        path: to.display().to_string(),
        source,
    })
}

/// Remove a directory and all its contents. No error if the directory is absent.
///
/// # Errors
/// Returns an error if the directory exists but cannot be removed.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<(), UtilError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(UtilError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Mark a file as executable by everyone (mode 0755).
///
/// # Errors
/// Returns an error if the permissions cannot be changed.
#[cfg(unix)]
pub fn make_executable(path: &Path) -> Result<(), UtilError> {
    use std::os::unix::fs::PermissionsExt;

    let perms = std::fs::Permissions::from_mode(0o755);
    std::fs::set_permissions(path, perms).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })
}
