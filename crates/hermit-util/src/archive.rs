//! Tarball extraction for fetched inputs.

use std::path::Path;

use flate2::read::GzDecoder;

use crate::error::UtilError;

/// Extract a `.tar.gz` archive into `dest`.
///
/// Extraction goes through a temporary sibling directory which is renamed
/// into place only on success, so a failed extraction never leaves a
/// half-populated `dest` behind.
///
/// If the archive contains a single top-level directory (the usual layout for
/// release tarballs), that directory's contents become `dest` directly.
///
/// # Errors
/// Returns an error if the archive cannot be read, an entry cannot be
/// unpacked, or the final rename fails.
pub fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<(), UtilError> {
    let file = std::fs::File::open(archive).map_err(|source| UtilError::Io {
        path: archive.display().to_string(),
        source,
    })?;

    let staging = staging_dir_for(dest);
    crate::fs::remove_dir_all_if_exists(&staging)?;
    crate::fs::ensure_dir(&staging)?;

    let mut tar = tar::Archive::new(GzDecoder::new(file));
    if let Err(e) = tar.unpack(&staging) {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(UtilError::Archive {
            path: archive.display().to_string(),
            message: e.to_string(),
        });
    }

    let root = strip_single_root(&staging)?;

    crate::fs::remove_dir_all_if_exists(dest)?;
    if let Some(parent) = dest.parent() {
        crate::fs::ensure_dir(parent)?;
    }
    let rename_result = crate::fs::rename(&root, dest);
    let _ = std::fs::remove_dir_all(&staging);
    rename_result
}

/// Temp directory next to `dest`, so the final rename stays on one filesystem.
fn staging_dir_for(dest: &Path) -> std::path::PathBuf {
    let pid = std::process::id();
    let name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("extract");
    dest.parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!(".tmp-{name}-{pid}"))
}

/// If `dir` holds exactly one directory and nothing else, return it;
/// otherwise return `dir` itself.
fn strip_single_root(dir: &Path) -> Result<std::path::PathBuf, UtilError> {
    let entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(|source| UtilError::Io {
            path: dir.display().to_string(),
            source,
        })?
        .filter_map(Result::ok)
        .collect();

    if entries.len() == 1 {
        if let Some(entry) = entries.first() {
            if entry.path().is_dir() {
                return Ok(entry.path());
            }
        }
    }
    Ok(dir.to_path_buf())
}
