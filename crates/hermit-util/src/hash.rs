//! SHA-256 hashing for content addressing and cache keys.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::UtilError;

/// Compute the SHA-256 hex digest of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Compute the SHA-256 hex digest of a file using streaming reads.
///
/// Uses a 64 KiB buffer so large fetched tarballs are never held in memory.
///
/// # Errors
/// Returns an error if the file cannot be opened or read.
pub fn sha256_file(path: &Path) -> Result<String, UtilError> {
    let file = std::fs::File::open(path).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut reader = std::io::BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = std::io::Read::read(&mut reader, &mut buf).map_err(|source| UtilError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if n == 0 {
            break;
        }
        let Some(chunk) = buf.get(..n) else {
            break; // unreachable: n is bounded by buf.len()
        };
        hasher.update(chunk);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// List the files under `dir` matching any of the include `patterns`,
/// deduplicated and sorted by relative path.
///
/// Patterns are glob expressions relative to `dir` (e.g. `src/**/*.rs`,
/// `*.toml`). Only regular files are returned.
///
/// # Errors
/// Returns an error if a pattern is invalid.
pub fn matching_files(dir: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, UtilError> {
    let mut paths: BTreeSet<PathBuf> = BTreeSet::new();
    for pattern in patterns {
        let full_pattern = dir.join(pattern).display().to_string();
        let matches = glob::glob(&full_pattern).map_err(|e| UtilError::GlobPattern {
            pattern: full_pattern.clone(),
            message: e.to_string(),
        })?;
        paths.extend(matches.filter_map(Result::ok).filter(|p| p.is_file()));
    }
    Ok(paths.into_iter().collect())
}

/// Hash the files under `dir` matching any of the include `patterns`.
///
/// Files are sorted by path relative to `dir` before hashing, and each
/// relative path is fed to the hasher before its contents so renames are
/// detected. The result is a pure function of the matched file set.
///
/// # Errors
/// Returns an error if a pattern is invalid or a matched file cannot be read.
pub fn sha256_dir(dir: &Path, patterns: &[String]) -> Result<String, UtilError> {
    let paths = matching_files(dir, patterns)?;

    let mut hasher = Sha256::new();
    for path in &paths {
        let relative = path.strip_prefix(dir).unwrap_or(path);
        hasher.update(relative.display().to_string().as_bytes());

        let data = std::fs::read(path).map_err(|source| UtilError::Io {
            path: path.display().to_string(),
            source,
        })?;
        hasher.update(&data);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash every regular file under `dir`, recursively.
///
/// This is the tree hash used to content-address fetched inputs: relative
/// paths are included, traversal order is sorted, symlinks are skipped.
///
/// # Errors
/// Returns an error if the directory or any file cannot be read.
pub fn sha256_tree(dir: &Path) -> Result<String, UtilError> {
    let mut files = Vec::new();
    collect_tree(dir, &mut files)?;
    files.sort();

    let mut hasher = Sha256::new();
    for path in &files {
        let relative = path.strip_prefix(dir).unwrap_or(path);
        hasher.update(relative.display().to_string().as_bytes());
        let data = std::fs::read(path).map_err(|source| UtilError::Io {
            path: path.display().to_string(),
            source,
        })?;
        hasher.update(&data);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn collect_tree(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), UtilError> {
    let entries = std::fs::read_dir(dir).map_err(|source| UtilError::Io {
        path: dir.display().to_string(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| UtilError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|source| UtilError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if file_type.is_symlink() {
            continue;
        }
        if file_type.is_dir() {
            collect_tree(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// Combine multiple string parts into a single composite SHA-256 hash.
///
/// Each part is hashed in order with a length prefix to prevent ambiguity.
pub fn sha256_multi(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        // Length-prefix each part to avoid collisions like ["ab","c"] vs ["a","bc"].
        let len_bytes = part.len().to_le_bytes();
        hasher.update(len_bytes);
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
