//! The `hermit.lock` lockfile: resolved pins for declared inputs.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// The `hermit.lock` lockfile.
///
/// One pin per declared input. Given a complete lockfile, input resolution is
/// fully deterministic: the same pins always produce the same input trees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Lockfile {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputPin>,
}

/// A resolved pin for one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputPin {
    pub name: String,
    #[serde(flatten)]
    pub source: PinSource,
    /// SHA-256 over the fetched tree (path-prefixed file contents).
    pub tree_hash: String,
}

/// The resolved source of a pinned input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "source_type")]
pub enum PinSource {
    /// A repository pinned to an exact commit.
    Git { url: String, rev: String },
    /// A tarball pinned to its content hash.
    Tarball { url: String, sha256: String },
}

impl Lockfile {
    /// Read and parse a `hermit.lock` from the given path.
    /// Returns an empty lockfile if the file does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or contains
    /// invalid TOML.
    pub fn from_path(path: &Path) -> Result<Self, LockfileError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| LockfileError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let lockfile: Lockfile = toml::from_str(&content).map_err(|e| LockfileError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(lockfile)
    }

    /// Look up the pin for an input name.
    pub fn pin(&self, name: &str) -> Option<&InputPin> {
        self.inputs.iter().find(|p| p.name == name)
    }

    /// Replace or add a pin, keeping entries sorted by name so the
    /// serialized lockfile is stable across runs.
    pub fn upsert(&mut self, pin: InputPin) {
        self.inputs.retain(|p| p.name != pin.name);
        self.inputs.push(pin);
        self.inputs.sort_by(|a, b| a.name.cmp(&b.name));
    }

    /// Write the lockfile to disk as human-readable TOML.
    ///
    /// Uses atomic write (write-to-temp-then-rename) to prevent partial
    /// writes from corrupting the lockfile.
    ///
    /// # Errors
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn write_to(&self, path: &Path) -> Result<(), LockfileError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| LockfileError::Serialize { source: e })?;
        let tmp_path = path.with_extension("lock.tmp");
        std::fs::write(&tmp_path, &content).map_err(|e| LockfileError::Write {
            path: tmp_path.display().to_string(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, path).map_err(|e| LockfileError::Write {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockfileError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid hermit.lock at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("cannot serialize lockfile: {source}")]
    Serialize { source: toml::ser::Error },
    #[error("cannot write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}
