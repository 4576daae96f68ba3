//! Content-addressed artifact store for build outputs.
//!
//! Entries live under `.hermit/cache/<key>/` and are immutable: a store for
//! an existing key is a no-op, so concurrent writers of identical inputs are
//! idempotent and distinct inputs never collide.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::CacheKey;
use crate::error::EngineError;

/// Metadata stored alongside a cached artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildMetadata {
    /// Platform the artifact was built for (e.g. "x86_64-linux").
    pub platform: String,
    /// Which phase produced it ("deps" or "package").
    pub phase: String,
    /// The executor program that produced it.
    pub program: String,
    /// Epoch seconds timestamp of when the build was produced.
    pub built_at: String,
}

/// Content-addressed store for build outputs under `.hermit/cache/`.
#[derive(Debug)]
pub struct ArtifactStore {
    cache_root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `<work_dir>/cache/`.
    pub fn new(work_dir: &Path) -> Self {
        Self {
            cache_root: work_dir.join("cache"),
        }
    }

    /// Return the cache directory path for a given key.
    pub fn cache_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_root.join(key.as_hex())
    }

    /// Check whether a cache entry exists for the given key.
    pub fn has(&self, key: &CacheKey) -> bool {
        self.cache_path(key).is_dir()
    }

    /// Store an artifact and its metadata in the cache.
    ///
    /// The cache is immutable: if an entry already exists for this key,
    /// the store is a no-op and returns `Ok(())`.
    ///
    /// # Errors
    /// Returns an error if the cache directory cannot be created or the
    /// artifact cannot be copied.
    pub fn store(
        &self,
        key: &CacheKey,
        artifact: &Path,
        metadata: &BuildMetadata,
    ) -> Result<(), EngineError> {
        let entry_dir = self.cache_path(key);

        // Immutable cache: never overwrite.
        if entry_dir.is_dir() {
            return Ok(());
        }

        hermit_util::fs::ensure_dir(&entry_dir)?;

        let Some(file_name) = artifact.file_name() else {
            return Err(EngineError::Io {
                path: artifact.display().to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "artifact path has no file name",
                ),
            });
        };
        let cached_artifact = entry_dir.join(file_name);
        std::fs::copy(artifact, &cached_artifact).map_err(|source| EngineError::Io {
            path: cached_artifact.display().to_string(),
            source,
        })?;

        let metadata_path = entry_dir.join("metadata.toml");
        let metadata_toml =
            toml::to_string_pretty(metadata).map_err(|e| EngineError::Metadata {
                message: e.to_string(),
            })?;
        std::fs::write(&metadata_path, metadata_toml).map_err(|source| EngineError::Io {
            path: metadata_path.display().to_string(),
            source,
        })?;

        Ok(())
    }

    /// Materialize a cached artifact to the given destination path.
    ///
    /// Prefers hard linking for disk efficiency, falls back to copy if
    /// linking fails (e.g. cross-filesystem).
    ///
    /// # Errors
    /// Returns an error if the cache entry does not exist or the artifact
    /// cannot be materialized.
    pub fn materialize(
        &self,
        key: &CacheKey,
        artifact_name: &str,
        dest: &Path,
    ) -> Result<(), EngineError> {
        let cached_artifact = self.cache_path(key).join(artifact_name);

        if !cached_artifact.exists() {
            return Err(EngineError::Io {
                path: cached_artifact.display().to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "cached artifact not found",
                ),
            });
        }

        hermit_util::fs::materialize(&cached_artifact, dest)?;
        Ok(())
    }

    /// Read back the metadata of a cache entry.
    ///
    /// # Errors
    /// Returns an error if the entry or its metadata is missing or invalid.
    pub fn metadata(&self, key: &CacheKey) -> Result<BuildMetadata, EngineError> {
        let metadata_path = self.cache_path(key).join("metadata.toml");
        let content =
            std::fs::read_to_string(&metadata_path).map_err(|source| EngineError::Io {
                path: metadata_path.display().to_string(),
                source,
            })?;
        toml::from_str(&content).map_err(|e| EngineError::Metadata {
            message: e.to_string(),
        })
    }
}

/// Return the current UTC time as epoch seconds.
pub(crate) fn now_epoch_secs() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}s-since-epoch", duration.as_secs())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;

    fn key_of(s: &str) -> CacheKey {
        // Keys are opaque hex strings; derive one from the test name.
        let args = crate::cache::BuildArgs {
            source_root: std::env::temp_dir(),
            include: Vec::new(),
            dep_manifests: Vec::new(),
            strict_deps: true,
            program: s.to_owned(),
            deps_args: Vec::new(),
            package_args: Vec::new(),
            package_env: Vec::new(),
            platform: "x86_64-linux".to_owned(),
            input_pins: String::new(),
            tools: Vec::new(),
            libraries: Vec::new(),
            search_path: String::new(),
        };
        crate::cache::dep_cache_key(&args).unwrap()
    }

    fn metadata() -> BuildMetadata {
        BuildMetadata {
            platform: "x86_64-linux".to_owned(),
            phase: "package".to_owned(),
            program: "cargo".to_owned(),
            built_at: now_epoch_secs(),
        }
    }

    #[test]
    fn store_and_materialize() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let key = key_of("store_and_materialize");

        let artifact = tmp.path().join("starfield");
        fs::write(&artifact, b"binary-content").unwrap();

        assert!(!store.has(&key));
        store.store(&key, &artifact, &metadata()).unwrap();
        assert!(store.has(&key));

        let dest = tmp.path().join("out/starfield");
        store.materialize(&key, "starfield", &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"binary-content");
    }

    #[test]
    fn store_is_immutable() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let key = key_of("store_is_immutable");

        let first = tmp.path().join("first");
        fs::write(&first, b"first").unwrap();
        store.store(&key, &first, &metadata()).unwrap();

        let second = tmp.path().join("second");
        fs::write(&second, b"second").unwrap();
        store.store(&key, &second, &metadata()).unwrap();

        // The original entry survives.
        let dest = tmp.path().join("out");
        store.materialize(&key, "first", &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"first");
    }

    #[test]
    fn materialize_missing_entry_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let key = key_of("materialize_missing_entry_fails");

        let result = store.materialize(&key, "whatever", &tmp.path().join("dest"));
        assert!(result.is_err());
    }

    #[test]
    fn metadata_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let key = key_of("metadata_round_trips");

        let artifact = tmp.path().join("starfield");
        fs::write(&artifact, b"bin").unwrap();
        store.store(&key, &artifact, &metadata()).unwrap();

        let read_back = store.metadata(&key).unwrap();
        assert_eq!(read_back.platform, "x86_64-linux");
        assert_eq!(read_back.phase, "package");
        assert_eq!(read_back.program, "cargo");
    }

    #[test]
    fn now_epoch_secs_not_empty() {
        let ts = now_epoch_secs();
        assert!(ts.contains("since-epoch"));
    }
}
