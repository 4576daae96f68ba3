//! Cache key computation for the two build phases.
//!
//! `BuildArgs` is the immutable record shared by the dependency-only build
//! and the full-package build. The dependency key covers only
//! dependency-relevant inputs — the manifest-file subset, the input pins,
//! the strict flag, the executor, the platform, and the dep-phase arguments.
//! Build-step environment and files outside the source filter never enter
//! it, so changing either reuses previously built dependencies. The package
//! key additionally covers the full filtered source tree, the package-phase
//! arguments and environment, and the dependency key itself.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::EngineError;

/// All inputs shared between the dependency-only and full-package builds.
#[derive(Debug, Clone)]
pub struct BuildArgs {
    /// Project root containing the source tree.
    pub source_root: PathBuf,
    /// Glob patterns selecting the build-relevant source set.
    pub include: Vec<String>,
    /// The dependency-manifest subset of the source filter.
    pub dep_manifests: Vec<String>,
    /// Refuse to build when a dependency is not covered by the lock.
    pub strict_deps: bool,
    /// The external build executor.
    pub program: String,
    /// Executor arguments for the dependency-only phase.
    pub deps_args: Vec<String>,
    /// Executor arguments for the full-package phase.
    pub package_args: Vec<String>,
    /// Environment applied to the full-package build step only.
    pub package_env: Vec<(String, String)>,
    /// Platform identifier the build is evaluated for.
    pub platform: String,
    /// Serialized lockfile content (the input pins).
    pub input_pins: String,
    /// Native build tool names.
    pub tools: Vec<String>,
    /// Resolved native library names, in search order.
    pub libraries: Vec<String>,
    /// The computed library search path.
    pub search_path: String,
}

/// A content-addressed cache key wrapping a SHA-256 hex string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Return the hex string representation of this cache key.
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for CacheKey {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

/// Compute the cache key of the dependency-only build.
///
/// # Errors
/// Returns an error if manifest files cannot be read.
pub fn dep_cache_key(args: &BuildArgs) -> Result<CacheKey, EngineError> {
    let manifest_hash = hermit_util::hash::sha256_dir(&args.source_root, &args.dep_manifests)?;
    let strict = if args.strict_deps { "strict" } else { "lax" };

    let mut parts: Vec<&str> = vec![
        "deps",
        &manifest_hash,
        &args.input_pins,
        strict,
        &args.program,
        &args.platform,
    ];
    for arg in &args.deps_args {
        parts.push(arg);
    }
    for tool in &args.tools {
        parts.push(tool);
    }

    Ok(CacheKey(hermit_util::hash::sha256_multi(&parts)))
}

/// Compute the cache key of the full-package build.
///
/// # Errors
/// Returns an error if source files cannot be read.
pub fn package_cache_key(args: &BuildArgs, dep_key: &CacheKey) -> Result<CacheKey, EngineError> {
    let source_hash = hermit_util::hash::sha256_dir(&args.source_root, &args.include)?;

    let env_flat: Vec<String> = args
        .package_env
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();

    let mut parts: Vec<&str> = vec![
        "package",
        dep_key.as_hex(),
        &source_hash,
        &args.program,
        &args.platform,
        &args.search_path,
    ];
    for arg in &args.package_args {
        parts.push(arg);
    }
    for lib in &args.libraries {
        parts.push(lib);
    }
    for entry in &env_flat {
        parts.push(entry);
    }

    Ok(CacheKey(hermit_util::hash::sha256_multi(&parts)))
}
