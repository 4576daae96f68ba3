//! Error types for hermit-engine.
//!
//! The taxonomy is three-way: resolution errors (an input cannot be fetched
//! or pinned), evaluation errors (the descriptor cannot be satisfied on a
//! platform), and build errors (the executor failed). All are fatal at the
//! point of occurrence; nothing is retried or downgraded.

/// Errors produced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // ── resolution ────────────────────────────────────────────────

    /// An input is declared but has no pin, and pinning is not allowed.
    #[error("input `{name}` is not pinned — run `hermit lock` to pin it")]
    InputNotPinned { name: String },

    /// Fetching an input failed.
    #[error("cannot fetch input `{name}`: {message}")]
    InputFetch { name: String, message: String },

    /// A fetched input tree does not match its pinned hash.
    #[error("input `{name}` does not match its pin — expected tree hash {expected}, got {actual}")]
    InputHashMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// The lockfile is stale or incomplete and `--locked` forbids updating it.
    #[error("the lockfile is out of date — re-run without --locked, or run `hermit update`")]
    LockfileUpdateRequired,

    // ── evaluation ────────────────────────────────────────────────

    /// The requested platform is not in the descriptor's supported set.
    #[error("platform `{platform}` is not supported by this descriptor (supported: {supported})")]
    UnsupportedPlatform { platform: String, supported: String },

    /// The package set input has no tree for the platform.
    #[error("package set `{input}` has no packages for platform `{platform}` (looked in {path})")]
    PackageSetMissingPlatform {
        input: String,
        platform: String,
        path: String,
    },

    /// A declared library or tool is absent from the platform's package set.
    #[error("package `{name}` not found for platform `{platform}` — available: {}", .available.join(", "))]
    PackageNotFound {
        name: String,
        platform: String,
        available: Vec<String>,
    },

    // ── build ─────────────────────────────────────────────────────

    /// Strict dependency mode requires every dependency manifest to exist.
    #[error("strict dependency mode: no file matches manifest pattern `{pattern}`")]
    MissingDependencyManifest { pattern: String },

    /// A build phase's executor invocation failed.
    #[error("{phase} build failed with {error_count} error(s)")]
    BuildPhaseFailed { phase: String, error_count: usize },

    /// The executor reported success but left no binary at the expected path.
    #[error("build succeeded but no artifact was produced at {path}")]
    ArtifactMissing { path: String },

    // ── plumbing ──────────────────────────────────────────────────

    /// A filesystem operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A `hermit.toml` already exists at the target path.
    #[error("hermit.toml already exists at {path} — refusing to overwrite an existing project")]
    ProjectExists { path: String },

    /// Metadata serialization/deserialization failed.
    #[error("cannot process metadata: {message}")]
    Metadata { message: String },

    /// A utility operation failed.
    #[error("{0}")]
    Util(#[from] hermit_util::error::UtilError),

    /// A descriptor operation failed.
    #[error("{0}")]
    Descriptor(#[from] hermit_config::descriptor::DescriptorError),

    /// A lockfile operation failed.
    #[error("{0}")]
    Lockfile(#[from] hermit_config::lockfile::LockfileError),

    /// A platform operation failed.
    #[error("{0}")]
    Platform(#[from] hermit_platform::PlatformError),
}
