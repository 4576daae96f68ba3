//! Error types for hermit-util.

/// Errors produced by utility functions.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    /// An I/O operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A glob pattern was invalid.
    #[error("invalid glob pattern `{pattern}`: {message}")]
    GlobPattern { pattern: String, message: String },

    /// A command failed to spawn.
    #[error("cannot execute `{program}`: {source}")]
    CommandExec {
        program: String,
        source: std::io::Error,
    },

    /// A command ran but exited unsuccessfully.
    #[error("{what} failed{}", render_exit(.exit_code, .stderr))]
    CommandFailed {
        what: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// A download failed.
    #[error("download failed: {message}")]
    Download { message: String },

    /// Downloaded or stored content does not match its expected hash.
    #[error("hash mismatch for {path} — expected {expected}, got {actual}")]
    HashMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// An archive could not be extracted.
    #[error("cannot extract {path}: {message}")]
    Archive { path: String, message: String },
}

fn render_exit(exit_code: &Option<i32>, stderr: &str) -> String {
    let code = match exit_code {
        Some(c) => format!(" (exit code {c})"),
        None => " (killed by signal)".to_owned(),
    };
    let detail = stderr.trim();
    if detail.is_empty() {
        code
    } else {
        format!("{code}: {detail}")
    }
}
