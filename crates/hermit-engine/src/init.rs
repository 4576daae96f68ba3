//! Project scaffolding for `hermit init`.

use std::path::Path;

use crate::error::EngineError;

/// Create a starter `hermit.toml` in `dir` for a package called `name`.
///
/// # Errors
/// Returns an error if a `hermit.toml` already exists or the file cannot be
/// written.
pub fn init_project(name: &str, dir: &Path) -> Result<(), EngineError> {
    let manifest_path = dir.join("hermit.toml");
    if manifest_path.exists() {
        return Err(EngineError::ProjectExists {
            path: manifest_path.display().to_string(),
        });
    }

    hermit_util::fs::ensure_dir(dir)?;

    let content = format!(
        r#"[package]
name = "{name}"

[inputs]
# Pin the package set providing your native libraries and tools.
pkgset = {{ git = "https://example.org/pkgset.git", ref = "main" }}

[platforms]
supported = ["x86_64-linux", "aarch64-linux", "x86_64-darwin", "aarch64-darwin"]

[libraries]
# Native libraries the binary loads at runtime, in search order.
native = []
# Native tools needed during the build and in the dev shell.
tools = []
"#
    );

    std::fs::write(&manifest_path, content).map_err(|source| EngineError::Io {
        path: manifest_path.display().to_string(),
        source,
    })?;
    Ok(())
}
