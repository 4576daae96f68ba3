//! Post-install executable wrapping.
//!
//! Wrapping renames the installed binary to a hidden `.<name>-wrapped`
//! sibling and puts an `sh` script in its place that exports the runtime
//! environment (the linker search-path variable and the backtrace flag)
//! before `exec`ing the real binary. The binary therefore finds its native
//! libraries without them being installed globally on the host.

use std::path::{Path, PathBuf};

use crate::error::EngineError;

/// First line after the shebang; identifies a script as a hermit wrapper.
const WRAPPER_MARKER: &str = "# wrapper script generated by hermit";

/// Wrap the installed executable at `binary` with the given environment.
///
/// Returns the path of the hidden real binary. Wrapping is idempotent: if
/// `binary` is already a wrapper (e.g. a rebuild materialized over an old
/// install), only the script is rewritten.
///
/// # Errors
/// Returns an error if the rename, script write, or permission change fails.
pub fn wrap_program(binary: &Path, env: &[(String, String)]) -> Result<PathBuf, EngineError> {
    let Some(name) = binary.file_name().and_then(|n| n.to_str()) else {
        return Err(EngineError::Io {
            path: binary.display().to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "binary path has no file name",
            ),
        });
    };
    let real = binary.with_file_name(format!(".{name}-wrapped"));

    if !is_wrapper(binary)? {
        hermit_util::fs::rename(binary, &real)?;
    }

    let script = render_wrapper(&real, env);
    std::fs::write(binary, script).map_err(|source| EngineError::Io {
        path: binary.display().to_string(),
        source,
    })?;
    #[cfg(unix)]
    hermit_util::fs::make_executable(binary)?;

    Ok(real)
}

/// Whether the file at `path` is a previously generated wrapper script.
fn is_wrapper(path: &Path) -> Result<bool, EngineError> {
    let mut head = [0u8; 128];
    let mut file = std::fs::File::open(path).map_err(|source| EngineError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let n = std::io::Read::read(&mut file, &mut head).map_err(|source| EngineError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let head = head.get(..n).unwrap_or(&[]);
    Ok(String::from_utf8_lossy(head).contains(WRAPPER_MARKER))
}

/// Render the wrapper script text.
fn render_wrapper(real: &Path, env: &[(String, String)]) -> String {
    let mut script = String::new();
    script.push_str("#!/bin/sh\n");
    script.push_str(WRAPPER_MARKER);
    script.push_str(" — do not edit\n");
    for (key, value) in env {
        script.push_str(&format!("export {key}=\"{value}\"\n"));
    }
    script.push_str(&format!("exec \"{}\" \"$@\"\n", real.display()));
    script
}
