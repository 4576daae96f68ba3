//! Development shell environment assembly.
//!
//! The dev shell gets the same runtime environment as the wrapped artifact
//! (linker search path and backtrace flag) plus the descriptor's native
//! build tools and interactive shell tools on `PATH`. The incremental
//! disable switch is build-step-only and is never exported here.

use std::path::{Path, PathBuf};
use std::process::Command;

use hermit_config::{Descriptor, Lockfile};

use crate::build::resolve_platform;
use crate::error::EngineError;
use crate::eval::EvalContext;
use crate::inputs;

/// The environment a dev shell runs with.
#[derive(Debug)]
pub struct ShellEnv {
    /// Plain `export`ed variables, in order.
    pub exports: Vec<(String, String)>,
    /// Directories prepended to `PATH`, in order, deduplicated.
    pub path_prepend: Vec<PathBuf>,
}

/// Options for entering a dev shell.
#[derive(Debug, Clone, Default)]
pub struct ShellOptions {
    /// Explicit platform identifier, or `None` for the host.
    pub platform: Option<String>,
    /// Require the lockfile to be up-to-date; error on any mismatch.
    pub locked: bool,
}

/// Assemble the dev-shell environment for a project.
///
/// # Errors
/// Returns resolution or evaluation errors; the shell environment is only
/// produced when the descriptor is fully satisfiable on the platform.
pub fn shell_env(project_root: &Path, options: &ShellOptions) -> Result<ShellEnv, EngineError> {
    let descriptor = Descriptor::from_path(&project_root.join("hermit.toml"))?;
    let lockfile_path = project_root.join("hermit.lock");
    let lockfile = Lockfile::from_path(&lockfile_path)?;

    if options.locked {
        inputs::check_lock_staleness(&descriptor, &lockfile)?;
    }

    let platform = resolve_platform(&options.platform)?;
    let (resolved, updated_lock) =
        inputs::resolve_all(project_root, &descriptor, &lockfile, options.locked)?;
    if updated_lock != lockfile {
        updated_lock.write_to(&lockfile_path)?;
    }

    let ctx = EvalContext::resolve(&descriptor, &resolved, &platform)?;
    Ok(assemble(&ctx))
}

/// Derive the shell environment from an evaluation context.
fn assemble(ctx: &EvalContext) -> ShellEnv {
    let mut path_prepend: Vec<PathBuf> = Vec::new();
    for tool in ctx.tools.iter().chain(ctx.shell_tools.iter()) {
        if !path_prepend.contains(&tool.bin_dir) {
            path_prepend.push(tool.bin_dir.clone());
        }
    }

    ShellEnv {
        exports: ctx.runtime_env(),
        path_prepend,
    }
}

/// Render the environment as a POSIX `sh` export script.
///
/// Byte-identical output for identical input; suitable for `eval "$(...)"`.
pub fn render_export_script(env: &ShellEnv) -> String {
    let mut script = String::new();
    for (key, value) in &env.exports {
        script.push_str(&format!("export {key}=\"{value}\"\n"));
    }
    if !env.path_prepend.is_empty() {
        let joined = env
            .path_prepend
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":");
        script.push_str(&format!("export PATH=\"{joined}:$PATH\"\n"));
    }
    script
}

/// Spawn an interactive shell with the environment applied.
///
/// Uses `$SHELL` when set, `/bin/sh` otherwise. Returns the shell's exit
/// code.
///
/// # Errors
/// Returns an error if the shell cannot be spawned.
pub fn spawn_interactive(env: &ShellEnv) -> Result<i32, EngineError> {
    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_owned());

    let mut cmd = Command::new(&shell);
    for (key, value) in &env.exports {
        cmd.env(key, value);
    }
    if !env.path_prepend.is_empty() {
        let current = std::env::var("PATH").unwrap_or_default();
        let mut joined = env
            .path_prepend
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":");
        if !current.is_empty() {
            joined.push(':');
            joined.push_str(&current);
        }
        cmd.env("PATH", joined);
    }

    let status = cmd.status().map_err(|source| EngineError::Io {
        path: shell,
        source,
    })?;
    Ok(status.code().unwrap_or(1))
}
