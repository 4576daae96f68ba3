//! Subprocess capture for external fetchers (e.g. `git`).

use std::path::Path;
use std::process::Command;

use crate::error::UtilError;

/// Structured output from a command execution.
#[derive(Debug)]
pub struct CommandOutput {
    /// Standard output as a string.
    pub stdout: String,
    /// Standard error as a string.
    pub stderr: String,
    /// Whether the command exited successfully.
    pub success: bool,
    /// The exit code, if the process was not killed by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// Turn a failed execution into an error naming the operation.
    ///
    /// # Errors
    /// Returns `UtilError::CommandFailed` when the command exited unsuccessfully.
    pub fn require_success(self, what: &str) -> Result<CommandOutput, UtilError> {
        if self.success {
            Ok(self)
        } else {
            Err(UtilError::CommandFailed {
                what: what.to_owned(),
                exit_code: self.exit_code,
                stderr: self.stderr,
            })
        }
    }
}

/// Execute a command and capture its output.
///
/// # Errors
/// Returns an error if the command cannot be spawned (e.g. binary not found).
/// A non-zero exit code is **not** an error; check `CommandOutput::success`
/// or use `require_success`.
pub fn run_command(cmd: &mut Command) -> Result<CommandOutput, UtilError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let output = cmd
        .output()
        .map_err(|source| UtilError::CommandExec { program, source })?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        success: output.status.success(),
        exit_code: output.status.code(),
    })
}

/// Execute a command with a working directory and capture its output.
///
/// # Errors
/// Same as `run_command`.
pub fn run_command_in(dir: &Path, cmd: &mut Command) -> Result<CommandOutput, UtilError> {
    cmd.current_dir(dir);
    run_command(cmd)
}
