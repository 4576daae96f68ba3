//! Build executor invocation and diagnostics normalization.
//!
//! hermit never compiles anything itself — it drives the descriptor's
//! executor program and normalizes its stderr into structured diagnostics.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::EngineError;

/// Severity level of an executor diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Error,
    Warning,
}

/// A single structured diagnostic from the executor.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
}

/// Result of one executor invocation.
#[derive(Debug)]
pub struct ExecutorResult {
    /// Whether the executor exited successfully.
    pub success: bool,
    /// The exit code, if the process was not killed by a signal.
    pub exit_code: Option<i32>,
    /// Parsed diagnostics from executor stderr.
    pub diagnostics: Vec<Diagnostic>,
    /// Raw stdout from the executor.
    pub raw_stdout: String,
    /// Raw stderr from the executor.
    pub raw_stderr: String,
}

impl ExecutorResult {
    /// Count the number of error-level diagnostics.
    ///
    /// A failed run with no parseable error lines still counts as one error.
    pub fn error_count(&self) -> usize {
        let parsed = self
            .diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .count();
        if parsed == 0 && !self.success {
            1
        } else {
            parsed
        }
    }

    /// Count the number of warning-level diagnostics.
    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Warning)
            .count()
    }
}

/// Builder for one executor invocation.
#[derive(Debug, Default)]
pub struct BuilderCommand {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    envs: Vec<(String, String)>,
    env_removed: Vec<String>,
}

impl BuilderCommand {
    /// Create a command for the given executor program.
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_owned(),
            ..Self::default()
        }
    }

    /// Set the argument list.
    pub fn args(mut self, args: &[String]) -> Self {
        self.args = args.to_vec();
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    /// Add environment variables for this invocation only.
    pub fn envs(mut self, envs: &[(String, String)]) -> Self {
        self.envs.extend(envs.iter().cloned());
        self
    }

    /// Scrub a variable from the executor's environment, regardless of the
    /// ambient process environment.
    pub fn env_remove(mut self, key: &str) -> Self {
        self.env_removed.push(key.to_owned());
        self
    }

    /// Execute and capture the result.
    ///
    /// A non-zero exit is reported through `ExecutorResult::success`, not as
    /// an error; only a failure to spawn is an error here.
    ///
    /// # Errors
    /// Returns an error if the executor binary cannot be spawned.
    pub fn execute(&self) -> Result<ExecutorResult, EngineError> {
        // Project-relative executor paths resolve against the working
        // directory, not the directory hermit was launched from.
        let program = match &self.cwd {
            Some(dir) if self.program.contains('/') && Path::new(&self.program).is_relative() => {
                dir.join(&self.program)
            }
            _ => PathBuf::from(&self.program),
        };

        let mut cmd = Command::new(&program);
        cmd.args(&self.args);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        for key in &self.env_removed {
            cmd.env_remove(key);
        }
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }

        let output = hermit_util::process::run_command(&mut cmd)?;
        let diagnostics = parse_diagnostics(&output.stderr);

        Ok(ExecutorResult {
            success: output.success,
            exit_code: output.exit_code,
            diagnostics,
            raw_stdout: output.stdout,
            raw_stderr: output.stderr,
        })
    }
}

/// Parse executor stderr into structured diagnostics.
///
/// Handles the common formats:
/// - `error: message` / `warning: message`
/// - `error[CODE]: message` (compiler-style coded errors)
pub fn parse_diagnostics(stderr: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for line in stderr.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(diag) = try_parse_line(trimmed) {
            diagnostics.push(diag);
        }
    }

    diagnostics
}

fn try_parse_line(line: &str) -> Option<Diagnostic> {
    if let Some(rest) = line.strip_prefix("error") {
        // "error: msg" or "error[E0999]: msg"
        let rest = rest.strip_prefix('[').map_or(rest, |coded| {
            coded.split_once(']').map_or(coded, |(_, after)| after)
        });
        if let Some(message) = rest.strip_prefix(':') {
            return Some(Diagnostic {
                level: DiagnosticLevel::Error,
                message: message.trim().to_owned(),
            });
        }
    }
    if let Some(message) = line.strip_prefix("warning:") {
        return Some(Diagnostic {
            level: DiagnosticLevel::Warning,
            message: message.trim().to_owned(),
        });
    }
    None
}

/// Print diagnostics in the standard short form; with `verbose`, dump the
/// executor's raw stderr instead.
pub fn print_diagnostics(result: &ExecutorResult, verbose: bool) {
    if verbose {
        eprint!("{}", result.raw_stderr);
        return;
    }
    for diag in &result.diagnostics {
        match diag.level {
            DiagnosticLevel::Error => eprintln!("  error: {}", diag.message),
            DiagnosticLevel::Warning => eprintln!("  warning: {}", diag.message),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare_error() {
        let diags = parse_diagnostics("error: linking failed\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.first().unwrap().level, DiagnosticLevel::Error);
        assert_eq!(diags.first().unwrap().message, "linking failed");
    }

    #[test]
    fn parse_coded_error() {
        let diags = parse_diagnostics("error[E0425]: cannot find value `x`\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.first().unwrap().message, "cannot find value `x`");
    }

    #[test]
    fn parse_warning() {
        let diags = parse_diagnostics("warning: unused variable\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.first().unwrap().level, DiagnosticLevel::Warning);
    }

    #[test]
    fn parse_skips_noise() {
        let stderr = "   Compiling app v0.1.0\nerror: real problem\n    Finished\n";
        let diags = parse_diagnostics(stderr);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.first().unwrap().message, "real problem");
    }

    #[test]
    fn parse_empty() {
        assert!(parse_diagnostics("").is_empty());
    }

    #[test]
    fn error_count_falls_back_to_one_on_silent_failure() {
        let result = ExecutorResult {
            success: false,
            exit_code: Some(101),
            diagnostics: Vec::new(),
            raw_stdout: String::new(),
            raw_stderr: String::new(),
        };
        assert_eq!(result.error_count(), 1);
    }

    #[test]
    fn error_count_counts_parsed_errors() {
        let result = ExecutorResult {
            success: false,
            exit_code: Some(1),
            diagnostics: parse_diagnostics("error: one\nerror: two\nwarning: three\n"),
            raw_stdout: String::new(),
            raw_stderr: String::new(),
        };
        assert_eq!(result.error_count(), 2);
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn execute_captures_output_and_env() {
        let result = BuilderCommand::new("sh")
            .args(&[
                "-c".to_owned(),
                "echo out-$HERMIT_TEST_VAR; echo 'error: boom' >&2; exit 1".to_owned(),
            ])
            .envs(&[("HERMIT_TEST_VAR".to_owned(), "42".to_owned())])
            .execute()
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.exit_code, Some(1));
        assert!(result.raw_stdout.contains("out-42"));
        assert_eq!(result.error_count(), 1);
    }

    #[test]
    fn execute_scrubs_removed_env() {
        let result = BuilderCommand::new("sh")
            .args(&["-c".to_owned(), "echo value=$HERMIT_SCRUBBED".to_owned()])
            .env_remove("HERMIT_SCRUBBED")
            .execute()
            .unwrap();
        assert!(result.raw_stdout.contains("value=\n") || result.raw_stdout.trim() == "value=");
    }

    #[test]
    fn execute_respects_cwd() {
        let tmp = tempfile::tempdir().unwrap();
        let result = BuilderCommand::new("sh")
            .args(&["-c".to_owned(), "pwd".to_owned()])
            .cwd(tmp.path())
            .execute()
            .unwrap();
        assert!(result.success);
        let reported = std::path::PathBuf::from(result.raw_stdout.trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            tmp.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn execute_missing_program_is_an_error() {
        let result = BuilderCommand::new("hermit_missing_executor_xyz").execute();
        assert!(result.is_err());
    }
}
