#![forbid(unsafe_code)]

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(name = "hermit", about = "A hermetic build pipeline for native applications")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a starter hermit.toml
    Init {
        /// Package name (defaults to the current directory name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Pin any unpinned inputs and write hermit.lock
    Lock,
    /// Re-resolve every input and refresh hermit.lock
    Update,
    /// Evaluate every supported platform, then build the host target
    Check {
        /// Show raw executor output
        #[arg(long)]
        verbose: bool,
        /// Force a rebuild, bypassing the cache
        #[arg(long)]
        force: bool,
        /// Require the lockfile to be up-to-date; error on any mismatch
        #[arg(long)]
        locked: bool,
    },
    /// Build the default package (the wrapped binary)
    Build {
        /// Platform identifier (defaults to host)
        #[arg(long)]
        platform: Option<String>,
        /// Show raw executor output
        #[arg(long)]
        verbose: bool,
        /// Force a rebuild, bypassing the cache
        #[arg(long)]
        force: bool,
        /// Require the lockfile to be up-to-date; error on any mismatch
        #[arg(long)]
        locked: bool,
    },
    /// Build and run the default package
    Run {
        /// Platform identifier (defaults to host)
        #[arg(long)]
        platform: Option<String>,
        /// Show raw executor output
        #[arg(long, short = 'v')]
        verbose: bool,
        /// Force a rebuild, bypassing the cache
        #[arg(long)]
        force: bool,
        /// Require the lockfile to be up-to-date; error on any mismatch
        #[arg(long)]
        locked: bool,
        /// Arguments to pass to the program
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Enter a development shell with the project environment
    Shell {
        /// Platform identifier (defaults to host)
        #[arg(long)]
        platform: Option<String>,
        /// Print the export script instead of spawning a shell
        #[arg(long)]
        print: bool,
        /// Require the lockfile to be up-to-date; error on any mismatch
        #[arg(long)]
        locked: bool,
    },
    /// Remove fetched inputs, caches, and installed outputs
    Clean,
    /// Check environment and project setup
    Doctor,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Init { name } => cmd_init(name),
        Command::Lock => cmd_lock(false),
        Command::Update => cmd_lock(true),
        Command::Check {
            verbose,
            force,
            locked,
        } => cmd_check(verbose, force, locked),
        Command::Build {
            platform,
            verbose,
            force,
            locked,
        } => cmd_build(platform, verbose, force, locked),
        Command::Run {
            platform,
            verbose,
            force,
            locked,
            args,
        } => cmd_run(platform, verbose, force, locked, &args),
        Command::Shell {
            platform,
            print,
            locked,
        } => cmd_shell(platform, print, locked),
        Command::Clean => cmd_clean(),
        Command::Doctor => cmd_doctor(),
    };

    if let Err(msg) = result {
        eprintln!("error: {msg}");
        process::exit(1);
    }
}

/// Find the project root by looking for `hermit.toml` in the current directory.
fn project_root() -> Result<PathBuf, Box<dyn Error>> {
    let cwd = std::env::current_dir()?;
    if !cwd.join("hermit.toml").exists() {
        return Err(
            "no hermit.toml found in current directory — run `hermit init` to create one".into(),
        );
    }
    Ok(cwd)
}

fn cmd_init(name: Option<String>) -> CliResult {
    let cwd = std::env::current_dir()?;
    let package_name = name.unwrap_or_else(|| {
        cwd.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("my-app")
            .to_owned()
    });

    hermit_engine::init_project(&package_name, &cwd)?;

    eprintln!("    Created hermit.toml for `{package_name}`");
    eprintln!();
    eprintln!("  Next steps:");
    eprintln!("    edit hermit.toml to declare your inputs and libraries");
    eprintln!("    hermit lock");
    eprintln!("    hermit build");
    Ok(())
}

fn cmd_lock(refresh: bool) -> CliResult {
    let root = project_root()?;
    let changed = hermit_engine::inputs::lock_inputs(&root, refresh)?;
    if changed == 0 {
        eprintln!("    Lockfile is up to date");
    } else {
        eprintln!("    Pinned {changed} input(s)");
    }
    Ok(())
}

fn cmd_check(verbose: bool, force: bool, locked: bool) -> CliResult {
    let root = project_root()?;
    let options = hermit_engine::CheckOptions {
        verbose,
        force,
        locked,
    };

    let result = hermit_engine::check(&root, &options)?;

    eprintln!(
        "    Checked {} platform(s)",
        result.platforms.len()
    );
    if let Some(build) = &result.build {
        eprintln!(
            "    Finished host build in {:.2}s ({})",
            build.duration.as_secs_f64(),
            outcome_label(build)
        );
    } else {
        eprintln!("    Host platform not in the supported set; evaluation only");
    }
    Ok(())
}

fn cmd_build(
    platform: Option<String>,
    verbose: bool,
    force: bool,
    locked: bool,
) -> CliResult {
    let root = project_root()?;
    let options = hermit_engine::BuildOptions {
        platform,
        verbose,
        force,
        locked,
    };

    let result = hermit_engine::build(&root, &options)?;

    eprintln!(
        "    Finished in {:.2}s ({})",
        result.duration.as_secs_f64(),
        outcome_label(&result)
    );
    eprintln!("    Installed {}", result.binary.display());
    Ok(())
}

fn outcome_label(result: &hermit_engine::BuildResult) -> &'static str {
    match (result.deps_outcome, result.package_outcome) {
        (hermit_engine::BuildOutcome::Cached, hermit_engine::BuildOutcome::Cached) => "cached",
        (hermit_engine::BuildOutcome::Cached, _) => "dependencies cached",
        _ => "fresh",
    }
}

fn cmd_run(
    platform: Option<String>,
    verbose: bool,
    force: bool,
    locked: bool,
    args: &[String],
) -> CliResult {
    let root = project_root()?;
    let options = hermit_engine::BuildOptions {
        platform,
        verbose,
        force,
        locked,
    };

    let result = hermit_engine::build(&root, &options)?;

    eprintln!(
        "    Finished in {:.2}s ({})",
        result.duration.as_secs_f64(),
        outcome_label(&result)
    );
    eprintln!("     Running `{}`", result.binary.display());

    let status = std::process::Command::new(&result.binary)
        .args(args)
        .status()
        .map_err(|e| format!("cannot run {}: {e}", result.binary.display()))?;

    if !status.success() {
        let code = status.code().unwrap_or(1);
        process::exit(code);
    }

    Ok(())
}

fn cmd_shell(platform: Option<String>, print: bool, locked: bool) -> CliResult {
    let root = project_root()?;
    let options = hermit_engine::shell::ShellOptions { platform, locked };

    let env = hermit_engine::shell::shell_env(&root, &options)?;

    if print {
        print!("{}", hermit_engine::shell::render_export_script(&env));
        return Ok(());
    }

    eprintln!("    Entering hermit shell (exit to leave)");
    let code = hermit_engine::shell::spawn_interactive(&env)?;
    if code != 0 {
        process::exit(code);
    }
    Ok(())
}

fn cmd_clean() -> CliResult {
    let root = project_root()?;
    hermit_util::fs::remove_dir_all_if_exists(&root.join(".hermit"))?;
    eprintln!("    Cleaned inputs, caches, and outputs");
    Ok(())
}

fn cmd_doctor() -> CliResult {
    eprintln!("Checking environment...");
    eprintln!();

    let mut issues = 0u32;

    match hermit_platform::host_platform() {
        Ok(platform) => eprintln!("  [ok] Host platform: {platform}"),
        Err(e) => {
            eprintln!("  [!!] Host platform: {e}");
            issues = issues.saturating_add(1);
        }
    }

    let cwd = std::env::current_dir()?;
    if cwd.join("hermit.toml").exists() {
        match hermit_config::Descriptor::from_path(&cwd.join("hermit.toml")) {
            Ok(descriptor) => {
                eprintln!("  [ok] Project: {}", descriptor.package.name);

                match hermit_config::Lockfile::from_path(&cwd.join("hermit.lock")) {
                    Ok(lockfile) => {
                        let unpinned: Vec<&String> = descriptor
                            .inputs
                            .keys()
                            .filter(|name| lockfile.pin(name).is_none())
                            .collect();
                        if unpinned.is_empty() {
                            eprintln!("  [ok] Inputs: {} pinned", descriptor.inputs.len());
                        } else {
                            eprintln!(
                                "  [!!] Inputs: {} unpinned ({}) — run `hermit lock`",
                                unpinned.len(),
                                unpinned
                                    .iter()
                                    .map(|s| s.as_str())
                                    .collect::<Vec<_>>()
                                    .join(", ")
                            );
                            issues = issues.saturating_add(1);
                        }
                    }
                    Err(e) => {
                        eprintln!("  [!!] hermit.lock: {e}");
                        issues = issues.saturating_add(1);
                    }
                }

                if executor_available(&cwd, &descriptor.build.program) {
                    eprintln!("  [ok] Executor: {}", descriptor.build.program);
                } else {
                    eprintln!(
                        "  [!!] Executor: `{}` not found on PATH",
                        descriptor.build.program
                    );
                    issues = issues.saturating_add(1);
                }
            }
            Err(e) => {
                eprintln!("  [!!] hermit.toml: {e}");
                issues = issues.saturating_add(1);
            }
        }
    } else {
        eprintln!("  [--] No hermit.toml in current directory");
    }

    eprintln!();
    if issues > 0 {
        eprintln!("{issues} issue(s) found — fix them before building");
        Err(format!("{issues} issue(s) found").into())
    } else {
        eprintln!("All checks passed");
        Ok(())
    }
}

/// Whether the executor program can be found: as a path when it contains a
/// separator, otherwise on `PATH`.
fn executor_available(project_root: &Path, program: &str) -> bool {
    if program.contains('/') {
        return project_root.join(program).exists() || Path::new(program).exists();
    }
    let Ok(path) = std::env::var("PATH") else {
        return false;
    };
    std::env::split_paths(&path).any(|dir| dir.join(program).is_file())
}
