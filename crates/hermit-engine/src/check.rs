//! The checks output: evaluate every supported platform, then build the host.
//!
//! Evaluation contexts are pure and share nothing, so the per-platform
//! fan-out runs in parallel. Any evaluation failure fails the whole check;
//! the host build only starts once every platform evaluates cleanly.

use std::path::Path;

use rayon::prelude::{IntoParallelRefIterator, ParallelIterator};

use hermit_config::{Descriptor, Lockfile};
use hermit_platform::host_platform;

use crate::build::{build, BuildOptions, BuildResult};
use crate::error::EngineError;
use crate::eval::EvalContext;
use crate::inputs;

/// Options controlling a check run.
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Whether to show raw executor output during the host build.
    pub verbose: bool,
    /// Force a rebuild, bypassing the cache.
    pub force: bool,
    /// Require the lockfile to be up-to-date; error on any mismatch.
    pub locked: bool,
}

/// Evaluation summary for one platform.
#[derive(Debug)]
pub struct PlatformCheck {
    pub platform: String,
    pub libraries: usize,
    pub tools: usize,
}

/// Result of a successful check.
#[derive(Debug)]
pub struct CheckResult {
    /// One entry per supported platform, in descriptor order.
    pub platforms: Vec<PlatformCheck>,
    /// The host build, when the host is in the supported set.
    pub build: Option<BuildResult>,
}

/// Evaluate the descriptor for every supported platform, then build the host.
///
/// # Errors
/// Returns the first resolution or evaluation error, or any build error from
/// the host build.
pub fn check(project_root: &Path, options: &CheckOptions) -> Result<CheckResult, EngineError> {
    let descriptor = Descriptor::from_path(&project_root.join("hermit.toml"))?;
    let lockfile_path = project_root.join("hermit.lock");
    let lockfile = Lockfile::from_path(&lockfile_path)?;

    if options.locked {
        inputs::check_lock_staleness(&descriptor, &lockfile)?;
    }

    let (resolved, updated_lock) =
        inputs::resolve_all(project_root, &descriptor, &lockfile, options.locked)?;
    if updated_lock != lockfile {
        updated_lock.write_to(&lockfile_path)?;
    }

    let platforms = descriptor.supported_platforms()?;

    // Pure per-platform evaluation; safe to fan out.
    let evaluations: Vec<Result<PlatformCheck, EngineError>> = platforms
        .par_iter()
        .map(|platform| {
            let ctx = EvalContext::resolve(&descriptor, &resolved, platform)?;
            eprintln!(
                "    Evaluated {} ({} libraries, {} tools)",
                platform,
                ctx.libraries.len(),
                ctx.tools.len()
            );
            Ok(PlatformCheck {
                platform: platform.to_string(),
                libraries: ctx.libraries.len(),
                tools: ctx.tools.len(),
            })
        })
        .collect();

    let mut checks = Vec::with_capacity(evaluations.len());
    for evaluation in evaluations {
        checks.push(evaluation?);
    }

    // Build the host target when it is part of the supported set.
    let build_result = match host_platform() {
        Ok(host) if descriptor.supports(&host) => {
            let build_options = BuildOptions {
                platform: Some(host.to_string()),
                verbose: options.verbose,
                force: options.force,
                locked: options.locked,
            };
            Some(build(project_root, &build_options)?)
        }
        _ => None,
    };

    Ok(CheckResult {
        platforms: checks,
        build: build_result,
    })
}
