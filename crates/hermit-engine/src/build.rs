//! Build orchestration: resolve inputs, evaluate, run the two cached build
//! phases, install, and wrap.
//!
//! Progression per platform is strictly linear:
//!
//! ```text
//! Unresolved -> DepsBuilt -> PackageBuilt -> Wrapped
//! ```
//!
//! There are no backward transitions and no retries. A failure at any state
//! halts that platform's build without touching others, and nothing partial
//! is published: the artifact store only ever gains whole entries.

use std::path::{Path, PathBuf};
use std::time::Instant;

use hermit_config::{Descriptor, Lockfile};
use hermit_platform::{host_platform, Platform};

use crate::artifact::{now_epoch_secs, ArtifactStore, BuildMetadata};
use crate::cache::{dep_cache_key, package_cache_key, BuildArgs, CacheKey};
use crate::error::EngineError;
use crate::eval::EvalContext;
use crate::inputs;
use crate::invoke::{print_diagnostics, BuilderCommand};

/// Environment variable disabling incremental compilation, applied to the
/// full-package build step only.
pub const INCREMENTAL_VAR: &str = "CARGO_INCREMENTAL";
const INCREMENTAL_OFF: &str = "0";

/// The states a platform's build moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Unresolved,
    DepsBuilt,
    PackageBuilt,
    Wrapped,
}

/// Options controlling a build invocation.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Explicit platform identifier, or `None` for the host.
    pub platform: Option<String>,
    /// Whether to show raw executor output.
    pub verbose: bool,
    /// Force a rebuild, bypassing the cache.
    pub force: bool,
    /// Require the lockfile to be up-to-date; error on any mismatch.
    pub locked: bool,
}

/// Whether a phase used a cached artifact or ran fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The artifact was already in cache; no executor run.
    Cached,
    /// The executor ran and the result was stored in cache.
    Fresh,
}

/// Result of a successful build.
#[derive(Debug)]
pub struct BuildResult {
    /// Outcome of the dependency-only phase.
    pub deps_outcome: BuildOutcome,
    /// Outcome of the full-package phase.
    pub package_outcome: BuildOutcome,
    /// Path to the installed, wrapped executable.
    pub binary: PathBuf,
    /// Final state reached (always `Wrapped` on success).
    pub phase: Phase,
    /// How long the build took (including cache checks).
    pub duration: std::time::Duration,
}

/// Run the full build pipeline for one platform.
///
/// Steps:
/// 1. Read `hermit.toml` and `hermit.lock`
/// 2. In `--locked` mode, verify the lockfile before doing any work
/// 3. Resolve the target platform (explicit or host) against the supported set
/// 4. Resolve all inputs (writing new pins unless `--locked`)
/// 5. Evaluate the descriptor for the platform; unsatisfiable descriptors
///    fail here, before any compilation
/// 6. Dependency-only phase, cached by the dependency key
/// 7. Full-package phase, cached by the package key, with incremental
///    compilation disabled in the executor's environment
/// 8. Install under `.hermit/out/<platform>/bin/` and wrap
///
/// # Errors
/// Returns resolution, evaluation, or build errors; all abort the pipeline
/// at the point of occurrence.
pub fn build(project_root: &Path, options: &BuildOptions) -> Result<BuildResult, EngineError> {
    let start = Instant::now();

    // 1. Descriptor and lockfile.
    let descriptor = Descriptor::from_path(&project_root.join("hermit.toml"))?;
    let lockfile_path = project_root.join("hermit.lock");
    let lockfile = Lockfile::from_path(&lockfile_path)?;

    // 2. Fail on lockfile drift before any fetch or build work.
    if options.locked {
        inputs::check_lock_staleness(&descriptor, &lockfile)?;
    }

    // 3. Target platform.
    let platform = resolve_platform(&options.platform)?;
    if !descriptor.supports(&platform) {
        return Err(EngineError::UnsupportedPlatform {
            platform: platform.to_string(),
            supported: descriptor.platforms.supported.join(", "),
        });
    }

    // 4. Resolve inputs. New pins are written back unless --locked.
    let (resolved, updated_lock) =
        inputs::resolve_all(project_root, &descriptor, &lockfile, options.locked)?;
    if updated_lock != lockfile {
        updated_lock.write_to(&lockfile_path)?;
    }

    // 5. Evaluate. A missing library or tool fails here, before compilation.
    let ctx = EvalContext::resolve(&descriptor, &resolved, &platform)?;

    let args = build_args(project_root, &descriptor, &updated_lock, &ctx)?;
    if args.strict_deps {
        check_dependency_manifests(&args)?;
    }
    let work_dir = project_root.join(".hermit");
    let store = ArtifactStore::new(&work_dir);

    // 6. Dependency-only phase.
    let dep_key = dep_cache_key(&args)?;
    let deps_outcome = run_deps_phase(&descriptor, &args, &store, &dep_key, options)?;

    // 7. Full-package phase.
    let package_key = package_cache_key(&args, &dep_key)?;
    let (package_outcome, built_binary) =
        run_package_phase(project_root, &descriptor, &args, &store, &package_key, options)?;

    // 8. Install and wrap.
    let installed = install_path(project_root, &descriptor, &platform);
    hermit_util::fs::materialize(&built_binary, &installed)?;
    crate::wrap::wrap_program(&installed, &ctx.runtime_env())?;

    Ok(BuildResult {
        deps_outcome,
        package_outcome,
        binary: installed,
        phase: Phase::Wrapped,
        duration: start.elapsed(),
    })
}

/// Resolve the platform: use the explicit value or detect the host.
///
/// Accepts `"host"` as an alias for the detected host platform.
///
/// # Errors
/// Returns an error if the identifier is malformed or host detection fails.
pub(crate) fn resolve_platform(platform_opt: &Option<String>) -> Result<Platform, EngineError> {
    match platform_opt {
        Some(name) if name == "host" => Ok(host_platform()?),
        Some(name) => Ok(name.parse::<Platform>()?),
        None => Ok(host_platform()?),
    }
}

/// Assemble the immutable build-arguments record shared by both phases.
fn build_args(
    project_root: &Path,
    descriptor: &Descriptor,
    lockfile: &Lockfile,
    ctx: &EvalContext,
) -> Result<BuildArgs, EngineError> {
    let input_pins =
        toml::to_string_pretty(lockfile).map_err(|e| EngineError::Metadata {
            message: e.to_string(),
        })?;

    Ok(BuildArgs {
        source_root: project_root.to_path_buf(),
        include: descriptor.source.include.clone(),
        dep_manifests: descriptor.source.dep_manifests.clone(),
        strict_deps: descriptor.build.strict_deps,
        program: descriptor.build.program.clone(),
        deps_args: descriptor.build.deps_args.clone(),
        package_args: descriptor.build.package_args.clone(),
        package_env: vec![(INCREMENTAL_VAR.to_owned(), INCREMENTAL_OFF.to_owned())],
        platform: ctx.platform.to_string(),
        input_pins,
        tools: ctx.tools.iter().map(|t| t.name.clone()).collect(),
        libraries: ctx.libraries.iter().map(|l| l.name.clone()).collect(),
        search_path: ctx.search_path.clone(),
    })
}

/// In strict mode, every dependency-manifest pattern must match at least one
/// file; a project with a missing lock is rejected before any build work.
fn check_dependency_manifests(args: &BuildArgs) -> Result<(), EngineError> {
    for pattern in &args.dep_manifests {
        let matches =
            hermit_util::hash::matching_files(&args.source_root, std::slice::from_ref(pattern))?;
        if matches.is_empty() {
            return Err(EngineError::MissingDependencyManifest {
                pattern: pattern.clone(),
            });
        }
    }
    Ok(())
}

/// Run (or reuse) the dependency-only build.
///
/// The cached entry is a stamp: the compiled dependencies themselves live
/// wherever the executor keeps them; the stamp records that they were built
/// for this exact dependency key.
fn run_deps_phase(
    descriptor: &Descriptor,
    args: &BuildArgs,
    store: &ArtifactStore,
    dep_key: &CacheKey,
    options: &BuildOptions,
) -> Result<BuildOutcome, EngineError> {
    if !options.force && store.has(dep_key) {
        eprintln!("    Fresh dependencies (cached)");
        return Ok(BuildOutcome::Cached);
    }

    eprintln!("    Building dependencies of {}", descriptor.package.name);
    // The incremental switch belongs to the package step only; scrub it so
    // ambient environment cannot leak into this phase.
    let result = BuilderCommand::new(&args.program)
        .args(&args.deps_args)
        .cwd(&args.source_root)
        .env_remove(INCREMENTAL_VAR)
        .execute()?;

    print_diagnostics(&result, options.verbose);
    if !result.success {
        return Err(EngineError::BuildPhaseFailed {
            phase: "dependency".to_owned(),
            error_count: result.error_count(),
        });
    }

    let stamp = store.cache_path(dep_key).with_extension("stamp");
    if let Some(parent) = stamp.parent() {
        hermit_util::fs::ensure_dir(parent)?;
    }
    std::fs::write(&stamp, dep_key.as_hex()).map_err(|source| EngineError::Io {
        path: stamp.display().to_string(),
        source,
    })?;
    let metadata = BuildMetadata {
        platform: args.platform.clone(),
        phase: "deps".to_owned(),
        program: args.program.clone(),
        built_at: now_epoch_secs(),
    };
    store.store(dep_key, &stamp, &metadata)?;
    let _ = std::fs::remove_file(&stamp);

    Ok(BuildOutcome::Fresh)
}

/// Run (or reuse) the full-package build, returning the binary location.
fn run_package_phase(
    project_root: &Path,
    descriptor: &Descriptor,
    args: &BuildArgs,
    store: &ArtifactStore,
    package_key: &CacheKey,
    options: &BuildOptions,
) -> Result<(BuildOutcome, PathBuf), EngineError> {
    let produced = executor_artifact_path(project_root, descriptor);
    let artifact_name = produced
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(&descriptor.package.name)
        .to_owned();
    let staged = store.cache_path(package_key).join(&artifact_name);

    if !options.force && store.has(package_key) {
        eprintln!("    Fresh {} (cached)", descriptor.package.name);
        return Ok((BuildOutcome::Cached, staged));
    }

    eprintln!("    Building {}", descriptor.package.name);
    let result = BuilderCommand::new(&args.program)
        .args(&args.package_args)
        .cwd(&args.source_root)
        .envs(&args.package_env)
        .execute()?;

    print_diagnostics(&result, options.verbose);
    if !result.success {
        return Err(EngineError::BuildPhaseFailed {
            phase: "package".to_owned(),
            error_count: result.error_count(),
        });
    }

    if !produced.is_file() {
        return Err(EngineError::ArtifactMissing {
            path: produced.display().to_string(),
        });
    }

    let metadata = BuildMetadata {
        platform: args.platform.clone(),
        phase: "package".to_owned(),
        program: args.program.clone(),
        built_at: now_epoch_secs(),
    };
    store.store(package_key, &produced, &metadata)?;

    Ok((BuildOutcome::Fresh, staged))
}

/// Where the executor leaves the compiled binary.
fn executor_artifact_path(project_root: &Path, descriptor: &Descriptor) -> PathBuf {
    match &descriptor.build.artifact {
        Some(rel) => project_root.join(rel),
        None => project_root
            .join("target")
            .join("release")
            .join(&descriptor.package.name),
    }
}

/// Where the wrapped executable is installed.
pub fn install_path(project_root: &Path, descriptor: &Descriptor, platform: &Platform) -> PathBuf {
    project_root
        .join(".hermit")
        .join("out")
        .join(platform.to_string())
        .join("bin")
        .join(&descriptor.package.name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use hermit_config::lockfile::{InputPin, PinSource};

    use super::*;

    /// A project whose "executor" is a shell script that records each
    /// invocation and fakes a compiled binary, so the whole pipeline runs
    /// without any real toolchain.
    fn write_project(root: &Path, platform: &str) {
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(root.join("Cargo.toml"), "[package]\nname = \"starfield\"").unwrap();
        fs::write(root.join("Cargo.lock"), "# lock v1").unwrap();
        fs::write(root.join("README.md"), "a starfield").unwrap();

        // The stub executor: `builder.sh deps` / `builder.sh package`.
        fs::write(
            root.join("builder.sh"),
            "#!/bin/sh\n\
             echo \"$1 incremental=$CARGO_INCREMENTAL\" >> invocations.log\n\
             if [ \"$1\" = package ]; then\n\
               mkdir -p out && printf 'compiled' > out/starfield\n\
             fi\n",
        )
        .unwrap();
        hermit_util::fs::make_executable(&root.join("builder.sh")).unwrap();

        fs::write(
            root.join("hermit.toml"),
            format!(
                r#"
[package]
name = "starfield"

[build]
program = "./builder.sh"
deps-args = ["deps"]
package-args = ["package"]
artifact = "out/starfield"

[inputs]
pkgset = {{ git = "https://example.org/pkgset.git", ref = "release-24.05" }}

[platforms]
supported = ["{platform}"]

[libraries]
native = ["wayland", "libxkbcommon"]
"#
            ),
        )
        .unwrap();
    }

    /// Seed the package set input and write a matching lockfile.
    fn seed_pkgset(root: &Path, platform: &str, libraries: &[&str]) {
        let store = inputs::inputs_store(root);
        let staging = store.join(".seed");
        for lib in libraries {
            let lib_dir = staging.join(platform).join(lib).join("lib");
            fs::create_dir_all(&lib_dir).unwrap();
            fs::write(lib_dir.join(format!("lib{lib}.so")), "elf").unwrap();
        }
        let tree_hash = hermit_util::hash::sha256_tree(&staging).unwrap();
        let short = tree_hash.get(..12).unwrap().to_owned();
        fs::rename(&staging, store.join(format!("pkgset-{short}"))).unwrap();

        let mut lockfile = Lockfile::default();
        lockfile.upsert(InputPin {
            name: "pkgset".to_owned(),
            source: PinSource::Git {
                url: "https://example.org/pkgset.git".to_owned(),
                rev: "0123456789abcdef0123456789abcdef01234567".to_owned(),
            },
            tree_hash,
        });
        lockfile.write_to(&root.join("hermit.lock")).unwrap();
    }

    fn host_id() -> String {
        host_platform().unwrap().to_string()
    }

    fn invocations(root: &Path) -> String {
        fs::read_to_string(root.join("invocations.log")).unwrap_or_default()
    }

    #[test]
    fn full_pipeline_builds_installs_and_wraps() {
        let tmp = tempfile::tempdir().unwrap();
        let platform = host_id();
        write_project(tmp.path(), &platform);
        seed_pkgset(tmp.path(), &platform, &["wayland", "libxkbcommon"]);

        let result = build(tmp.path(), &BuildOptions::default()).unwrap();
        assert_eq!(result.deps_outcome, BuildOutcome::Fresh);
        assert_eq!(result.package_outcome, BuildOutcome::Fresh);
        assert_eq!(result.phase, Phase::Wrapped);

        // Installed executable is the wrapper; the real binary is hidden.
        let script = fs::read_to_string(&result.binary).unwrap();
        assert!(script.starts_with("#!/bin/sh"));
        assert!(script.contains("RUST_BACKTRACE=\"1\""));
        assert!(script.contains("wayland/lib"));
        let hidden = result.binary.with_file_name(".starfield-wrapped");
        assert_eq!(fs::read(&hidden).unwrap(), b"compiled");

        // Both phases ran exactly once; only the package phase saw the
        // incremental-compilation switch.
        let log = invocations(tmp.path());
        assert_eq!(log, "deps incremental=\npackage incremental=0\n");
    }

    #[test]
    fn second_build_is_fully_cached() {
        let tmp = tempfile::tempdir().unwrap();
        let platform = host_id();
        write_project(tmp.path(), &platform);
        seed_pkgset(tmp.path(), &platform, &["wayland", "libxkbcommon"]);

        build(tmp.path(), &BuildOptions::default()).unwrap();
        let second = build(tmp.path(), &BuildOptions::default()).unwrap();

        assert_eq!(second.deps_outcome, BuildOutcome::Cached);
        assert_eq!(second.package_outcome, BuildOutcome::Cached);
        // The executor was not invoked again.
        assert_eq!(invocations(tmp.path()).lines().count(), 2);
        // The wrapped install is still intact.
        let script = fs::read_to_string(&second.binary).unwrap();
        assert!(script.contains("RUST_BACKTRACE"));
    }

    #[test]
    fn source_change_rebuilds_package_but_reuses_deps() {
        let tmp = tempfile::tempdir().unwrap();
        let platform = host_id();
        write_project(tmp.path(), &platform);
        seed_pkgset(tmp.path(), &platform, &["wayland", "libxkbcommon"]);

        build(tmp.path(), &BuildOptions::default()).unwrap();
        fs::write(tmp.path().join("src/main.rs"), "fn main() { run() }").unwrap();
        let second = build(tmp.path(), &BuildOptions::default()).unwrap();

        assert_eq!(second.deps_outcome, BuildOutcome::Cached);
        assert_eq!(second.package_outcome, BuildOutcome::Fresh);
    }

    #[test]
    fn change_outside_source_filter_is_fully_cached() {
        let tmp = tempfile::tempdir().unwrap();
        let platform = host_id();
        write_project(tmp.path(), &platform);
        seed_pkgset(tmp.path(), &platform, &["wayland", "libxkbcommon"]);

        build(tmp.path(), &BuildOptions::default()).unwrap();
        fs::write(tmp.path().join("README.md"), "updated docs").unwrap();
        let second = build(tmp.path(), &BuildOptions::default()).unwrap();

        assert_eq!(second.deps_outcome, BuildOutcome::Cached);
        assert_eq!(second.package_outcome, BuildOutcome::Cached);
    }

    #[test]
    fn manifest_change_rebuilds_dependencies() {
        let tmp = tempfile::tempdir().unwrap();
        let platform = host_id();
        write_project(tmp.path(), &platform);
        seed_pkgset(tmp.path(), &platform, &["wayland", "libxkbcommon"]);

        build(tmp.path(), &BuildOptions::default()).unwrap();
        fs::write(tmp.path().join("Cargo.lock"), "# lock v2").unwrap();
        let second = build(tmp.path(), &BuildOptions::default()).unwrap();

        assert_eq!(second.deps_outcome, BuildOutcome::Fresh);
        assert_eq!(second.package_outcome, BuildOutcome::Fresh);
    }

    #[test]
    fn force_bypasses_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let platform = host_id();
        write_project(tmp.path(), &platform);
        seed_pkgset(tmp.path(), &platform, &["wayland", "libxkbcommon"]);

        build(tmp.path(), &BuildOptions::default()).unwrap();
        let options = BuildOptions {
            force: true,
            ..BuildOptions::default()
        };
        let second = build(tmp.path(), &options).unwrap();

        assert_eq!(second.deps_outcome, BuildOutcome::Fresh);
        assert_eq!(second.package_outcome, BuildOutcome::Fresh);
    }

    #[test]
    fn missing_library_fails_before_any_compilation() {
        let tmp = tempfile::tempdir().unwrap();
        let platform = host_id();
        write_project(tmp.path(), &platform);
        // libxkbcommon is declared but absent from the package set.
        seed_pkgset(tmp.path(), &platform, &["wayland"]);

        let err = build(tmp.path(), &BuildOptions::default()).unwrap_err();
        assert!(
            matches!(err, EngineError::PackageNotFound { ref name, .. } if name == "libxkbcommon"),
            "unexpected error: {err}"
        );
        // The executor never ran.
        assert_eq!(invocations(tmp.path()), "");
    }

    #[test]
    fn unsupported_platform_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let platform = host_id();
        write_project(tmp.path(), &platform);
        seed_pkgset(tmp.path(), &platform, &["wayland", "libxkbcommon"]);

        let other = if platform == "x86_64-linux" {
            "aarch64-darwin"
        } else {
            "x86_64-linux"
        };
        let options = BuildOptions {
            platform: Some(other.to_owned()),
            ..BuildOptions::default()
        };
        let err = build(tmp.path(), &options).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedPlatform { .. }));
    }

    #[test]
    fn locked_without_lockfile_fails_before_fetching() {
        let tmp = tempfile::tempdir().unwrap();
        let platform = host_id();
        write_project(tmp.path(), &platform);
        // No hermit.lock written.

        let options = BuildOptions {
            locked: true,
            ..BuildOptions::default()
        };
        let err = build(tmp.path(), &options).unwrap_err();
        assert!(matches!(err, EngineError::LockfileUpdateRequired));
        assert_eq!(invocations(tmp.path()), "");
    }

    #[test]
    fn failing_executor_surfaces_phase_error() {
        let tmp = tempfile::tempdir().unwrap();
        let platform = host_id();
        write_project(tmp.path(), &platform);
        seed_pkgset(tmp.path(), &platform, &["wayland", "libxkbcommon"]);

        fs::write(
            tmp.path().join("builder.sh"),
            "#!/bin/sh\necho 'error: dependency graph is broken' >&2\nexit 1\n",
        )
        .unwrap();
        hermit_util::fs::make_executable(&tmp.path().join("builder.sh")).unwrap();

        let err = build(tmp.path(), &BuildOptions::default()).unwrap_err();
        assert!(
            matches!(
                err,
                EngineError::BuildPhaseFailed { ref phase, error_count: 1 } if phase == "dependency"
            ),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn executor_success_without_artifact_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let platform = host_id();
        write_project(tmp.path(), &platform);
        seed_pkgset(tmp.path(), &platform, &["wayland", "libxkbcommon"]);

        // Executor succeeds but never produces out/starfield.
        fs::write(tmp.path().join("builder.sh"), "#!/bin/sh\nexit 0\n").unwrap();
        hermit_util::fs::make_executable(&tmp.path().join("builder.sh")).unwrap();

        let err = build(tmp.path(), &BuildOptions::default()).unwrap_err();
        assert!(matches!(err, EngineError::ArtifactMissing { .. }));
    }

    #[test]
    fn strict_deps_requires_manifest_files() {
        let tmp = tempfile::tempdir().unwrap();
        let platform = host_id();
        write_project(tmp.path(), &platform);
        seed_pkgset(tmp.path(), &platform, &["wayland", "libxkbcommon"]);

        // Remove the dependency lock; strict mode must refuse to build.
        fs::remove_file(tmp.path().join("Cargo.lock")).unwrap();

        let err = build(tmp.path(), &BuildOptions::default()).unwrap_err();
        assert!(
            matches!(
                err,
                EngineError::MissingDependencyManifest { ref pattern } if pattern == "Cargo.lock"
            ),
            "unexpected error: {err}"
        );
        assert_eq!(invocations(tmp.path()), "");
    }

    #[test]
    fn resolve_platform_host_alias_matches_default() {
        let from_alias = resolve_platform(&Some("host".to_owned()));
        let from_none = resolve_platform(&None);
        match (from_alias, from_none) {
            (Ok(a), Ok(b)) => assert_eq!(a, b),
            (Err(_), Err(_)) => {}
            (a, b) => panic!("alias and default disagree: {a:?} vs {b:?}"),
        }
    }

    #[test]
    fn resolve_platform_explicit() {
        let platform = resolve_platform(&Some("aarch64-darwin".to_owned())).unwrap();
        assert_eq!(platform.to_string(), "aarch64-darwin");
    }

    #[test]
    fn resolve_platform_invalid() {
        assert!(resolve_platform(&Some("sparc-solaris".to_owned())).is_err());
    }

    #[test]
    fn phase_ordering_is_linear() {
        assert!(Phase::Unresolved < Phase::DepsBuilt);
        assert!(Phase::DepsBuilt < Phase::PackageBuilt);
        assert!(Phase::PackageBuilt < Phase::Wrapped);
    }
}
