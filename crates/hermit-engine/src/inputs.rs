//! Input resolution: turning declared source locators into pinned,
//! content-addressed trees under `.hermit/inputs/`.
//!
//! Resolution is deterministic given the lockfile. A pin that is missing,
//! a fetch that fails, or a fetched tree whose hash does not match its pin
//! aborts resolution before any build work starts. Store entries are named
//! by tree hash, so a directory that exists is already verified content.

use std::path::{Path, PathBuf};
use std::process::Command;

use hermit_config::descriptor::{Descriptor, InputSpec};
use hermit_config::lockfile::{InputPin, Lockfile, PinSource};

use crate::error::EngineError;

/// One resolved input: its pin and the store directory holding its tree.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub name: String,
    pub store_path: PathBuf,
    pub pin: InputPin,
}

/// The full resolved input set, in descriptor (name) order.
#[derive(Debug, Default)]
pub struct ResolvedInputs {
    inputs: Vec<ResolvedInput>,
}

impl ResolvedInputs {
    /// Look up a resolved input by name.
    pub fn get(&self, name: &str) -> Option<&ResolvedInput> {
        self.inputs.iter().find(|i| i.name == name)
    }

    /// All resolved inputs.
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedInput> {
        self.inputs.iter()
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// The input store directory for a project: `.hermit/inputs/`.
pub fn inputs_store(project_root: &Path) -> PathBuf {
    project_root.join(".hermit").join("inputs")
}

/// Store directory for a pinned input: `<store>/<name>-<tree_hash[..12]>`.
fn store_dir(store: &Path, name: &str, tree_hash: &str) -> PathBuf {
    let short = tree_hash.get(..12).unwrap_or(tree_hash);
    store.join(format!("{name}-{short}"))
}

/// Verify the lockfile is complete and consistent with the descriptor.
///
/// Used by `--locked` mode: every declared input must have a pin whose
/// locator agrees with the declaration. Runs before any fetch or build work
/// so drift is reported immediately.
///
/// # Errors
/// Returns `LockfileUpdateRequired` on any missing or mismatched pin.
pub fn check_lock_staleness(
    descriptor: &Descriptor,
    lockfile: &Lockfile,
) -> Result<(), EngineError> {
    for (name, spec) in &descriptor.inputs {
        let Some(pin) = lockfile.pin(name) else {
            return Err(EngineError::LockfileUpdateRequired);
        };
        if !pin_matches_spec(pin, spec) {
            return Err(EngineError::LockfileUpdateRequired);
        }
    }
    Ok(())
}

/// Whether a pin still corresponds to the declared locator.
fn pin_matches_spec(pin: &InputPin, spec: &InputSpec) -> bool {
    match (&pin.source, &spec.git, &spec.url) {
        (PinSource::Git { url, .. }, Some(declared), None) => url == declared,
        (PinSource::Tarball { url, sha256 }, None, Some(declared)) => {
            url == declared && Some(sha256) == spec.sha256.as_ref()
        }
        _ => false,
    }
}

/// Resolve every declared input, fetching anything not already in the store.
///
/// With `locked = false`, inputs without a pin (or whose declaration changed)
/// are freshly resolved and the returned lockfile carries the new pins; the
/// caller decides whether to write it. With `locked = true`, any drift is
/// fatal before fetching starts.
///
/// # Errors
/// Returns resolution errors: missing pins under `--locked`, fetch failures,
/// or tree-hash mismatches.
pub fn resolve_all(
    project_root: &Path,
    descriptor: &Descriptor,
    lockfile: &Lockfile,
    locked: bool,
) -> Result<(ResolvedInputs, Lockfile), EngineError> {
    if locked {
        check_lock_staleness(descriptor, lockfile)?;
    }

    let store = inputs_store(project_root);
    let mut updated = lockfile.clone();
    let mut resolved = Vec::new();

    for (name, spec) in &descriptor.inputs {
        let pin = match lockfile.pin(name) {
            Some(pin) if pin_matches_spec(pin, spec) => pin.clone(),
            Some(_) | None if locked => return Err(EngineError::LockfileUpdateRequired),
            Some(_) | None => {
                eprintln!("    Resolving input `{name}`");
                let pin = pin_fresh(&store, name, spec)?;
                updated.upsert(pin.clone());
                pin
            }
        };

        let store_path = ensure_fetched(&store, name, &pin)?;
        resolved.push(ResolvedInput {
            name: name.clone(),
            store_path,
            pin,
        });
    }

    Ok((ResolvedInputs { inputs: resolved }, updated))
}

/// Re-pin inputs and write the lockfile.
///
/// With `refresh = false` only unpinned (or drifted) inputs are resolved;
/// with `refresh = true` every input is re-resolved from its locator.
/// Returns the number of pins that changed.
///
/// # Errors
/// Returns resolution errors from fetching or pinning.
pub fn lock_inputs(project_root: &Path, refresh: bool) -> Result<usize, EngineError> {
    let descriptor = Descriptor::from_path(&project_root.join("hermit.toml"))?;
    let lockfile_path = project_root.join("hermit.lock");
    let lockfile = Lockfile::from_path(&lockfile_path)?;
    let store = inputs_store(project_root);

    let mut updated = lockfile.clone();
    let mut changed = 0usize;

    for (name, spec) in &descriptor.inputs {
        let needs_pin = refresh
            || !lockfile
                .pin(name)
                .is_some_and(|pin| pin_matches_spec(pin, spec));
        if !needs_pin {
            continue;
        }
        eprintln!("    Resolving input `{name}`");
        let pin = pin_fresh(&store, name, spec)?;
        if lockfile.pin(name) != Some(&pin) {
            changed = changed.saturating_add(1);
        }
        updated.upsert(pin);
    }

    if updated != lockfile {
        updated.write_to(&lockfile_path)?;
    }
    Ok(changed)
}

/// Ensure the tree for a pin exists in the store, fetching it if absent.
///
/// The store directory name embeds the tree hash, so an existing directory
/// is already verified content and is returned as-is.
fn ensure_fetched(store: &Path, name: &str, pin: &InputPin) -> Result<PathBuf, EngineError> {
    let dest = store_dir(store, name, &pin.tree_hash);
    if dest.is_dir() {
        return Ok(dest);
    }

    let staging = fetch_to_staging(store, name, &pin.source)?;

    let actual = hermit_util::hash::sha256_tree(&staging)?;
    if actual != pin.tree_hash {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(EngineError::InputHashMismatch {
            name: name.to_owned(),
            expected: pin.tree_hash.clone(),
            actual,
        });
    }

    hermit_util::fs::rename(&staging, &dest)?;
    Ok(dest)
}

/// Resolve an input locator from scratch: fetch, hash, and place the tree.
fn pin_fresh(store: &Path, name: &str, spec: &InputSpec) -> Result<InputPin, EngineError> {
    let source = match (&spec.git, &spec.url) {
        (Some(url), None) => {
            let reference = spec.reference.as_deref().unwrap_or("HEAD");
            let rev = resolve_git_ref(name, url, reference)?;
            PinSource::Git {
                url: url.clone(),
                rev,
            }
        }
        (None, Some(url)) => {
            // Validation guarantees sha256 is present for tarball locators.
            let Some(sha256) = &spec.sha256 else {
                return Err(EngineError::InputFetch {
                    name: name.to_owned(),
                    message: "tarball locator has no sha256 pin".to_owned(),
                });
            };
            PinSource::Tarball {
                url: url.clone(),
                sha256: sha256.clone(),
            }
        }
        _ => {
            return Err(EngineError::InputFetch {
                name: name.to_owned(),
                message: "locator must declare exactly one of `git` or `url`".to_owned(),
            })
        }
    };

    let staging = fetch_to_staging(store, name, &source)?;
    let tree_hash = hermit_util::hash::sha256_tree(&staging)?;

    let dest = store_dir(store, name, &tree_hash);
    if dest.is_dir() {
        let _ = std::fs::remove_dir_all(&staging);
    } else {
        hermit_util::fs::rename(&staging, &dest)?;
    }

    Ok(InputPin {
        name: name.to_owned(),
        source,
        tree_hash,
    })
}

/// Fetch a pinned source into a staging directory inside the store.
fn fetch_to_staging(store: &Path, name: &str, source: &PinSource) -> Result<PathBuf, EngineError> {
    hermit_util::fs::ensure_dir(store)?;
    let staging = store.join(format!(".tmp-{name}-{}", std::process::id()));
    hermit_util::fs::remove_dir_all_if_exists(&staging)?;

    match source {
        PinSource::Git { url, rev } => fetch_git(name, url, rev, &staging)?,
        PinSource::Tarball { url, sha256 } => fetch_tarball(name, url, sha256, &staging)?,
    }
    Ok(staging)
}

/// Resolve a git reference to a commit id via `git ls-remote`.
///
/// A reference that is already a full commit id is used as-is.
fn resolve_git_ref(name: &str, url: &str, reference: &str) -> Result<String, EngineError> {
    if reference.len() == 40 && reference.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok(reference.to_lowercase());
    }

    let output = hermit_util::process::run_command(
        Command::new("git").args(["ls-remote", url, reference]),
    )?
    .require_success(&format!("resolving `{reference}` for input `{name}`"))?;

    let rev = output
        .stdout
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().next())
        .map(str::to_owned);

    rev.ok_or_else(|| EngineError::InputFetch {
        name: name.to_owned(),
        message: format!("reference `{reference}` not found at {url}"),
    })
}

/// Fetch a repository at an exact commit into `dest` (without its `.git/`).
fn fetch_git(name: &str, url: &str, rev: &str, dest: &Path) -> Result<(), EngineError> {
    hermit_util::fs::ensure_dir(dest)?;

    hermit_util::process::run_command_in(dest, Command::new("git").arg("init").arg("--quiet"))?
        .require_success(&format!("initializing fetch for input `{name}`"))?;

    hermit_util::process::run_command_in(
        dest,
        Command::new("git").args(["fetch", "--quiet", "--depth", "1", url, rev]),
    )?
    .require_success(&format!("fetching input `{name}` at {rev}"))?;

    hermit_util::process::run_command_in(
        dest,
        Command::new("git").args(["checkout", "--quiet", "FETCH_HEAD"]),
    )?
    .require_success(&format!("checking out input `{name}` at {rev}"))?;

    // The tree hash covers content only.
    hermit_util::fs::remove_dir_all_if_exists(&dest.join(".git"))?;
    Ok(())
}

/// Download and verify a tarball, then extract it into `dest`.
fn fetch_tarball(name: &str, url: &str, sha256: &str, dest: &Path) -> Result<(), EngineError> {
    let archive = dest.with_extension("tar.gz");
    let downloaded = hermit_util::download::download_with_progress(url, &archive, name)?;
    if downloaded != sha256 {
        let _ = std::fs::remove_file(&archive);
        return Err(EngineError::InputHashMismatch {
            name: name.to_owned(),
            expected: sha256.to_owned(),
            actual: downloaded,
        });
    }

    let result = hermit_util::archive::extract_tar_gz(&archive, dest);
    let _ = std::fs::remove_file(&archive);
    result?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;

    const DESCRIPTOR: &str = r#"
[package]
name = "starfield"

[inputs]
pkgset = { git = "https://example.org/pkgset.git", ref = "release-24.05" }

[platforms]
supported = ["x86_64-linux"]
"#;

    fn descriptor() -> Descriptor {
        Descriptor::from_str(DESCRIPTOR, "hermit.toml").unwrap()
    }

    /// Seed the input store with a tree and return a matching pin.
    fn seed_input(project_root: &Path, name: &str, files: &[(&str, &str)]) -> InputPin {
        let store = inputs_store(project_root);
        let staging = store.join(".seed");
        fs::create_dir_all(&staging).unwrap();
        for (rel, content) in files {
            let path = staging.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
        }
        let tree_hash = hermit_util::hash::sha256_tree(&staging).unwrap();
        let dest = store_dir(&store, name, &tree_hash);
        fs::rename(&staging, &dest).unwrap();

        InputPin {
            name: name.to_owned(),
            source: PinSource::Git {
                url: format!("https://example.org/{name}.git"),
                rev: "0123456789abcdef0123456789abcdef01234567".to_owned(),
            },
            tree_hash,
        }
    }

    #[test]
    fn staleness_ok_when_all_pinned() {
        let mut lockfile = Lockfile::default();
        lockfile.upsert(InputPin {
            name: "pkgset".to_owned(),
            source: PinSource::Git {
                url: "https://example.org/pkgset.git".to_owned(),
                rev: "aaaa".to_owned(),
            },
            tree_hash: "hash".to_owned(),
        });
        assert!(check_lock_staleness(&descriptor(), &lockfile).is_ok());
    }

    #[test]
    fn staleness_rejects_missing_pin() {
        let result = check_lock_staleness(&descriptor(), &Lockfile::default());
        assert!(matches!(result, Err(EngineError::LockfileUpdateRequired)));
    }

    #[test]
    fn staleness_rejects_url_drift() {
        let mut lockfile = Lockfile::default();
        lockfile.upsert(InputPin {
            name: "pkgset".to_owned(),
            source: PinSource::Git {
                url: "https://example.org/other.git".to_owned(),
                rev: "aaaa".to_owned(),
            },
            tree_hash: "hash".to_owned(),
        });
        let result = check_lock_staleness(&descriptor(), &lockfile);
        assert!(matches!(result, Err(EngineError::LockfileUpdateRequired)));
    }

    #[test]
    fn staleness_rejects_kind_drift() {
        // Declared as git, pinned as tarball.
        let mut lockfile = Lockfile::default();
        lockfile.upsert(InputPin {
            name: "pkgset".to_owned(),
            source: PinSource::Tarball {
                url: "https://example.org/pkgset.git".to_owned(),
                sha256: "aa".to_owned(),
            },
            tree_hash: "hash".to_owned(),
        });
        let result = check_lock_staleness(&descriptor(), &lockfile);
        assert!(matches!(result, Err(EngineError::LockfileUpdateRequired)));
    }

    #[test]
    fn resolve_all_uses_store_without_fetching() {
        let tmp = tempfile::tempdir().unwrap();
        // The pin's URL is unreachable; a fetch attempt would fail loudly.
        // Resolution must succeed purely from the seeded store.
        let pin = seed_input(tmp.path(), "pkgset", &[("x86_64-linux/wayland/lib/l.so", "elf")]);
        let mut lockfile = Lockfile::default();
        let mut spec_pin = pin.clone();
        spec_pin.source = PinSource::Git {
            url: "https://example.org/pkgset.git".to_owned(),
            rev: "0123456789abcdef0123456789abcdef01234567".to_owned(),
        };
        lockfile.upsert(spec_pin);

        let (resolved, updated) =
            resolve_all(tmp.path(), &descriptor(), &lockfile, true).unwrap();
        assert_eq!(resolved.len(), 1);
        let input = resolved.get("pkgset").unwrap();
        assert!(input.store_path.join("x86_64-linux/wayland/lib/l.so").exists());
        assert_eq!(updated, lockfile);
    }

    #[test]
    fn resolve_all_locked_fails_on_missing_pin() {
        let tmp = tempfile::tempdir().unwrap();
        let result = resolve_all(tmp.path(), &descriptor(), &Lockfile::default(), true);
        assert!(matches!(result, Err(EngineError::LockfileUpdateRequired)));
    }

    #[test]
    fn ensure_fetched_rejects_hash_mismatch() {
        // A pin whose tree hash doesn't name an existing store entry forces a
        // fetch; with an unreachable URL that fails — and must fail, not
        // silently accept whatever is on disk.
        let tmp = tempfile::tempdir().unwrap();
        let store = inputs_store(tmp.path());
        let pin = InputPin {
            name: "pkgset".to_owned(),
            source: PinSource::Git {
                url: "file:///nonexistent/hermit-test-repo".to_owned(),
                rev: "0123456789abcdef0123456789abcdef01234567".to_owned(),
            },
            tree_hash: "0".repeat(64),
        };
        let result = ensure_fetched(&store, "pkgset", &pin);
        assert!(result.is_err());
    }

    #[test]
    fn store_dir_uses_short_hash() {
        let dir = store_dir(Path::new("/store"), "pkgset", &"ab".repeat(32));
        assert_eq!(
            dir,
            Path::new("/store").join(format!("pkgset-{}", "ab".repeat(6)))
        );
    }

    #[test]
    fn resolve_git_ref_accepts_full_commit() {
        let rev = "0123456789ABCDEF0123456789abcdef01234567";
        let resolved = resolve_git_ref("pkgset", "https://example.org/x.git", rev).unwrap();
        assert_eq!(resolved, rev.to_lowercase());
    }

    #[test]
    fn resolved_inputs_lookup() {
        let inputs = ResolvedInputs {
            inputs: vec![ResolvedInput {
                name: "pkgset".to_owned(),
                store_path: "/store/pkgset-abc".into(),
                pin: InputPin {
                    name: "pkgset".to_owned(),
                    source: PinSource::Git {
                        url: "u".to_owned(),
                        rev: "r".to_owned(),
                    },
                    tree_hash: "t".to_owned(),
                },
            }],
        };
        assert!(inputs.get("pkgset").is_some());
        assert!(inputs.get("missing").is_none());
        assert!(!inputs.is_empty());
    }
}
