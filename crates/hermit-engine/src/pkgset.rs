//! A view over the resolved package-index input.
//!
//! The package set lays out packages as `<tree>/<platform>/<name>/`, with
//! libraries under `<name>/lib/` and tools under `<name>/bin/`. Lookups are
//! evaluation-time only; a missing package fails evaluation before any build
//! step runs.

use std::path::{Path, PathBuf};

use hermit_platform::Platform;

use crate::error::EngineError;

/// The packages available to one platform.
#[derive(Debug)]
pub struct PackageSet {
    input_name: String,
    platform: String,
    platform_root: PathBuf,
}

impl PackageSet {
    /// Open the package set of `input_tree` for one platform.
    ///
    /// # Errors
    /// Returns an error if the input tree has no directory for the platform.
    pub fn open(
        input_name: &str,
        input_tree: &Path,
        platform: &Platform,
    ) -> Result<Self, EngineError> {
        let platform_root = input_tree.join(platform.to_string());
        if !platform_root.is_dir() {
            return Err(EngineError::PackageSetMissingPlatform {
                input: input_name.to_owned(),
                platform: platform.to_string(),
                path: platform_root.display().to_string(),
            });
        }
        Ok(Self {
            input_name: input_name.to_owned(),
            platform: platform.to_string(),
            platform_root,
        })
    }

    /// The input this set was opened from.
    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    /// Root directory of a package.
    ///
    /// # Errors
    /// Returns `PackageNotFound` (listing the available names) if the package
    /// is absent from this platform's set.
    pub fn lookup(&self, name: &str) -> Result<PathBuf, EngineError> {
        let dir = self.platform_root.join(name);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(EngineError::PackageNotFound {
                name: name.to_owned(),
                platform: self.platform.clone(),
                available: self.available(),
            })
        }
    }

    /// Filesystem location of a library package: `<pkg>/lib` when present,
    /// otherwise the package root.
    ///
    /// # Errors
    /// Returns `PackageNotFound` if the package is absent.
    pub fn library_location(&self, name: &str) -> Result<PathBuf, EngineError> {
        let root = self.lookup(name)?;
        let lib = root.join("lib");
        Ok(if lib.is_dir() { lib } else { root })
    }

    /// Executable directory of a tool package: `<pkg>/bin` when present,
    /// otherwise the package root.
    ///
    /// # Errors
    /// Returns `PackageNotFound` if the package is absent.
    pub fn tool_bin_dir(&self, name: &str) -> Result<PathBuf, EngineError> {
        let root = self.lookup(name)?;
        let bin = root.join("bin");
        Ok(if bin.is_dir() { bin } else { root })
    }

    /// Sorted names of every package in this platform's set.
    fn available(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.platform_root) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_owned))
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;

    fn platform() -> Platform {
        "x86_64-linux".parse().unwrap()
    }

    fn seed_set(tree: &Path) {
        for pkg in ["wayland", "libxkbcommon", "vulkan-loader"] {
            fs::create_dir_all(tree.join("x86_64-linux").join(pkg).join("lib")).unwrap();
        }
        fs::create_dir_all(tree.join("x86_64-linux/pkg-config/bin")).unwrap();
        // A package with neither lib/ nor bin/.
        fs::create_dir_all(tree.join("x86_64-linux/headers-only")).unwrap();
    }

    #[test]
    fn open_requires_platform_dir() {
        let tmp = tempfile::tempdir().unwrap();
        seed_set(tmp.path());

        assert!(PackageSet::open("pkgset", tmp.path(), &platform()).is_ok());

        let darwin: Platform = "aarch64-darwin".parse().unwrap();
        let err = PackageSet::open("pkgset", tmp.path(), &darwin).unwrap_err();
        assert!(
            err.to_string().contains("aarch64-darwin"),
            "error was: {err}"
        );
    }

    #[test]
    fn library_location_prefers_lib_dir() {
        let tmp = tempfile::tempdir().unwrap();
        seed_set(tmp.path());
        let set = PackageSet::open("pkgset", tmp.path(), &platform()).unwrap();

        let loc = set.library_location("wayland").unwrap();
        assert!(loc.ends_with("wayland/lib"));
    }

    #[test]
    fn library_location_falls_back_to_root() {
        let tmp = tempfile::tempdir().unwrap();
        seed_set(tmp.path());
        let set = PackageSet::open("pkgset", tmp.path(), &platform()).unwrap();

        let loc = set.library_location("headers-only").unwrap();
        assert!(loc.ends_with("headers-only"));
    }

    #[test]
    fn tool_bin_dir_prefers_bin() {
        let tmp = tempfile::tempdir().unwrap();
        seed_set(tmp.path());
        let set = PackageSet::open("pkgset", tmp.path(), &platform()).unwrap();

        let bin = set.tool_bin_dir("pkg-config").unwrap();
        assert!(bin.ends_with("pkg-config/bin"));
    }

    #[test]
    fn missing_package_lists_available() {
        let tmp = tempfile::tempdir().unwrap();
        seed_set(tmp.path());
        let set = PackageSet::open("pkgset", tmp.path(), &platform()).unwrap();

        let err = set.lookup("libGL").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("libGL"), "error was: {msg}");
        assert!(msg.contains("wayland"), "error was: {msg}");
    }
}
