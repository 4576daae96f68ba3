//! The `hermit.toml` build descriptor.
//!
//! The descriptor is fully declarative: named upstream inputs, the supported
//! platform set, the source filter, the build executor and its per-phase
//! arguments, and the native libraries/tools the artifact needs at runtime.
//! Validation is fail-closed — a descriptor that parses but is internally
//! inconsistent is rejected before any resolution or build work starts.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use hermit_platform::{OsFamily, Platform};

/// The parsed and validated `hermit.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    pub package: Package,
    #[serde(default)]
    pub source: SourceFilter,
    #[serde(default)]
    pub build: BuildConfig,
    /// Named upstream inputs. A `BTreeMap` keeps iteration deterministic;
    /// duplicate names are impossible by construction.
    #[serde(default)]
    pub inputs: BTreeMap<String, InputSpec>,
    pub platforms: Platforms,
    #[serde(default)]
    pub libraries: Libraries,
    #[serde(default)]
    pub shell: ShellConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "0.1.0".to_owned()
}

/// Which files of the project tree participate in the build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceFilter {
    /// Glob patterns selecting the build-relevant source set.
    #[serde(default = "default_include")]
    pub include: Vec<String>,
    /// The dependency-manifest subset: the only files whose content feeds the
    /// dependency-only cache key.
    #[serde(default = "default_dep_manifests")]
    pub dep_manifests: Vec<String>,
}

impl Default for SourceFilter {
    fn default() -> Self {
        Self {
            include: default_include(),
            dep_manifests: default_dep_manifests(),
        }
    }
}

fn default_include() -> Vec<String> {
    vec![
        "src/**/*.rs".to_owned(),
        "Cargo.toml".to_owned(),
        "Cargo.lock".to_owned(),
    ]
}

fn default_dep_manifests() -> Vec<String> {
    vec!["Cargo.toml".to_owned(), "Cargo.lock".to_owned()]
}

/// The external build executor and its per-phase invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildConfig {
    /// Program driving the build (the executor is external to hermit).
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments for the dependency-only phase.
    #[serde(default = "default_deps_args")]
    pub deps_args: Vec<String>,
    /// Arguments for the full-package phase.
    #[serde(default = "default_package_args")]
    pub package_args: Vec<String>,
    /// Refuse to build when a dependency is not covered by the lock.
    #[serde(default = "default_true")]
    pub strict_deps: bool,
    /// Where the executor leaves the compiled binary, relative to the
    /// project root. Defaults to `target/release/<package name>`.
    #[serde(default)]
    pub artifact: Option<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            deps_args: default_deps_args(),
            package_args: default_package_args(),
            strict_deps: true,
            artifact: None,
        }
    }
}

fn default_program() -> String {
    "cargo".to_owned()
}

fn default_deps_args() -> Vec<String> {
    vec!["fetch".to_owned(), "--locked".to_owned()]
}

fn default_package_args() -> Vec<String> {
    vec![
        "build".to_owned(),
        "--release".to_owned(),
        "--locked".to_owned(),
    ]
}

fn default_true() -> bool {
    true
}

/// A named upstream source locator: either a repository + revision reference,
/// or a tarball URL + content hash. Exactly one form must be given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<String>,
    /// Revision reference for git locators (branch, tag, or commit).
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Required SHA-256 of the tarball for url locators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// The platform set the descriptor is evaluated for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Platforms {
    pub supported: Vec<String>,
}

/// Native libraries and build tools the artifact needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Libraries {
    /// Ordered native library names; order determines linker search precedence.
    #[serde(default)]
    pub native: Vec<String>,
    /// Native build tools needed during compilation and in the dev shell.
    #[serde(default)]
    pub tools: Vec<String>,
    /// OS-family-conditional additions, evaluated once per platform.
    #[serde(default)]
    pub extra: Vec<LibraryExtra>,
    /// Name of the input providing the package set.
    #[serde(default = "default_package_set")]
    pub package_set: String,
}

fn default_package_set() -> String {
    "pkgset".to_owned()
}

impl Default for Libraries {
    fn default() -> Self {
        Self {
            native: Vec::new(),
            tools: Vec::new(),
            extra: Vec::new(),
            package_set: default_package_set(),
        }
    }
}

/// A declarative predicate: add `name` when the platform's OS family matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryExtra {
    pub family: String,
    pub name: String,
}

/// Extras for the interactive development shell.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Additional interactive tools (resolved from the package set).
    #[serde(default)]
    pub tools: Vec<String>,
}

impl Descriptor {
    /// Read, parse, and validate a `hermit.toml` from the given path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, contains invalid TOML,
    /// or fails validation.
    pub fn from_path(path: &Path) -> Result<Self, DescriptorError> {
        let content = std::fs::read_to_string(path).map_err(|e| DescriptorError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_str(&content, &path.display().to_string())
    }

    /// Parse and validate descriptor content.
    ///
    /// # Errors
    /// Returns an error on invalid TOML or failed validation.
    pub fn from_str(content: &str, origin: &str) -> Result<Self, DescriptorError> {
        let descriptor: Descriptor =
            toml::from_str(content).map_err(|e| DescriptorError::Parse {
                path: origin.to_owned(),
                source: e,
            })?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Serialize back to TOML (used for cache key computation).
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, DescriptorError> {
        toml::to_string_pretty(self).map_err(|e| DescriptorError::Serialize { source: e })
    }

    /// The supported platforms, parsed.
    ///
    /// # Errors
    /// Returns an error if any identifier is malformed (also caught by
    /// `validate`, so this cannot fail on a validated descriptor).
    pub fn supported_platforms(&self) -> Result<Vec<Platform>, DescriptorError> {
        self.platforms
            .supported
            .iter()
            .map(|s| {
                s.parse::<Platform>()
                    .map_err(|e| DescriptorError::Platform { source: e })
            })
            .collect()
    }

    /// Whether `platform` is in the supported set.
    pub fn supports(&self, platform: &Platform) -> bool {
        let id = platform.to_string();
        self.platforms.supported.iter().any(|p| *p == id)
    }

    /// The native library names for one platform: the declared list plus any
    /// family extras whose predicate matches, in declaration order.
    pub fn libraries_for(&self, platform: &Platform) -> Vec<String> {
        let mut names = self.libraries.native.clone();
        for extra in &self.libraries.extra {
            if extra.family == platform.family.as_str() {
                names.push(extra.name.clone());
            }
        }
        names
    }

    fn validate(&self) -> Result<(), DescriptorError> {
        if self.package.name.is_empty() {
            return Err(DescriptorError::Invalid {
                reason: "package.name must not be empty".to_owned(),
            });
        }

        if self.platforms.supported.is_empty() {
            return Err(DescriptorError::Invalid {
                reason: "platforms.supported must list at least one platform".to_owned(),
            });
        }
        let mut seen = std::collections::BTreeSet::new();
        for p in &self.platforms.supported {
            p.parse::<Platform>()
                .map_err(|e| DescriptorError::Platform { source: e })?;
            if !seen.insert(p.clone()) {
                return Err(DescriptorError::Invalid {
                    reason: format!("platform `{p}` is listed twice"),
                });
            }
        }

        for (name, spec) in &self.inputs {
            if name.is_empty() {
                return Err(DescriptorError::Invalid {
                    reason: "input names must not be empty".to_owned(),
                });
            }
            match (&spec.git, &spec.url) {
                (Some(_), Some(_)) => {
                    return Err(DescriptorError::Invalid {
                        reason: format!("input `{name}` declares both `git` and `url`"),
                    })
                }
                (None, None) => {
                    return Err(DescriptorError::Invalid {
                        reason: format!("input `{name}` declares neither `git` nor `url`"),
                    })
                }
                (None, Some(_)) if spec.sha256.is_none() => {
                    return Err(DescriptorError::Invalid {
                        reason: format!("input `{name}` is a tarball and must pin `sha256`"),
                    })
                }
                _ => {}
            }
        }

        for extra in &self.libraries.extra {
            extra
                .family
                .parse::<OsFamily>()
                .map_err(|e| DescriptorError::Platform { source: e })?;
        }

        let needs_packages = !self.libraries.native.is_empty()
            || !self.libraries.tools.is_empty()
            || !self.libraries.extra.is_empty()
            || !self.shell.tools.is_empty();
        if needs_packages && !self.inputs.contains_key(&self.libraries.package_set) {
            return Err(DescriptorError::Invalid {
                reason: format!(
                    "libraries reference package set input `{}`, which is not declared under [inputs]",
                    self.libraries.package_set
                ),
            });
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid hermit.toml at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("cannot serialize descriptor: {source}")]
    Serialize { source: toml::ser::Error },
    #[error("invalid hermit.toml: {reason}")]
    Invalid { reason: String },
    #[error("{source}")]
    Platform {
        source: hermit_platform::PlatformError,
    },
}
