//! Per-platform descriptor evaluation.
//!
//! `EvalContext::resolve` is a pure function of (descriptor, resolved inputs,
//! platform): it looks up every declared library and tool in the platform's
//! package set and derives the library search path. Nothing is shared
//! between evaluations of different platforms, and no build work happens
//! here — a descriptor that cannot be satisfied fails at this stage.

use std::path::PathBuf;

use hermit_config::descriptor::Descriptor;
use hermit_platform::{Platform, SEARCH_PATH_SEPARATOR};

use crate::error::EngineError;
use crate::inputs::ResolvedInputs;
use crate::pkgset::PackageSet;

/// Environment variable enabling diagnostic backtraces in the built artifact
/// and the dev shell. Always set to `"1"`.
pub const BACKTRACE_VAR: &str = "RUST_BACKTRACE";

/// A native library resolved to its filesystem location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLibrary {
    pub name: String,
    pub location: PathBuf,
}

/// A tool resolved to the directory holding its executables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTool {
    pub name: String,
    pub bin_dir: PathBuf,
}

/// The evaluation result for one platform.
#[derive(Debug)]
pub struct EvalContext {
    pub platform: Platform,
    /// Declared libraries plus the matching OS-family extras, in order.
    pub libraries: Vec<ResolvedLibrary>,
    /// Native build tools, available during builds and in the dev shell.
    pub tools: Vec<ResolvedTool>,
    /// Dev-shell-only interactive tools.
    pub shell_tools: Vec<ResolvedTool>,
    /// The joined library search path.
    pub search_path: String,
}

impl EvalContext {
    /// Evaluate the descriptor for one platform.
    ///
    /// # Errors
    /// Returns an evaluation error if the platform is unsupported, the
    /// package set input lacks a tree for it, or any declared library or
    /// tool is absent from the platform's package set.
    pub fn resolve(
        descriptor: &Descriptor,
        inputs: &ResolvedInputs,
        platform: &Platform,
    ) -> Result<Self, EngineError> {
        if !descriptor.supports(platform) {
            return Err(EngineError::UnsupportedPlatform {
                platform: platform.to_string(),
                supported: descriptor.platforms.supported.join(", "),
            });
        }

        let library_names = descriptor.libraries_for(platform);
        let tool_names = &descriptor.libraries.tools;
        let shell_tool_names = &descriptor.shell.tools;

        let needs_packages =
            !library_names.is_empty() || !tool_names.is_empty() || !shell_tool_names.is_empty();

        let mut libraries = Vec::with_capacity(library_names.len());
        let mut tools = Vec::with_capacity(tool_names.len());
        let mut shell_tools = Vec::with_capacity(shell_tool_names.len());

        if needs_packages {
            let set_name = &descriptor.libraries.package_set;
            let input = inputs
                .get(set_name)
                .ok_or_else(|| EngineError::InputNotPinned {
                    name: set_name.clone(),
                })?;
            let set = PackageSet::open(set_name, &input.store_path, platform)?;

            for name in &library_names {
                libraries.push(ResolvedLibrary {
                    name: name.clone(),
                    location: set.library_location(name)?,
                });
            }
            for name in tool_names {
                tools.push(ResolvedTool {
                    name: name.clone(),
                    bin_dir: set.tool_bin_dir(name)?,
                });
            }
            for name in shell_tool_names {
                shell_tools.push(ResolvedTool {
                    name: name.clone(),
                    bin_dir: set.tool_bin_dir(name)?,
                });
            }
        }

        let locations: Vec<PathBuf> = libraries.iter().map(|l| l.location.clone()).collect();
        let search_path = join_search_path(&locations);

        Ok(Self {
            platform: platform.clone(),
            libraries,
            tools,
            shell_tools,
            search_path,
        })
    }

    /// Environment the built artifact (and the dev shell) runs with: the
    /// platform's linker search-path variable and the backtrace flag.
    pub fn runtime_env(&self) -> Vec<(String, String)> {
        vec![
            (
                self.platform.library_path_var().to_owned(),
                self.search_path.clone(),
            ),
            (BACKTRACE_VAR.to_owned(), "1".to_owned()),
        ]
    }
}

/// Join library locations into a single search-path string.
///
/// Order is preserved — it determines dynamic-linker search precedence — and
/// the result is a pure function of the input list.
pub fn join_search_path(locations: &[PathBuf]) -> String {
    locations
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(&SEARCH_PATH_SEPARATOR.to_string())
}
