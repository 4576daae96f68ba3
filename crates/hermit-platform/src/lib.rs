//! Platform identifiers, host detection, and per-family linker conventions.
//!
//! A platform is an `<arch>-<os>` tuple such as `x86_64-linux` or
//! `aarch64-darwin`. Descriptors are evaluated once per platform, with no
//! state shared between evaluations.

use std::fmt;
use std::str::FromStr;

/// Separator used when joining library locations into a search-path string.
///
/// Both supported OS families are Unix-like, so this is always `:`.
pub const SEARCH_PATH_SEPARATOR: char = ':';

/// The operating-system family of a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Linux,
    Darwin,
}

impl OsFamily {
    /// The dynamic-linker search-path variable consulted by this family.
    pub fn library_path_var(self) -> &'static str {
        match self {
            OsFamily::Linux => "LD_LIBRARY_PATH",
            OsFamily::Darwin => "DYLD_LIBRARY_PATH",
        }
    }

    /// The family name as it appears in descriptors (`linux` / `darwin`).
    pub fn as_str(self) -> &'static str {
        match self {
            OsFamily::Linux => "linux",
            OsFamily::Darwin => "darwin",
        }
    }
}

impl FromStr for OsFamily {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linux" => Ok(OsFamily::Linux),
            "darwin" => Ok(OsFamily::Darwin),
            other => Err(PlatformError::UnknownFamily {
                family: other.to_owned(),
            }),
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A build platform: architecture plus OS family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    pub arch: Arch,
    pub family: OsFamily,
}

/// Supported CPU architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    Aarch64,
}

impl Arch {
    pub fn as_str(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
        }
    }
}

impl FromStr for Arch {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86_64" => Ok(Arch::X86_64),
            "aarch64" => Ok(Arch::Aarch64),
            other => Err(PlatformError::UnknownArch {
                arch: other.to_owned(),
            }),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Platform {
    /// The dynamic-linker search-path variable for this platform.
    pub fn library_path_var(&self) -> &'static str {
        self.family.library_path_var()
    }
}

impl FromStr for Platform {
    type Err = PlatformError;

    /// Parse an `<arch>-<os>` identifier (e.g. `x86_64-linux`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((arch, family)) = s.split_once('-') else {
            return Err(PlatformError::Malformed {
                platform: s.to_owned(),
            });
        };
        Ok(Platform {
            arch: arch.parse()?,
            family: family.parse()?,
        })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.arch, self.family)
    }
}

/// Detect the platform hermit is running on.
///
/// # Errors
/// Returns an error if the current OS or architecture has no hermit
/// platform identifier.
pub fn host_platform() -> Result<Platform, PlatformError> {
    let family = match std::env::consts::OS {
        "linux" => OsFamily::Linux,
        "macos" => OsFamily::Darwin,
        other => {
            return Err(PlatformError::UnsupportedHost {
                os: other.to_owned(),
                arch: std::env::consts::ARCH.to_owned(),
            })
        }
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => Arch::X86_64,
        "aarch64" => Arch::Aarch64,
        other => {
            return Err(PlatformError::UnsupportedHost {
                os: std::env::consts::OS.to_owned(),
                arch: other.to_owned(),
            })
        }
    };
    Ok(Platform { arch, family })
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("unsupported host: {os}/{arch} — hermit supports linux and darwin on x86_64/aarch64")]
    UnsupportedHost { os: String, arch: String },

    #[error("malformed platform `{platform}` — expected `<arch>-<os>` (e.g. `x86_64-linux`)")]
    Malformed { platform: String },

    #[error("unknown architecture `{arch}` — expected `x86_64` or `aarch64`")]
    UnknownArch { arch: String },

    #[error("unknown OS family `{family}` — expected `linux` or `darwin`")]
    UnknownFamily { family: String },
}
