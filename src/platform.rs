//! Platform resolution for selecting the correct release artifact.
//!
//! Release bundles are published per operating system and CPU architecture, and a
//! formula lists them under platform keys such as `darwin_arm64` or `linux_amd64`.
//! This module turns the identifiers reported by the calling environment into a
//! [`PlatformKey`].
//!
//! Resolution is exact. A host that is not one of the [`SUPPORTED_PLATFORMS`] is
//! rejected with [`TapkegError::UnsupportedPlatform`]; there is no fallback to a
//! "closest" platform. Whether a formula actually ships an artifact for a supported
//! platform is decided later, by the artifact table lookup.
//!
//! # Examples
//!
//! ```
//! use tapkeg::platform::{self, Arch, Os};
//!
//! let key = platform::resolve("linux", "x86_64").unwrap();
//! assert_eq!(key.os, Os::Linux);
//! assert_eq!(key.arch, Arch::Amd64);
//! assert_eq!(key.to_string(), "linux_amd64");
//!
//! assert!(platform::resolve("windows", "x86_64").is_err());
//! ```

use crate::error::{Result, TapkegError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Os {
    MacOs,
    Linux,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Arch {
    Amd64,
    Arm64,
}

/// Every (OS, arch) pair this installer knows how to serve.
pub const SUPPORTED_PLATFORMS: &[PlatformKey] = &[
    PlatformKey::new(Os::MacOs, Arch::Arm64),
    PlatformKey::new(Os::MacOs, Arch::Amd64),
    PlatformKey::new(Os::Linux, Arch::Amd64),
];

impl Os {
    /// Name used in artifact file names and platform keys
    pub fn as_str(self) -> &'static str {
        match self {
            Os::MacOs => "darwin",
            Os::Linux => "linux",
        }
    }

    fn parse(id: &str) -> Option<Self> {
        match id.to_ascii_lowercase().as_str() {
            "macos" | "darwin" | "osx" | "mac" => Some(Os::MacOs),
            "linux" => Some(Os::Linux),
            _ => None,
        }
    }
}

impl Arch {
    pub fn as_str(self) -> &'static str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::Arm64 => "arm64",
        }
    }

    fn parse(id: &str) -> Option<Self> {
        // Rust reports "x86_64"/"aarch64"; release names use "amd64"/"arm64"
        match id.to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" | "x64" => Some(Arch::Amd64),
            "aarch64" | "arm64" => Some(Arch::Arm64),
            _ => None,
        }
    }
}

/// Lookup key into a variant's artifact table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlatformKey {
    pub os: Os,
    pub arch: Arch,
}

impl PlatformKey {
    pub const fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.os.as_str(), self.arch.as_str())
    }
}

impl FromStr for PlatformKey {
    type Err = TapkegError;

    /// Parse a key in `<os>_<arch>` form, e.g. `darwin_arm64`
    fn from_str(s: &str) -> Result<Self> {
        let (os, arch) = s.split_once('_').ok_or_else(|| TapkegError::UnsupportedPlatform {
            os: s.to_string(),
            arch: String::new(),
        })?;
        resolve(os, arch)
    }
}

impl Serialize for PlatformKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PlatformKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Map an OS identifier and CPU architecture identifier to a platform key.
///
/// # Errors
///
/// Returns [`TapkegError::UnsupportedPlatform`] naming both identifiers when the pair
/// is not in [`SUPPORTED_PLATFORMS`].
pub fn resolve(os: &str, arch: &str) -> Result<PlatformKey> {
    let unsupported = || TapkegError::UnsupportedPlatform {
        os: os.to_string(),
        arch: arch.to_string(),
    };

    let key = PlatformKey::new(
        Os::parse(os).ok_or_else(unsupported)?,
        Arch::parse(arch).ok_or_else(unsupported)?,
    );

    if SUPPORTED_PLATFORMS.contains(&key) {
        Ok(key)
    } else {
        Err(unsupported())
    }
}

/// Resolve the given identifiers, falling back to those of the machine we run on.
pub fn resolve_host(os: Option<&str>, arch: Option<&str>) -> Result<PlatformKey> {
    resolve(
        os.unwrap_or(std::env::consts::OS),
        arch.unwrap_or(std::env::consts::ARCH),
    )
}
