//! Formula definitions: the data every installation is driven by.
//!
//! A [`Formula`] is pure data. Per-package differences (URLs, checksums, release
//! channels, completion file names, conflicts) live in JSON records rather than in
//! code, and a single installer consumes them all.
//!
//! ```text
//! Formula "mutagen"
//!   variants:
//!     stable      0.10.2        { darwin_amd64, linux_amd64 }
//!     prerelease  0.11.0-beta2  { darwin_amd64, linux_amd64 }
//!   conflicts_with: [...]
//! ```

use crate::error::{Result, TapkegError};
use crate::platform::PlatformKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Release channel of a formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantLabel {
    #[default]
    Stable,
    Prerelease,
}

impl VariantLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            VariantLabel::Stable => "stable",
            VariantLabel::Prerelease => "prerelease",
        }
    }

    pub fn is_unstable(self) -> bool {
        self == VariantLabel::Prerelease
    }
}

impl fmt::Display for VariantLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariantLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "stable" => Ok(VariantLabel::Stable),
            // Homebrew called this channel "devel"; release names use "edge"/"beta"
            "prerelease" | "devel" | "edge" | "beta" => Ok(VariantLabel::Prerelease),
            other => anyhow::bail!("unknown variant `{other}` (expected stable or prerelease)"),
        }
    }
}

/// One downloadable bundle for one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub url: String,
    pub sha256: String,
    pub version: String,
}

/// A release channel with its own version and per-platform artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    pub label: VariantLabel,
    pub version: String,
    pub artifacts: BTreeMap<PlatformKey, ArtifactDescriptor>,
}

/// A completion script the product binary can generate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionScript {
    pub shell: Shell,
    /// File name the script is written to, and installed under
    pub file: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
}

impl Shell {
    pub fn as_str(self) -> &'static str {
        match self {
            Shell::Bash => "bash",
            Shell::Zsh => "zsh",
            Shell::Fish => "fish",
        }
    }
}

impl CompletionScript {
    /// Argument passed to `<binary> generate` to produce this script
    pub fn generate_flag(&self) -> String {
        format!("--{}-completion-script={}", self.shell.as_str(), self.file)
    }
}

/// A package that must not be installed alongside this one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDecl {
    pub name: String,
    #[serde(default)]
    pub because: Option<String>,
}

/// Where the agent archive is placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentDestination {
    /// Next to the executable
    Bin,
    /// The keg's private libexec directory
    #[default]
    Libexec,
}

impl FromStr for AgentDestination {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "bin" => Ok(AgentDestination::Bin),
            "libexec" => Ok(AgentDestination::Libexec),
            other => anyhow::bail!("unknown agent destination `{other}` (expected bin or libexec)"),
        }
    }
}

/// Package definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Formula {
    /// Unique formula name
    pub name: String,
    /// Human-readable product name used in caveats
    #[serde(default)]
    pub display_name: Option<String>,
    /// Name of the installed executable; defaults to the formula name
    #[serde(default)]
    pub binary: Option<String>,
    pub desc: String,
    pub homepage: String,
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub default_variant: VariantLabel,
    #[serde(default)]
    pub completions: Vec<CompletionScript>,
    /// Agent archive file name inside the bundle; defaults to `<binary>-agents.tar.gz`
    #[serde(default)]
    pub agent_archive: Option<String>,
    #[serde(default)]
    pub agent_destination: AgentDestination,
    /// What the project calls its prerelease channel ("edge", "beta", ...)
    #[serde(default)]
    pub prerelease_channel: Option<String>,
    #[serde(default)]
    pub conflicts_with: Vec<ConflictDecl>,
}

/// The outcome of formula selection: one descriptor for one platform
#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    pub formula: &'a Formula,
    pub variant: &'a Variant,
    pub platform: PlatformKey,
    pub artifact: &'a ArtifactDescriptor,
}

impl Formula {
    pub fn binary_name(&self) -> &str {
        self.binary.as_deref().unwrap_or(&self.name)
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn agent_archive_name(&self) -> String {
        self.agent_archive
            .clone()
            .unwrap_or_else(|| format!("{}-agents.tar.gz", self.binary_name()))
    }

    pub fn variant(&self, label: VariantLabel) -> Option<&Variant> {
        self.variants.iter().find(|v| v.label == label)
    }

    /// Pick the artifact for `platform` from the requested variant.
    ///
    /// `label` defaults to the formula's default variant, which is `stable` unless
    /// the definition says otherwise.
    ///
    /// # Errors
    ///
    /// - [`TapkegError::VariantNotFound`] if the formula does not define the variant
    /// - [`TapkegError::NoArtifactForPlatform`] if the variant has no descriptor for
    ///   `platform`
    pub fn select(&self, label: Option<VariantLabel>, platform: PlatformKey) -> Result<Selection<'_>> {
        let label = label.unwrap_or(self.default_variant);
        let variant = self.variant(label).ok_or_else(|| TapkegError::VariantNotFound {
            formula: self.name.clone(),
            label: label.to_string(),
        })?;

        let artifact =
            variant
                .artifacts
                .get(&platform)
                .ok_or_else(|| TapkegError::NoArtifactForPlatform {
                    formula: self.name.clone(),
                    variant: format!("{} {}", label, variant.version),
                    platform: platform.to_string(),
                })?;

        Ok(Selection {
            formula: self,
            variant,
            platform,
            artifact,
        })
    }
}
