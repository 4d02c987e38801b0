//! Install layout and the Cellar of installed formulae.
//!
//! Every destination the installer writes to is an explicit field of
//! [`InstallLayout`]; nothing is implied by a global prefix once a layout exists.
//! The default layout follows Homebrew's conventions:
//!
//! ```text
//! <prefix>/
//!   bin/                              executables
//!   etc/bash_completion.d/            bash completions
//!   share/zsh/site-functions/         zsh completions
//!   share/fish/vendor_completions.d/  fish completions
//!   Cellar/<formula>/<version>/
//!     INSTALL_RECEIPT.json
//!     libexec/                        private data (agent archives)
//! ```

use crate::formula::{AgentDestination, Shell};
use crate::receipt::InstallReceipt;
use anyhow::{Context, Result};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Detect the install prefix on this system
pub fn detect_prefix() -> PathBuf {
    // First check environment variable
    if let Ok(prefix) = std::env::var("TAPKEG_PREFIX") {
        return PathBuf::from(prefix);
    }

    #[cfg(target_arch = "aarch64")]
    {
        PathBuf::from("/opt/homebrew")
    }
    #[cfg(not(target_arch = "aarch64"))]
    {
        PathBuf::from("/usr/local")
    }
}

/// Filesystem destinations for an installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    pub prefix: PathBuf,
    pub bin_dir: PathBuf,
    pub cellar_dir: PathBuf,
    pub bash_completion_dir: PathBuf,
    pub zsh_completion_dir: PathBuf,
    pub fish_completion_dir: PathBuf,
    /// Overrides each formula's preferred agent archive location
    pub agent_destination: Option<AgentDestination>,
}

impl InstallLayout {
    /// Homebrew-style layout rooted at `prefix`
    pub fn from_prefix(prefix: impl Into<PathBuf>) -> Self {
        let prefix = prefix.into();
        Self {
            bin_dir: prefix.join("bin"),
            cellar_dir: prefix.join("Cellar"),
            bash_completion_dir: prefix.join("etc/bash_completion.d"),
            zsh_completion_dir: prefix.join("share/zsh/site-functions"),
            fish_completion_dir: prefix.join("share/fish/vendor_completions.d"),
            agent_destination: None,
            prefix,
        }
    }

    /// Layout for the detected prefix
    pub fn detect() -> Self {
        Self::from_prefix(detect_prefix())
    }

    pub fn with_agent_destination(mut self, destination: Option<AgentDestination>) -> Self {
        self.agent_destination = destination;
        self
    }

    pub fn completion_dir(&self, shell: Shell) -> &Path {
        match shell {
            Shell::Bash => &self.bash_completion_dir,
            Shell::Zsh => &self.zsh_completion_dir,
            Shell::Fish => &self.fish_completion_dir,
        }
    }

    /// Cellar directory holding one installed version of a formula
    pub fn keg_path(&self, formula: &str, version: &str) -> PathBuf {
        self.cellar_dir.join(formula).join(version)
    }

    /// Directory the agent archive is copied into
    pub fn agent_dir(&self, preferred: AgentDestination, formula: &str, version: &str) -> PathBuf {
        match self.agent_destination.unwrap_or(preferred) {
            AgentDestination::Bin => self.bin_dir.clone(),
            AgentDestination::Libexec => self.keg_path(formula, version).join("libexec"),
        }
    }
}

/// An installed formula in the Cellar
#[derive(Debug, Clone)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    pub receipt: InstallReceipt,
}

impl InstalledPackage {
    /// Name of the executable this package put on the PATH
    pub fn binary_name(&self) -> &str {
        &self.receipt.binary
    }
}

/// Read all installed packages from the Cellar
///
/// Version directories without a readable receipt are skipped with a warning; they
/// were not produced by a completed install.
pub fn list_installed(layout: &InstallLayout) -> Result<Vec<InstalledPackage>> {
    let cellar = &layout.cellar_dir;

    if !cellar.exists() {
        return Ok(vec![]);
    }

    let mut packages = Vec::new();

    for entry in fs::read_dir(cellar)
        .with_context(|| format!("Failed to read Cellar: {}", cellar.display()))?
    {
        let entry = entry?;
        let formula_name = entry.file_name().to_string_lossy().to_string();

        // Skip hidden files
        if formula_name.starts_with('.') || !entry.path().is_dir() {
            continue;
        }

        for version_entry in fs::read_dir(entry.path())? {
            let version_entry = version_entry?;
            let version = version_entry.file_name().to_string_lossy().to_string();

            if version.starts_with('.') {
                continue;
            }

            match InstallReceipt::read(&version_entry.path()) {
                Ok(receipt) => packages.push(InstalledPackage {
                    name: formula_name.clone(),
                    version,
                    path: version_entry.path(),
                    receipt,
                }),
                Err(e) => warn!(
                    "Ignoring {}: {:#}",
                    version_entry.path().display(),
                    e
                ),
            }
        }
    }

    packages.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| compare_versions(&a.version, &b.version))
    });
    Ok(packages)
}

/// Order version strings segment by segment, numbers numerically.
///
/// `0.9.0 < 0.10.2`, and `0.11.0 < 0.11.0-beta2` since the longer string has an
/// extra segment.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    fn segments(version: &str) -> impl Iterator<Item = (u64, &str)> {
        version.split(['.', '-', '_']).map(|segment| {
            let rest = segment.trim_start_matches(|c: char| c.is_ascii_digit());
            let digits = segment.len() - rest.len();
            let number = segment[..digits].parse().unwrap_or(0);
            (number, rest)
        })
    }

    segments(a).cmp(segments(b))
}

/// All installed versions of one formula, oldest first
pub fn get_installed_versions(layout: &InstallLayout, formula: &str) -> Result<Vec<InstalledPackage>> {
    Ok(list_installed(layout)?
        .into_iter()
        .filter(|pkg| pkg.name == formula)
        .collect())
}
