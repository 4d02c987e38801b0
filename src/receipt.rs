//! Install receipts.
//!
//! Each completed installation leaves an `INSTALL_RECEIPT.json` in its keg:
//!
//! ```text
//! <prefix>/Cellar/mutagen-edge/0.16.1/
//!   INSTALL_RECEIPT.json
//!   libexec/mutagen-agents.tar.gz
//! ```
//!
//! The receipt is the record of what is installed. It names the executable the
//! formula put on the PATH (which the conflict check compares against), the exact
//! artifact that was installed (which guards against republished checksums), and
//! every file copied outside the keg (which uninstall removes).

use crate::formula::{ArtifactDescriptor, Selection, VariantLabel};
use crate::platform::PlatformKey;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const RECEIPT_FILE: &str = "INSTALL_RECEIPT.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub tapkeg_version: String,
    pub formula: String,
    pub version: String,
    pub variant: VariantLabel,
    pub binary: String,
    pub platform: PlatformKey,
    pub source: ArtifactDescriptor,
    #[serde(default)]
    pub conflicts_with: Vec<String>,
    #[serde(default)]
    pub installed_files: Vec<PathBuf>,
    pub time: i64,
}

impl InstallReceipt {
    /// Create a receipt for a finished installation
    pub fn new(selection: &Selection<'_>, installed_files: Vec<PathBuf>) -> Self {
        Self {
            tapkeg_version: format!("tapkeg/{}", env!("CARGO_PKG_VERSION")),
            formula: selection.formula.name.clone(),
            version: selection.variant.version.clone(),
            variant: selection.variant.label,
            binary: selection.formula.binary_name().to_string(),
            platform: selection.platform,
            source: selection.artifact.clone(),
            conflicts_with: selection
                .formula
                .conflicts_with
                .iter()
                .map(|c| c.name.clone())
                .collect(),
            installed_files,
            time: chrono::Utc::now().timestamp(),
        }
    }

    /// Read an existing INSTALL_RECEIPT.json file
    pub fn read(keg_path: &Path) -> Result<Self> {
        let receipt_path = keg_path.join(RECEIPT_FILE);
        let contents = fs::read_to_string(&receipt_path)
            .with_context(|| format!("Failed to read receipt: {}", receipt_path.display()))?;

        let receipt: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse receipt: {}", receipt_path.display()))?;

        Ok(receipt)
    }

    /// Write receipt to INSTALL_RECEIPT.json
    pub fn write(&self, keg_path: &Path) -> Result<()> {
        fs::create_dir_all(keg_path)
            .with_context(|| format!("Failed to create keg: {}", keg_path.display()))?;

        let receipt_path = keg_path.join(RECEIPT_FILE);
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize install receipt")?;

        fs::write(&receipt_path, json)
            .with_context(|| format!("Failed to write receipt: {}", receipt_path.display()))?;

        Ok(())
    }

    /// Installation time in local time, for display
    pub fn installed_at(&self) -> Option<chrono::DateTime<chrono::Local>> {
        chrono::DateTime::from_timestamp(self.time, 0).map(|t| t.with_timezone(&chrono::Local))
    }
}
