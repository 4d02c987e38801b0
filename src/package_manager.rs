//! High-level PackageManager API - the full install pipeline in one place.
//!
//! ```text
//! resolve platform ─> select artifact ─> conflict gate ─> verify + unpack
//!        ─> install plan ─> receipt ─> smoke test ─> caveats
//! ```
//!
//! Every stage fails fast. Nothing under the install layout is touched until the
//! platform, the artifact, the conflict gate and (for archives) the checksum have
//! all been accepted.
//!
//! # Quick Start
//!
//! ```no_run
//! use tapkeg::{BundleSource, InstallLayout, InstallRequest, PackageManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pm = PackageManager::new(InstallLayout::detect())?;
//!
//!     let request = InstallRequest::new(
//!         "mutagen-edge",
//!         BundleSource::Archive("mutagen_darwin_arm64_v0.16.1.tar.gz".into()),
//!     );
//!     let result = pm.install(&request).await?;
//!     println!("Installed {} {}", result.name, result.version);
//!     println!("{}", result.caveats);
//!
//!     Ok(())
//! }
//! ```

use crate::bundle::{self, BundleContents};
use crate::cellar::{self, InstallLayout, InstalledPackage};
use crate::error::{Result, TapkegError};
use crate::formula::{Selection, VariantLabel};
use crate::index::FormulaIndex;
use crate::install::InstallPlan;
use crate::platform::{self, PlatformKey};
use crate::receipt::InstallReceipt;
use crate::{caveats, conflict, smoke};
use anyhow::Context;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Where the bundle to install comes from
#[derive(Debug, Clone)]
pub enum BundleSource {
    /// A downloaded `.tar.gz` that still needs checksum verification
    Archive(PathBuf),
    /// A directory already verified and unpacked by the caller
    Unpacked(PathBuf),
}

/// Parameters of one install invocation
#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub formula: String,
    pub variant: Option<VariantLabel>,
    /// Host identifiers; `None` means the machine we run on
    pub os: Option<String>,
    pub arch: Option<String>,
    pub source: BundleSource,
    pub skip_test: bool,
}

impl InstallRequest {
    pub fn new(formula: impl Into<String>, source: BundleSource) -> Self {
        Self {
            formula: formula.into(),
            variant: None,
            os: None,
            arch: None,
            source,
            skip_test: false,
        }
    }

    pub fn platform(&self) -> Result<PlatformKey> {
        platform::resolve_host(self.os.as_deref(), self.arch.as_deref())
    }
}

/// Result of an install operation
#[derive(Debug, Clone, Serialize)]
pub struct InstallResult {
    /// Formula name
    pub name: String,
    /// Installed version
    pub version: String,
    pub variant: VariantLabel,
    pub platform: PlatformKey,
    /// Path in Cellar
    pub keg: PathBuf,
    /// Files copied into the layout
    pub installed_files: Vec<PathBuf>,
    /// Scratch workspace used for completion generation (already removed)
    pub scratch_dir: Option<PathBuf>,
    /// Whether the smoke test ran (and passed)
    pub tested: bool,
    /// Post-install guidance
    pub caveats: String,
    /// Time taken (milliseconds)
    pub time_ms: u64,
}

/// Result of an uninstall operation
#[derive(Debug, Clone, Serialize)]
pub struct UninstallResult {
    pub name: String,
    /// Uninstalled versions
    pub versions: Vec<String>,
    /// Files removed from outside the Cellar
    pub removed_files: Vec<PathBuf>,
}

pub struct PackageManager {
    index: FormulaIndex,
    layout: InstallLayout,
    timeout: Option<Duration>,
}

impl PackageManager {
    /// Package manager over the built-in formulae
    pub fn new(layout: InstallLayout) -> Result<Self> {
        Ok(Self::with_index(FormulaIndex::builtin()?, layout))
    }

    pub fn with_index(index: FormulaIndex, layout: InstallLayout) -> Self {
        Self {
            index,
            layout,
            timeout: None,
        }
    }

    /// Bound every subprocess (completion generation, smoke test)
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn index(&self) -> &FormulaIndex {
        &self.index
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    /// Pick the artifact of `name` for `platform`
    pub fn resolve(
        &self,
        name: &str,
        variant: Option<VariantLabel>,
        platform: PlatformKey,
    ) -> Result<Selection<'_>> {
        self.index.get(name)?.select(variant, platform)
    }

    /// Packages currently recorded in the Cellar
    pub fn installed(&self) -> Result<Vec<InstalledPackage>> {
        Ok(cellar::list_installed(&self.layout)?)
    }

    /// Plan an install without running it
    pub fn plan(&self, request: &InstallRequest) -> Result<InstallPlan> {
        let selection = self.resolve(&request.formula, request.variant, request.platform()?)?;
        let root = match &request.source {
            BundleSource::Unpacked(dir) => dir.clone(),
            BundleSource::Archive(path) => {
                let stem = path
                    .file_name()
                    .map(|name| name.to_string_lossy().trim_end_matches(".tar.gz").to_string())
                    .unwrap_or_default();
                path.with_file_name(stem)
            }
        };
        let bundle = BundleContents::expected(&root, selection.formula);
        Ok(InstallPlan::for_selection(&selection, &bundle, &self.layout))
    }

    /// Install a formula from a bundle.
    ///
    /// # Errors
    ///
    /// Any stage failure aborts the pipeline and is returned as is. The scratch
    /// workspace and any staging directory are removed on every path.
    pub async fn install(&self, request: &InstallRequest) -> Result<InstallResult> {
        let start = Instant::now();

        let platform = request.platform()?;
        let selection = self.resolve(&request.formula, request.variant, platform)?;
        let formula = selection.formula;
        info!(
            "Installing {} {} ({}) for {}",
            formula.name, selection.variant.version, selection.variant.label, platform
        );

        let installed = self.installed()?;
        conflict::check_conflicts(formula, &installed)?;
        conflict::check_republication(&selection, &installed)?;

        // Keeps the unpacked archive alive until the plan has run
        let mut _staging = None;
        let root = match &request.source {
            BundleSource::Unpacked(dir) => dir.clone(),
            BundleSource::Archive(archive) => {
                bundle::verify_checksum(archive, selection.artifact).await?;
                let staging = tempfile::Builder::new()
                    .prefix(&format!("tapkeg-{}-", formula.name))
                    .tempdir()
                    .context("Failed to create staging directory")?;
                bundle::unpack(archive, staging.path())?;
                let root = staging.path().to_path_buf();
                _staging = Some(staging);
                root
            }
        };
        let contents = bundle::inspect(&root, formula)?;

        let plan = InstallPlan::for_selection(&selection, &contents, &self.layout);
        let outcome = plan.execute(self.timeout).await?;
        debug!("{} installed {} files", formula.name, outcome.installed_files.len());

        let keg = self
            .layout
            .keg_path(&formula.name, &selection.variant.version);
        InstallReceipt::new(&selection, outcome.installed_files.clone()).write(&keg)?;

        if !request.skip_test {
            let binary = self.layout.bin_dir.join(formula.binary_name());
            smoke::run(&formula.name, &binary, self.timeout).await?;
        }

        Ok(InstallResult {
            name: formula.name.clone(),
            version: selection.variant.version.clone(),
            variant: selection.variant.label,
            platform,
            keg,
            installed_files: outcome.installed_files,
            scratch_dir: outcome.scratch_dir,
            tested: !request.skip_test,
            caveats: caveats::render(formula, selection.variant.label),
            time_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Remove every installed version of a formula
    pub fn uninstall(&self, name: &str) -> Result<UninstallResult> {
        let versions = cellar::get_installed_versions(&self.layout, name)?;
        if versions.is_empty() {
            return Err(TapkegError::NotInstalled(name.to_string()));
        }

        let mut removed_files = Vec::new();
        for pkg in &versions {
            for file in &pkg.receipt.installed_files {
                // Files inside the keg go away with it
                if file.starts_with(&pkg.path) {
                    continue;
                }
                match fs::remove_file(file) {
                    Ok(()) => removed_files.push(file.clone()),
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        debug!("{} already removed", file.display());
                    }
                    Err(e) => {
                        return Err(anyhow::Error::new(e)
                            .context(format!("Failed to remove {}", file.display()))
                            .into());
                    }
                }
            }

            fs::remove_dir_all(&pkg.path)
                .with_context(|| format!("Failed to remove keg: {}", pkg.path.display()))?;
            info!("Uninstalled {} {}", pkg.name, pkg.version);
        }

        // Drop the formula directory once its last keg is gone
        let formula_dir = self.layout.cellar_dir.join(name);
        if fs::read_dir(&formula_dir).is_ok_and(|mut entries| entries.next().is_none()) {
            fs::remove_dir(&formula_dir)?;
        }

        Ok(UninstallResult {
            name: name.to_string(),
            versions: versions.into_iter().map(|pkg| pkg.version).collect(),
            removed_files,
        })
    }

    /// Re-run the smoke test of an installed formula
    pub async fn test(&self, name: &str) -> Result<()> {
        let versions = cellar::get_installed_versions(&self.layout, name)?;
        let pkg = versions
            .last()
            .ok_or_else(|| TapkegError::NotInstalled(name.to_string()))?;
        let binary = self.layout.bin_dir.join(pkg.binary_name());
        smoke::run(name, &binary, self.timeout).await
    }

    /// Caveats of a formula, for the installed variant when there is one
    pub fn caveats(&self, name: &str, variant: Option<VariantLabel>) -> Result<String> {
        let formula = self.index.get(name)?;
        let label = match variant {
            Some(label) => label,
            None => cellar::get_installed_versions(&self.layout, name)?
                .last()
                .map(|pkg| pkg.receipt.variant)
                .unwrap_or(formula.default_variant),
        };
        if formula.variant(label).is_none() {
            return Err(TapkegError::VariantNotFound {
                formula: name.to_string(),
                label: label.to_string(),
            });
        }
        Ok(caveats::render(formula, label))
    }
}
