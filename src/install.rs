//! Install plans and their execution.
//!
//! An [`InstallPlan`] is the ordered list of steps that puts an unpacked bundle
//! into an [`InstallLayout`]. For a formula with three completion scripts:
//!
//! ```text
//! 1. create scratch dir            <bundle>/.generated-XXXXXX
//! 2. run <bundle>/mutagen generate --bash-completion-script=mutagen.bash ...
//! 3. copy scratch/mutagen.bash  -> etc/bash_completion.d/
//! 4. copy scratch/mutagen.fish  -> share/fish/vendor_completions.d/
//! 5. copy scratch/_mutagen      -> share/zsh/site-functions/
//! 6. copy bundle/mutagen        -> bin/
//! 7. copy bundle/mutagen-agents.tar.gz -> Cellar/<name>/<version>/libexec/
//! ```
//!
//! Steps run strictly in order and the first failure aborts the rest. Files already
//! copied stay where they are; the scratch directory never survives execution,
//! whether the plan succeeds, fails, or the future running it is dropped.

use crate::bundle::BundleContents;
use crate::cellar::InstallLayout;
use crate::error::{Result, TapkegError};
use crate::formula::Selection;
use anyhow::Context;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, warn};

/// Where a copied file comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepSource {
    /// A file of the unpacked bundle
    Bundle(PathBuf),
    /// A file generated into the scratch directory
    Scratch(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStep {
    CreateScratchDir,
    /// Run `program` inside the scratch directory; it must leave `outputs` there
    InvokeSubprocess {
        program: PathBuf,
        args: Vec<String>,
        outputs: Vec<String>,
    },
    CopyFile {
        source: StepSource,
        dest_dir: PathBuf,
    },
}

impl fmt::Display for InstallStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallStep::CreateScratchDir => write!(f, "create scratch directory"),
            InstallStep::InvokeSubprocess { program, args, .. } => {
                write!(f, "run {} {}", program.display(), args.join(" "))
            }
            InstallStep::CopyFile { source, dest_dir } => {
                let source = match source {
                    StepSource::Bundle(path) => path.display().to_string(),
                    StepSource::Scratch(name) => format!("<scratch>/{name}"),
                };
                write!(f, "copy {} -> {}", source, dest_dir.display())
            }
        }
    }
}

/// What a successful execution left behind
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    /// Every file copied into the layout, in copy order
    pub installed_files: Vec<PathBuf>,
    /// Scratch directory that was used (already removed)
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct InstallPlan {
    pub formula: String,
    pub steps: Vec<InstallStep>,
    /// Directory the scratch workspace is created in
    scratch_parent: PathBuf,
}

impl InstallPlan {
    /// Plan the installation of `selection` from an unpacked bundle
    pub fn for_selection(
        selection: &Selection<'_>,
        bundle: &BundleContents,
        layout: &InstallLayout,
    ) -> Self {
        let formula = selection.formula;
        let mut steps = Vec::new();

        if !formula.completions.is_empty() {
            steps.push(InstallStep::CreateScratchDir);

            let mut args = vec!["generate".to_string()];
            args.extend(formula.completions.iter().map(|c| c.generate_flag()));
            steps.push(InstallStep::InvokeSubprocess {
                program: bundle.binary.clone(),
                args,
                outputs: formula.completions.iter().map(|c| c.file.clone()).collect(),
            });

            for script in &formula.completions {
                steps.push(InstallStep::CopyFile {
                    source: StepSource::Scratch(script.file.clone()),
                    dest_dir: layout.completion_dir(script.shell).to_path_buf(),
                });
            }
        }

        steps.push(InstallStep::CopyFile {
            source: StepSource::Bundle(bundle.binary.clone()),
            dest_dir: layout.bin_dir.clone(),
        });

        steps.push(InstallStep::CopyFile {
            source: StepSource::Bundle(bundle.agent_archive.clone()),
            dest_dir: layout.agent_dir(
                formula.agent_destination,
                &formula.name,
                &selection.variant.version,
            ),
        });

        Self {
            formula: formula.name.clone(),
            steps,
            scratch_parent: bundle.root.clone(),
        }
    }

    /// Run every step in order.
    ///
    /// `timeout` bounds each subprocess; running out of time counts as a failed run.
    pub async fn execute(&self, timeout: Option<Duration>) -> Result<InstallOutcome> {
        let mut scratch: Option<TempDir> = None;
        let mut installed_files = Vec::new();

        for (i, step) in self.steps.iter().enumerate() {
            debug!("[{}] step {}: {}", self.formula, i + 1, step);

            match step {
                InstallStep::CreateScratchDir => {
                    let dir = tempfile::Builder::new()
                        .prefix(".generated-")
                        .tempdir_in(&self.scratch_parent)
                        .with_context(|| {
                            format!(
                                "Failed to create scratch directory in {}",
                                self.scratch_parent.display()
                            )
                        })?;
                    scratch = Some(dir);
                }
                InstallStep::InvokeSubprocess {
                    program,
                    args,
                    outputs,
                } => {
                    let dir = self.scratch(&scratch)?;
                    self.generate(program, args, outputs, dir, timeout).await?;
                }
                InstallStep::CopyFile { source, dest_dir } => {
                    let source = match source {
                        StepSource::Bundle(path) => path.clone(),
                        StepSource::Scratch(name) => self.scratch(&scratch)?.join(name),
                    };
                    installed_files.push(copy_into(&source, dest_dir)?);
                }
            }
        }

        let scratch_dir = scratch.map(|dir| {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!("Failed to remove scratch directory {}: {}", path.display(), e);
            }
            path
        });

        Ok(InstallOutcome {
            installed_files,
            scratch_dir,
        })
    }

    fn scratch<'a>(&self, scratch: &'a Option<TempDir>) -> Result<&'a Path> {
        scratch.as_ref().map(TempDir::path).ok_or_else(|| {
            TapkegError::Other(anyhow::anyhow!(
                "install plan for {} uses the scratch directory before creating it",
                self.formula
            ))
        })
    }

    async fn generate(
        &self,
        program: &Path,
        args: &[String],
        outputs: &[String],
        dir: &Path,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let failed = |reason: String| TapkegError::CompletionGenerationFailed {
            formula: self.formula.clone(),
            reason,
        };

        let mut command = Command::new(program);
        command.args(args).current_dir(dir);
        let output = run_to_completion(&mut command, timeout)
            .await
            .map_err(|reason| {
                failed(format!("{} {}: {}", program.display(), args.join(" "), reason))
            })?;
        debug!("{} generate exited with {}", self.formula, output.status);

        // Every script must exist before any is copied out
        let missing: Vec<&str> = outputs
            .iter()
            .filter(|name| !dir.join(name).is_file())
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(failed(format!("no output written for {}", missing.join(", "))));
        }

        Ok(())
    }
}

/// Copy `source` into `dest_dir`, keeping its file name and permissions
fn copy_into(source: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let file_name = source
        .file_name()
        .with_context(|| format!("Not a file: {}", source.display()))?;
    let dest = dest_dir.join(file_name);

    fs::create_dir_all(dest_dir)
        .with_context(|| format!("Failed to create directory: {}", dest_dir.display()))?;
    fs::copy(source, &dest)
        .with_context(|| format!("Failed to copy {} to {}", source.display(), dest.display()))?;

    Ok(dest)
}

/// Run a command to completion, succeeding only on exit status zero.
///
/// The child is killed if `timeout` elapses or the returned future is dropped. The
/// error is a one-line description of what went wrong.
pub(crate) async fn run_to_completion(
    command: &mut Command,
    timeout: Option<Duration>,
) -> std::result::Result<Output, String> {
    command.kill_on_drop(true).stdin(std::process::Stdio::null());

    let output = match timeout {
        Some(limit) => match tokio::time::timeout(limit, command.output()).await {
            Ok(result) => result,
            Err(_) => return Err(format!("timed out after {}s", limit.as_secs_f64())),
        },
        None => command.output().await,
    }
    .map_err(|e| format!("failed to start: {e}"))?;

    if output.status.success() {
        return Ok(output);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        Err(format!("exited with {}", output.status))
    } else {
        Err(format!("exited with {}: {}", output.status, stderr))
    }
}
