//! Post-install smoke test: the installed binary must run `version` successfully.

use crate::error::{Result, TapkegError};
use crate::install::run_to_completion;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Run `<binary> version` and require exit status zero.
///
/// Output is not inspected. A failure leaves the installed files in place.
pub async fn run(formula: &str, binary: &Path, timeout: Option<Duration>) -> Result<()> {
    let mut command = Command::new(binary);
    command.arg("version");

    let output = run_to_completion(&mut command, timeout)
        .await
        .map_err(|reason| TapkegError::PostInstallVerificationFailed {
            formula: formula.to_string(),
            reason: format!("{} version: {}", binary.display(), reason),
        })?;

    debug!(
        "{} version: {}",
        formula,
        String::from_utf8_lossy(&output.stdout).trim()
    );
    Ok(())
}
