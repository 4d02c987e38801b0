//! Pre-install gate: conflicting installations and republished artifacts.
//!
//! Both checks are pure functions of the candidate and the receipts of what is
//! already installed. They run before the installer touches the filesystem, so a
//! rejected install leaves nothing behind.

use crate::cellar::InstalledPackage;
use crate::error::{Result, TapkegError};
use crate::formula::{Formula, Selection};
use tracing::debug;

/// Refuse to install `candidate` next to a package it collides with.
///
/// An installed package collides when it provides the same executable, when the
/// candidate's `conflicts_with` names the package or the executable it installed,
/// or when its receipt lists the candidate.
/// Other installed versions of the candidate itself never collide.
///
/// # Errors
///
/// [`TapkegError::ConflictingInstallation`] naming every colliding package.
pub fn check_conflicts(candidate: &Formula, installed: &[InstalledPackage]) -> Result<()> {
    let binary = candidate.binary_name();
    let mut conflicts = Vec::new();

    for pkg in installed.iter().filter(|pkg| pkg.name != candidate.name) {
        let declared = candidate
            .conflicts_with
            .iter()
            .find(|c| c.name == pkg.name || c.name == pkg.binary_name());

        let reason = if let Some(decl) = declared {
            decl.because.clone()
        } else if pkg.binary_name() == binary {
            Some(format!("both install `{binary}` binaries"))
        } else if pkg.receipt.conflicts_with.iter().any(|n| *n == candidate.name) {
            Some(format!("{} declares a conflict with {}", pkg.name, candidate.name))
        } else {
            continue;
        };

        debug!("{} conflicts with installed {}", candidate.name, pkg.name);
        conflicts.push(match reason {
            Some(reason) => format!("{} {} ({})", pkg.name, pkg.version, reason),
            None => format!("{} {}", pkg.name, pkg.version),
        });
    }

    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(TapkegError::ConflictingInstallation {
            formula: candidate.name.clone(),
            conflicts,
        })
    }
}

/// Refuse an artifact whose URL and version were installed before under a
/// different checksum.
pub fn check_republication(selection: &Selection<'_>, installed: &[InstalledPackage]) -> Result<()> {
    let artifact = selection.artifact;

    for pkg in installed {
        let seen = &pkg.receipt.source;
        if seen.url == artifact.url && seen.version == artifact.version && seen.sha256 != artifact.sha256
        {
            return Err(TapkegError::ChecksumRepublished {
                url: artifact.url.clone(),
                version: artifact.version.clone(),
                published: seen.sha256.clone(),
                found: artifact.sha256.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::ConflictDecl;
    use crate::formula::tests::sample_formula;
    use crate::receipt::InstallReceipt;
    use std::path::PathBuf;

    fn installed(formula: &Formula) -> InstalledPackage {
        let selection = formula
            .select(None, "linux_amd64".parse().unwrap())
            .unwrap();
        InstalledPackage {
            name: formula.name.clone(),
            version: selection.variant.version.clone(),
            path: PathBuf::from("/prefix/Cellar").join(&formula.name),
            receipt: InstallReceipt::new(&selection, vec![]),
        }
    }

    fn beta() -> Formula {
        let mut beta = sample_formula("sample-beta", &["linux_amd64"]);
        beta.binary = Some("sample".to_string());
        beta.conflicts_with = vec![ConflictDecl {
            name: "sample".to_string(),
            because: Some("both install `sample` binaries".to_string()),
        }];
        beta
    }

    #[test]
    fn test_no_conflict_on_empty_environment() {
        assert!(check_conflicts(&beta(), &[]).is_ok());
    }

    #[test]
    fn test_declared_conflict_names_package_and_reason() {
        let stable = sample_formula("sample", &["linux_amd64"]);
        let err = check_conflicts(&beta(), &[installed(&stable)]).unwrap_err();
        match err {
            TapkegError::ConflictingInstallation { formula, conflicts } => {
                assert_eq!(formula, "sample-beta");
                assert_eq!(conflicts, vec!["sample 1.0.0 (both install `sample` binaries)"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_undeclared_binary_collision() {
        let mut other = sample_formula("other", &["linux_amd64"]);
        other.binary = Some("sample".to_string());
        let stable = sample_formula("sample", &["linux_amd64"]);

        let err = check_conflicts(&stable, &[installed(&other)]).unwrap_err();
        assert!(err.to_string().contains("other 1.0.0"));
    }

    #[test]
    fn test_declared_conflict_matches_installed_binary_name() {
        let mut suite = sample_formula("sync-suite", &["linux_amd64"]);
        suite.binary = Some("syncd".to_string());
        let mut candidate = sample_formula("sample", &["linux_amd64"]);
        candidate.conflicts_with = vec![ConflictDecl {
            name: "syncd".to_string(),
            because: Some("both run a sync daemon".to_string()),
        }];

        match check_conflicts(&candidate, &[installed(&suite)]).unwrap_err() {
            TapkegError::ConflictingInstallation { conflicts, .. } => {
                assert_eq!(conflicts, vec!["sync-suite 1.0.0 (both run a sync daemon)"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reverse_declaration_from_receipt() {
        let mut unrelated = sample_formula("unrelated", &["linux_amd64"]);
        unrelated.conflicts_with = vec![ConflictDecl {
            name: "sample".to_string(),
            because: None,
        }];
        let stable = sample_formula("sample", &["linux_amd64"]);

        assert!(check_conflicts(&stable, &[installed(&unrelated)]).is_err());
    }

    #[test]
    fn test_reinstall_is_not_a_conflict() {
        let stable = sample_formula("sample", &["linux_amd64"]);
        assert!(check_conflicts(&stable, &[installed(&stable)]).is_ok());
    }

    #[test]
    fn test_republished_checksum_rejected() {
        let stable = sample_formula("sample", &["linux_amd64"]);
        let pkg = installed(&stable);

        let mut republished = stable.clone();
        for artifact in republished.variants[0].artifacts.values_mut() {
            artifact.sha256 = "e".repeat(64);
        }
        let selection = republished
            .select(None, "linux_amd64".parse().unwrap())
            .unwrap();

        let err = check_republication(&selection, &[pkg.clone()]).unwrap_err();
        assert!(matches!(err, TapkegError::ChecksumRepublished { .. }));

        let selection = stable.select(None, "linux_amd64".parse().unwrap()).unwrap();
        assert!(check_republication(&selection, &[pkg]).is_ok());
    }
}
