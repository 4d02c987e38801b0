//! Release bundle verification and unpacking.
//!
//! A release bundle is a gzip-compressed tarball with a flat layout:
//!
//! ```text
//! mutagen_linux_amd64_v0.16.1.tar.gz
//!   mutagen                  product binary (named like the formula's binary)
//!   mutagen-agents.tar.gz    agent archive
//! ```
//!
//! Fetching is left to the caller. Given a local archive, [`verify_checksum`] must
//! succeed before [`unpack`] runs, and nothing is installed from an archive that
//! failed verification.

use crate::error::{Result, TapkegError};
use crate::formula::{ArtifactDescriptor, Formula};
use anyhow::Context;
use flate2::read::GzDecoder;
use std::fs;
use std::path::{Path, PathBuf};
use tar::Archive;
use tokio::io::AsyncReadExt;

/// Files of an unpacked bundle the installer consumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleContents {
    pub root: PathBuf,
    pub binary: PathBuf,
    pub agent_archive: PathBuf,
}

/// SHA256 of a file, lowercase hex
pub async fn sha256_file(file_path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};

    let mut file = tokio::fs::File::open(file_path)
        .await
        .with_context(|| format!("Failed to open {}", file_path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0; 8192];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Check a downloaded archive against its published descriptor
pub async fn verify_checksum(file_path: &Path, artifact: &ArtifactDescriptor) -> Result<()> {
    let actual = sha256_file(file_path).await?;

    if actual != artifact.sha256 {
        return Err(TapkegError::ChecksumMismatch {
            path: file_path.to_path_buf(),
            expected: artifact.sha256.clone(),
            actual,
        });
    }

    Ok(())
}

/// Extract a bundle tar.gz into `dest`
pub fn unpack(archive_path: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create directory: {}", dest.display()))?;

    let file = fs::File::open(archive_path)
        .with_context(|| format!("Failed to open bundle: {}", archive_path.display()))?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);

    archive
        .unpack(dest)
        .with_context(|| format!("Failed to extract bundle to: {}", dest.display()))?;

    Ok(())
}

impl BundleContents {
    /// Where the files of `formula` are expected in a bundle unpacked at `root`
    pub fn expected(root: &Path, formula: &Formula) -> Self {
        Self {
            root: root.to_path_buf(),
            binary: root.join(formula.binary_name()),
            agent_archive: root.join(formula.agent_archive_name()),
        }
    }
}

/// Locate the files the installer needs inside an unpacked bundle.
///
/// The returned paths are absolute, since the product binary is later run from
/// inside the scratch directory.
pub fn inspect(root: &Path, formula: &Formula) -> Result<BundleContents> {
    if !root.is_dir() {
        return Err(TapkegError::MissingBundleFile {
            path: root.to_path_buf(),
        });
    }
    let root = std::path::absolute(root)
        .with_context(|| format!("Failed to resolve bundle path: {}", root.display()))?;
    let contents = BundleContents::expected(&root, formula);

    for path in [&contents.binary, &contents.agent_archive] {
        if !path.is_file() {
            return Err(TapkegError::MissingBundleFile { path: path.clone() });
        }
    }

    Ok(contents)
}
