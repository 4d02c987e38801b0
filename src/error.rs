use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TapkegError {
    #[error("Unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("Formula not found: {name}{}", .suggestion.as_ref().map(|s| format!(" (did you mean `{s}`?)")).unwrap_or_default())]
    FormulaNotFound {
        name: String,
        suggestion: Option<String>,
    },

    #[error("Formula {formula} has no {label} variant")]
    VariantNotFound { formula: String, label: String },

    #[error("No {variant} artifact of {formula} for platform {platform}")]
    NoArtifactForPlatform {
        formula: String,
        variant: String,
        platform: String,
    },

    #[error("Checksum mismatch for {}: expected {expected}, got {actual}", .path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error(
        "{url} was republished under version {version} with a different checksum ({published} -> {found})"
    )]
    ChecksumRepublished {
        url: String,
        version: String,
        published: String,
        found: String,
    },

    #[error("Invalid formula index: {0}")]
    InvalidIndex(String),

    #[error("Cannot install {formula}: conflicts with installed {}", .conflicts.join(", "))]
    ConflictingInstallation {
        formula: String,
        conflicts: Vec<String>,
    },

    #[error("Completion generation failed for {formula}: {reason}")]
    CompletionGenerationFailed { formula: String, reason: String },

    #[error("Bundle is missing {}", .path.display())]
    MissingBundleFile { path: PathBuf },

    #[error("Post-install verification failed for {formula}: {reason}")]
    PostInstallVerificationFailed { formula: String, reason: String },

    #[error("Formula not installed: {0}")]
    NotInstalled(String),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TapkegError>;
