//! Library interface for tapkeg
//!
//! tapkeg installs products shipped as prebuilt, per-platform binary bundles. A
//! [`Formula`] describes the product as data: its release channels, the artifact
//! published for each platform, the completion scripts its binary can generate and
//! the packages it must not be installed alongside. [`PackageManager`] drives an
//! installation from a verified bundle to a smoke-tested install.

pub mod bundle;
pub mod caveats;
pub mod cellar;
pub mod conflict;
pub mod error;
pub mod formula;
pub mod index;
pub mod install;
pub mod package_manager;
pub mod platform;
pub mod receipt;
pub mod smoke;

// Re-export commonly used types
pub use cellar::{InstallLayout, InstalledPackage};
pub use error::{Result, TapkegError};
pub use formula::{AgentDestination, ArtifactDescriptor, Formula, Variant, VariantLabel};
pub use index::FormulaIndex;
pub use package_manager::{
    BundleSource, InstallRequest, InstallResult, PackageManager, UninstallResult,
};
pub use platform::PlatformKey;
