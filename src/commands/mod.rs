//! Command implementations for the tapkeg CLI
//!
//! - **install**: install, uninstall and re-testing installed formulae
//! - **query**: formula information, artifact resolution, listings and caveats

pub mod install;
pub mod query;

pub use install::{install, test, uninstall};
pub use query::{caveats, info, list, resolve};
