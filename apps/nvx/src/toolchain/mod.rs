//! Runtime version management for the nvx CLI.
//!
//! ## Module Structure
//!
//! - [`platform`] - OS and architecture detection
//! - [`version`] - Version argument validation
//! - [`download`] - Release fetching with progress tracking
//! - [`archive`] - Concurrent ZIP and tar.xz extraction
//! - [`paths`] - Version directory store
//! - [`activation`] - Link and copy activation strategies
//! - [`shell`] - Persistent search path publishing
//! - [`conflict`] - PATH shadowing detection
//! - [`installer`] - Install orchestration

pub mod activation;
pub mod archive;
pub mod conflict;
pub mod download;
pub mod installer;
pub mod paths;
pub mod platform;
pub mod shell;
pub mod version;

pub use activation::{
    ActivationEngine, ActivationReport, ActivationStrategy, Activator, CopyActivator,
    LinkActivator,
};
pub use download::HttpFetcher;
pub use installer::{InstallOutcome, Installer};
pub use paths::{ActivationState, VersionStore};
pub use platform::PlatformDescriptor;
pub use shell::SystemPublisher;
pub use version::VersionId;
