//! Use command for the nvx CLI.
//!
//! Switches the active Node.js version.
//!
//! ## Usage
//!
//! ```bash
//! nvx use 18.19.0
//! ```

use anyhow::{Context, Result, bail};
use clap::Args;

use crate::config::Config;
use crate::toolchain::{PlatformDescriptor, VersionId};

/// Arguments for the use command.
#[derive(Args)]
pub struct UseArgs {
    /// Version to activate (e.g., "18.19.0").
    pub version: String,
}

/// Executes the use command.
///
/// # Errors
///
/// Returns an error if:
/// - The version argument is invalid
/// - The version is not installed
/// - The active version pointer cannot be replaced
pub fn execute(args: &UseArgs) -> Result<()> {
    let version = VersionId::parse(&args.version)?;
    let config = Config::from_env()?;
    let platform = PlatformDescriptor::detect()?;
    let engine = super::activation_engine(&config, platform);
    let store = engine.store();

    if !store.exists(&version) {
        bail!(
            "Node.js {version} is not installed.\n\
             Run 'nvx install {version}' to install it first."
        );
    }

    if engine.is_active(&version) {
        println!("Node.js {version} is already active.");
        return Ok(());
    }

    let report = engine
        .activate(&version)
        .with_context(|| format!("Failed to activate Node.js {version}"))?;

    super::report_activation(&report, store, platform);

    Ok(())
}
