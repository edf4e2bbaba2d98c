//! Uninstall command for the nvx CLI.
//!
//! Removes an installed Node.js version. Removing the active version also
//! removes the active version pointer.
//!
//! ## Usage
//!
//! ```bash
//! nvx uninstall 18.19.0
//! ```

use anyhow::{Context, Result, bail};
use clap::Args;

use crate::config::Config;
use crate::toolchain::{PlatformDescriptor, VersionId};

/// Arguments for the uninstall command.
#[derive(Args)]
pub struct UninstallArgs {
    /// Version to uninstall (e.g., "18.19.0").
    pub version: String,
}

/// Executes the uninstall command.
///
/// # Errors
///
/// Returns an error if:
/// - The version argument is invalid
/// - The version is not installed
/// - Directory removal fails
pub fn execute(args: &UninstallArgs) -> Result<()> {
    let version = VersionId::parse(&args.version)?;
    let config = Config::from_env()?;
    let platform = PlatformDescriptor::detect()?;
    let engine = super::activation_engine(&config, platform);
    let store = engine.store();

    if !store.exists(&version) {
        bail!("Node.js {version} is not installed.");
    }

    if engine.deactivate_if_active(&version)? {
        println!("Node.js {version} was the active version; no version is active now.");
    }

    println!("Uninstalling Node.js {version}...");
    store
        .remove(&version)
        .with_context(|| format!("Failed to uninstall Node.js {version}"))?;

    println!("Node.js {version} uninstalled.");

    if store.active_version().is_none() {
        let remaining = store.list_installed()?;
        if let Some(latest) = remaining.last() {
            println!("Run 'nvx use {latest}' to activate another version.");
        }
    }

    Ok(())
}
