//! List command for the nvx CLI.
//!
//! ## Output Format
//!
//! ```text
//! Installed versions:
//!
//!   18.19.0
//! * 20.11.1    (active)
//! ```

use anyhow::Result;

use crate::config::Config;

/// Lists installed versions, oldest first, and marks the active one.
///
/// # Errors
///
/// Returns an error if the versions directory cannot be read.
pub fn execute() -> Result<()> {
    let config = Config::from_env()?;
    let store = config.store();
    let versions = store.list_installed()?;
    let active = store.active_version();

    if versions.is_empty() {
        println!("No versions installed.");
        println!();
        println!("Run 'nvx install <version>' to install one.");
        return Ok(());
    }

    println!("Installed versions:");
    println!();

    for version in &versions {
        if active.as_ref() == Some(version) {
            println!("* {version}    (active)");
        } else {
            println!("  {version}");
        }
    }

    if active.is_none() {
        println!();
        println!("No active version. Run 'nvx use <version>' to activate one.");
    }

    Ok(())
}
