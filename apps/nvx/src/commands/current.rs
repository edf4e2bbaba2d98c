//! Current command for the nvx CLI.
//!
//! Prints the active version and how it was activated.

use anyhow::Result;

use crate::config::Config;
use crate::toolchain::ActivationState;

/// Executes the current command.
///
/// # Errors
///
/// Returns an error if the configuration is invalid.
pub fn execute() -> Result<()> {
    let config = Config::from_env()?;
    let store = config.store();

    match store.current_state() {
        ActivationState::Inactive => {
            println!("No active version.");
            println!("Run 'nvx use <version>' to activate one.");
        }
        ActivationState::ActiveViaLink { version } => {
            println!("{version} (link: {})", store.current_path().display());
        }
        ActivationState::ActiveViaCopy { version } => {
            println!("{version} (copy: {})", store.current_bin_dir().display());
        }
    }

    Ok(())
}
