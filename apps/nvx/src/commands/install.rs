//! Install command for the nvx CLI.
//!
//! Downloads and unpacks a specific Node.js version. The first installed
//! version becomes the active one.
//!
//! ## Usage
//!
//! ```bash
//! nvx install 20.11.1
//! ```

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;

use crate::config::Config;
use crate::toolchain::download::{release_url, text_progress};
use crate::toolchain::{HttpFetcher, InstallOutcome, Installer, PlatformDescriptor, VersionId};

/// Print extraction progress every this many entries.
const EXTRACT_PROGRESS_STEP: usize = 64;

/// Arguments for the install command.
#[derive(Args)]
pub struct InstallArgs {
    /// Version to install (e.g., "20.11.1").
    pub version: String,
}

/// Executes the install command.
///
/// # Process
///
/// 1. Validate the version and detect the platform
/// 2. Download the release archive with progress display
/// 3. Extract it with a worker pool into a staging directory
/// 4. Promote the staging directory to the versions directory
/// 5. Activate the version if no version is active
///
/// # Errors
///
/// Returns an error if:
/// - The version argument is invalid
/// - The platform is unsupported
/// - Download or extraction fails
/// - Activation fails; the installed version is kept
pub async fn execute(args: &InstallArgs) -> Result<()> {
    let version = VersionId::parse(&args.version)?;
    let config = Config::from_env()?;
    let platform = PlatformDescriptor::detect()?;
    let store = config.store();

    if !store.exists(&version) {
        println!("Installing Node.js {version} for {platform}...");
        println!(
            "Downloading {}...",
            release_url(&config.dist_server, &version, platform)
        );
    }

    let fetcher = HttpFetcher::new(config.dist_server.clone())?;
    let engine = super::activation_engine(&config, platform);
    let installer = Installer::new(fetcher, engine, platform, config.workers);

    let outcome = installer
        .install(&version, text_progress(), &print_extract_progress)
        .await
        .with_context(|| format!("Failed to install Node.js {version}"))?;

    match &outcome {
        InstallOutcome::Installed { extraction, .. } => {
            println!();
            println!(
                "Node.js {version} installed ({} files, {} workers).",
                extraction.files, extraction.workers
            );
        }
        InstallOutcome::AlreadyInstalled { .. } => {
            println!("Node.js {version} is already installed.");
        }
    }

    let activation = installer.activate_if_idle(&version).with_context(|| {
        format!(
            "Node.js {version} is installed but could not be activated \
             (run 'nvx use {version}' to retry)"
        )
    })?;

    if let Some(report) = activation {
        super::report_activation(&report, &store, platform);
    } else if let Some(active) = store.active_version()
        && active != version
    {
        println!("Run 'nvx use {version}' to switch from {active}.");
    }

    Ok(())
}

fn print_extract_progress(done: usize, total: usize) {
    if done == total || done % EXTRACT_PROGRESS_STEP == 0 {
        print!("\rExtracting files: {done}/{total}");
        let _ = std::io::stdout().flush();
    }
}
