#![warn(clippy::pedantic)]

//! # nvx
//!
//! A Node.js runtime version manager. `nvx` downloads official release
//! archives, unpacks them with a pool of worker threads and switches the
//! active version by pointing `versions/current` at one installation.
//!
//! ## Subcommands
//!
//! - `install` - Download and unpack a version
//! - `use` - Switch the active version
//! - `uninstall` - Remove an installed version
//! - `list` - List installed versions
//! - `current` - Show the active version
//!
//! ## Examples
//!
//! ```bash
//! nvx install 20.11.1
//! nvx use 20.11.1
//! nvx list
//! ```

mod commands;
mod config;
mod errors;
mod toolchain;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{current, install, list, uninstall, use_cmd};
use tracing_subscriber::EnvFilter;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("NVX_GIT_COMMIT"),
    ")"
);

/// Node.js runtime version manager.
#[derive(Parser)]
#[command(
    name = "nvx",
    author,
    version,
    long_version = LONG_VERSION,
    about = "Install and switch between Node.js versions",
    long_about = "nvx installs official Node.js release archives side by side and switches \
    the active version by replacing a single 'current' pointer.",
    after_help = "\
ACTIVATION:
    link    'current' is a symbolic link to the version directory (Unix default)
    copy    'current/bin' holds copies of the executables and is added to the
            user's PATH once (Windows default)

ENVIRONMENT VARIABLES:
    NVX_HOME                Root directory (default: ~/.nvx, %APPDATA%\\nvx on Windows)
    NVX_DIST_SERVER         Release server URL (default: https://nodejs.org/dist)
    NVX_ACTIVATION          Activation strategy: link or copy
    NVX_WORKERS             Extraction worker threads (default: logical CPUs)
    RUST_LOG                Log filter for diagnostics on stderr (default: warn)"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for the nvx CLI.
#[derive(Subcommand)]
pub enum Commands {
    /// Install a Node.js version.
    ///
    /// Downloads the release archive for this platform and unpacks it.
    /// The first installed version becomes the active one.
    Install(install::InstallArgs),

    /// Switch the active Node.js version.
    Use(use_cmd::UseArgs),

    /// Uninstall a Node.js version.
    ///
    /// Uninstalling the active version leaves no version active.
    Uninstall(uninstall::UninstallArgs),

    /// List installed Node.js versions.
    List,

    /// Show the active Node.js version.
    Current,
}

#[tokio::main]
async fn main() {
    init_logging();
    if let Err(e) = run().await {
        std::process::exit(handle_error(&e));
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Prints the error chain on one line and returns the exit code.
fn handle_error(e: &anyhow::Error) -> i32 {
    eprintln!("Error: {e:#}");
    1
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Install(args) => install::execute(&args).await,
        Commands::Use(args) => use_cmd::execute(&args),
        Commands::Uninstall(args) => uninstall::execute(&args),
        Commands::List => list::execute(),
        Commands::Current => current::execute(),
    }
}
