//! Runtime configuration read from the environment.
//!
//! | Variable          | Default                                         |
//! |-------------------|-------------------------------------------------|
//! | `NVX_HOME`        | `~/.nvx` (Unix), `%APPDATA%\nvx` (Windows)      |
//! | `NVX_DIST_SERVER` | `https://nodejs.org/dist`                       |
//! | `NVX_ACTIVATION`  | `link` on Unix, `copy` on Windows               |
//! | `NVX_WORKERS`     | number of logical CPUs                          |
//!
//! Empty values count as unset.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::errors::NvxError;
use crate::toolchain::activation::{ACTIVATION_ENV, ActivationStrategy};
use crate::toolchain::download::{DEFAULT_DIST_SERVER, DIST_SERVER_ENV};
use crate::toolchain::paths::VersionStore;

/// Environment variable overriding the root directory.
pub const NVX_HOME_ENV: &str = "NVX_HOME";

/// Environment variable overriding the extraction worker count.
pub const WORKERS_ENV: &str = "NVX_WORKERS";

/// Settings shared by every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub home: PathBuf,
    pub dist_server: String,
    pub activation: ActivationStrategy,
    /// `None` means one worker per logical CPU.
    pub workers: Option<usize>,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable holds an invalid value or no default
    /// root directory can be determined.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let home = match get(NVX_HOME_ENV) {
            Some(home) => PathBuf::from(home),
            None => default_home()?,
        };

        let dist_server = get(DIST_SERVER_ENV).unwrap_or_else(|| DEFAULT_DIST_SERVER.to_string());

        let activation = match get(ACTIVATION_ENV) {
            Some(value) => value.parse()?,
            None => ActivationStrategy::host_default(),
        };

        let workers = get(WORKERS_ENV).map(|v| parse_workers(&v)).transpose()?;

        Ok(Self {
            home,
            dist_server,
            activation,
            workers,
        })
    }

    #[must_use]
    pub fn store(&self) -> VersionStore {
        VersionStore::with_root(self.home.clone())
    }
}

fn parse_workers(value: &str) -> Result<usize, NvxError> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(NvxError::invalid_config(
            WORKERS_ENV,
            value,
            "a positive integer",
        )),
    }
}

fn default_home() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        Ok(dirs::data_dir()
            .context("Cannot determine AppData directory. Set NVX_HOME environment variable.")?
            .join("nvx"))
    }
    #[cfg(not(windows))]
    {
        Ok(dirs::home_dir()
            .context("Cannot determine home directory. Set NVX_HOME environment variable.")?
            .join(".nvx"))
    }
}
