//! Version activation.
//!
//! Activation points `versions/current` at exactly one installed version.
//! Two strategies exist and one is fixed when the engine is built:
//!
//! - [`LinkActivator`] replaces `current` with a symbolic link to the
//!   version's install directory. The search path entry never changes.
//! - [`CopyActivator`] materializes `current/bin` with copies of the
//!   directory holding the runtime executable, writes a version marker and
//!   publishes `current/bin` through a [`PathPublisher`]. Used where links
//!   are unavailable.
//!
//! Every activation first removes whatever `current` was. If the new version
//! cannot be materialized, the partial `current` is removed as well and the
//! state is [`ActivationState::Inactive`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info};

use super::paths::{ActivationState, VERSION_MARKER_FILE, VersionStore};
use super::shell::{PathPublisher, PublishOutcome};
use super::version::VersionId;
use crate::errors::NvxError;

/// Environment variable selecting the activation strategy.
pub const ACTIVATION_ENV: &str = "NVX_ACTIVATION";

/// How `current` is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationStrategy {
    Link,
    Copy,
}

impl ActivationStrategy {
    /// Links on Unix, copies on Windows.
    #[must_use]
    pub fn host_default() -> Self {
        if cfg!(windows) { Self::Copy } else { Self::Link }
    }

    #[must_use = "returns the strategy name without side effects"]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Copy => "copy",
        }
    }
}

impl FromStr for ActivationStrategy {
    type Err = NvxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "link" => Ok(Self::Link),
            "copy" => Ok(Self::Copy),
            _ => Err(NvxError::invalid_config(ACTIVATION_ENV, s, "'link' or 'copy'")),
        }
    }
}

impl fmt::Display for ActivationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an activation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    pub state: ActivationState,
    /// Files copied into `current/bin`; zero for links.
    pub files_copied: usize,
    /// Result of publishing `current/bin`, when the strategy publishes.
    pub published: Option<PublishOutcome>,
}

/// Builds `current` for an installed version.
///
/// Implementations may assume `current` does not exist when called.
pub trait Activator {
    fn strategy(&self) -> ActivationStrategy;

    /// Materializes `current` for `version`, installed at `install_dir`.
    ///
    /// # Errors
    ///
    /// Returns the strategy-specific failure; the engine cleans up after it.
    fn materialize(
        &self,
        store: &VersionStore,
        version: &VersionId,
        install_dir: &Path,
    ) -> Result<ActivationReport, NvxError>;
}

impl<A: Activator + ?Sized> Activator for Box<A> {
    fn strategy(&self) -> ActivationStrategy {
        (**self).strategy()
    }

    fn materialize(
        &self,
        store: &VersionStore,
        version: &VersionId,
        install_dir: &Path,
    ) -> Result<ActivationReport, NvxError> {
        (**self).materialize(store, version, install_dir)
    }
}

/// Activates by symbolic link.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkActivator;

impl Activator for LinkActivator {
    fn strategy(&self) -> ActivationStrategy {
        ActivationStrategy::Link
    }

    fn materialize(
        &self,
        store: &VersionStore,
        version: &VersionId,
        install_dir: &Path,
    ) -> Result<ActivationReport, NvxError> {
        let link = store.current_path();
        // Relative to the versions directory, so the root can be moved.
        let target = PathBuf::from(version.dir_name());
        debug!(link = %link.display(), target = %target.display(), "creating link");
        create_dir_link(&target, &link)
            .map_err(|e| NvxError::link_failed(&link, install_dir, e))?;

        Ok(ActivationReport {
            state: ActivationState::ActiveViaLink {
                version: version.clone(),
            },
            files_copied: 0,
            published: None,
        })
    }
}

#[cfg(unix)]
fn create_dir_link(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_dir_link(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

/// Activates by copying the executable directory into `current/bin`.
#[derive(Debug)]
pub struct CopyActivator<P> {
    publisher: P,
    executable: String,
}

impl<P: PathPublisher> CopyActivator<P> {
    /// `executable` is the file name that identifies the executable directory,
    /// e.g. `node.exe`.
    pub fn new(publisher: P, executable: impl Into<String>) -> Self {
        Self {
            publisher,
            executable: executable.into(),
        }
    }
}

impl<P: PathPublisher> Activator for CopyActivator<P> {
    fn strategy(&self) -> ActivationStrategy {
        ActivationStrategy::Copy
    }

    fn materialize(
        &self,
        store: &VersionStore,
        version: &VersionId,
        install_dir: &Path,
    ) -> Result<ActivationReport, NvxError> {
        let source = find_executable_dir(install_dir, &self.executable)
            .ok_or_else(|| NvxError::executable_not_found(version.as_str(), &self.executable))?;

        let bin_dir = store.current_bin_dir();
        debug!(from = %source.display(), to = %bin_dir.display(), "copying executables");
        let files_copied = VersionStore::copy_tree(&source, &bin_dir, &|_, _| {})?;

        let absolute = std::path::absolute(&bin_dir).map_err(|e| {
            NvxError::io(format!("Failed to resolve {}", bin_dir.display()), e)
        })?;
        debug!(bin_dir = %absolute.display(), "publishing search path entry");
        let published = self.publisher.publish(&absolute)?;

        // The marker makes `current` count as active, so it goes last.
        let marker = store.current_path().join(VERSION_MARKER_FILE);
        std::fs::write(&marker, version.as_str())
            .map_err(|e| NvxError::copy_failed(&marker, e))?;

        Ok(ActivationReport {
            state: ActivationState::ActiveViaCopy {
                version: version.clone(),
            },
            files_copied,
            published: Some(published),
        })
    }
}

/// Finds the directory holding `executable`: the install root itself, or
/// the first immediate child (by name) that contains it.
#[must_use]
pub fn find_executable_dir(install_dir: &Path, executable: &str) -> Option<PathBuf> {
    if install_dir.join(executable).is_file() {
        return Some(install_dir.to_path_buf());
    }

    let mut children: Vec<PathBuf> = std::fs::read_dir(install_dir)
        .ok()?
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .map(|entry| entry.path())
        .collect();
    children.sort();

    children
        .into_iter()
        .find(|child| child.join(executable).is_file())
}

/// Switches the active version using a fixed [`Activator`].
#[derive(Debug)]
pub struct ActivationEngine<A> {
    store: VersionStore,
    activator: A,
}

impl<A: Activator> ActivationEngine<A> {
    #[must_use]
    pub fn new(store: VersionStore, activator: A) -> Self {
        Self { store, activator }
    }

    #[must_use]
    pub fn store(&self) -> &VersionStore {
        &self.store
    }

    #[must_use]
    pub fn strategy(&self) -> ActivationStrategy {
        self.activator.strategy()
    }

    /// Reads the current activation state from disk.
    #[must_use]
    pub fn state(&self) -> ActivationState {
        self.store.current_state()
    }

    /// Returns whether `version` is active in the form this engine would
    /// build it. A version activated by the other strategy is not.
    #[must_use]
    pub fn is_active(&self, version: &VersionId) -> bool {
        match (self.state(), self.strategy()) {
            (ActivationState::ActiveViaLink { version: active }, ActivationStrategy::Link)
            | (ActivationState::ActiveViaCopy { version: active }, ActivationStrategy::Copy) => {
                &active == version
            }
            _ => false,
        }
    }

    /// Makes `version` the active version.
    ///
    /// Nothing is touched when the version is not installed. Otherwise the
    /// old `current` is removed first; if the new one cannot be built or
    /// published, any partial `current` is removed and the state is
    /// [`ActivationState::Inactive`].
    ///
    /// # Errors
    ///
    /// - [`NvxError::NotInstalled`] if the version directory is missing
    /// - [`NvxError::RemovalFailed`] if the old pointer cannot be removed
    /// - [`NvxError::LinkFailed`], [`NvxError::ExecutableNotFound`] or
    ///   [`NvxError::CopyFailed`] from the strategy
    /// - [`NvxError::PublishFailed`] if the search path cannot be updated
    pub fn activate(&self, version: &VersionId) -> Result<ActivationReport, NvxError> {
        if !self.store.exists(version) {
            return Err(NvxError::not_installed(version.as_str()));
        }

        let previous = self.store.current_state();
        self.store.remove_current()?;

        let install_dir = self.store.install_dir_for(version);
        match self
            .activator
            .materialize(&self.store, version, &install_dir)
        {
            Ok(report) => {
                info!(
                    from = ?previous.version().map(VersionId::as_str),
                    to = %version,
                    strategy = %self.activator.strategy(),
                    "activated version"
                );
                Ok(report)
            }
            Err(e) => {
                debug!(error = %e, "activation failed, removing partial current");
                let _ = self.store.remove_current();
                Err(e)
            }
        }
    }

    /// Removes `current` if it points at `version`. Returns whether it did.
    ///
    /// # Errors
    ///
    /// Returns [`NvxError::RemovalFailed`] if the pointer cannot be deleted.
    pub fn deactivate_if_active(&self, version: &VersionId) -> Result<bool, NvxError> {
        if self.store.active_version().as_ref() != Some(version) {
            return Ok(false);
        }
        self.store.remove_current()?;
        info!(%version, "deactivated version");
        Ok(true)
    }
}
