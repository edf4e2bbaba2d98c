//! Version directory store for nvx.
//!
//! The presence of a version directory is the only record that a version is
//! installed; nothing else is persisted about installs. The `current` entry
//! inside the versions directory is the active version pointer and is either
//! a symbolic link to a version directory or a materialized directory.
//!
//! ## Directory Structure
//!
//! ```text
//! ~/.nvx/                     # Root directory (or NVX_HOME)
//!   versions/
//!     v20.11.1/               # Unpacked release archive
//!       bin/node
//!       lib/...
//!     v18.19.0/
//!     current                 # Symlink to a version, or a directory:
//!       bin/                  #   copies of the active executable directory
//!       .nvx-version          #   marker naming the copied version
//!   downloads/                # Archives while an install is running
//!   staging/                  # Extractions that have not been promoted yet
//! ```

use std::path::{Component, Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use super::version::VersionId;
use crate::errors::NvxError;

/// Name of the active version pointer inside the versions directory.
pub const CURRENT_DIR: &str = "current";

/// Marker written into a materialized `current` directory.
pub const VERSION_MARKER_FILE: &str = ".nvx-version";

/// What the `current` pointer looks like on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationState {
    /// No usable `current` entry.
    Inactive,
    /// `current` is a symbolic link to the version's install directory.
    ActiveViaLink { version: VersionId },
    /// `current` is a directory holding copies of the version's executables.
    ActiveViaCopy { version: VersionId },
}

impl ActivationState {
    /// Returns the active version, if any.
    #[must_use]
    pub fn version(&self) -> Option<&VersionId> {
        match self {
            Self::Inactive => None,
            Self::ActiveViaLink { version } | Self::ActiveViaCopy { version } => Some(version),
        }
    }
}

/// Paths and filesystem operations for installed versions.
#[derive(Debug, Clone)]
pub struct VersionStore {
    pub root: PathBuf,
    pub versions: PathBuf,
    pub downloads: PathBuf,
    pub staging: PathBuf,
}

impl VersionStore {
    /// Creates a store rooted at the given directory. Nothing is touched on disk.
    #[must_use = "returns new store instance without side effects"]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            versions: root.join("versions"),
            downloads: root.join("downloads"),
            staging: root.join("staging"),
            root,
        }
    }

    /// Install directory for a version, e.g. `~/.nvx/versions/v20.11.1`.
    #[must_use = "returns the path without side effects"]
    pub fn install_dir_for(&self, version: &VersionId) -> PathBuf {
        self.versions.join(version.dir_name())
    }

    /// Extraction directory used before an install is promoted.
    #[must_use = "returns the path without side effects"]
    pub fn staging_dir_for(&self, version: &VersionId) -> PathBuf {
        self.staging.join(version.dir_name())
    }

    #[must_use = "returns the path without side effects"]
    pub fn download_path(&self, filename: &str) -> PathBuf {
        self.downloads.join(filename)
    }

    /// The active version pointer, `~/.nvx/versions/current`.
    #[must_use = "returns the path without side effects"]
    pub fn current_path(&self) -> PathBuf {
        self.versions.join(CURRENT_DIR)
    }

    /// Directory that must be on the search path for the active version.
    #[must_use = "returns the path without side effects"]
    pub fn current_bin_dir(&self) -> PathBuf {
        self.current_path().join("bin")
    }

    #[must_use = "returns installation status without side effects"]
    pub fn exists(&self, version: &VersionId) -> bool {
        self.install_dir_for(version).is_dir()
    }

    /// Ensures the root, versions, downloads and staging directories exist.
    ///
    /// # Errors
    ///
    /// Returns [`NvxError::Io`] if any directory cannot be created.
    pub fn ensure_directories(&self) -> Result<(), NvxError> {
        for dir in [&self.root, &self.versions, &self.downloads, &self.staging] {
            std::fs::create_dir_all(dir).map_err(|e| {
                NvxError::io(format!("Failed to create directory: {}", dir.display()), e)
            })?;
        }
        Ok(())
    }

    /// Recursively deletes a version's install directory. There is no rollback
    /// if deletion stops halfway.
    ///
    /// # Errors
    ///
    /// - [`NvxError::NotInstalled`] if the directory does not exist
    /// - [`NvxError::RemovalFailed`] if deletion fails
    pub fn remove(&self, version: &VersionId) -> Result<(), NvxError> {
        if !self.exists(version) {
            return Err(NvxError::not_installed(version.as_str()));
        }
        let dir = self.install_dir_for(version);
        debug!(path = %dir.display(), "removing version directory");
        std::fs::remove_dir_all(&dir).map_err(|e| NvxError::removal_failed(&dir, e))
    }

    /// Lists installed versions in ascending version order.
    ///
    /// The `current` pointer and any directory whose name is not a
    /// `v`-prefixed version are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`NvxError::Io`] if the versions directory cannot be read.
    pub fn list_installed(&self) -> Result<Vec<VersionId>, NvxError> {
        if !self.versions.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.versions).map_err(|e| {
            NvxError::io(
                format!("Failed to read versions directory: {}", self.versions.display()),
                e,
            )
        })?;

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| NvxError::io("Failed to read directory entry", e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name == CURRENT_DIR {
                continue;
            }
            let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
            if is_dir && let Some(version) = VersionId::from_dir_name(name) {
                versions.push(version);
            }
        }

        versions.sort();
        Ok(versions)
    }

    /// Reads the active version pointer from disk.
    ///
    /// A link whose target is gone, or a directory without a readable version
    /// marker, counts as [`ActivationState::Inactive`]; activation replaces
    /// either one.
    #[must_use]
    pub fn current_state(&self) -> ActivationState {
        let current = self.current_path();
        let Ok(meta) = std::fs::symlink_metadata(&current) else {
            return ActivationState::Inactive;
        };

        if meta.file_type().is_symlink() {
            let Ok(target) = std::fs::read_link(&current) else {
                return ActivationState::Inactive;
            };
            if !current.is_dir() {
                return ActivationState::Inactive;
            }
            return target
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(VersionId::from_dir_name)
                .map_or(ActivationState::Inactive, |version| {
                    ActivationState::ActiveViaLink { version }
                });
        }

        if meta.is_dir() {
            return std::fs::read_to_string(current.join(VERSION_MARKER_FILE))
                .ok()
                .and_then(|s| VersionId::parse(s.trim()).ok())
                .map_or(ActivationState::Inactive, |version| {
                    ActivationState::ActiveViaCopy { version }
                });
        }

        ActivationState::Inactive
    }

    /// Returns the active version, if any.
    #[must_use]
    pub fn active_version(&self) -> Option<VersionId> {
        self.current_state().version().cloned()
    }

    /// Removes the `current` pointer, whichever form it takes. Succeeds when
    /// there is nothing to remove.
    ///
    /// # Errors
    ///
    /// Returns [`NvxError::RemovalFailed`] if the link or directory cannot be deleted.
    pub fn remove_current(&self) -> Result<(), NvxError> {
        let current = self.current_path();
        let meta = match std::fs::symlink_metadata(&current) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(NvxError::removal_failed(&current, e)),
        };

        let result = if meta.file_type().is_symlink() {
            remove_link(&current)
        } else if meta.is_dir() {
            std::fs::remove_dir_all(&current)
        } else {
            std::fs::remove_file(&current)
        };
        result.map_err(|e| NvxError::removal_failed(&current, e))
    }

    /// Recursively copies `src` into `dst`, preserving structure and
    /// permission bits. Symbolic links are recreated as links on Unix and
    /// copied as their target's content elsewhere. A relative link that
    /// points outside `src` is recreated as an absolute link to its original
    /// target, so it still resolves from `dst`.
    ///
    /// `progress` receives `(copied, total)` after each file.
    ///
    /// # Errors
    ///
    /// Returns [`NvxError::CopyFailed`] naming the first path that could not be copied.
    pub fn copy_tree(
        src: &Path,
        dst: &Path,
        progress: &dyn Fn(usize, usize),
    ) -> Result<usize, NvxError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(src).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(src).to_path_buf();
                NvxError::copy_failed(path, std::io::Error::other(e.to_string()))
            })?;
            let relative = entry
                .path()
                .strip_prefix(src)
                .map_err(|e| NvxError::copy_failed(entry.path(), std::io::Error::other(e)))?
                .to_path_buf();
            if entry.file_type().is_dir() {
                std::fs::create_dir_all(dst.join(&relative))
                    .map_err(|e| NvxError::copy_failed(entry.path(), e))?;
            } else {
                files.push((entry.into_path(), relative));
            }
        }

        let total = files.len();
        for (copied, (from, relative)) in files.iter().enumerate() {
            let to = dst.join(relative);
            if let Some(parent) = to.parent() {
                std::fs::create_dir_all(parent).map_err(|e| NvxError::copy_failed(from, e))?;
            }
            copy_entry(from, relative, &to).map_err(|e| NvxError::copy_failed(from, e))?;
            progress(copied + 1, total);
        }

        Ok(total)
    }
}

#[cfg(unix)]
fn copy_entry(from: &Path, relative: &Path, to: &Path) -> std::io::Result<()> {
    let meta = std::fs::symlink_metadata(from)?;
    if meta.file_type().is_symlink() {
        let mut target = std::fs::read_link(from)?;
        if target.is_relative() && link_escapes(relative, &target) {
            let base = std::path::absolute(from.parent().unwrap_or(Path::new(".")))?;
            target = join_lexically(&base, &target);
        }
        std::os::unix::fs::symlink(target, to)
    } else {
        std::fs::copy(from, to).map(|_| ())
    }
}

#[cfg(not(unix))]
fn copy_entry(from: &Path, _relative: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::copy(from, to).map(|_| ())
}

/// Returns whether a relative link target, resolved from the directory of
/// `link` (itself relative to the copied root), leaves that root.
#[cfg_attr(not(unix), allow(dead_code))]
fn link_escapes(link: &Path, target: &Path) -> bool {
    let mut depth = link.components().count().saturating_sub(1);
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return true;
                }
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return true,
        }
    }
    false
}

/// Joins `target` onto `base`, applying `..` without touching the filesystem.
#[cfg_attr(not(unix), allow(dead_code))]
fn join_lexically(base: &Path, target: &Path) -> PathBuf {
    let mut joined = base.to_path_buf();
    for component in target.components() {
        match component {
            Component::ParentDir => {
                joined.pop();
            }
            Component::CurDir => {}
            other => joined.push(other.as_os_str()),
        }
    }
    joined
}

/// Removes a symbolic link without following it.
fn remove_link(path: &Path) -> std::io::Result<()> {
    #[cfg(windows)]
    {
        // Directory symlinks and junctions are removed with `remove_dir`.
        std::fs::remove_dir(path).or_else(|_| std::fs::remove_file(path))
    }

    #[cfg(not(windows))]
    {
        std::fs::remove_file(path)
    }
}
