//! Install orchestration.
//!
//! Ties the fetcher, the extractor, the version store and the activation
//! engine together:
//!
//! 1. an installed version is reported without downloading anything
//! 2. the archive is streamed into `downloads/`
//! 3. it is extracted into `staging/v<version>` with the common root stripped
//! 4. the staging directory is renamed to `versions/v<version>`
//! 5. the archive is deleted
//!
//! A version directory only ever appears through the rename in step 4, so a
//! failed download or extraction never leaves a half-populated install.
//! Activating the first installed version is a separate step,
//! [`Installer::activate_if_idle`], so its failure never undoes an install.

use tracing::{debug, info, warn};

use super::activation::{ActivationEngine, ActivationReport, Activator};
use super::archive::{ExtractOptions, ExtractProgress, ExtractionReport, extract_archive};
use super::download::{ArchiveFetcher, ProgressCallback, download_to};
use super::platform::PlatformDescriptor;
use super::version::VersionId;
use crate::errors::NvxError;

/// What [`Installer::install`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The version was downloaded and unpacked.
    Installed {
        version: VersionId,
        extraction: ExtractionReport,
    },
    /// The version directory already existed; nothing was downloaded.
    AlreadyInstalled { version: VersionId },
}

/// Installs versions for one platform.
pub struct Installer<F, A> {
    fetcher: F,
    engine: ActivationEngine<A>,
    platform: PlatformDescriptor,
    workers: Option<usize>,
}

impl<F: ArchiveFetcher, A: Activator> Installer<F, A> {
    #[must_use]
    pub fn new(
        fetcher: F,
        engine: ActivationEngine<A>,
        platform: PlatformDescriptor,
        workers: Option<usize>,
    ) -> Self {
        Self {
            fetcher,
            engine,
            platform,
            workers,
        }
    }

    /// Installs `version`.
    ///
    /// # Errors
    ///
    /// - [`NvxError::FetchFailed`] if the archive cannot be downloaded
    /// - [`NvxError::ArchiveUnreadable`], [`NvxError::UnsafeEntryPath`] or
    ///   [`NvxError::ExtractionFailed`] from extraction
    /// - [`NvxError::Io`] for failures managing the store directories
    pub async fn install(
        &self,
        version: &VersionId,
        download_progress: ProgressCallback,
        extract_progress: ExtractProgress<'_>,
    ) -> Result<InstallOutcome, NvxError> {
        let store = self.engine.store();
        store.ensure_directories()?;

        if store.exists(version) {
            debug!(%version, "version already installed");
            return Ok(InstallOutcome::AlreadyInstalled {
                version: version.clone(),
            });
        }

        let fetched = self.fetcher.fetch(version, self.platform).await?;
        let archive_name = self.platform.archive_file_name(&version.dir_name());
        let archive_path = store.download_path(&archive_name);
        let bytes = download_to(fetched, &archive_path, download_progress).await?;
        debug!(archive = %archive_path.display(), bytes, "archive downloaded");

        let staging = store.staging_dir_for(version);
        clear_staging(&staging)?;

        let options = ExtractOptions {
            workers: self.workers,
            strip_common_root: true,
        };
        let extracted = extract_archive(
            &archive_path,
            &staging,
            self.platform.archive_format(),
            &options,
            extract_progress,
        );
        remove_archive(&archive_path);
        let extraction = extracted?;

        let install_dir = store.install_dir_for(version);
        std::fs::rename(&staging, &install_dir).map_err(|e| {
            NvxError::io(
                format!(
                    "Failed to move {} to {}",
                    staging.display(),
                    install_dir.display()
                ),
                e,
            )
        })?;
        info!(%version, files = extraction.files, "version installed");

        Ok(InstallOutcome::Installed {
            version: version.clone(),
            extraction,
        })
    }

    /// Activates `version` when no version is active. Returns `None` when
    /// another version already is.
    ///
    /// # Errors
    ///
    /// Any error from [`ActivationEngine::activate`].
    pub fn activate_if_idle(
        &self,
        version: &VersionId,
    ) -> Result<Option<ActivationReport>, NvxError> {
        if self.engine.store().active_version().is_some() {
            return Ok(None);
        }
        self.engine.activate(version).map(Some)
    }
}

fn clear_staging(staging: &std::path::Path) -> Result<(), NvxError> {
    if staging.exists() {
        debug!(path = %staging.display(), "removing stale staging directory");
        std::fs::remove_dir_all(staging)
            .map_err(|e| NvxError::removal_failed(staging, e))?;
    }
    Ok(())
}

fn remove_archive(path: &std::path::Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!(archive = %path.display(), error = %e, "could not delete downloaded archive");
    }
}
