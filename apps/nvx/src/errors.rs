//! Error types for the nvx CLI.
//!
//! This module defines the `NvxError` enum which consolidates the failure
//! outcomes of the version manager core: validation, platform detection,
//! fetching, extraction, the version directory store, activation, and
//! search-path publication.
//!
//! Core operations return `Result<T, NvxError>`; command handlers wrap them in
//! `anyhow::Result` and `main` prints a single `Error: ...` line.

use std::path::PathBuf;
use thiserror::Error;

/// Consolidated error type for nvx operations.
#[derive(Debug, Error)]
pub enum NvxError {
    /// The version argument is malformed. No I/O has been attempted.
    #[error("invalid version '{input}': {reason}\nExample: 20.5.1")]
    InvalidVersionFormat {
        /// The raw argument as typed by the user.
        input: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Host OS or CPU architecture has no published runtime archive.
    #[error(
        "unsupported platform: {os} on {arch}. \
         Supported platforms are: windows, macos and linux on x86_64 or aarch64"
    )]
    UnsupportedPlatform {
        /// Host operating system name.
        os: String,
        /// Host CPU architecture name.
        arch: String,
    },

    /// Network failure or non-success status from the release server.
    #[error("failed to fetch {url}: {message}")]
    FetchFailed {
        /// The requested archive URL.
        url: String,
        /// Description of the failure.
        message: String,
        /// The underlying error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The archive could not be opened or is not in the expected format.
    #[error("cannot read archive {path}: {message}")]
    ArchiveUnreadable {
        /// Path of the archive on disk.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// An archive entry would be written outside the destination directory.
    #[error("refusing to extract entry with absolute path or parent reference: {entry}")]
    UnsafeEntryPath {
        /// The offending entry path as stored in the archive.
        entry: String,
    },

    /// The first error recorded by an extraction worker.
    #[error("failed to extract {entry}")]
    ExtractionFailed {
        /// Destination path of the entry that failed.
        entry: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The requested version has no install directory.
    #[error("version {version} is not installed")]
    NotInstalled {
        /// The version that was not found.
        version: String,
    },

    /// Copy activation could not find the runtime executable in the install tree.
    #[error("could not locate '{executable}' inside the {version} installation")]
    ExecutableNotFound {
        /// The version being activated.
        version: String,
        /// The executable file name that was searched for.
        executable: String,
    },

    /// Recursive removal of a directory or link failed.
    #[error("failed to remove {path}")]
    RemovalFailed {
        /// The path that could not be removed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Copying a file or directory tree failed.
    #[error("failed to copy {path}")]
    CopyFailed {
        /// The source path that could not be copied.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Creating the `current` symbolic link failed.
    #[error("failed to link {link} -> {target}")]
    LinkFailed {
        /// The link path.
        link: PathBuf,
        /// The directory the link should point to.
        target: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The persistent search path could not be updated.
    #[error("failed to update search path: {message}")]
    PublishFailed {
        /// Description of the failure.
        message: String,
        /// The underlying I/O error, if any.
        #[source]
        source: Option<std::io::Error>,
    },

    /// An environment variable holds a value nvx cannot use.
    #[error("invalid value '{value}' for {variable}: expected {expected}")]
    InvalidConfig {
        /// The environment variable name.
        variable: &'static str,
        /// The rejected value.
        value: String,
        /// Human-readable description of accepted values.
        expected: &'static str,
    },

    /// Error reading or writing files.
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O operation that failed.
        message: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

#[allow(dead_code)]
impl NvxError {
    /// Creates a new `InvalidVersionFormat` error.
    #[must_use]
    pub fn invalid_version(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidVersionFormat {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `UnsupportedPlatform` error.
    #[must_use]
    pub fn unsupported_platform(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self::UnsupportedPlatform {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Creates a new `FetchFailed` error.
    #[must_use]
    pub fn fetch_failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FetchFailed {
            url: url.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new `FetchFailed` error with a source error.
    #[must_use]
    pub fn fetch_failed_with_source(
        url: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::FetchFailed {
            url: url.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new `ArchiveUnreadable` error.
    #[must_use]
    pub fn archive_unreadable(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ArchiveUnreadable {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `UnsafeEntryPath` error.
    #[must_use]
    pub fn unsafe_entry_path(entry: impl Into<String>) -> Self {
        Self::UnsafeEntryPath {
            entry: entry.into(),
        }
    }

    /// Creates a new `ExtractionFailed` error.
    #[must_use]
    pub fn extraction_failed(entry: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ExtractionFailed {
            entry: entry.into(),
            source,
        }
    }

    /// Creates a new `NotInstalled` error.
    #[must_use]
    pub fn not_installed(version: impl Into<String>) -> Self {
        Self::NotInstalled {
            version: version.into(),
        }
    }

    /// Creates a new `ExecutableNotFound` error.
    #[must_use]
    pub fn executable_not_found(version: impl Into<String>, executable: impl Into<String>) -> Self {
        Self::ExecutableNotFound {
            version: version.into(),
            executable: executable.into(),
        }
    }

    /// Creates a new `RemovalFailed` error.
    #[must_use]
    pub fn removal_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::RemovalFailed {
            path: path.into(),
            source,
        }
    }

    /// Creates a new `CopyFailed` error.
    #[must_use]
    pub fn copy_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CopyFailed {
            path: path.into(),
            source,
        }
    }

    /// Creates a new `LinkFailed` error.
    #[must_use]
    pub fn link_failed(
        link: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::LinkFailed {
            link: link.into(),
            target: target.into(),
            source,
        }
    }

    /// Creates a new `PublishFailed` error.
    #[must_use]
    pub fn publish_failed(message: impl Into<String>) -> Self {
        Self::PublishFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new `PublishFailed` error with an I/O source.
    #[must_use]
    pub fn publish_failed_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::PublishFailed {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a new `InvalidConfig` error.
    #[must_use]
    pub fn invalid_config(
        variable: &'static str,
        value: impl Into<String>,
        expected: &'static str,
    ) -> Self {
        Self::InvalidConfig {
            variable,
            value: value.into(),
            expected,
        }
    }

    /// Creates a new `Io` error from an I/O error with context.
    #[must_use]
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    fn io_err(msg: &str) -> std::io::Error {
        std::io::Error::other(msg.to_string())
    }

    #[test]
    fn invalid_version_includes_usage_hint() {
        let err = NvxError::invalid_version("20.5", "expected MAJOR.MINOR.PATCH");
        assert_eq!(
            err.to_string(),
            "invalid version '20.5': expected MAJOR.MINOR.PATCH\nExample: 20.5.1"
        );
    }

    #[test]
    fn unsupported_platform_names_os_and_arch() {
        let err = NvxError::unsupported_platform("freebsd", "x86_64");
        assert!(err.to_string().starts_with("unsupported platform: freebsd on x86_64."));
    }

    #[test]
    fn fetch_failed_displays_url_and_message() {
        let err = NvxError::fetch_failed("https://example.test/a.zip", "HTTP 404 Not Found");
        assert_eq!(
            err.to_string(),
            "failed to fetch https://example.test/a.zip: HTTP 404 Not Found"
        );
        assert!(err.source().is_none());
    }

    #[test]
    fn fetch_failed_with_source_keeps_cause() {
        let err = NvxError::fetch_failed_with_source("u", "connection refused", io_err("refused"));
        assert_eq!(err.source().map(ToString::to_string), Some("refused".into()));
    }

    #[test]
    fn archive_unreadable_displays_path() {
        let err = NvxError::archive_unreadable("/tmp/a.zip", "invalid Zip archive");
        assert_eq!(
            err.to_string(),
            "cannot read archive /tmp/a.zip: invalid Zip archive"
        );
    }

    #[test]
    fn extraction_failed_exposes_io_source() {
        let err = NvxError::extraction_failed("/out/bin/node", io_err("disk full"));
        assert_eq!(err.to_string(), "failed to extract /out/bin/node");
        assert_eq!(err.source().map(ToString::to_string), Some("disk full".into()));
    }

    #[test]
    fn not_installed_displays_version() {
        let err = NvxError::not_installed("20.11.1");
        assert_eq!(err.to_string(), "version 20.11.1 is not installed");
    }

    #[test]
    fn executable_not_found_displays_both_values() {
        let err = NvxError::executable_not_found("20.11.1", "node.exe");
        assert_eq!(
            err.to_string(),
            "could not locate 'node.exe' inside the 20.11.1 installation"
        );
    }

    #[test]
    fn removal_and_copy_failures_display_path() {
        assert_eq!(
            NvxError::removal_failed("/x/v1.0.0", io_err("busy")).to_string(),
            "failed to remove /x/v1.0.0"
        );
        assert_eq!(
            NvxError::copy_failed("/x/node", io_err("denied")).to_string(),
            "failed to copy /x/node"
        );
    }

    #[test]
    fn link_failed_displays_both_ends() {
        let err = NvxError::link_failed("/x/current", "/x/v1.0.0", io_err("exists"));
        assert_eq!(err.to_string(), "failed to link /x/current -> /x/v1.0.0");
    }

    #[test]
    fn publish_failed_displays_message() {
        let err = NvxError::publish_failed("registry key missing");
        assert_eq!(
            err.to_string(),
            "failed to update search path: registry key missing"
        );
    }

    #[test]
    fn invalid_config_displays_expectation() {
        let err = NvxError::invalid_config("NVX_ACTIVATION", "hardlink", "'link' or 'copy'");
        assert_eq!(
            err.to_string(),
            "invalid value 'hardlink' for NVX_ACTIVATION: expected 'link' or 'copy'"
        );
    }

    #[test]
    fn errors_convert_into_anyhow() {
        let err: anyhow::Error = NvxError::not_installed("1.2.3").into();
        assert!(matches!(
            err.downcast_ref::<NvxError>(),
            Some(NvxError::NotInstalled { .. })
        ));
    }
}
