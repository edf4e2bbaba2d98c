//! Platform detection for the nvx version manager.
//!
//! This module maps the host operating system and CPU architecture onto the
//! naming used by the Node.js release server, and decides which archive
//! format is downloaded for the host.
//!
//! ## Supported Platforms
//!
//! | OS      | Tag      | Archive  |
//! |---------|----------|----------|
//! | Windows | `win`    | `.zip`   |
//! | macOS   | `darwin` | `.tar.xz`|
//! | Linux   | `linux`  | `.tar.xz`|
//!
//! Architectures: `x86_64` (`x64`) and `aarch64` (`arm64`).

use std::fmt;

use crate::errors::NvxError;

/// Archive container used for a platform's release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// ZIP archive, random access by entry index.
    Zip,
    /// Tar stream compressed with xz.
    TarXz,
}

impl ArchiveFormat {
    /// Returns the file extension used in release file names.
    #[must_use = "returns the extension string without side effects"]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarXz => "tar.xz",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Host platform as understood by the release server.
///
/// Derived once per process by [`PlatformDescriptor::detect`]. There is no way
/// to construct a descriptor for an unsupported host, so downstream code never
/// sees an empty tag or extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlatformDescriptor {
    tag: &'static str,
    arch: &'static str,
    format: ArchiveFormat,
}

impl PlatformDescriptor {
    /// Detects the current platform from `std::env::consts`.
    ///
    /// # Errors
    ///
    /// Returns [`NvxError::UnsupportedPlatform`] if the host OS or architecture
    /// has no published runtime archive.
    pub fn detect() -> Result<Self, NvxError> {
        let os = std::env::consts::OS;
        let arch = std::env::consts::ARCH;
        Self::from_parts(os, arch).ok_or_else(|| NvxError::unsupported_platform(os, arch))
    }

    /// Maps an OS and architecture name (as in `std::env::consts`) to a descriptor.
    ///
    /// Returns `None` for any combination outside the supported set.
    #[must_use]
    pub fn from_parts(os: &str, arch: &str) -> Option<Self> {
        let (tag, format) = match os {
            "windows" => ("win", ArchiveFormat::Zip),
            "macos" => ("darwin", ArchiveFormat::TarXz),
            "linux" => ("linux", ArchiveFormat::TarXz),
            _ => return None,
        };
        let arch = match arch {
            "x86_64" => "x64",
            "aarch64" => "arm64",
            _ => return None,
        };
        Some(Self { tag, arch, format })
    }

    /// Platform tag used in release file names (`win`, `darwin`, `linux`).
    #[must_use = "returns the platform tag without side effects"]
    pub fn tag(self) -> &'static str {
        self.tag
    }

    /// Architecture tag used in release file names (`x64`, `arm64`).
    #[must_use = "returns the architecture tag without side effects"]
    pub fn arch(self) -> &'static str {
        self.arch
    }

    #[must_use = "returns the archive format without side effects"]
    pub fn archive_format(self) -> ArchiveFormat {
        self.format
    }

    /// Returns whether this platform is Windows.
    #[must_use = "returns platform check result without side effects"]
    pub fn is_windows(self) -> bool {
        self.tag == "win"
    }

    /// File name of the runtime executable inside an installation.
    #[must_use = "returns the executable name without side effects"]
    pub fn executable_name(self) -> &'static str {
        if self.is_windows() { "node.exe" } else { "node" }
    }

    /// Release archive file name, e.g. `node-v20.11.1-linux-x64.tar.xz`.
    #[must_use]
    pub fn archive_file_name(self, dir_name: &str) -> String {
        format!(
            "node-{dir_name}-{}-{}.{}",
            self.tag,
            self.arch,
            self.format.extension()
        )
    }
}

impl fmt::Display for PlatformDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.tag(), self.arch())
    }
}
