//! Search-path publishing for nvx.
//!
//! The activated executables live in `versions/current/bin`. Making that
//! directory visible to new shells is a persistent, user-level change, so it
//! goes through the [`PathPublisher`] trait and nowhere else.
//!
//! ## Implementations
//!
//! - Unix: [`ShellProfilePublisher`] appends an `export PATH` block to the
//!   detected shell profile. The block carries a marker comment and is
//!   written once.
//! - Windows: [`RegistryPublisher`] prepends the directory to
//!   `HKEY_CURRENT_USER\Environment\Path` and broadcasts `WM_SETTINGCHANGE`.
//!
//! ## Configuration Format
//!
//! For bash/zsh:
//! ```bash
//! # nvx
//! export PATH="$HOME/.nvx/versions/current/bin:$PATH"
//! ```
//!
//! For fish:
//! ```fish
//! # nvx
//! fish_add_path $HOME/.nvx/versions/current/bin
//! ```

use std::path::{Path, PathBuf};

use crate::errors::NvxError;

/// Marker comment used to identify the nvx PATH configuration.
#[cfg(unix)]
const NVX_MARKER: &str = "# nvx";

/// Result of publishing a directory on the search path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The directory was added. `hint` tells the user how to pick it up.
    Added { location: PathBuf, hint: String },
    /// The directory was already published at `location`.
    AlreadyPresent { location: PathBuf },
    /// Nothing could be changed automatically; the user must run `instruction`.
    ManualStepRequired { reason: String, instruction: String },
}

/// Makes a directory visible on the user's persistent command search path.
pub trait PathPublisher {
    /// Publishes `bin_dir`, which must be absolute.
    ///
    /// # Errors
    ///
    /// Returns [`NvxError::PublishFailed`] if the persistent setting cannot be
    /// read or written.
    fn publish(&self, bin_dir: &Path) -> Result<PublishOutcome, NvxError>;
}

impl<P: PathPublisher + ?Sized> PathPublisher for &P {
    fn publish(&self, bin_dir: &Path) -> Result<PublishOutcome, NvxError> {
        (**self).publish(bin_dir)
    }
}

/// Publisher for the host operating system.
#[cfg(unix)]
pub type SystemPublisher = ShellProfilePublisher;

/// Publisher for the host operating system.
#[cfg(windows)]
pub type SystemPublisher = RegistryPublisher;

/// Returns a human-readable message describing a publish outcome.
#[must_use]
pub fn format_publish_message(outcome: &PublishOutcome, bin_dir: &Path) -> String {
    match outcome {
        PublishOutcome::Added { location, hint } => format!(
            "Added {} to PATH in {}\n{hint}",
            bin_dir.display(),
            location.display()
        ),
        PublishOutcome::AlreadyPresent { location } => {
            format!("PATH already configured in {}", location.display())
        }
        PublishOutcome::ManualStepRequired {
            reason,
            instruction,
        } => format!("{reason}. To use nvx, add to your PATH:\n  {instruction}"),
    }
}

/// Returns the manual PATH configuration instruction appropriate for the platform.
#[must_use]
pub fn manual_path_instruction(bin_dir: &Path) -> String {
    if cfg!(windows) {
        format!("setx PATH \"{};%PATH%\"", bin_dir.display())
    } else {
        format!("export PATH=\"{}:$PATH\"", bin_dir.display())
    }
}

/// Represents supported shell types.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
}

#[cfg(unix)]
impl Shell {
    /// Detects the user's shell from the SHELL environment variable.
    #[must_use]
    pub fn detect() -> Option<Self> {
        let shell_path = std::env::var("SHELL").ok()?;
        Self::from_path(&shell_path)
    }

    /// Parses a shell from a path string (e.g., "/bin/bash").
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let shell_name = Path::new(path).file_name()?.to_str()?;
        match shell_name {
            "bash" => Some(Self::Bash),
            "zsh" => Some(Self::Zsh),
            "fish" => Some(Self::Fish),
            _ => None,
        }
    }

    /// Returns the profile files to check for this shell, in preference order.
    #[must_use]
    pub fn profile_candidates(self, home_dir: &Path) -> Vec<PathBuf> {
        match self {
            Self::Bash => vec![home_dir.join(".bashrc"), home_dir.join(".bash_profile")],
            Self::Zsh => vec![home_dir.join(".zshrc")],
            Self::Fish => vec![home_dir.join(".config").join("fish").join("config.fish")],
        }
    }

    /// Generates the PATH configuration snippet for this shell.
    ///
    /// Bash and zsh get a double-quoted path with `\`, `$`, backticks and `"`
    /// escaped. Fish gets a single-quoted path when it contains characters
    /// the fish parser would interpret.
    #[must_use]
    pub fn path_config(self, bin_dir: &Path) -> String {
        let path_str = bin_dir.display().to_string();
        match self {
            Self::Bash | Self::Zsh => {
                let escaped = path_str
                    .replace('\\', "\\\\")
                    .replace('$', "\\$")
                    .replace('`', "\\`")
                    .replace('"', "\\\"");
                format!("\n{NVX_MARKER}\nexport PATH=\"{escaped}:$PATH\"\n")
            }
            Self::Fish => {
                let needs_quotes = path_str.chars().any(|c| {
                    matches!(
                        c,
                        ' ' | '$' | '\\' | '\'' | '*' | '?' | '(' | ')' | '[' | ']' | '{' | '}'
                    )
                });
                let formatted = if needs_quotes {
                    format!("'{}'", path_str.replace('\'', "\\'"))
                } else {
                    path_str
                };
                format!("\n{NVX_MARKER}\nfish_add_path {formatted}\n")
            }
        }
    }
}

/// Publishes the bin directory through a shell profile.
#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct ShellProfilePublisher {
    home: Option<PathBuf>,
    shell: Option<Shell>,
}

#[cfg(unix)]
impl ShellProfilePublisher {
    /// Uses `$SHELL` and the user's home directory.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(dirs::home_dir(), Shell::detect())
    }

    /// Writes to the profile of `shell` under `home`.
    #[must_use]
    pub fn new(home: Option<PathBuf>, shell: Option<Shell>) -> Self {
        Self { home, shell }
    }
}

#[cfg(unix)]
impl PathPublisher for ShellProfilePublisher {
    fn publish(&self, bin_dir: &Path) -> Result<PublishOutcome, NvxError> {
        let manual = |reason: &str| PublishOutcome::ManualStepRequired {
            reason: reason.to_string(),
            instruction: manual_path_instruction(bin_dir),
        };

        let Some(shell) = self.shell else {
            return Ok(manual("Could not detect shell"));
        };
        let Some(home) = &self.home else {
            return Ok(manual("Could not find home directory"));
        };

        let candidates = shell.profile_candidates(home);
        let Some(profile) = candidates.iter().find(|p| p.exists()).cloned() else {
            return Ok(manual("Could not find shell profile"));
        };

        if is_path_configured(&profile)? {
            tracing::debug!(profile = %profile.display(), "PATH already configured");
            return Ok(PublishOutcome::AlreadyPresent { location: profile });
        }

        append_to_file(&profile, &shell.path_config(bin_dir))?;
        tracing::info!(profile = %profile.display(), bin_dir = %bin_dir.display(), "published PATH entry");

        let hint = format!("Run 'source {}' to use the active version.", profile.display());
        Ok(PublishOutcome::Added {
            location: profile,
            hint,
        })
    }
}

/// Checks if the nvx PATH configuration already exists in a file.
#[cfg(unix)]
fn is_path_configured(profile_path: &Path) -> Result<bool, NvxError> {
    let content = std::fs::read_to_string(profile_path).map_err(|e| {
        NvxError::publish_failed_with_source(
            format!("failed to read profile {}", profile_path.display()),
            e,
        )
    })?;
    Ok(content.lines().any(|line| line.trim_end() == NVX_MARKER))
}

#[cfg(unix)]
fn append_to_file(path: &Path, content: &str) -> Result<(), NvxError> {
    use std::fs::OpenOptions;
    use std::io::Write;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            NvxError::publish_failed_with_source(
                format!("failed to open profile for writing: {}", path.display()),
                e,
            )
        })?;

    file.write_all(content.as_bytes()).map_err(|e| {
        NvxError::publish_failed_with_source(
            format!("failed to write to profile: {}", path.display()),
            e,
        )
    })
}

/// Publishes the bin directory through the per-user `Path` registry value.
#[cfg(windows)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryPublisher;

#[cfg(windows)]
impl RegistryPublisher {
    #[must_use]
    pub fn from_env() -> Self {
        Self
    }
}

#[cfg(windows)]
impl PathPublisher for RegistryPublisher {
    fn publish(&self, bin_dir: &Path) -> Result<PublishOutcome, NvxError> {
        use winreg::RegKey;
        use winreg::enums::{HKEY_CURRENT_USER, KEY_READ, KEY_WRITE};

        let hkcu = RegKey::predef(HKEY_CURRENT_USER);
        let (env, _) = hkcu
            .create_subkey_with_flags("Environment", KEY_READ | KEY_WRITE)
            .map_err(|e| {
                NvxError::publish_failed_with_source("failed to open HKCU\\Environment", e)
            })?;

        let current_path: String = match env.get_value("Path") {
            Ok(value) => value,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(NvxError::publish_failed_with_source(
                    "failed to read PATH from registry",
                    e,
                ));
            }
        };

        let location = PathBuf::from(r"Registry: HKCU\Environment\Path");
        let bin_str = bin_dir.to_string_lossy();

        let Some(new_path) = prepend_path_entry(&current_path, &bin_str) else {
            return Ok(PublishOutcome::AlreadyPresent { location });
        };

        env.set_value("Path", &new_path).map_err(|e| {
            NvxError::publish_failed_with_source("failed to update PATH in registry", e)
        })?;
        tracing::info!(bin_dir = %bin_dir.display(), "published PATH entry in registry");

        broadcast_environment_change();

        Ok(PublishOutcome::Added {
            location,
            hint: "Open a new terminal to use the active version.".to_string(),
        })
    }
}

/// Tells running applications that the user environment changed.
#[cfg(windows)]
fn broadcast_environment_change() {
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        HWND_BROADCAST, SMTO_ABORTIFHUNG, SendMessageTimeoutW, WM_SETTINGCHANGE,
    };

    let param: Vec<u16> = "Environment".encode_utf16().chain(Some(0)).collect();
    let mut result: usize = 0;
    // SAFETY: `param` is a NUL-terminated UTF-16 string that outlives the call,
    // and `result` is a valid out pointer.
    let sent = unsafe {
        SendMessageTimeoutW(
            HWND_BROADCAST,
            WM_SETTINGCHANGE,
            0,
            param.as_ptr() as isize,
            SMTO_ABORTIFHUNG,
            5000,
            &raw mut result,
        )
    };
    if sent == 0 {
        tracing::warn!("WM_SETTINGCHANGE broadcast did not complete");
    }
}

/// Puts `entry` first in a `;`-separated PATH value.
///
/// Other occurrences (compared case-insensitively, ignoring a trailing
/// separator) are removed. Returns `None` when `entry` is already first and
/// unique.
#[cfg_attr(not(windows), allow(dead_code))]
fn prepend_path_entry(current: &str, entry: &str) -> Option<String> {
    let normalize = |s: &str| s.trim_end_matches(['\\', '/']).to_ascii_lowercase();
    let wanted = normalize(entry);

    let parts: Vec<&str> = current.split(';').filter(|p| !p.is_empty()).collect();
    let occurrences = parts.iter().filter(|p| normalize(p) == wanted).count();
    if occurrences == 1 && parts.first().is_some_and(|p| normalize(p) == wanted) {
        return None;
    }

    let rest = parts.into_iter().filter(|p| normalize(p) != wanted);
    Some(
        std::iter::once(entry)
            .chain(rest)
            .collect::<Vec<_>>()
            .join(";"),
    )
}

/// Publisher that records every call instead of touching the system.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingPublisher {
    pub calls: std::sync::Mutex<Vec<PathBuf>>,
    pub fail: bool,
}

#[cfg(test)]
impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<PathBuf> {
        self.calls.lock().expect("Should lock").clone()
    }
}

#[cfg(test)]
impl PathPublisher for RecordingPublisher {
    fn publish(&self, bin_dir: &Path) -> Result<PublishOutcome, NvxError> {
        self.calls
            .lock()
            .expect("Should lock")
            .push(bin_dir.to_path_buf());
        if self.fail {
            return Err(NvxError::publish_failed("registry is read-only"));
        }
        Ok(PublishOutcome::Added {
            location: PathBuf::from("recorded"),
            hint: String::new(),
        })
    }
}
