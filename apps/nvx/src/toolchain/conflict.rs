//! PATH shadowing detection.
//!
//! After an activation the runtime executable should resolve to
//! `versions/current/bin`. Another installation earlier in `PATH` (a system
//! package, another version manager) silently wins instead; this module
//! detects that case so the commands can warn about it, and notices when
//! the managed directory is not on the search path at all.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// The managed executable resolves somewhere else first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConflict {
    /// Executable file name, e.g. `node`.
    pub binary: String,
    /// Where the search path resolves it.
    pub found: PathBuf,
    /// Where the active version provides it.
    pub expected: PathBuf,
}

/// How the search path resolves the managed executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStatus {
    /// The managed executable is the one found first.
    Resolved,
    /// Another file with the same name is found first.
    Shadowed(PathConflict),
    /// The executable is not found on the search path at all.
    NotOnPath,
    /// There is no managed executable to compare against.
    Unmanaged,
}

/// Checks how `executable` resolves against `bin_dir` using the process `PATH`.
#[must_use]
pub fn path_status(bin_dir: &Path, executable: &str) -> PathStatus {
    let Ok(cwd) = std::env::current_dir() else {
        return PathStatus::Unmanaged;
    };
    path_status_in(bin_dir, executable, std::env::var_os("PATH"), &cwd)
}

/// Checks how `executable` resolves against `bin_dir` using the given search path.
///
/// Paths are compared after resolving links, so a linked `current` matches
/// its version directory.
#[must_use]
pub fn path_status_in(
    bin_dir: &Path,
    executable: &str,
    search_path: Option<OsString>,
    cwd: &Path,
) -> PathStatus {
    let expected = bin_dir.join(executable);
    if !expected.exists() {
        return PathStatus::Unmanaged;
    }

    let Ok(found) = which::which_in(executable, search_path, cwd) else {
        return PathStatus::NotOnPath;
    };
    if same_file(&found, &expected) {
        return PathStatus::Resolved;
    }

    PathStatus::Shadowed(PathConflict {
        binary: executable.to_string(),
        found,
        expected,
    })
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Formats a user-friendly warning message for a PATH conflict.
#[must_use]
pub fn format_conflict_warning(conflict: &PathConflict) -> String {
    let mut lines = vec![
        "Warning: PATH conflict detected".to_string(),
        format!(
            "  '{}' found at: {}",
            conflict.binary,
            conflict.found.display()
        ),
        format!("  Expected:        {}", conflict.expected.display()),
        String::new(),
        "The active version may not be used. To fix:".to_string(),
    ];

    if let Some(parent) = conflict.found.parent() {
        lines.push(format!("  - Remove {} from your PATH, or", parent.display()));
    }
    if let Some(parent) = conflict.expected.parent() {
        lines.push(format!(
            "  - Ensure {} comes before other paths in $PATH",
            parent.display()
        ));
    }

    lines.join("\n")
}
