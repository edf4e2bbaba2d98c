#![warn(clippy::pedantic)]

//! Integration tests for the nvx CLI.
//!
//! These tests spawn the compiled `nvx` binary and validate its behavior
//! through stdout, stderr, exit codes and the files it leaves on disk.
//!
//! ## Test Strategy
//!
//! 1. **Help and version**: CLI metadata display
//! 2. **Argument validation**: malformed versions fail before any I/O
//! 3. **Configuration**: invalid environment values are reported
//! 4. **Empty state**: `list`, `current`, `use` and `uninstall` with nothing installed
//! 5. **Fetch failures**: unreachable server and missing releases
//! 6. **End to end** (Unix): install, switch, list and uninstall against a
//!    local release server, with both activation strategies
//!
//! ## Test Infrastructure
//!
//! - Uses `assert_cmd` for spawning and asserting on command execution
//! - Uses `assert_fs` for temporary filesystem operations
//! - Uses `predicates` for flexible output matching
//! - Every test runs against its own `NVX_HOME`
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p nvx
//! ```

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::process::Command;

/// Builds an `nvx` command isolated in `home`.
fn nvx(home: &std::path::Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("nvx"));
    cmd.env("NVX_HOME", home)
        .env_remove("NVX_ACTIVATION")
        .env_remove("NVX_WORKERS")
        .env("NVX_DIST_SERVER", "http://127.0.0.1:1");
    cmd
}

/// Starts a minimal HTTP server on a local port that serves `files` by path
/// and answers 404 for anything else. Returns the base URL.
fn serve_releases(files: Vec<(String, Vec<u8>)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let request = String::from_utf8_lossy(&request);
            let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
            match files.iter().find(|(p, _)| *p == path) {
                Some((_, body)) => {
                    let header = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = stream.write_all(header.as_bytes());
                    let _ = stream.write_all(body);
                }
                None => {
                    let _ = stream.write_all(
                        b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    );
                }
            }
        }
    });
    format!("http://{addr}")
}

// -----------------------------------------------------------------------------
// Help and Version
// -----------------------------------------------------------------------------

/// Verifies that `nvx --help` lists the subcommands and environment variables.
///
/// **Expected behavior**: Exit with code 0 and show every subcommand.
#[test]
fn help_lists_commands_and_environment() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("nvx"));
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("use"))
        .stdout(predicate::str::contains("uninstall"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("current"))
        .stdout(predicate::str::contains("NVX_HOME"))
        .stdout(predicate::str::contains("NVX_ACTIVATION"));
}

/// Verifies that `nvx --version` prints the package version.
#[test]
fn version_flag_prints_version() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("nvx"));
    cmd.arg("--version");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

/// Verifies that `nvx install --help` shows the version argument.
#[test]
fn install_help_shows_version_argument() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("nvx"));
    cmd.arg("install").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("VERSION"));
}

/// Verifies that a subcommand is required.
///
/// **Expected behavior**: Exit with non-zero code and print usage.
#[test]
fn missing_subcommand_fails() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("nvx"));

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

// -----------------------------------------------------------------------------
// Argument Validation
// -----------------------------------------------------------------------------

/// Verifies that a malformed version is rejected before anything is created.
///
/// **Expected behavior**: Exit with non-zero code, print the reason and an
/// example, and leave `NVX_HOME` untouched.
#[test]
fn install_rejects_malformed_version() {
    let temp = assert_fs::TempDir::new().unwrap();

    nvx(temp.path())
        .arg("install")
        .arg("20.x.1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid version '20.x.1'"))
        .stderr(predicate::str::contains("Example: 20.5.1"));

    temp.child("versions").assert(predicate::path::missing());
}

/// Verifies that versions longer than eight characters are rejected.
#[test]
fn install_rejects_overlong_version() {
    let temp = assert_fs::TempDir::new().unwrap();

    nvx(temp.path())
        .arg("install")
        .arg("20.11.100")
        .assert()
        .failure()
        .stderr(predicate::str::contains("longer than 8 characters"));
}

/// Verifies that a `v` prefix is not accepted on the command line.
#[test]
fn use_rejects_prefixed_version() {
    let temp = assert_fs::TempDir::new().unwrap();

    nvx(temp.path())
        .arg("use")
        .arg("v20.5.1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected MAJOR.MINOR.PATCH"));
}

// -----------------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------------

/// Verifies that an unknown activation strategy is reported.
#[test]
fn invalid_activation_strategy_is_reported() {
    let temp = assert_fs::TempDir::new().unwrap();

    nvx(temp.path())
        .env("NVX_ACTIVATION", "sideways")
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "invalid value 'sideways' for NVX_ACTIVATION",
        ));
}

/// Verifies that a zero worker count is reported.
#[test]
fn invalid_worker_count_is_reported() {
    let temp = assert_fs::TempDir::new().unwrap();

    nvx(temp.path())
        .env("NVX_WORKERS", "0")
        .arg("current")
        .assert()
        .failure()
        .stderr(predicate::str::contains("NVX_WORKERS"));
}

// -----------------------------------------------------------------------------
// Empty State
// -----------------------------------------------------------------------------

/// Verifies that `nvx list` succeeds with nothing installed.
///
/// **Expected behavior**: Exit with code 0 and say no versions are installed.
#[test]
fn list_with_nothing_installed() {
    let temp = assert_fs::TempDir::new().unwrap();

    nvx(temp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No versions installed."));
}

/// Verifies that `nvx current` succeeds with nothing active.
#[test]
fn current_with_nothing_active() {
    let temp = assert_fs::TempDir::new().unwrap();

    nvx(temp.path())
        .arg("current")
        .assert()
        .success()
        .stdout(predicate::str::contains("No active version."));
}

/// Verifies that activating a version that is not installed fails.
///
/// **Expected behavior**: Exit with non-zero code and suggest `nvx install`.
#[test]
fn use_not_installed_fails() {
    let temp = assert_fs::TempDir::new().unwrap();

    nvx(temp.path())
        .arg("use")
        .arg("18.0.0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not installed"))
        .stderr(predicate::str::contains("nvx install 18.0.0"));
}

/// Verifies that uninstalling a version that is not installed fails.
#[test]
fn uninstall_not_installed_fails() {
    let temp = assert_fs::TempDir::new().unwrap();

    nvx(temp.path())
        .arg("uninstall")
        .arg("18.0.0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Node.js 18.0.0 is not installed."));
}

// -----------------------------------------------------------------------------
// Fetch Failures
// -----------------------------------------------------------------------------

/// Verifies that an unreachable release server produces a single error line.
///
/// **Test setup**: `NVX_DIST_SERVER` points at a closed local port.
///
/// **Expected behavior**: Exit with non-zero code, name the URL, and leave no
/// version directory behind.
#[test]
fn install_with_unreachable_server_fails() {
    let temp = assert_fs::TempDir::new().unwrap();

    nvx(temp.path())
        .arg("install")
        .arg("20.0.0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to install Node.js 20.0.0"))
        .stderr(predicate::str::contains("http://127.0.0.1:1/v20.0.0/"));

    temp.child("versions/v20.0.0")
        .assert(predicate::path::missing());
}

/// Verifies that a missing release is reported with its HTTP status.
#[test]
fn install_missing_release_reports_status() {
    let temp = assert_fs::TempDir::new().unwrap();
    let server = serve_releases(Vec::new());

    nvx(temp.path())
        .env("NVX_DIST_SERVER", &server)
        .arg("install")
        .arg("99.0.0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("404"));

    temp.child("versions/v99.0.0")
        .assert(predicate::path::missing());
}

// -----------------------------------------------------------------------------
// End to End
// -----------------------------------------------------------------------------

#[cfg(unix)]
mod end_to_end {
    use super::*;
    use tar::{Builder, EntryType, Header};
    use xz2::write::XzEncoder;

    fn host_archive_name(version: &str) -> String {
        let tag = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "x64",
            "aarch64" => "arm64",
            other => other,
        };
        format!("node-v{version}-{tag}-{arch}.tar.xz")
    }

    /// Builds a release-shaped tar.xz: `bin/node`, an `npm` link into `lib/`.
    fn release_tar_xz(version: &str) -> Vec<u8> {
        let root = host_archive_name(version).replace(".tar.xz", "");
        let encoder = XzEncoder::new(Vec::new(), 6);
        let mut builder = Builder::new(encoder);

        let add_file = |builder: &mut Builder<XzEncoder<Vec<u8>>>,
                        path: &str,
                        data: &[u8],
                        mode: u32| {
            let mut header = Header::new_gnu();
            header.set_entry_type(EntryType::Regular);
            header.set_size(data.len() as u64);
            header.set_mode(mode);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("{root}/{path}"), data)
                .unwrap();
        };

        let script = format!("#!/bin/sh\necho v{version}\n");
        add_file(&mut builder, "bin/node", script.as_bytes(), 0o755);
        add_file(
            &mut builder,
            "lib/node_modules/npm/bin/npm-cli.js",
            b"console.log('npm')\n",
            0o644,
        );

        let mut link = Header::new_gnu();
        link.set_entry_type(EntryType::Symlink);
        link.set_size(0);
        link.set_mode(0o777);
        builder
            .append_link(
                &mut link,
                format!("{root}/bin/npm"),
                "../lib/node_modules/npm/bin/npm-cli.js",
            )
            .unwrap();

        let encoder = builder.into_inner().unwrap();
        encoder.finish().unwrap()
    }

    fn release_server(versions: &[&str]) -> String {
        serve_releases(
            versions
                .iter()
                .map(|v| {
                    (
                        format!("/v{v}/{}", host_archive_name(v)),
                        release_tar_xz(v),
                    )
                })
                .collect(),
        )
    }

    /// Verifies the full lifecycle with link activation.
    ///
    /// **Test setup**: local release server with two versions, `NVX_ACTIVATION=link`,
    /// and `HOME` pointed at an empty directory.
    ///
    /// **Expected behavior**: the first install activates itself, the second
    /// does not, `use` switches the link, and uninstalling the active version
    /// leaves nothing active.
    #[test]
    fn link_lifecycle() {
        let temp = assert_fs::TempDir::new().unwrap();
        let home = temp.child("home");
        home.create_dir_all().unwrap();
        let nvx_home = temp.child("nvx");
        let server = release_server(&["20.0.0", "18.0.0"]);

        let run = |args: &[&str]| {
            let mut cmd = nvx(nvx_home.path());
            cmd.env("NVX_DIST_SERVER", &server)
                .env("NVX_ACTIVATION", "link")
                .env("NVX_WORKERS", "2")
                .env("HOME", home.path())
                .env("SHELL", "/bin/sh")
                .args(args);
            cmd.assert()
        };

        run(&["install", "20.0.0"])
            .success()
            .stdout(predicate::str::contains("Node.js 20.0.0 installed"))
            .stdout(predicate::str::contains("Now using Node.js 20.0.0."));

        nvx_home
            .child("versions/v20.0.0/bin/node")
            .assert(predicate::path::is_file());
        nvx_home
            .child("versions/v20.0.0/lib/node_modules/npm/bin/npm-cli.js")
            .assert(predicate::path::is_file());
        let npm = nvx_home.child("versions/v20.0.0/bin/npm");
        assert!(
            std::fs::symlink_metadata(npm.path())
                .unwrap()
                .file_type()
                .is_symlink()
        );
        let current = nvx_home.child("versions/current");
        assert!(
            std::fs::symlink_metadata(current.path())
                .unwrap()
                .file_type()
                .is_symlink()
        );
        nvx_home
            .child("versions/current/bin/node")
            .assert(predicate::str::contains("echo v20.0.0"));
        nvx_home.child("staging/v20.0.0").assert(predicate::path::missing());

        run(&["install", "18.0.0"])
            .success()
            .stdout(predicate::str::contains("Run 'nvx use 18.0.0' to switch from 20.0.0."));

        run(&["list"])
            .success()
            .stdout(predicate::str::contains("  18.0.0\n* 20.0.0    (active)"));

        run(&["use", "18.0.0"])
            .success()
            .stdout(predicate::str::contains("Now using Node.js 18.0.0."));
        nvx_home
            .child("versions/current/bin/node")
            .assert(predicate::str::contains("echo v18.0.0"));

        run(&["use", "18.0.0"])
            .success()
            .stdout(predicate::str::contains("already active"));

        run(&["current"])
            .success()
            .stdout(predicate::str::starts_with("18.0.0 (link:"));

        run(&["uninstall", "18.0.0"])
            .success()
            .stdout(predicate::str::contains("was the active version"))
            .stdout(predicate::str::contains("Run 'nvx use 20.0.0'"));
        nvx_home.child("versions/v18.0.0").assert(predicate::path::missing());
        assert!(std::fs::symlink_metadata(current.path()).is_err());

        run(&["current"])
            .success()
            .stdout(predicate::str::contains("No active version."));

        run(&["install", "20.0.0"])
            .success()
            .stdout(predicate::str::contains("already installed"))
            .stdout(predicate::str::contains("Now using Node.js 20.0.0."));

        assert!(home.path().read_dir().unwrap().next().is_none());
    }

    /// Verifies copy activation and profile publishing.
    ///
    /// **Test setup**: `NVX_ACTIVATION=copy`, `SHELL=/bin/bash` and a `HOME`
    /// containing an empty `.bashrc`.
    ///
    /// **Expected behavior**: `current/bin` holds copies, the version marker
    /// names the active version, and the PATH block is written exactly once
    /// across two activations.
    #[test]
    fn copy_lifecycle_publishes_once() {
        let temp = assert_fs::TempDir::new().unwrap();
        let home = temp.child("home");
        home.create_dir_all().unwrap();
        let bashrc = home.child(".bashrc");
        bashrc.write_str("# user settings\n").unwrap();
        let nvx_home = temp.child("nvx");
        let server = release_server(&["20.0.0", "18.0.0"]);

        let run = |args: &[&str]| {
            let mut cmd = nvx(nvx_home.path());
            cmd.env("NVX_DIST_SERVER", &server)
                .env("NVX_ACTIVATION", "copy")
                .env("HOME", home.path())
                .env("SHELL", "/bin/bash")
                .args(args);
            cmd.assert()
        };

        run(&["install", "20.0.0"])
            .success()
            .stdout(predicate::str::contains("Now using Node.js 20.0.0."))
            .stdout(predicate::str::contains("Added"));

        let current = nvx_home.child("versions/current");
        assert!(std::fs::symlink_metadata(current.path()).unwrap().is_dir());
        current
            .child("bin/node")
            .assert(predicate::str::contains("echo v20.0.0"));
        current
            .child(".nvx-version")
            .assert(predicate::str::diff("20.0.0"));
        current
            .child("bin/npm")
            .assert(predicate::str::contains("console.log('npm')"));

        run(&["install", "18.0.0"]).success();
        run(&["use", "18.0.0"])
            .success()
            .stdout(predicate::str::contains("PATH already configured"));

        current
            .child("bin/node")
            .assert(predicate::str::contains("echo v18.0.0"));
        run(&["current"])
            .success()
            .stdout(predicate::str::starts_with("18.0.0 (copy:"));

        let profile = std::fs::read_to_string(bashrc.path()).unwrap();
        assert!(profile.starts_with("# user settings\n"));
        assert_eq!(profile.matches("# nvx").count(), 1);
        assert!(profile.contains("versions/current/bin:$PATH"));
    }

    /// Verifies that a failed PATH update can be retried.
    ///
    /// **Test setup**: `NVX_ACTIVATION=copy`, `SHELL=/bin/bash`, and a
    /// `.bashrc` that is a directory so the profile cannot be read.
    ///
    /// **Expected behavior**: install keeps the version but reports the
    /// activation failure; once the profile is fixed, `use` activates and
    /// writes the PATH block instead of claiming the version is active.
    #[test]
    fn failed_publish_is_retried_by_use() {
        let temp = assert_fs::TempDir::new().unwrap();
        let home = temp.child("home");
        let bashrc = home.child(".bashrc");
        bashrc.create_dir_all().unwrap();
        let nvx_home = temp.child("nvx");
        let server = release_server(&["20.0.0"]);

        let run = |args: &[&str]| {
            let mut cmd = nvx(nvx_home.path());
            cmd.env("NVX_DIST_SERVER", &server)
                .env("NVX_ACTIVATION", "copy")
                .env("HOME", home.path())
                .env("SHELL", "/bin/bash")
                .args(args);
            cmd.assert()
        };

        run(&["install", "20.0.0"])
            .failure()
            .stdout(predicate::str::contains("Node.js 20.0.0 installed"))
            .stderr(predicate::str::contains(
                "Node.js 20.0.0 is installed but could not be activated",
            ));
        nvx_home
            .child("versions/v20.0.0/bin/node")
            .assert(predicate::path::is_file());
        nvx_home
            .child("versions/current")
            .assert(predicate::path::missing());
        run(&["current"])
            .success()
            .stdout(predicate::str::contains("No active version."));

        std::fs::remove_dir(bashrc.path()).unwrap();
        bashrc.write_str("").unwrap();

        run(&["use", "20.0.0"])
            .success()
            .stdout(predicate::str::contains("Now using Node.js 20.0.0."))
            .stdout(predicate::str::contains("already active").not());
        let profile = std::fs::read_to_string(bashrc.path()).unwrap();
        assert_eq!(profile.matches("# nvx").count(), 1);
    }

    /// Verifies that switching strategy re-activates the same version.
    ///
    /// **Test setup**: version activated with `NVX_ACTIVATION=link`, then
    /// `use` run again with `NVX_ACTIVATION=copy`.
    ///
    /// **Expected behavior**: `current` becomes a copied directory instead of
    /// the command reporting the version as already active.
    #[test]
    fn use_with_other_strategy_rebuilds_current() {
        let temp = assert_fs::TempDir::new().unwrap();
        let home = temp.child("home");
        home.create_dir_all().unwrap();
        home.child(".bashrc").write_str("").unwrap();
        let nvx_home = temp.child("nvx");
        let server = release_server(&["20.0.0"]);

        let run = |strategy: &str, args: &[&str]| {
            let mut cmd = nvx(nvx_home.path());
            cmd.env("NVX_DIST_SERVER", &server)
                .env("NVX_ACTIVATION", strategy)
                .env("HOME", home.path())
                .env("SHELL", "/bin/bash")
                .args(args);
            cmd.assert()
        };

        run("link", &["install", "20.0.0"]).success();
        run("link", &["use", "20.0.0"])
            .success()
            .stdout(predicate::str::contains("already active"));

        run("copy", &["use", "20.0.0"])
            .success()
            .stdout(predicate::str::contains("Now using Node.js 20.0.0."));

        let current = nvx_home.child("versions/current");
        let meta = std::fs::symlink_metadata(current.path()).unwrap();
        assert!(meta.is_dir() && !meta.file_type().is_symlink());
        run("copy", &["current"])
            .success()
            .stdout(predicate::str::starts_with("20.0.0 (copy:"));
    }
}
