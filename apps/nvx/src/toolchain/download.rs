//! Release archive fetching for nvx.
//!
//! The [`ArchiveFetcher`] trait is the boundary to the release server: it
//! turns a version and platform into a byte stream with an optional declared
//! length. [`HttpFetcher`] is the production implementation.
//! [`download_to`] drains a fetched stream into a file.
//!
//! ## Features
//!
//! - Streaming downloads with progress callbacks
//! - Downloads to temporary file, then renames on success
//! - Configurable timeout per request
//!
//! There are no retries. A failed fetch is reported and the user re-runs the
//! command.

use std::future::Future;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::platform::PlatformDescriptor;
use super::version::VersionId;
use crate::errors::NvxError;

/// Environment variable overriding the release server base URL.
pub const DIST_SERVER_ENV: &str = "NVX_DIST_SERVER";

/// Default release server base URL.
pub const DEFAULT_DIST_SERVER: &str = "https://nodejs.org/dist";

/// Request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Minimum interval between progress callback invocations in milliseconds.
const PROGRESS_CALLBACK_INTERVAL_MS: u128 = 250;

/// Progress event emitted during downloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Download has started. `total` is 0 when the server sent no length.
    Started { total: u64 },
    /// Download progress update.
    Progress {
        /// Bytes downloaded so far.
        downloaded: u64,
        /// Current download speed in bytes per second.
        speed: u64,
    },
    /// Download completed successfully.
    Completed,
}

/// Callback type for receiving progress updates during downloads.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// A release archive as handed over by the fetch boundary.
pub struct FetchedArchive {
    /// URL the bytes come from, for error messages.
    pub url: String,
    /// Length announced by the server, if any.
    pub declared_length: Option<u64>,
    pub stream: BoxStream<'static, io::Result<Bytes>>,
}

/// Source of release archives.
pub trait ArchiveFetcher {
    /// Starts fetching the archive for `version` built for `platform`.
    ///
    /// # Errors
    ///
    /// Returns [`NvxError::FetchFailed`] on connection failure or any
    /// non-success status.
    fn fetch(
        &self,
        version: &VersionId,
        platform: PlatformDescriptor,
    ) -> impl Future<Output = Result<FetchedArchive, NvxError>> + Send;
}

/// Builds the release URL, e.g.
/// `https://nodejs.org/dist/v20.11.1/node-v20.11.1-linux-x64.tar.xz`.
#[must_use]
pub fn release_url(base_url: &str, version: &VersionId, platform: PlatformDescriptor) -> String {
    let dir = version.dir_name();
    format!(
        "{}/{dir}/{}",
        base_url.trim_end_matches('/'),
        platform.archive_file_name(&dir)
    )
}

/// Fetches release archives over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFetcher {
    /// Creates a fetcher for the given release server.
    ///
    /// # Errors
    ///
    /// Returns [`NvxError::FetchFailed`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, NvxError> {
        let base_url = base_url.into();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                NvxError::fetch_failed_with_source(&base_url, "failed to create HTTP client", e)
            })?;
        Ok(Self { client, base_url })
    }
}

impl ArchiveFetcher for HttpFetcher {
    async fn fetch(
        &self,
        version: &VersionId,
        platform: PlatformDescriptor,
    ) -> Result<FetchedArchive, NvxError> {
        let url = release_url(&self.base_url, version, platform);
        debug!(%url, "requesting release archive");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| NvxError::fetch_failed_with_source(&url, "request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NvxError::fetch_failed(&url, format!("HTTP {status}")));
        }

        let declared_length = response.content_length();
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(io::Error::other))
            .boxed();

        Ok(FetchedArchive {
            url,
            declared_length,
            stream,
        })
    }
}

/// Writes a fetched archive to `dest`.
///
/// Bytes go to `dest` with a `.tmp` extension first; the file is renamed
/// once the stream ends, and the temporary file is removed on failure.
/// Returns the number of bytes written.
///
/// # Errors
///
/// - [`NvxError::FetchFailed`] if the stream fails or ends short of the declared length
/// - [`NvxError::Io`] if the file cannot be created, written or renamed
pub async fn download_to(
    archive: FetchedArchive,
    dest: &Path,
    callback: ProgressCallback,
) -> Result<u64, NvxError> {
    let temp_path = dest.with_extension("tmp");

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            NvxError::io(format!("Failed to create directory: {}", parent.display()), e)
        })?;
    }

    match stream_to_file(archive, &temp_path, &callback).await {
        Ok(written) => {
            tokio::fs::rename(&temp_path, dest).await.map_err(|e| {
                NvxError::io(
                    format!(
                        "Failed to rename {} to {}",
                        temp_path.display(),
                        dest.display()
                    ),
                    e,
                )
            })?;
            callback(ProgressEvent::Completed);
            Ok(written)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&temp_path).await;
            Err(e)
        }
    }
}

async fn stream_to_file(
    archive: FetchedArchive,
    dest: &Path,
    callback: &ProgressCallback,
) -> Result<u64, NvxError> {
    let FetchedArchive {
        url,
        declared_length,
        mut stream,
    } = archive;

    callback(ProgressEvent::Started {
        total: declared_length.unwrap_or(0),
    });

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| NvxError::io(format!("Failed to create file: {}", dest.display()), e))?;

    let mut downloaded: u64 = 0;
    let start_time = Instant::now();
    let mut last_callback_time = Instant::now();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| NvxError::fetch_failed_with_source(&url, "failed to read response", e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| NvxError::io(format!("Failed to write to {}", dest.display()), e))?;
        downloaded += chunk.len() as u64;

        let now = Instant::now();
        if now.duration_since(last_callback_time).as_millis() >= PROGRESS_CALLBACK_INTERVAL_MS {
            callback(ProgressEvent::Progress {
                downloaded,
                speed: bytes_per_second(downloaded, start_time.elapsed()),
            });
            last_callback_time = now;
        }
    }

    file.flush()
        .await
        .map_err(|e| NvxError::io(format!("Failed to flush {}", dest.display()), e))?;

    if let Some(expected) = declared_length
        && downloaded != expected
    {
        return Err(NvxError::fetch_failed(
            &url,
            format!("received {downloaded} of {expected} bytes"),
        ));
    }

    callback(ProgressEvent::Progress {
        downloaded,
        speed: bytes_per_second(downloaded, start_time.elapsed()),
    });

    Ok(downloaded)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn bytes_per_second(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    }
}

/// Returns a callback that prints a single updating progress line to stdout.
#[must_use]
pub fn text_progress() -> ProgressCallback {
    let total = Arc::new(std::sync::atomic::AtomicU64::new(0));
    Arc::new(move |event| match event {
        ProgressEvent::Started { total: t } => {
            total.store(t, std::sync::atomic::Ordering::Relaxed);
        }
        ProgressEvent::Progress { downloaded, speed } => {
            print_progress(
                downloaded,
                total.load(std::sync::atomic::Ordering::Relaxed),
                speed,
            );
        }
        ProgressEvent::Completed => println!(),
    })
}

/// Prints a simple text-based progress line.
#[allow(clippy::cast_precision_loss)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
fn print_progress(downloaded: u64, total: u64, speed: u64) {
    let percent = if total > 0 {
        (downloaded as f64 / total as f64 * 100.0) as u8
    } else {
        0
    };
    let speed_str = format_speed(speed as f64);
    let downloaded_str = format_bytes(downloaded);
    let total_str = format_bytes(total);

    print!("\r{downloaded_str}/{total_str} ({percent}%) {speed_str}     ");
    let _ = io::stdout().flush();
}

/// Formats bytes into a human-readable string (KB, MB, GB).
fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    #[allow(clippy::cast_precision_loss)]
    let bytes_f = bytes as f64;

    if bytes_f >= GB {
        format!("{:.2} GB", bytes_f / GB)
    } else if bytes_f >= MB {
        format!("{:.2} MB", bytes_f / MB)
    } else if bytes_f >= KB {
        format!("{:.2} KB", bytes_f / KB)
    } else {
        format!("{bytes} B")
    }
}

/// Formats speed (bytes/sec) into a human-readable string.
fn format_speed(speed: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    if speed >= MB {
        format!("{:.2} MB/s", speed / MB)
    } else if speed >= KB {
        format!("{:.2} KB/s", speed / KB)
    } else {
        format!("{speed:.0} B/s")
    }
}
