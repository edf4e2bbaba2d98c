//! Concurrent archive extraction for nvx.
//!
//! Release archives are unpacked by a bounded pool of worker threads that
//! share a pre-filled job queue. The calling thread does everything that must
//! happen in order:
//!
//! 1. open the archive (`.tar.xz` is first decompressed to a sibling `.tar`
//!    so workers can seek into it independently)
//! 2. enumerate every entry, rejecting absolute paths and `..` components
//! 3. create directory entries
//! 4. queue one job per file or symbolic link and start the workers
//!
//! Each worker owns its archive handle and a 32 KiB copy buffer. When a job
//! fails the worker records the error and stops; the other workers finish the
//! job they are on, see the cancellation flag, and stop taking new ones. The
//! call returns once every worker has exited, with the first recorded error.
//! Files already written stay on disk.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, warn};
use zip::ZipArchive;

use super::platform::ArchiveFormat;
use crate::errors::NvxError;

/// Size of each worker's private copy buffer.
pub const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Progress sink invoked with `(completed, total)` after each finished job.
pub type ExtractProgress<'a> = &'a (dyn Fn(usize, usize) + Sync);

/// Tuning knobs for [`extract_archive`].
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Worker thread count. Defaults to the number of logical CPUs.
    pub workers: Option<usize>,
    /// Drop a top-level folder shared by every entry
    /// (`node-v20.11.1-linux-x64/bin/node` becomes `bin/node`).
    pub strip_common_root: bool,
}

/// What a successful extraction wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtractionReport {
    pub files: usize,
    pub directories: usize,
    pub links: usize,
    /// Link entries that could not be represented on this host.
    pub skipped: usize,
    pub workers: usize,
}

/// Where a job reads its bytes from.
#[derive(Debug)]
enum EntrySource {
    /// Entry index in a ZIP archive.
    Zip(usize),
    /// Byte range inside a plain tar file.
    Tar { offset: u64, size: u64 },
    /// Symbolic link with the given target.
    Symlink(PathBuf),
}

/// One file or link to materialize. Consumed by exactly one worker.
#[derive(Debug)]
struct ExtractionJob {
    destination: PathBuf,
    mode: Option<u32>,
    source: EntrySource,
}

#[derive(Debug)]
enum EntryKind {
    Directory,
    File,
    Symlink(PathBuf),
}

/// An archive entry after path validation, before root stripping.
#[derive(Debug)]
struct RawEntry {
    path: PathBuf,
    kind: EntryKind,
    mode: Option<u32>,
    source: Option<EntrySource>,
}

/// Random-access view of the archive a worker reads from.
enum ArchiveSource {
    Zip(PathBuf),
    Tar(PathBuf),
}

/// Extracts `archive` into `dest` using a worker pool.
///
/// `dest` is created if needed. An archive without entries succeeds and
/// writes nothing.
///
/// # Errors
///
/// - [`NvxError::ArchiveUnreadable`] if the archive cannot be opened or
///   enumerated; no worker has started and nothing has been written
/// - [`NvxError::UnsafeEntryPath`] if an entry or link target points outside `dest`
/// - [`NvxError::ExtractionFailed`] with the first error any worker recorded
pub fn extract_archive(
    archive: &Path,
    dest: &Path,
    format: ArchiveFormat,
    options: &ExtractOptions,
    progress: ExtractProgress<'_>,
) -> Result<ExtractionReport, NvxError> {
    match format {
        ArchiveFormat::Zip => {
            let entries = enumerate_zip(archive)?;
            run_extraction(
                &ArchiveSource::Zip(archive.to_path_buf()),
                entries,
                dest,
                options,
                progress,
            )
        }
        ArchiveFormat::TarXz => {
            let tar_path = decompressed_path(archive);
            let result = decompress_xz(archive, &tar_path).and_then(|()| {
                let entries = enumerate_tar(&tar_path)?;
                run_extraction(
                    &ArchiveSource::Tar(tar_path.clone()),
                    entries,
                    dest,
                    options,
                    progress,
                )
            });
            let _ = std::fs::remove_file(&tar_path);
            result
        }
    }
}

fn run_extraction(
    source: &ArchiveSource,
    entries: Vec<RawEntry>,
    dest: &Path,
    options: &ExtractOptions,
    progress: ExtractProgress<'_>,
) -> Result<ExtractionReport, NvxError> {
    let strip = if options.strip_common_root {
        find_common_root(entries.iter().map(|e| e.path.as_path()))
    } else {
        None
    };

    std::fs::create_dir_all(dest).map_err(|e| NvxError::extraction_failed(dest, e))?;

    let mut report = ExtractionReport::default();
    let mut jobs = Vec::new();

    for entry in entries {
        let relative = match &strip {
            Some(prefix) => match entry.path.strip_prefix(prefix) {
                Ok(p) if p.as_os_str().is_empty() => continue,
                Ok(p) => p.to_path_buf(),
                Err(_) => entry.path.clone(),
            },
            None => entry.path.clone(),
        };
        let destination = dest.join(&relative);

        match entry.kind {
            EntryKind::Directory => {
                std::fs::create_dir_all(&destination)
                    .map_err(|e| NvxError::extraction_failed(&destination, e))?;
                report.directories += 1;
            }
            EntryKind::Symlink(target) => {
                if !link_stays_inside(&relative, &target) {
                    return Err(NvxError::unsafe_entry_path(format!(
                        "{} -> {}",
                        relative.display(),
                        target.display()
                    )));
                }
                if cfg!(unix) {
                    report.links += 1;
                    jobs.push(ExtractionJob {
                        destination,
                        mode: None,
                        source: EntrySource::Symlink(target),
                    });
                } else {
                    warn!(entry = %relative.display(), "skipping symbolic link entry");
                    report.skipped += 1;
                }
            }
            EntryKind::File => {
                let Some(source) = entry.source else {
                    continue;
                };
                report.files += 1;
                jobs.push(ExtractionJob {
                    destination,
                    mode: entry.mode,
                    source,
                });
            }
        }
    }

    if jobs.is_empty() {
        return Ok(report);
    }

    let total = jobs.len();
    let workers = options
        .workers
        .unwrap_or_else(num_cpus::get)
        .clamp(1, total);
    report.workers = workers;
    debug!(jobs = total, workers, dest = %dest.display(), "starting extraction workers");

    let (job_tx, job_rx) = channel::bounded::<ExtractionJob>(total);
    for job in jobs {
        job_tx.send(job).map_err(|_| {
            NvxError::io("Failed to queue extraction job", io::ErrorKind::BrokenPipe.into())
        })?;
    }
    drop(job_tx);

    let (err_tx, err_rx) = channel::bounded::<NvxError>(total);
    let cancelled = AtomicBool::new(false);
    let completed = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let worker = Worker {
                source,
                jobs: job_rx.clone(),
                errors: err_tx.clone(),
                cancelled: &cancelled,
                completed: &completed,
                total,
                progress,
            };
            scope.spawn(move || worker.run());
        }
    });
    drop(err_tx);

    match err_rx.try_recv() {
        Ok(err) => Err(err),
        Err(_) => Ok(report),
    }
}

struct Worker<'a> {
    source: &'a ArchiveSource,
    jobs: Receiver<ExtractionJob>,
    errors: Sender<NvxError>,
    cancelled: &'a AtomicBool,
    completed: &'a AtomicUsize,
    total: usize,
    progress: ExtractProgress<'a>,
}

/// Per-worker archive handle, opened on first use.
enum OpenSource {
    Zip(ZipArchive<File>),
    Tar(File),
}

impl Worker<'_> {
    fn run(self) {
        let mut handle: Option<OpenSource> = None;
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];

        for job in &self.jobs {
            if self.cancelled.load(Ordering::Acquire) {
                break;
            }
            if let Err(e) = self.extract_one(&job, &mut handle, &mut buf) {
                self.cancelled.store(true, Ordering::Release);
                // Capacity equals the job count, so this never blocks.
                let _ = self
                    .errors
                    .try_send(NvxError::extraction_failed(&job.destination, e));
                break;
            }
            let done = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
            (self.progress)(done, self.total);
        }
    }

    fn extract_one(
        &self,
        job: &ExtractionJob,
        handle: &mut Option<OpenSource>,
        buf: &mut [u8],
    ) -> io::Result<()> {
        if let Some(parent) = job.destination.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match &job.source {
            EntrySource::Symlink(target) => create_symlink(target, &job.destination),
            EntrySource::Zip(index) => {
                let OpenSource::Zip(archive) = self.open(handle)? else {
                    return Err(io::Error::other("archive handle does not match entry"));
                };
                let mut entry = archive.by_index(*index).map_err(io::Error::other)?;
                let mut out = create_destination(&job.destination, job.mode)?;
                copy_with_buffer(&mut entry, &mut out, buf)?;
                out.flush()
            }
            EntrySource::Tar { offset, size } => {
                let OpenSource::Tar(file) = self.open(handle)? else {
                    return Err(io::Error::other("archive handle does not match entry"));
                };
                file.seek(SeekFrom::Start(*offset))?;
                let mut entry = Read::by_ref(file).take(*size);
                let mut out = create_destination(&job.destination, job.mode)?;
                let written = copy_with_buffer(&mut entry, &mut out, buf)?;
                if written != *size {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("entry truncated after {written} of {size} bytes"),
                    ));
                }
                out.flush()
            }
        }
    }

    fn open<'h>(&self, handle: &'h mut Option<OpenSource>) -> io::Result<&'h mut OpenSource> {
        if handle.is_none() {
            let opened = match self.source {
                ArchiveSource::Zip(path) => {
                    OpenSource::Zip(ZipArchive::new(File::open(path)?).map_err(io::Error::other)?)
                }
                ArchiveSource::Tar(path) => OpenSource::Tar(File::open(path)?),
            };
            *handle = Some(opened);
        }
        handle
            .as_mut()
            .ok_or_else(|| io::Error::other("archive handle unavailable"))
    }
}

/// Streams `reader` into `writer` through a caller-owned buffer.
fn copy_with_buffer<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    buf: &mut [u8],
) -> io::Result<u64> {
    let mut written = 0u64;
    loop {
        let n = match reader.read(buf) {
            Ok(0) => return Ok(written),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        written += n as u64;
    }
}

fn create_destination(path: &Path, mode: Option<u32>) -> io::Result<File> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode & 0o777);
    }
    #[cfg(not(unix))]
    let _ = mode;

    options.open(path)
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    match std::fs::symlink_metadata(link) {
        Ok(_) => std::fs::remove_file(link)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn create_symlink(_target: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symbolic link entries are not supported on this platform",
    ))
}

fn enumerate_zip(archive_path: &Path) -> Result<Vec<RawEntry>, NvxError> {
    let file = File::open(archive_path)
        .map_err(|e| NvxError::archive_unreadable(archive_path, e.to_string()))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| NvxError::archive_unreadable(archive_path, e.to_string()))?;

    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive
            .by_index_raw(index)
            .map_err(|e| NvxError::archive_unreadable(archive_path, e.to_string()))?;
        let path = entry
            .enclosed_name()
            .ok_or_else(|| NvxError::unsafe_entry_path(entry.name()))?;
        let path = sanitize_entry_path(&path)?;
        let (kind, source) = if entry.is_dir() {
            (EntryKind::Directory, None)
        } else {
            (EntryKind::File, Some(EntrySource::Zip(index)))
        };
        entries.push(RawEntry {
            path,
            kind,
            mode: entry.unix_mode(),
            source,
        });
    }
    Ok(entries)
}

fn decompressed_path(archive: &Path) -> PathBuf {
    let name = archive
        .file_name()
        .map_or_else(|| "archive".into(), |n| n.to_string_lossy().into_owned());
    archive.with_file_name(format!("{name}.unpacked.tar"))
}

fn decompress_xz(archive_path: &Path, tar_path: &Path) -> Result<(), NvxError> {
    let file = File::open(archive_path)
        .map_err(|e| NvxError::archive_unreadable(archive_path, e.to_string()))?;
    let mut decoder = xz2::read::XzDecoder::new(BufReader::new(file));
    let out = File::create(tar_path).map_err(|e| {
        NvxError::io(format!("Failed to create file: {}", tar_path.display()), e)
    })?;
    let mut out = BufWriter::new(out);
    io::copy(&mut decoder, &mut out)
        .map_err(|e| NvxError::archive_unreadable(archive_path, e.to_string()))?;
    out.flush().map_err(|e| {
        NvxError::io(format!("Failed to write file: {}", tar_path.display()), e)
    })
}

fn enumerate_tar(tar_path: &Path) -> Result<Vec<RawEntry>, NvxError> {
    let unreadable = |e: io::Error| NvxError::archive_unreadable(tar_path, e.to_string());

    let file = File::open(tar_path).map_err(unreadable)?;
    let mut archive = tar::Archive::new(file);
    let mut entries = Vec::new();

    for entry in archive.entries_with_seek().map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let raw_path = entry.path().map_err(unreadable)?.into_owned();
        let path = sanitize_entry_path(&raw_path)?;
        if path.as_os_str().is_empty() {
            continue;
        }
        let header = entry.header();
        let mode = header.mode().ok();
        let entry_type = header.entry_type();

        let (kind, source) = if entry_type.is_dir() {
            (EntryKind::Directory, None)
        } else if entry_type.is_symlink() {
            let target = entry
                .link_name()
                .map_err(unreadable)?
                .ok_or_else(|| {
                    NvxError::archive_unreadable(
                        tar_path,
                        format!("link entry without target: {}", raw_path.display()),
                    )
                })?
                .into_owned();
            (EntryKind::Symlink(target), None)
        } else if entry_type.is_file() {
            let source = EntrySource::Tar {
                offset: entry.raw_file_position(),
                size: entry.size(),
            };
            (EntryKind::File, Some(source))
        } else {
            debug!(entry = %raw_path.display(), ?entry_type, "skipping unsupported tar entry");
            continue;
        };

        entries.push(RawEntry {
            path,
            kind,
            mode,
            source,
        });
    }
    Ok(entries)
}

/// Keeps only normal path components, rejecting anything that could escape
/// the destination directory.
fn sanitize_entry_path(path: &Path) -> Result<PathBuf, NvxError> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(NvxError::unsafe_entry_path(path.display().to_string()));
            }
        }
    }
    Ok(clean)
}

/// Returns whether a relative link target, resolved from the link's own
/// directory, stays inside the extraction root.
fn link_stays_inside(link: &Path, target: &Path) -> bool {
    let mut depth = link.components().count().saturating_sub(1);
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

/// Finds a top-level folder shared by every entry.
///
/// Returns `Some(prefix)` only if all entries start with the same first
/// component AND at least one entry is nested below it, so flat archives
/// keep their files.
fn find_common_root<'a>(paths: impl Iterator<Item = &'a Path>) -> Option<PathBuf> {
    let mut common_root: Option<PathBuf> = None;
    let mut has_nested_entries = false;

    for path in paths {
        if path.components().count() > 1 {
            has_nested_entries = true;
        }
        let first_component = path.components().next()?;
        let root = PathBuf::from(first_component.as_os_str());

        match &common_root {
            None => common_root = Some(root),
            Some(existing) if existing != &root => return None,
            Some(_) => {}
        }
    }

    if has_nested_entries { common_root } else { None }
}
