use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{Corruption, ZipError};
use crate::io::ReadAt;
use crate::select::EntryFilter;

use super::archive::Archive;
use super::decoder::EntryReader;
use super::path::resolve_destination;
use super::structures::{LocalHeader, ZipFileEntry};

/// Decompressed bytes moved per write.
const COPY_BUF_SIZE: usize = 64 * 1024;

/// What to do with the rest of the archive after an entry fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failed entry
    #[default]
    Abort,
    /// Keep going and report every failure
    Continue,
}

/// Handling of destination files that already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overwrite {
    #[default]
    Always,
    Never,
}

/// Shared flag checked between entries.
///
/// Entries finished before the flag is raised stay on disk.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Failure notification handed to [`ExtractOptions::on_failure`].
#[derive(Debug)]
pub struct EntryFailure<'a> {
    pub archive: &'a str,
    pub entry: &'a str,
    pub error: &'a ZipError,
}

pub type FailureCallback = Arc<dyn Fn(&EntryFailure<'_>) + Send + Sync>;

/// Knobs for an extraction pass.
#[derive(Clone)]
pub struct ExtractOptions {
    pub failure_policy: FailurePolicy,
    pub overwrite: Overwrite,
    /// Write files by base name and skip directory entries
    pub junk_paths: bool,
    /// Entries extracted concurrently, 1 means sequential
    pub jobs: usize,
    pub filter: EntryFilter,
    pub cancel: CancelFlag,
    pub on_failure: Option<FailureCallback>,
    /// Name used in failure notifications
    pub archive_name: String,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            overwrite: Overwrite::default(),
            junk_paths: false,
            jobs: 1,
            filter: EntryFilter::default(),
            cancel: CancelFlag::default(),
            on_failure: None,
            archive_name: String::new(),
        }
    }
}

impl fmt::Debug for ExtractOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractOptions")
            .field("failure_policy", &self.failure_policy)
            .field("overwrite", &self.overwrite)
            .field("junk_paths", &self.junk_paths)
            .field("jobs", &self.jobs)
            .field("filter", &self.filter)
            .field("cancel", &self.cancel)
            .field("on_failure", &self.on_failure.is_some())
            .field("archive_name", &self.archive_name)
            .finish()
    }
}

impl ExtractOptions {
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn overwrite(mut self, overwrite: Overwrite) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn junk_paths(mut self, junk: bool) -> Self {
        self.junk_paths = junk;
        self
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn filter(mut self, filter: EntryFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn on_failure<F>(mut self, callback: F) -> Self
    where
        F: Fn(&EntryFailure<'_>) + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(callback));
        self
    }

    pub fn archive_name(mut self, name: impl Into<String>) -> Self {
        self.archive_name = name.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    /// Destination exists and overwriting is off
    #[error("file exists")]
    Exists,
    /// Directory entry dropped by junk-path mode
    #[error("directory skipped, paths are junked")]
    JunkedDirectory,
}

#[derive(Debug)]
pub enum EntryOutcome {
    Extracted { bytes: u64 },
    /// Decoded and checked without writing anything
    Verified { bytes: u64 },
    Directory,
    Skipped(SkipReason),
    Failed(ZipError),
}

impl EntryOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, EntryOutcome::Failed(_))
    }
}

/// Outcome of one entry.
#[derive(Debug)]
pub struct ExtractionResult {
    /// Position in the central directory
    pub index: usize,
    pub name: String,
    pub outcome: EntryOutcome,
}

/// Per-entry results of a pass, in central directory order.
#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub results: Vec<ExtractionResult>,
    /// Stopped by the cancel flag
    pub cancelled: bool,
    /// Stopped by a failure under [`FailurePolicy::Abort`]
    pub aborted: bool,
}

impl ExtractionReport {
    pub fn failures(&self) -> impl Iterator<Item = (&ExtractionResult, &ZipError)> {
        self.results.iter().filter_map(|r| match &r.outcome {
            EntryOutcome::Failed(e) => Some((r, e)),
            _ => None,
        })
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    /// Every selected entry was handled and none failed.
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failure_count() == 0
    }

    /// Sum of bytes written (or verified) for file entries.
    pub fn bytes_written(&self) -> u64 {
        self.results
            .iter()
            .map(|r| match r.outcome {
                EntryOutcome::Extracted { bytes } | EntryOutcome::Verified { bytes } => bytes,
                _ => 0,
            })
            .sum()
    }

    pub fn files_extracted(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, EntryOutcome::Extracted { .. }))
            .count()
    }

    /// Turn the first failure into an error, for callers that want `?`.
    pub fn into_result(mut self) -> Result<Self, ZipError> {
        if let Some(i) = self.results.iter().position(|r| r.outcome.is_failed()) {
            if let EntryOutcome::Failed(e) = self.results.remove(i).outcome {
                return Err(e);
            }
        }
        Ok(self)
    }
}

/// Drives extraction of an [`Archive`].
///
/// The extractor shares the read-only archive and keeps no archive state of
/// its own; several passes may run over the same archive.
pub struct ZipExtractor<R: ReadAt> {
    archive: Arc<Archive<R>>,
    options: ExtractOptions,
}

impl<R: ReadAt + 'static> ZipExtractor<R> {
    pub fn new(archive: Arc<Archive<R>>, options: ExtractOptions) -> Self {
        Self { archive, options }
    }

    pub fn archive(&self) -> &Arc<Archive<R>> {
        &self.archive
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// List all entries in the archive
    pub fn list_files(&self) -> &[ZipFileEntry] {
        self.archive.entries()
    }

    /// Decompress `entry` into `out`, checking size and CRC-32.
    pub async fn extract_to_writer<W>(
        &self,
        entry: &ZipFileEntry,
        out: &mut W,
    ) -> Result<u64, ZipError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let (local, mut reader) = self.archive.open_entry(entry).await?;
        copy_verified(&self.archive, entry, &local, &mut reader, out).await
    }

    /// Extract file data to memory
    pub async fn extract_to_memory(&self, entry: &ZipFileEntry) -> Result<Vec<u8>, ZipError> {
        let mut out = Vec::with_capacity(entry.uncompressed_size.min(1 << 20) as usize);
        self.extract_to_writer(entry, &mut out).await?;
        Ok(out)
    }

    /// Extract file to disk
    ///
    /// Nothing is created when the entry cannot be decoded; a partially
    /// written file is removed if decoding or verification fails.
    pub async fn extract_to_file(
        &self,
        entry: &ZipFileEntry,
        output_path: &Path,
    ) -> Result<u64, ZipError> {
        extract_file(&self.archive, entry, output_path).await
    }

    /// Extract every selected entry under `dest`.
    ///
    /// Only failing to create `dest` itself or a task crash is returned as
    /// `Err`; per-entry failures are recorded in the report.
    pub async fn extract_all(&self, dest: &Path) -> Result<ExtractionReport, ZipError> {
        fs::create_dir_all(dest)
            .await
            .map_err(|e| ZipError::io(format!("creating {}", dest.display()), e))?;

        if self.options.jobs > 1 {
            self.extract_parallel(dest).await
        } else {
            Ok(self.extract_sequential(dest).await)
        }
    }

    /// Decode every selected file entry and check it, writing nothing.
    pub async fn verify(&self) -> ExtractionReport {
        let mut report = ExtractionReport::default();

        for (index, entry) in self.selected() {
            if self.options.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let outcome = if entry.is_directory {
                EntryOutcome::Directory
            } else {
                match self.extract_to_writer(entry, &mut tokio::io::sink()).await {
                    Ok(bytes) => EntryOutcome::Verified { bytes },
                    Err(e) => EntryOutcome::Failed(e),
                }
            };

            if self.record(&mut report, index, entry, outcome) {
                break;
            }
        }

        report
    }

    fn selected(&self) -> impl Iterator<Item = (usize, &ZipFileEntry)> {
        self.archive
            .entries()
            .iter()
            .enumerate()
            .filter(|(_, e)| self.options.filter.matches(&e.name()))
    }

    /// Append a result, notify on failure. Returns true when the pass must
    /// stop.
    fn record(
        &self,
        report: &mut ExtractionReport,
        index: usize,
        entry: &ZipFileEntry,
        outcome: EntryOutcome,
    ) -> bool {
        let name = entry.name().into_owned();
        let stop = match &outcome {
            EntryOutcome::Failed(error) => {
                self.notify(&name, error);
                self.options.failure_policy == FailurePolicy::Abort
            }
            _ => false,
        };
        report.results.push(ExtractionResult {
            index,
            name,
            outcome,
        });
        if stop {
            report.aborted = true;
        }
        stop
    }

    fn notify(&self, name: &str, error: &ZipError) {
        log::warn!("{name}: {error}");
        if let Some(callback) = &self.options.on_failure {
            callback(&EntryFailure {
                archive: &self.options.archive_name,
                entry: name,
                error,
            });
        }
    }

    fn destination(&self, dest: &Path, entry: &ZipFileEntry) -> Result<Option<PathBuf>, ZipError> {
        resolve_destination(dest, &entry.file_name, entry.is_directory, self.options.junk_paths)
            .map_err(|reason| ZipError::UnsafePath {
                entry: entry.name().into_owned(),
                reason,
            })
    }

    async fn extract_sequential(&self, dest: &Path) -> ExtractionReport {
        let mut report = ExtractionReport::default();

        for (index, entry) in self.selected() {
            if self.options.cancel.is_cancelled() {
                log::info!("extraction cancelled before {}", entry.name());
                report.cancelled = true;
                break;
            }

            let outcome = match self.destination(dest, entry) {
                Err(e) => EntryOutcome::Failed(e),
                Ok(None) => EntryOutcome::Skipped(SkipReason::JunkedDirectory),
                Ok(Some(path)) if entry.is_directory => create_directory(&path).await,
                Ok(Some(path)) => {
                    extract_entry(&self.archive, entry, &path, self.options.overwrite).await
                }
            };

            if self.record(&mut report, index, entry, outcome) {
                break;
            }
        }

        report
    }

    /// Resolve everything and create all directories first, then extract
    /// files concurrently; payload regions are disjoint and reads are
    /// positional, so tasks share nothing but the archive.
    async fn extract_parallel(&self, dest: &Path) -> Result<ExtractionReport, ZipError> {
        let mut report = ExtractionReport::default();
        let mut pending = Vec::new();

        for (index, entry) in self.selected() {
            if self.options.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let outcome = match self.destination(dest, entry) {
                Err(e) => EntryOutcome::Failed(e),
                Ok(None) => EntryOutcome::Skipped(SkipReason::JunkedDirectory),
                Ok(Some(path)) if entry.is_directory => create_directory(&path).await,
                Ok(Some(path)) => match create_parent(&path).await {
                    Ok(()) => {
                        pending.push((index, path));
                        continue;
                    }
                    Err(e) => EntryOutcome::Failed(e),
                },
            };

            if self.record(&mut report, index, entry, outcome) {
                report.results.sort_by_key(|r| r.index);
                return Ok(report);
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.options.jobs));
        let stop = Arc::new(AtomicBool::new(false));
        let abort_on_failure = self.options.failure_policy == FailurePolicy::Abort;
        let mut tasks = JoinSet::new();

        for (index, path) in pending {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            if stop.load(Ordering::SeqCst) {
                break;
            }
            if self.options.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let archive = Arc::clone(&self.archive);
            let stop = Arc::clone(&stop);
            let overwrite = self.options.overwrite;
            tasks.spawn(async move {
                let _permit = permit;
                let entry = &archive.entries()[index];
                let outcome = extract_entry(&archive, entry, &path, overwrite).await;
                if outcome.is_failed() && abort_on_failure {
                    stop.store(true, Ordering::SeqCst);
                }
                (index, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) = joined.map_err(|e| {
                ZipError::io("extraction task failed", std::io::Error::other(e))
            })?;
            let entry = &self.archive.entries()[index];
            self.record(&mut report, index, entry, outcome);
        }

        report.results.sort_by_key(|r| r.index);
        Ok(report)
    }
}

async fn create_directory(path: &Path) -> EntryOutcome {
    match fs::create_dir_all(path).await {
        Ok(()) => {
            log::debug!("created directory {}", path.display());
            EntryOutcome::Directory
        }
        Err(e) => EntryOutcome::Failed(ZipError::io(
            format!("creating directory {}", path.display()),
            e,
        )),
    }
}

async fn create_parent(path: &Path) -> Result<(), ZipError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ZipError::io(format!("creating directory {}", parent.display()), e))?;
        }
    }
    Ok(())
}

async fn extract_entry<R: ReadAt>(
    archive: &Archive<R>,
    entry: &ZipFileEntry,
    path: &Path,
    overwrite: Overwrite,
) -> EntryOutcome {
    if overwrite == Overwrite::Never {
        match fs::try_exists(path).await {
            Ok(true) => {
                log::info!("skipping {} (file exists)", path.display());
                return EntryOutcome::Skipped(SkipReason::Exists);
            }
            Ok(false) => {}
            Err(e) => {
                return EntryOutcome::Failed(ZipError::io(
                    format!("checking {}", path.display()),
                    e,
                ));
            }
        }
    }

    match extract_file(archive, entry, path).await {
        Ok(bytes) => EntryOutcome::Extracted { bytes },
        Err(e) => EntryOutcome::Failed(e),
    }
}

async fn extract_file<R: ReadAt>(
    archive: &Archive<R>,
    entry: &ZipFileEntry,
    output_path: &Path,
) -> Result<u64, ZipError> {
    // Opening the entry validates method and local header before anything
    // touches the filesystem.
    let (local, mut reader) = archive.open_entry(entry).await?;

    create_parent(output_path).await?;
    let file = fs::File::create(output_path)
        .await
        .map_err(|e| ZipError::io(format!("creating {}", output_path.display()), e))?;
    let mut out = BufWriter::new(file);

    match copy_verified(archive, entry, &local, &mut reader, &mut out).await {
        Ok(bytes) => {
            log::info!("extracted {} ({bytes} bytes)", output_path.display());
            Ok(bytes)
        }
        Err(e) => {
            drop(out);
            if let Err(rm) = fs::remove_file(output_path).await {
                log::debug!("could not remove {}: {rm}", output_path.display());
            }
            Err(e)
        }
    }
}

/// Stream `reader` into `out`, then compare size, CRC-32 and any data
/// descriptor with the central directory.
async fn copy_verified<R, W>(
    archive: &Archive<R>,
    entry: &ZipFileEntry,
    local: &LocalHeader,
    reader: &mut EntryReader<'_, R>,
    out: &mut W,
) -> Result<u64, ZipError>
where
    R: ReadAt,
    W: AsyncWrite + Unpin + Send,
{
    let name = entry.name();
    let write_err = |e| ZipError::io(format!("writing {name}"), e);

    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut hasher = crc32fast::Hasher::new();
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        out.write_all(&buf[..n]).await.map_err(write_err)?;
        total += n as u64;
    }
    out.flush().await.map_err(write_err)?;

    let corrupt = |corruption| ZipError::CorruptEntry {
        entry: name.to_string(),
        offset: entry.lfh_offset,
        corruption,
    };

    if total != entry.uncompressed_size {
        return Err(corrupt(Corruption::Size {
            expected: entry.uncompressed_size,
            actual: total,
        }));
    }
    let actual = hasher.finalize();
    if actual != entry.crc32 {
        return Err(corrupt(Corruption::Checksum {
            expected: entry.crc32,
            actual,
        }));
    }

    if let Some(descriptor) = archive.data_descriptor(entry, local).await? {
        let checks = [
            ("CRC-32", entry.crc32 as u64, descriptor.crc32 as u64),
            ("compressed size", entry.compressed_size, descriptor.compressed_size),
            ("uncompressed size", entry.uncompressed_size, descriptor.uncompressed_size),
        ];
        for (field, central, found) in checks {
            if central != found {
                return Err(corrupt(Corruption::DescriptorMismatch {
                    field,
                    central,
                    descriptor: found,
                }));
            }
        }
    }

    Ok(total)
}
