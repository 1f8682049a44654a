//! Main entry point for the zipex CLI application.
//!
//! Opens a ZIP archive from the local filesystem or an HTTP URL and
//! extracts, lists or tests it. Each failure category maps to its own exit
//! code so scripts can tell an unreadable file from a damaged entry.

use anyhow::Context;
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use zipex::cli::{Command, ExtractArgs, is_http_url};
use zipex::{
    Archive, CancelFlag, Cli, EntryOutcome, ExtractionReport, HttpRangeReader, LocalFileReader,
    ReadAt, ZipError, ZipExtractor,
};

/// Why a run did not succeed.
#[derive(Debug, thiserror::Error)]
enum Failure {
    #[error("cannot open archive: {0:#}")]
    Open(anyhow::Error),

    #[error("cannot prepare destination: {0}")]
    Destination(ZipError),

    #[error("{0} of the entries failed")]
    Entries(usize),

    #[error("interrupted, entries extracted so far were kept")]
    Cancelled,
}

impl Failure {
    /// Process status for this failure; 2 is left to clap usage errors.
    fn code(&self) -> u8 {
        match self {
            Failure::Open(_) => 1,
            Failure::Destination(_) => 3,
            Failure::Entries(_) => 4,
            Failure::Cancelled => 130,
        }
    }

    fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            eprintln!("zipex: {failure}");
            failure.exit_code()
        }
    }
}

/// Open the archive source and dispatch the command.
async fn run(command: Command) -> Result<(), Failure> {
    let source = command.archive().to_string();
    let quiet = match &command {
        Command::Extract(args) => args.is_quiet(),
        Command::Test { quiet, .. } => *quiet,
        Command::List { .. } => false,
    };

    if is_http_url(&source) {
        let reader = HttpRangeReader::new(source.clone())
            .await
            .with_context(|| format!("connecting to {source}"))
            .map_err(Failure::Open)?;
        let transferred_before = reader.transferred_bytes();
        let reader = Arc::new(reader);

        let result = process_zip(reader.clone(), command).await;

        // Display network transfer statistics for HTTP sources
        if !quiet {
            let transferred = reader.transferred_bytes() - transferred_before;
            eprintln!("\nTotal bytes transferred: {}", format_size(transferred));
        }
        result
    } else {
        let reader = LocalFileReader::new(Path::new(&source))
            .with_context(|| format!("opening {source}"))
            .map_err(Failure::Open)?;
        process_zip(Arc::new(reader), command).await
    }
}

async fn process_zip<R: ReadAt + 'static>(reader: Arc<R>, command: Command) -> Result<(), Failure> {
    // Central directory failures count as open failures.
    let archive = Archive::open(reader)
        .await
        .context("reading central directory")
        .map_err(Failure::Open)?;
    let archive = Arc::new(archive);

    match command {
        Command::List { verbose, .. } => {
            list_files(&archive, verbose);
            Ok(())
        }
        Command::Test { archive: name, quiet } => test_archive(archive, &name, quiet).await,
        Command::Extract(args) => extract(archive, &args).await,
    }
}

async fn extract<R: ReadAt + 'static>(
    archive: Arc<Archive<R>>,
    args: &ExtractArgs,
) -> Result<(), Failure> {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupt received, stopping after the current entry");
            flag.cancel();
        }
    });

    let options = args.options().cancel_flag(cancel);
    let extractor = ZipExtractor::new(archive, options);

    let destination = Path::new(&args.destination);
    let report = extractor
        .extract_all(destination)
        .await
        .map_err(Failure::Destination)?;

    if !args.is_quiet() {
        print_progress(&report);
    }
    if !args.is_very_quiet() {
        for (result, error) in report.failures() {
            eprintln!("error: {}: {}", result.name, error);
        }
    }

    summarize(&report)
}

async fn test_archive<R: ReadAt + 'static>(
    archive: Arc<Archive<R>>,
    name: &str,
    quiet: bool,
) -> Result<(), Failure> {
    let options = zipex::ExtractOptions::default()
        .failure_policy(zipex::FailurePolicy::Continue)
        .archive_name(name);
    let report = ZipExtractor::new(archive, options).verify().await;

    for result in &report.results {
        match &result.outcome {
            EntryOutcome::Verified { .. } if !quiet => {
                println!("    testing: {:<40} OK", result.name)
            }
            EntryOutcome::Failed(e) => println!("    testing: {:<40} {}", result.name, e),
            _ => {}
        }
    }
    if report.is_success() && !quiet {
        println!("No errors detected in compressed data of {name}.");
    }

    summarize(&report)
}

fn summarize(report: &ExtractionReport) -> Result<(), Failure> {
    match report.failure_count() {
        0 if report.cancelled => Err(Failure::Cancelled),
        0 => Ok(()),
        n => Err(Failure::Entries(n)),
    }
}

fn print_progress(report: &ExtractionReport) {
    for result in &report.results {
        match &result.outcome {
            EntryOutcome::Extracted { .. } => println!("  inflating: {}", result.name),
            EntryOutcome::Directory => println!("   creating: {}", result.name),
            EntryOutcome::Skipped(reason) => {
                eprintln!("Skipping: {} ({reason})", result.name)
            }
            EntryOutcome::Verified { .. } | EntryOutcome::Failed(_) => {}
        }
    }
}

/// List files in the ZIP archive.
///
/// Supports two output formats:
/// - Simple format: Just file names, one per line
/// - Verbose format (`-v`): Detailed table with size, compression ratio and timestamps
fn list_files<R: ReadAt>(archive: &Archive<R>, verbose: bool) {
    if verbose {
        println!(
            "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
            "Length", "Size", "Cmpr", "Date", "Time"
        );
        println!("{}", "-".repeat(70));
    }

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in archive.entries() {
        if !verbose {
            println!("{}", entry.name());
            continue;
        }

        let (year, month, day) = entry.mod_date();
        let (hour, minute, _second) = entry.mod_time();

        println!(
            "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
            entry.uncompressed_size,
            entry.compressed_size,
            ratio(entry.compressed_size, entry.uncompressed_size),
            year,
            month,
            day,
            hour,
            minute,
            entry.name()
        );

        if !entry.is_directory {
            total_uncompressed += entry.uncompressed_size;
            total_compressed += entry.compressed_size;
            file_count += 1;
        }
    }

    if verbose {
        println!("{}", "-".repeat(70));
        println!(
            "{:>10}  {:>10}  {}  {:>21}  {} files",
            total_uncompressed,
            total_compressed,
            ratio(total_compressed, total_uncompressed),
            "",
            file_count
        );
    }
}

/// Compression ratio as percentage saved.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 && compressed <= uncompressed {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "  0%".to_string()
    }
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
