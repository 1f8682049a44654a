//! # zipex
//!
//! A safe, streaming ZIP extractor.
//!
//! The crate parses the archive layout itself (end of central directory,
//! central directory, local headers, data descriptors), decodes STORED and
//! DEFLATE payloads in bounded chunks and writes them under a destination
//! directory, refusing entry names that would escape it. Archives can be
//! read from the local filesystem, from memory, or from HTTP servers that
//! support Range requests.
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use zipex::{Archive, ExtractOptions, FailurePolicy, ZipExtractor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let archive = Arc::new(Archive::open_path(Path::new("archive.zip")).await?);
//!
//!     let options = ExtractOptions::default().failure_policy(FailurePolicy::Continue);
//!     let extractor = ZipExtractor::new(archive, options);
//!
//!     let report = extractor.extract_all(Path::new("out")).await?;
//!     for (result, error) in report.failures() {
//!         eprintln!("{}: {}", result.name, error);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod select;
pub mod zip;

pub use cli::Cli;
pub use error::{Corruption, ErrorKind, UnsafePathReason, ZipError};
pub use io::{HttpRangeReader, LocalFileReader, MemoryReader, ReadAt};
pub use select::EntryFilter;
pub use zip::{
    Archive, CancelFlag, EntryFailure, EntryOutcome, ExtractOptions, ExtractionReport,
    ExtractionResult, FailurePolicy, Overwrite, ZipExtractor, ZipFileEntry,
};
