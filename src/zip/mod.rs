//! ZIP archive parsing and extraction.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - [`parser`]: Low-level parsing of ZIP structures from raw bytes
//! - [`decoder`]: Stored and DEFLATE decoders plus the lazy [`EntryReader`]
//! - [`path`]: Turning untrusted entry names into safe relative paths
//! - [`archive`]: The open-archive handle
//! - [`extractor`]: The extraction engine and its per-entry report
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! The EOCD is read first (from the end of the file), then the Central
//! Directory. Local headers are only read when an entry is extracted.
//!
//! ## Limitations
//!
//! - Only STORED and DEFLATE entries can be decoded
//! - ZIP64, encrypted and multi-disk archives are detected and refused
//! - Stored permissions and timestamps are not applied to extracted files

mod archive;
mod decoder;
mod extractor;
mod parser;
pub mod path;
mod structures;

pub use archive::Archive;
pub use decoder::{DecodeStep, Decoder, DeflateDecoder, EntryReader, StoredDecoder, decoder_for};
pub use extractor::{
    CancelFlag, EntryFailure, EntryOutcome, ExtractOptions, ExtractionReport, ExtractionResult,
    FailureCallback, FailurePolicy, Overwrite, SkipReason, ZipExtractor,
};
pub use parser::ZipParser;
pub use structures::*;
