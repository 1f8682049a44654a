//! Error types shared by the reader, parser and extraction engine.

use std::fmt;
use std::io;

use thiserror::Error;

/// Coarse failure category of a [`ZipError`].
///
/// Callers that only need to branch on the kind of failure (for exit codes,
/// retry decisions and the like) match on this instead of the full error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    OutOfBounds,
    MalformedArchive,
    UnsupportedMethod,
    CorruptEntry,
    UnsafePath,
    IoFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::OutOfBounds => "out of bounds",
            ErrorKind::MalformedArchive => "malformed archive",
            ErrorKind::UnsupportedMethod => "unsupported method",
            ErrorKind::CorruptEntry => "corrupt entry",
            ErrorKind::UnsafePath => "unsafe path",
            ErrorKind::IoFailure => "I/O failure",
        };
        f.write_str(name)
    }
}

/// What exactly was wrong with an entry whose payload did not check out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Corruption {
    #[error("CRC-32 mismatch: expected 0x{expected:08x}, got 0x{actual:08x}")]
    Checksum { expected: u32, actual: u32 },

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    Size { expected: u64, actual: u64 },

    #[error("decompressed data exceeds declared size of {declared} bytes")]
    Overrun { declared: u64 },

    #[error("compressed data ended after {produced} of {declared} bytes")]
    Truncated { declared: u64, produced: u64 },

    #[error("invalid deflate stream: {0}")]
    Deflate(String),

    #[error("stored entry has compressed size {compressed} but uncompressed size {uncompressed}")]
    StoredSize { compressed: u64, uncompressed: u64 },

    #[error("local header {field} is {local}, central directory says {central}")]
    HeaderMismatch {
        field: &'static str,
        central: u64,
        local: u64,
    },

    #[error("data descriptor {field} is {descriptor}, central directory says {central}")]
    DescriptorMismatch {
        field: &'static str,
        central: u64,
        descriptor: u64,
    },
}

/// Why an entry name was refused as a destination path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UnsafePathReason {
    #[error("absolute path")]
    Absolute,
    #[error("path escapes the destination directory")]
    ParentEscape,
    #[error("path contains a NUL byte")]
    NulByte,
    #[error("path component is not a plain name")]
    InvalidComponent,
    #[error("empty file name")]
    Empty,
}

/// Errors produced while reading or extracting an archive.
#[derive(Debug, Error)]
pub enum ZipError {
    #[error("read of {len} bytes at offset {offset} exceeds archive size {size}")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    #[error("malformed archive at offset {offset}: {reason}")]
    MalformedArchive { offset: u64, reason: String },

    #[error("{entry}: unsupported compression method {method}")]
    UnsupportedMethod { entry: String, method: u16 },

    #[error("{entry}: unsupported feature: {feature}")]
    UnsupportedFeature { entry: String, feature: &'static str },

    #[error("{entry}: corrupt entry (local header at {offset}): {corruption}")]
    CorruptEntry {
        entry: String,
        offset: u64,
        corruption: Corruption,
    },

    #[error("{entry}: {reason}")]
    UnsafePath {
        entry: String,
        reason: UnsafePathReason,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl ZipError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        ZipError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        ZipError::MalformedArchive {
            offset,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ZipError::OutOfBounds { .. } => ErrorKind::OutOfBounds,
            ZipError::MalformedArchive { .. } => ErrorKind::MalformedArchive,
            ZipError::UnsupportedMethod { .. } | ZipError::UnsupportedFeature { .. } => {
                ErrorKind::UnsupportedMethod
            }
            ZipError::CorruptEntry { .. } => ErrorKind::CorruptEntry,
            ZipError::UnsafePath { .. } => ErrorKind::UnsafePath,
            ZipError::Io { .. } => ErrorKind::IoFailure,
        }
    }
}
