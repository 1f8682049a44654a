//! Per-entry decompression.
//!
//! A [`Decoder`] turns compressed bytes into plain bytes one step at a time.
//! [`EntryReader`] drives a decoder with payload chunks pulled from the
//! archive and never yields more than the entry's declared size.

use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{Corruption, ZipError};
use crate::io::ReadAt;

use super::structures::{CompressionMethod, LocalHeader, ZipFileEntry};

/// Compressed bytes fetched from the archive per read.
const CHUNK_SIZE: usize = 64 * 1024;

/// Progress made by one [`Decoder::decode`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeStep {
    pub consumed: usize,
    pub produced: usize,
    /// The decoder saw the end of its stream.
    pub finished: bool,
}

/// A streaming decompressor for one compression method.
pub trait Decoder: Send {
    fn decode(&mut self, input: &[u8], output: &mut [u8]) -> Result<DecodeStep, Corruption>;

    /// Whether the stream carries its own end marker.
    ///
    /// Self-terminating streams that run out of input early are truncated.
    fn self_terminating(&self) -> bool;
}

/// Method 0: bytes are copied verbatim.
#[derive(Debug, Default)]
pub struct StoredDecoder;

impl Decoder for StoredDecoder {
    fn decode(&mut self, input: &[u8], output: &mut [u8]) -> Result<DecodeStep, Corruption> {
        let n = input.len().min(output.len());
        output[..n].copy_from_slice(&input[..n]);
        Ok(DecodeStep {
            consumed: n,
            produced: n,
            finished: false,
        })
    }

    fn self_terminating(&self) -> bool {
        false
    }
}

/// Method 8: raw DEFLATE, no zlib wrapper.
pub struct DeflateDecoder {
    inner: Decompress,
}

impl DeflateDecoder {
    pub fn new() -> Self {
        Self {
            inner: Decompress::new(false),
        }
    }
}

impl Default for DeflateDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for DeflateDecoder {
    fn decode(&mut self, input: &[u8], output: &mut [u8]) -> Result<DecodeStep, Corruption> {
        let before_in = self.inner.total_in();
        let before_out = self.inner.total_out();

        let status = self
            .inner
            .decompress(input, output, FlushDecompress::None)
            .map_err(|e| Corruption::Deflate(e.to_string()))?;

        Ok(DecodeStep {
            consumed: (self.inner.total_in() - before_in) as usize,
            produced: (self.inner.total_out() - before_out) as usize,
            finished: status == Status::StreamEnd,
        })
    }

    fn self_terminating(&self) -> bool {
        true
    }
}

/// Pick the decoder for `entry`, refusing anything we cannot decode.
pub fn decoder_for(entry: &ZipFileEntry) -> Result<Box<dyn Decoder>, ZipError> {
    let name = || entry.name().into_owned();

    if entry.is_encrypted() {
        return Err(ZipError::UnsupportedFeature {
            entry: name(),
            feature: "encryption",
        });
    }
    if entry.has_zip64_sentinel() {
        return Err(ZipError::UnsupportedFeature {
            entry: name(),
            feature: "ZIP64 sizes",
        });
    }

    match entry.compression_method {
        CompressionMethod::Stored => {
            if entry.compressed_size != entry.uncompressed_size {
                return Err(ZipError::CorruptEntry {
                    entry: name(),
                    offset: entry.lfh_offset,
                    corruption: Corruption::StoredSize {
                        compressed: entry.compressed_size,
                        uncompressed: entry.uncompressed_size,
                    },
                });
            }
            Ok(Box::new(StoredDecoder))
        }
        CompressionMethod::Deflate => Ok(Box::new(DeflateDecoder::new())),
        CompressionMethod::Unknown(method) => Err(ZipError::UnsupportedMethod {
            entry: name(),
            method,
        }),
    }
}

/// Lazy, single-pass view of one entry's decompressed bytes.
///
/// Compressed input is fetched on demand and bounded by the central
/// directory's compressed size; output stops at the declared uncompressed
/// size.
pub struct EntryReader<'a, R: ReadAt + ?Sized> {
    reader: &'a R,
    entry: &'a ZipFileEntry,
    decoder: Box<dyn Decoder>,
    /// Next archive offset to fetch
    pos: u64,
    /// One past the last payload byte
    end: u64,
    input: Vec<u8>,
    input_pos: usize,
    produced: u64,
    done: bool,
}

impl<'a, R: ReadAt + ?Sized> EntryReader<'a, R> {
    pub fn new(
        reader: &'a R,
        entry: &'a ZipFileEntry,
        local: &LocalHeader,
        decoder: Box<dyn Decoder>,
    ) -> Self {
        Self {
            reader,
            entry,
            decoder,
            pos: local.data_offset,
            end: local.data_offset + entry.compressed_size,
            input: Vec::new(),
            input_pos: 0,
            produced: 0,
            done: false,
        }
    }

    /// Decompressed bytes handed out so far.
    pub fn produced(&self) -> u64 {
        self.produced
    }

    fn corrupt(&self, corruption: Corruption) -> ZipError {
        ZipError::CorruptEntry {
            entry: self.entry.name().into_owned(),
            offset: self.entry.lfh_offset,
            corruption,
        }
    }

    async fn refill(&mut self) -> Result<(), ZipError> {
        let len = (self.end - self.pos).min(CHUNK_SIZE as u64) as usize;
        self.input.resize(len, 0);
        self.reader.read_exact_at(self.pos, &mut self.input).await?;
        self.pos += len as u64;
        self.input_pos = 0;
        Ok(())
    }

    /// Fill `buf` with the next decompressed bytes.
    ///
    /// Returns `Ok(0)` once the entry is exhausted. `buf` must not be empty.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ZipError> {
        let declared = self.entry.uncompressed_size;

        loop {
            if self.done || buf.is_empty() {
                return Ok(0);
            }

            if self.input_pos == self.input.len() && self.pos < self.end {
                self.refill().await?;
            }
            let input_exhausted = self.input_pos == self.input.len() && self.pos == self.end;

            // Leave room for exactly one byte past the declared size so an
            // overlong stream is caught without decoding all of it.
            let room = (declared - self.produced).saturating_add(1);
            let cap = buf.len().min(usize::try_from(room).unwrap_or(usize::MAX));

            let step = self
                .decoder
                .decode(&self.input[self.input_pos..], &mut buf[..cap])
                .map_err(|c| self.corrupt(c))?;
            self.input_pos += step.consumed;
            self.produced += step.produced as u64;

            if self.produced > declared {
                return Err(self.corrupt(Corruption::Overrun { declared }));
            }

            if step.finished {
                self.done = true;
                let trailing = (self.input.len() - self.input_pos) as u64 + (self.end - self.pos);
                if trailing > 0 {
                    log::debug!(
                        "{}: {trailing} bytes after end of deflate stream",
                        self.entry.name()
                    );
                }
            }

            if step.produced > 0 {
                return Ok(step.produced);
            }

            let input_exhausted =
                input_exhausted || (self.input_pos == self.input.len() && self.pos == self.end);
            if self.done {
                return Ok(0);
            }
            if input_exhausted {
                if self.decoder.self_terminating() {
                    return Err(self.corrupt(Corruption::Truncated {
                        declared,
                        produced: self.produced,
                    }));
                }
                self.done = true;
                return Ok(0);
            }
            if step.consumed == 0 && self.input_pos < self.input.len() {
                return Err(self.corrupt(Corruption::Deflate(
                    "decoder made no progress".to_string(),
                )));
            }
        }
    }
}
