//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. Refuse ZIP64 and multi-disk layouts instead of mis-reading them
//! 3. Read the Central Directory to get metadata for all files
//! 4. For extraction, read each file's Local File Header and cross-check it
//!
//! Only the archive tail and the central directory are read up front, which
//! keeps listing cheap for both large local files and HTTP sources.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::sync::Arc;

use crate::error::{Corruption, ZipError};
use crate::io::ReadAt;

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Low-level ZIP file parser.
///
/// Generic over the reader type so the same code serves local files,
/// in-memory buffers and HTTP sources. Usually driven through
/// [`Archive`](super::Archive) rather than directly.
pub struct ZipParser<R: ReadAt> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
}

impl<R: ReadAt> ZipParser<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Handles both the simple case (no comment) and archives with a
    /// comment by scanning backwards for the signature, never further than
    /// the longest possible comment.
    ///
    /// # Returns
    ///
    /// A tuple of (EOCD record, offset of EOCD in file).
    ///
    /// # Errors
    ///
    /// [`ZipError::MalformedArchive`] if no EOCD exists in the trailing
    /// window.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64), ZipError> {
        let eocd_size = EndOfCentralDirectory::SIZE as u64;
        if self.size < eocd_size {
            return Err(ZipError::malformed(
                0,
                format!("file is {} bytes, too small to be a ZIP archive", self.size),
            ));
        }

        // Common case: no archive comment, EOCD is the last 22 bytes.
        let offset = self.size - eocd_size;
        let buf = self
            .reader
            .read_vec_at(offset, EndOfCentralDirectory::SIZE)
            .await?;
        if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && buf[20..22] == [0, 0] {
            let eocd = EndOfCentralDirectory::from_bytes(&buf, offset)?;
            return Ok((eocd, offset));
        }

        let search_size = (MAX_COMMENT_SIZE + eocd_size).min(self.size);
        let search_start = self.size - search_size;
        log::debug!("EOCD not at tail, scanning {search_size} bytes from {search_start}");

        let buf = self
            .reader
            .read_vec_at(search_start, search_size as usize)
            .await?;

        // Walk backwards from the last position a full record fits.
        let last = buf.len() - EndOfCentralDirectory::SIZE;
        for i in (0..=last).rev() {
            if &buf[i..i + 4] != EndOfCentralDirectory::SIGNATURE {
                continue;
            }
            // The declared comment has to fit in what follows the record.
            let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;
            if i + EndOfCentralDirectory::SIZE + comment_len <= buf.len() {
                let offset = search_start + i as u64;
                let eocd = EndOfCentralDirectory::from_bytes(
                    &buf[i..i + EndOfCentralDirectory::SIZE],
                    offset,
                )?;
                return Ok((eocd, offset));
            }
        }

        Err(ZipError::malformed(
            search_start,
            "end of central directory signature not found",
        ))
    }

    /// Parse the Central Directory into entries, in on-disk order.
    pub async fn read_central_directory(
        &self,
    ) -> Result<(Vec<ZipFileEntry>, Vec<u8>), ZipError> {
        let (eocd, eocd_offset) = self.find_eocd().await?;

        if eocd.is_zip64() || self.has_zip64_locator(eocd_offset).await? {
            return Err(ZipError::malformed(
                eocd_offset,
                "ZIP64 archives are not supported",
            ));
        }
        if eocd.is_multi_disk() {
            return Err(ZipError::malformed(
                eocd_offset,
                "multi-disk archives are not supported",
            ));
        }

        let cd_offset = eocd.cd_offset as u64;
        let cd_size = eocd.cd_size as u64;
        if cd_offset + cd_size > eocd_offset {
            return Err(ZipError::malformed(
                eocd_offset,
                format!(
                    "central directory [{cd_offset}, {}) overlaps end record",
                    cd_offset + cd_size
                ),
            ));
        }

        let comment_start = eocd_offset + EndOfCentralDirectory::SIZE as u64;
        let comment_len = (eocd.comment_len as u64).min(self.size - comment_start);
        let comment = self
            .reader
            .read_vec_at(comment_start, comment_len as usize)
            .await?;

        // Read the entire Central Directory in one request
        // (efficient for HTTP as it's a single Range request)
        let cd_data = self.reader.read_vec_at(cd_offset, cd_size as usize).await?;
        log::debug!(
            "central directory: {} entries, {cd_size} bytes at {cd_offset}",
            eocd.total_entries
        );

        let mut entries = Vec::with_capacity(eocd.total_entries as usize);
        let mut cursor = Cursor::new(cd_data.as_slice());
        for _ in 0..eocd.total_entries {
            entries.push(parse_cdfh(&mut cursor, cd_offset)?);
        }

        Ok((entries, comment))
    }

    async fn has_zip64_locator(&self, eocd_offset: u64) -> Result<bool, ZipError> {
        let Some(offset) = eocd_offset.checked_sub(ZIP64_LOCATOR_SIZE as u64) else {
            return Ok(false);
        };
        let sig = self.reader.read_vec_at(offset, 4).await?;
        Ok(sig == ZIP64_LOCATOR_SIGNATURE)
    }

    /// Read the Local File Header of `entry` and compute where its data
    /// begins.
    ///
    /// The name and extra field lengths in the local header may differ from
    /// the central directory's, so the payload offset is only known after
    /// this read.
    pub async fn read_local_header(&self, entry: &ZipFileEntry) -> Result<LocalHeader, ZipError> {
        let offset = entry.lfh_offset;
        let lfh_buf = self.reader.read_vec_at(offset, LFH_SIZE).await?;

        if &lfh_buf[0..4] != LFH_SIGNATURE {
            return Err(ZipError::malformed(
                offset,
                format!("invalid local file header for {}", entry.name()),
            ));
        }

        let mut cursor = Cursor::new(&lfh_buf[4..]);
        let truncated = |_| ZipError::malformed(offset, "truncated local file header");
        let _version_needed = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
        let flags = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
        let method = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
        let _last_mod_time = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
        let _last_mod_date = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
        let crc32 = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        let compressed_size = cursor.read_u32::<LittleEndian>().map_err(truncated)? as u64;
        let uncompressed_size = cursor.read_u32::<LittleEndian>().map_err(truncated)? as u64;
        let file_name_length = cursor.read_u16::<LittleEndian>().map_err(truncated)? as u64;
        let extra_field_length = cursor.read_u16::<LittleEndian>().map_err(truncated)? as u64;

        // Data starts after: LFH (30 bytes) + filename + extra field
        let data_offset = offset + LFH_SIZE as u64 + file_name_length + extra_field_length;

        Ok(LocalHeader {
            data_offset,
            compression_method: CompressionMethod::from_u16(method),
            flags,
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }

    /// Cross-check a local header against its central directory entry.
    ///
    /// With a data descriptor the local CRC and sizes are placeholders, and
    /// the central directory sizes alone decide how much payload to read.
    pub fn check_local_header(
        &self,
        entry: &ZipFileEntry,
        local: &LocalHeader,
    ) -> Result<(), ZipError> {
        let mismatch = |field, central: u64, local: u64| ZipError::CorruptEntry {
            entry: entry.name().into_owned(),
            offset: entry.lfh_offset,
            corruption: Corruption::HeaderMismatch {
                field,
                central,
                local,
            },
        };

        if local.compression_method != entry.compression_method {
            return Err(mismatch(
                "compression method",
                entry.compression_method.as_u16() as u64,
                local.compression_method.as_u16() as u64,
            ));
        }

        if !entry.has_data_descriptor() {
            if local.crc32 != entry.crc32 {
                return Err(mismatch("CRC-32", entry.crc32 as u64, local.crc32 as u64));
            }
            if local.compressed_size != entry.compressed_size {
                return Err(mismatch(
                    "compressed size",
                    entry.compressed_size,
                    local.compressed_size,
                ));
            }
            if local.uncompressed_size != entry.uncompressed_size {
                return Err(mismatch(
                    "uncompressed size",
                    entry.uncompressed_size,
                    local.uncompressed_size,
                ));
            }
        }

        let payload_end = local.data_offset.checked_add(entry.compressed_size);
        if payload_end.is_none_or(|end| end > self.size) {
            return Err(ZipError::OutOfBounds {
                offset: local.data_offset,
                len: entry.compressed_size,
                size: self.size,
            });
        }

        Ok(())
    }

    /// Read the data descriptor that follows an entry's payload, if one fits.
    pub async fn read_data_descriptor(
        &self,
        entry: &ZipFileEntry,
        local: &LocalHeader,
    ) -> Result<Option<DataDescriptor>, ZipError> {
        let offset = local.data_offset + entry.compressed_size;
        let available = self.size.saturating_sub(offset).min(DD_SIZE as u64 + 4);
        if available < DD_SIZE as u64 {
            return Ok(None);
        }
        let buf = self.reader.read_vec_at(offset, available as usize).await?;
        Ok(DataDescriptor::from_bytes(&buf))
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Parse one Central Directory File Header from `cursor`.
///
/// `base` is the archive offset of the cursor's first byte, used to report
/// where a bad record starts.
fn parse_cdfh(cursor: &mut Cursor<&[u8]>, base: u64) -> Result<ZipFileEntry, ZipError> {
    let record_offset = base + cursor.position();
    let truncated = |_| ZipError::malformed(record_offset, "truncated central directory record");

    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig).map_err(truncated)?;
    if sig != CDFH_SIGNATURE {
        return Err(ZipError::malformed(
            record_offset,
            "invalid central directory file header signature",
        ));
    }

    let _version_made_by = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    let _version_needed = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    let flags = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    let compression_method = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    let last_mod_time = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    let last_mod_date = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    let crc32 = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    let compressed_size = cursor.read_u32::<LittleEndian>().map_err(truncated)? as u64;
    let uncompressed_size = cursor.read_u32::<LittleEndian>().map_err(truncated)? as u64;
    let file_name_length = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    let extra_field_length = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    let file_comment_length = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    let _disk_number_start = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    let _internal_attrs = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    let external_attrs = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    let lfh_offset = cursor.read_u32::<LittleEndian>().map_err(truncated)? as u64;

    let mut file_name = vec![0u8; file_name_length as usize];
    cursor.read_exact(&mut file_name).map_err(truncated)?;

    // Skip extra field and comment, both must still lie inside the directory.
    let skip = extra_field_length as u64 + file_comment_length as u64;
    let end = cursor.position() + skip;
    if end > cursor.get_ref().len() as u64 {
        return Err(ZipError::malformed(
            record_offset,
            "truncated central directory record",
        ));
    }
    cursor.set_position(end);

    let is_directory = file_name.ends_with(b"/");

    Ok(ZipFileEntry {
        file_name,
        compression_method: CompressionMethod::from_u16(compression_method),
        flags,
        compressed_size,
        uncompressed_size,
        crc32,
        lfh_offset,
        last_mod_time,
        last_mod_date,
        external_attrs,
        is_directory,
    })
}
