use std::path::Path;
use std::sync::Arc;

use crate::error::ZipError;
use crate::io::{LocalFileReader, ReadAt};

use super::decoder::{EntryReader, decoder_for};
use super::parser::ZipParser;
use super::structures::{DataDescriptor, LocalHeader, ZipFileEntry};

/// An open ZIP archive.
///
/// Holding an `Archive` means the central directory parsed successfully;
/// the entry list is read once in [`Archive::open`] and never changes.
/// [`Archive::close`] consumes the handle and returns the reader, so nothing
/// can be done with a closed archive except opening it again.
pub struct Archive<R: ReadAt> {
    parser: ZipParser<R>,
    entries: Vec<ZipFileEntry>,
    comment: Vec<u8>,
}

impl<R: ReadAt> Archive<R> {
    /// Parse the central directory of `reader`.
    pub async fn open(reader: Arc<R>) -> Result<Self, ZipError> {
        let parser = ZipParser::new(reader);
        let (entries, comment) = parser.read_central_directory().await?;
        log::debug!("opened archive with {} entries", entries.len());
        Ok(Self {
            parser,
            entries,
            comment,
        })
    }

    /// Entries in central directory order.
    pub fn entries(&self) -> &[ZipFileEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    pub fn by_name(&self, name: &[u8]) -> Option<&ZipFileEntry> {
        self.entries.iter().find(|e| e.file_name == name)
    }

    /// Total archive size in bytes.
    pub fn size(&self) -> u64 {
        self.parser.size()
    }

    /// Read and cross-check the local header of `entry`.
    pub async fn local_header(&self, entry: &ZipFileEntry) -> Result<LocalHeader, ZipError> {
        let local = self.parser.read_local_header(entry).await?;
        self.parser.check_local_header(entry, &local)?;
        Ok(local)
    }

    /// Start decompressing `entry`.
    ///
    /// Method and feature checks happen here, before any byte is produced.
    pub async fn open_entry<'a>(
        &'a self,
        entry: &'a ZipFileEntry,
    ) -> Result<(LocalHeader, EntryReader<'a, R>), ZipError> {
        let decoder = decoder_for(entry)?;
        let local = self.local_header(entry).await?;
        let reader = EntryReader::new(self.parser.reader().as_ref(), entry, &local, decoder);
        Ok((local, reader))
    }

    /// Data descriptor trailing `entry`, when its flags announce one.
    pub async fn data_descriptor(
        &self,
        entry: &ZipFileEntry,
        local: &LocalHeader,
    ) -> Result<Option<DataDescriptor>, ZipError> {
        if !entry.has_data_descriptor() {
            return Ok(None);
        }
        self.parser.read_data_descriptor(entry, local).await
    }

    pub fn reader(&self) -> &Arc<R> {
        self.parser.reader()
    }

    /// Release the archive, handing the reader back for a later re-open.
    pub fn close(self) -> Arc<R> {
        self.parser.reader().clone()
    }
}

impl Archive<LocalFileReader> {
    /// Open an archive from a local path.
    pub async fn open_path(path: &Path) -> Result<Self, ZipError> {
        let reader = LocalFileReader::new(path)
            .map_err(|e| ZipError::io(format!("opening {}", path.display()), e))?;
        Self::open(Arc::new(reader)).await
    }
}
