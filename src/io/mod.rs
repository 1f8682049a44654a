mod http;
mod local;
mod memory;

pub use http::HttpRangeReader;
pub use local::LocalFileReader;
pub use memory::MemoryReader;

use async_trait::async_trait;
use std::io;

use crate::error::ZipError;

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Fill `buf` completely from `offset`.
    ///
    /// Fails with [`ZipError::OutOfBounds`] before touching the source when
    /// the requested range does not fit inside it.
    async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), ZipError> {
        let size = self.size();
        let len = buf.len() as u64;
        if offset.checked_add(len).is_none_or(|end| end > size) {
            return Err(ZipError::OutOfBounds { offset, len, size });
        }

        let mut filled = 0;
        while filled < buf.len() {
            let pos = offset + filled as u64;
            let n = match self.read_at(pos, &mut buf[filled..]).await {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ZipError::io(format!("reading at offset {pos}"), e)),
            };
            if n == 0 {
                return Err(ZipError::io(
                    format!("reading at offset {pos}"),
                    io::ErrorKind::UnexpectedEof.into(),
                ));
            }
            filled += n;
        }
        Ok(())
    }

    /// Read `len` bytes at `offset` into a fresh buffer.
    async fn read_vec_at(&self, offset: u64, len: usize) -> Result<Vec<u8>, ZipError> {
        let mut buf = vec![0u8; len];
        self.read_exact_at(offset, &mut buf).await?;
        Ok(buf)
    }
}
