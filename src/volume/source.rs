//! Byte-offset-addressable access to the voxel data block.
//!
//! The windowed cache only needs one primitive from its backing store:
//! filling a buffer from an absolute byte offset. Plain files provide
//! it by seeking. GZip streams cannot seek, so compressed sources are
//! inflated into memory when opened and windowed from there; coverage
//! and range semantics are identical either way.

use crate::error::Result;
use crate::paths::is_gz_file;
use either::Either;
use flate2::bufread::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

/// A source of voxel data which can serve reads at arbitrary byte
/// offsets.
pub trait ByteSource: Send {
    /// Fill `buf` with the bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// - `ImageError::Io` if the source ends before `buf` is full or
    ///   the underlying read fails.
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;
}

impl<S> ByteSource for S
where
    S: Read + Seek + Send,
{
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let _ = self.seek(SeekFrom::Start(offset))?;
        self.read_exact(buf)?;
        Ok(())
    }
}

/// A seekable window over a plain volume file.
pub type FileSource = BufReader<File>;

/// An in-memory voxel block, used for inflated GZip sources and for
/// volumes generated in memory.
pub type MemSource = Cursor<Vec<u8>>;

/// Either a direct file window or an in-memory block.
pub type AnySource = Either<FileSource, MemSource>;

/// Open the voxel block at `path` for windowed reading.
///
/// Plain files are windowed in place. Files ending in ".gz" are
/// inflated into memory first; byte offsets then address the
/// decompressed stream.
pub fn open_block<P: AsRef<Path>>(path: P) -> Result<AnySource> {
    let file = BufReader::new(File::open(&path)?);
    if is_gz_file(&path) {
        let mut decoder = GzDecoder::new(file);
        let mut block = Vec::new();
        let n = decoder.read_to_end(&mut block)?;
        tracing::debug!("inflated {:?}: {} bytes", path.as_ref(), n);
        Ok(Either::Right(Cursor::new(block)))
    } else {
        Ok(Either::Left(file))
    }
}

#[cfg(test)]
mod tests {
    use super::ByteSource;
    use std::io::Cursor;

    #[test]
    fn cursor_reads_at_offset() {
        let mut src = Cursor::new((0u8..32).collect::<Vec<_>>());
        let mut buf = [0u8; 4];
        src.read_exact_at(10, &mut buf).unwrap();
        assert_eq!(buf, [10, 11, 12, 13]);
        // offsets can go backwards
        src.read_exact_at(0, &mut buf).unwrap();
        assert_eq!(buf, [0, 1, 2, 3]);
    }

    #[test]
    fn truncated_source_fails() {
        let mut src = Cursor::new(vec![1u8, 2, 3]);
        let mut buf = [0u8; 8];
        assert!(src.read_exact_at(0, &mut buf).is_err());
        assert!(src.read_exact_at(100, &mut buf).is_err());
    }
}
