//! Forward-only byte cursor over any [`Read`] source.
//!
//! The decoder never seeks: every field is read in file order, and the only
//! way to move ahead is to consume bytes. Tracking the position ourselves
//! lets the decoder run on plain byte slices as well as files.

use std::io::{self, Read};

use ggscope_core::{GgufError, Result};

/// Upper bound on speculative preallocation for declared lengths.
///
/// Buffers grow past this only as bytes actually arrive, so a hostile length
/// field cannot force a huge allocation on a short input.
const PREALLOC_LIMIT: u64 = 1 << 20;

/// Counting reader that maps short reads to [`GgufError::Truncated`].
#[derive(Debug)]
pub struct ByteCursor<R> {
    inner: R,
    position: u64,
}

impl<R: Read> ByteCursor<R> {
    /// Wrap a reader positioned at offset zero.
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Run a fixed-width read, reporting a short read as truncation of `what`.
    pub fn read_with<T>(
        &mut self,
        what: &'static str,
        needed: u64,
        read: impl FnOnce(&mut Self) -> io::Result<T>,
    ) -> Result<T> {
        let offset = self.position;
        read(self).map_err(|e| map_read_error(e, what, offset, needed))
    }

    /// Read exactly `len` bytes.
    pub fn read_bytes(&mut self, len: u64, what: &'static str) -> Result<Vec<u8>> {
        let offset = self.position;
        let mut buf = Vec::with_capacity(len.min(PREALLOC_LIMIT) as usize);
        let got = self.by_ref().take(len).read_to_end(&mut buf)?;
        if (got as u64) < len {
            return Err(GgufError::Truncated {
                what,
                offset,
                needed: len,
            });
        }
        Ok(buf)
    }

    /// Consume and discard `len` bytes.
    pub fn skip(&mut self, len: u64, what: &'static str) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        let offset = self.position;
        let skipped = io::copy(&mut self.by_ref().take(len), &mut io::sink())?;
        if skipped < len {
            return Err(GgufError::Truncated {
                what,
                offset,
                needed: len,
            });
        }
        Ok(())
    }
}

impl<R: Read> Read for ByteCursor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

fn map_read_error(err: io::Error, what: &'static str, offset: u64, needed: u64) -> GgufError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        GgufError::Truncated {
            what,
            offset,
            needed,
        }
    } else {
        GgufError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian, ReadBytesExt};
    use ggscope_core::ErrorKind;

    #[test]
    fn test_position_tracks_reads() {
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8, 9];
        let mut cursor = ByteCursor::new(&data[..]);
        let v = cursor
            .read_with("u32", 4, |r| r.read_u32::<LittleEndian>())
            .unwrap();
        assert_eq!(v, u32::from_le_bytes([1, 2, 3, 4]));
        assert_eq!(cursor.position(), 4);

        cursor.skip(2, "gap").unwrap();
        assert_eq!(cursor.position(), 6);

        assert_eq!(cursor.read_bytes(3, "tail").unwrap(), vec![7, 8, 9]);
        assert_eq!(cursor.position(), 9);
    }

    #[test]
    fn test_short_fixed_read_is_truncation() {
        let data = [1u8, 2];
        let mut cursor = ByteCursor::new(&data[..]);
        let err = cursor
            .read_with("u32", 4, |r| r.read_u32::<LittleEndian>())
            .unwrap_err();
        assert!(matches!(
            err,
            GgufError::Truncated {
                what: "u32",
                offset: 0,
                needed: 4
            }
        ));
    }

    #[test]
    fn test_short_bulk_read_is_truncation() {
        let data = [0u8; 10];
        let mut cursor = ByteCursor::new(&data[..]);
        cursor.skip(4, "gap").unwrap();
        let err = cursor.read_bytes(1 << 40, "payload").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedData);
        assert!(matches!(err, GgufError::Truncated { offset: 4, .. }));
    }

    #[test]
    fn test_skip_past_end() {
        let data = [0u8; 3];
        let mut cursor = ByteCursor::new(&data[..]);
        let err = cursor.skip(5, "padding").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedData);
    }

    #[test]
    fn test_zero_length_reads() {
        let mut cursor = ByteCursor::new(&[0u8; 0][..]);
        assert!(cursor.read_bytes(0, "empty").unwrap().is_empty());
        cursor.skip(0, "nothing").unwrap();
        assert_eq!(cursor.position(), 0);
    }
}
