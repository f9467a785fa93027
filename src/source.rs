//! Positional-read capability.
//!
//! The decoder never consumes its source sequentially: it jumps from the
//! archive tail to the almanac and from there to each file's cipher rows.
//! [`ReadAt`] is that capability — a read at an absolute offset that does not
//! disturb any cursor — kept distinct from [`std::io::Read`] on purpose.

use std::fs::File;
use std::io;

use crate::error::{Error, Result};

/// A source supporting reads at absolute offsets.
pub trait ReadAt {
    /// Read into `buf` starting at `offset`, returning the bytes read.
    /// A return of 0 means end of source. Partial reads are permitted.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;
}

impl ReadAt for [u8] {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        if offset >= self.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.len() - offset);
        buf[..n].copy_from_slice(&self[offset..offset + n]);
        Ok(n)
    }
}

#[cfg(unix)]
impl ReadAt for File {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }
}

#[cfg(windows)]
impl ReadAt for File {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(self, buf, offset)
    }
}

impl<T: ReadAt + ?Sized> ReadAt for &T {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_at(offset, buf)
    }
}

/// Fill `buf` completely from `offset`, surfacing a source that runs dry as
/// [`Error::ShortRead`].
pub(crate) fn read_at_full<R: ReadAt + ?Sized>(src: &R, offset: u64, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read_at(offset + filled as u64, &mut buf[filled..]) {
            Ok(0) => return Err(Error::ShortRead),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(Error::ShortRead),
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_reads_at_offsets() {
        let data = b"0123456789";
        let mut buf = [0u8; 4];

        assert_eq!(data[..].read_at(3, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"3456");

        assert_eq!(data[..].read_at(8, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"89");

        assert_eq!(data[..].read_at(10, &mut buf).unwrap(), 0);
    }

    #[test]
    fn read_at_full_flags_short_sources() {
        let data = b"abcdef";
        let mut buf = [0u8; 4];
        read_at_full(&data[..], 2, &mut buf).unwrap();
        assert_eq!(&buf, b"cdef");

        let mut too_much = [0u8; 8];
        assert!(matches!(
            read_at_full(&data[..], 2, &mut too_much),
            Err(Error::ShortRead)
        ));
    }
}
