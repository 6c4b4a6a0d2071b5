//! Common stream types

use std::{
    cmp::min,
    io,
    io::{Read, Seek, SeekFrom},
};

use crate::Archive;

/// A [`Read`] + [`Seek`] stream over the disc image of an [`Archive`].
#[derive(Clone)]
pub struct LogicalStream {
    archive: Archive,
    pos: u64,
}

impl LogicalStream {
    /// Creates a stream positioned at the start of the disc image.
    #[inline]
    pub fn new(archive: Archive) -> Self { Self { archive, pos: 0 } }

    /// The size of the disc image.
    #[inline]
    pub fn len(&self) -> u64 { self.archive.disc_size() }

    /// Whether the disc image is empty.
    #[inline]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Returns the underlying archive.
    #[inline]
    pub fn into_inner(self) -> Archive { self.archive }
}

impl Read for LogicalStream {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let size = self.archive.disc_size();
        if self.pos >= size {
            return Ok(0);
        }
        let len = min(buf.len() as u64, size - self.pos) as usize;
        self.archive.read_at(self.pos, &mut buf[..len]).map_err(io::Error::other)?;
        self.pos += len as u64;
        Ok(len)
    }
}

impl Seek for LogicalStream {
    #[inline]
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = match pos {
            SeekFrom::Start(v) => v,
            SeekFrom::End(v) => self.archive.disc_size().saturating_add_signed(v),
            SeekFrom::Current(v) => self.pos.saturating_add_signed(v),
        };
        Ok(self.pos)
    }

    #[inline]
    fn stream_position(&mut self) -> io::Result<u64> { Ok(self.pos) }
}
