//! The Purge method: runs of non-zero data stored with their offsets, followed by a SHA-1 trailer.

use std::{cmp::min, io, mem::size_of};

use zerocopy::FromBytes;

use crate::{
    hashes::hash_bytes,
    io::{header::WIASegment, HashBytes},
};

fn invalid_data(msg: String) -> io::Error { io::Error::new(io::ErrorKind::InvalidData, msg) }

/// Streaming decoder over an in-memory Purge window.
///
/// The SHA-1 trailer covers every byte of the window before it, including any uncompressed
/// exception lists at the start. It is checked before any output is produced.
pub struct PurgeDecoder<'a> {
    /// Segment data, excluding the prefix and the hash trailer.
    data: &'a [u8],
    /// Decompressed size.
    size: u64,
    out_pos: u64,
    /// Output offset of the current segment.
    segment_start: u64,
    /// Bytes of the current segment not yet produced.
    segment_remaining: u64,
}

impl<'a> PurgeDecoder<'a> {
    /// Creates a decoder for `window`, whose first `prefix` bytes are not segment data.
    pub fn new(window: &'a [u8], prefix: usize, size: u64) -> io::Result<Self> {
        let hash_offset = window.len().checked_sub(size_of::<HashBytes>()).ok_or_else(|| {
            invalid_data(format!("Purge data too short: {} bytes", window.len()))
        })?;
        if prefix > hash_offset {
            return Err(invalid_data(format!(
                "Purge prefix {:#X} exceeds data size {:#X}",
                prefix, hash_offset
            )));
        }
        let (hashed, expected) = window.split_at(hash_offset);
        if hash_bytes(hashed).as_slice() != expected {
            return Err(invalid_data("Purge data hash mismatch".to_string()));
        }
        Ok(Self {
            data: &hashed[prefix..],
            size,
            out_pos: 0,
            segment_start: 0,
            segment_remaining: 0,
        })
    }

    /// Whether every segment has been consumed.
    #[inline]
    pub fn done(&self) -> bool { self.data.is_empty() }

    fn next_segment(&mut self) -> io::Result<()> {
        let (segment, rest) = WIASegment::read_from_prefix(self.data).map_err(|_| {
            invalid_data(format!(
                "Truncated Purge segment header at output offset {:#X}",
                self.out_pos
            ))
        })?;
        let offset = segment.offset.get() as u64;
        let size = segment.size.get() as u64;
        if offset < self.out_pos {
            return Err(invalid_data(format!(
                "Purge segment at {:#X} overlaps previous data ending at {:#X}",
                offset, self.out_pos
            )));
        }
        if offset + size > self.size {
            return Err(invalid_data(format!(
                "Purge segment {:#X}+{:#X} exceeds decompressed size {:#X}",
                offset, size, self.size
            )));
        }
        if (rest.len() as u64) < size {
            return Err(invalid_data(format!("Truncated Purge segment at {:#X}", offset)));
        }
        self.data = rest;
        self.segment_start = offset;
        self.segment_remaining = size;
        Ok(())
    }
}

impl io::Read for PurgeDecoder<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < buf.len() && self.out_pos < self.size {
            let out = &mut buf[written..];
            let len = if self.out_pos < self.segment_start {
                // Gap before the current segment
                let len = min(self.segment_start - self.out_pos, out.len() as u64) as usize;
                out[..len].fill(0);
                len
            } else if self.segment_remaining > 0 {
                let len = min(self.segment_remaining, out.len() as u64) as usize;
                let (literal, rest) = self.data.split_at(len);
                out[..len].copy_from_slice(literal);
                self.data = rest;
                self.segment_remaining -= len as u64;
                len
            } else if !self.data.is_empty() {
                self.next_segment()?;
                continue;
            } else {
                // Zero tail
                self.segment_start = self.size;
                continue;
            };
            written += len;
            self.out_pos += len as u64;
        }
        Ok(written)
    }
}
