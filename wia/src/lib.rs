#![warn(missing_docs, clippy::missing_inline_in_public_items)]
//! Library for random access reads of WIA compressed GameCube and Wii disc images.
//!
//! WIA stores a disc image as a set of fixed-size compressed groups, indexed by tables that map
//! raw disc areas and Wii partition data onto those groups. Wii partition data is stored
//! decrypted with its hash blocks removed, along with the hash bytes that can't be recomputed.
//!
//! Supported compression methods:
//! - None
//! - Purge
//! - BZIP2 (feature `compress-bzip2`)
//! - LZMA and LZMA2 (feature `compress-lzma`)
//!
//! # Examples
//!
//! Opening an archive and reading the disc header:
//!
//! ```no_run
//! let mut archive = wia::Archive::new("path/to/file.wia")
//!     .expect("Failed to open archive");
//! let header = archive.read(0, 0x440)
//!     .expect("Failed to read disc header");
//! println!("Game ID: {}", String::from_utf8_lossy(&header[..6]));
//! ```
//!
//! Writing out the full disc image:
//!
//! ```no_run
//! let archive = wia::Archive::new("path/to/file.wia")
//!     .expect("Failed to open archive");
//! let mut out = std::fs::File::create("output.iso")
//!     .expect("Failed to create output file");
//! std::io::copy(&mut archive.open_stream(), &mut out)
//!     .expect("Failed to write data");
//! ```

use std::path::Path;

pub use hashes::{hash_bytes, HashBlockSource, ZeroHashBlocks};
pub use io::{
    header::{
        version_string, WIADisc, WIAException, WIAFileHeader, WIAGroup, WIAPartition,
        WIAPartitionData, WIARawData, DISC_HEAD_SIZE, HASHES_SIZE, SECTOR_DATA_SIZE, SECTOR_SIZE,
    },
    reader::GroupError,
    ArchiveMeta, ArchiveStream, Compression, DiscType, HashBytes, KeyBytes, MagicBytes,
};
pub use stream::LogicalStream;

mod hashes;
mod io;
mod stream;
mod util;

/// Error types for wia.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The archive is malformed or unsupported.
    #[error("format error: {0}")]
    Format(String),
    /// A stored SHA-1 hash doesn't match the data it covers.
    #[error("{what} hash mismatch: {got}, expected {expected}")]
    HashMismatch {
        /// The hashed structure.
        what: &'static str,
        /// The computed hash, hex encoded.
        got: String,
        /// The stored hash, hex encoded.
        expected: String,
    },
    /// Compressed data failed to decompress.
    #[error("decompression error: {0}")]
    Decompression(String, #[source] std::io::Error),
    /// The archive's tables are inconsistent with each other.
    #[error("index error: {0}")]
    Index(String),
    /// A general I/O error.
    #[error("I/O error: {0}")]
    Io(String, #[source] std::io::Error),
    /// An unknown error.
    #[error("error: {0}")]
    Other(String),
}

impl From<&str> for Error {
    #[inline]
    fn from(s: &str) -> Error { Error::Other(s.to_string()) }
}

impl From<String> for Error {
    #[inline]
    fn from(s: String) -> Error { Error::Other(s) }
}

/// Helper result type for [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Helper trait for adding context to errors.
pub trait ErrorContext {
    /// Adds context to an error.
    fn context(self, context: impl Into<String>) -> Error;
}

impl ErrorContext for std::io::Error {
    #[inline]
    fn context(self, context: impl Into<String>) -> Error { Error::Io(context.into(), self) }
}

/// Helper trait for adding context to result errors.
pub trait ResultContext<T> {
    /// Adds context to a result error.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Adds context to a result error using a closure.
    fn with_context<F>(self, f: F) -> Result<T>
    where F: FnOnce() -> String;
}

impl<T, E> ResultContext<T> for Result<T, E>
where E: ErrorContext
{
    #[inline]
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    #[inline]
    fn with_context<F>(self, f: F) -> Result<T>
    where F: FnOnce() -> String {
        self.map_err(|e| e.context(f()))
    }
}

/// An open WIA archive.
///
/// All tables are read and validated when the archive is opened. Reads take `&mut self`; clone
/// the archive to read from several threads. Clones share the tables and open their own stream.
#[derive(Clone)]
pub struct Archive {
    reader: io::reader::WiaReader,
}

impl Archive {
    /// Opens an archive from a file path.
    #[inline]
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Archive> {
        let stream = io::file::FileStream::new(path.as_ref())?;
        Self::new_stream(Box::new(stream))
    }

    /// Opens an archive from an existing stream.
    #[inline]
    pub fn new_stream(stream: Box<dyn ArchiveStream>) -> Result<Archive> {
        Ok(Archive { reader: io::reader::WiaReader::new(stream)? })
    }

    /// The file header.
    #[inline]
    pub fn header(&self) -> &WIAFileHeader { self.reader.header() }

    /// The disc header, zero-extended if stored shorter.
    #[inline]
    pub fn disc(&self) -> &WIADisc { self.reader.disc() }

    /// The partition table.
    #[inline]
    pub fn partitions(&self) -> &[WIAPartition] { self.reader.partitions() }

    /// The raw data table.
    #[inline]
    pub fn raw_data(&self) -> &[WIARawData] { self.reader.raw_data() }

    /// The group table.
    #[inline]
    pub fn groups(&self) -> &[WIAGroup] { self.reader.groups() }

    /// Summarized archive metadata.
    #[inline]
    pub fn meta(&self) -> ArchiveMeta { self.reader.meta() }

    /// The size of the original disc image.
    #[inline]
    pub fn disc_size(&self) -> u64 { self.reader.disc_size() }

    /// The size of the chunks that disc data is divided into.
    #[inline]
    pub fn chunk_size(&self) -> u32 { self.reader.chunk_size() }

    /// Fills `out` with disc bytes starting at `offset`.
    ///
    /// Areas not covered by raw data, such as Wii partition data, read as zeros.
    #[inline]
    pub fn read_at(&mut self, offset: u64, out: &mut [u8]) -> Result<()> {
        self.reader.read_at(offset, out)
    }

    /// Reads `size` disc bytes starting at `offset`.
    #[inline]
    pub fn read(&mut self, offset: u64, size: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; size];
        self.reader.read_at(offset, &mut out)?;
        Ok(out)
    }

    /// Fills `out` with decrypted partition sectors, hash blocks included.
    ///
    /// `partition_data_offset` is the disc offset of the partition's data (see
    /// [`WIAPartition::data_offset`]) and `offset` is relative to it, counting 0x8000 bytes per
    /// sector. Hash blocks contain only the hash bytes stored in the archive.
    #[inline]
    pub fn read_decrypted_at(
        &mut self,
        offset: u64,
        out: &mut [u8],
        partition_data_offset: u64,
    ) -> Result<()> {
        self.reader.read_decrypted_at(offset, out, partition_data_offset, &mut ZeroHashBlocks)
    }

    /// Reads `size` bytes of decrypted partition sectors. See [`Archive::read_decrypted_at`].
    #[inline]
    pub fn read_decrypted(
        &mut self,
        offset: u64,
        size: usize,
        partition_data_offset: u64,
    ) -> Result<Vec<u8>> {
        let mut out = vec![0u8; size];
        self.read_decrypted_at(offset, &mut out, partition_data_offset)?;
        Ok(out)
    }

    /// Like [`Archive::read_decrypted_at`], with hash blocks computed by `hash_source` before the
    /// stored hash exceptions are applied.
    #[inline]
    pub fn read_decrypted_with(
        &mut self,
        offset: u64,
        out: &mut [u8],
        partition_data_offset: u64,
        hash_source: &mut dyn HashBlockSource,
    ) -> Result<()> {
        self.reader.read_decrypted_at(offset, out, partition_data_offset, hash_source)
    }

    /// Fills `out` with partition data, hash blocks excluded.
    ///
    /// `offset` is relative to the partition's data, counting 0x7C00 bytes per sector.
    #[inline]
    pub fn read_partition_data_at(
        &mut self,
        offset: u64,
        out: &mut [u8],
        partition_data_offset: u64,
    ) -> Result<()> {
        self.reader.read_partition_data_at(offset, out, partition_data_offset)
    }

    /// Reads `size` bytes of partition data. See [`Archive::read_partition_data_at`].
    #[inline]
    pub fn read_partition_data(
        &mut self,
        offset: u64,
        size: usize,
        partition_data_offset: u64,
    ) -> Result<Vec<u8>> {
        let mut out = vec![0u8; size];
        self.reader.read_partition_data_at(offset, &mut out, partition_data_offset)?;
        Ok(out)
    }

    /// Opens a [`Read`](std::io::Read) + [`Seek`](std::io::Seek) stream over the disc image.
    #[inline]
    pub fn open_stream(&self) -> LogicalStream { LogicalStream::new(self.clone()) }

    /// Decompresses every group referenced by the archive's tables in parallel, returning the
    /// groups that failed.
    #[inline]
    pub fn verify_groups(&self) -> Vec<GroupError> { self.reader.verify_groups() }
}
