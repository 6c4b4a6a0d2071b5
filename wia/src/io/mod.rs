//! WIA file format handling: headers, tables, decompression and reads.

use std::io::{Read, Seek};

use dyn_clone::DynClone;

pub use header::{Compression, DiscType};

pub(crate) mod decompress;
pub(crate) mod file;
pub(crate) mod header;
pub(crate) mod index;
pub(crate) mod purge;
pub(crate) mod reader;

/// SHA-1 hash bytes
pub type HashBytes = [u8; 20];

/// AES key bytes
pub type KeyBytes = [u8; 16];

/// Magic bytes
pub type MagicBytes = [u8; 4];

/// Required trait bounds for reading WIA archives.
pub trait ArchiveStream: Read + Seek + DynClone + Send + Sync {}

impl<T> ArchiveStream for T where T: Read + Seek + DynClone + Send + Sync + ?Sized {}

dyn_clone::clone_trait_object!(ArchiveStream);

/// Metadata about an open archive.
#[derive(Debug, Clone)]
pub struct ArchiveMeta {
    /// The disc type stored in the archive.
    pub disc_type: DiscType,
    /// The compression method used for groups and tables.
    pub compression: Compression,
    /// The compression level recorded by the writer. Informational only.
    pub compression_level: i32,
    /// The size in bytes of the chunks that disc data is divided into.
    pub chunk_size: u32,
    /// The WIA version that wrote the archive.
    pub version: u32,
    /// The minimum WIA version required to read the archive.
    pub version_compatible: u32,
    /// The size of the original disc image.
    pub disc_size: u64,
    /// The archive size recorded in the file header.
    pub archive_size: u64,
    /// The actual length of the archive stream.
    pub stream_len: u64,
    /// The number of partition entries.
    pub num_partitions: u32,
    /// The number of raw data entries.
    pub num_raw_data: u32,
    /// The number of group entries.
    pub num_groups: u32,
}
