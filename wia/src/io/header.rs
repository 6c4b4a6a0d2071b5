//! Fixed-layout WIA structures and their validation.

use std::{fmt, mem::size_of};

use zerocopy::{big_endian::*, FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    hashes::verify_hash,
    io::{HashBytes, KeyBytes, MagicBytes},
    static_assert, Error, Result,
};

pub const WIA_MAGIC: MagicBytes = *b"WIA\x01";

/// Archives requiring a newer reader than this are read on a best-effort basis.
pub const WIA_VERSION_WRITE_COMPATIBLE: u32 = 0x01000000;
/// Archives older than this are rejected.
pub const WIA_VERSION_READ_COMPATIBLE: u32 = 0x00080000;

/// Size in bytes of a disc sector.
pub const SECTOR_SIZE: usize = 0x8000;
/// Size in bytes of the hash block at the start of each Wii partition sector.
pub const HASHES_SIZE: usize = 0x400;
/// Size in bytes of the data following the hash block in a Wii partition sector.
pub const SECTOR_DATA_SIZE: usize = SECTOR_SIZE - HASHES_SIZE;
/// Number of sectors sharing one set of H2 hashes (a Wii "group").
pub const HASH_GROUP_SECTORS: usize = 64;
/// Amount of disc data covered by one [`WIAExceptionList`].
pub const EXCEPTION_LIST_SPAN: usize = 0x200000;
/// Size of the disc header copy stored in [`WIADisc`].
pub const DISC_HEAD_SIZE: usize = 0x80;

/// This struct is stored at offset 0x0 and is 0x48 bytes long. The wit source code says its format
/// will never be changed.
#[derive(Clone, Debug, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, align(4))]
pub struct WIAFileHeader {
    /// Always [`WIA_MAGIC`].
    pub magic: MagicBytes,
    /// The WIA format version.
    ///
    /// A short note from the wit source code about how version numbers are encoded:
    ///
    /// ```c
    /// //-----------------------------------------------------
    /// // Format of version number: AABBCCDD = A.BB | A.BB.CC
    /// // If D != 0x00 && D != 0xff => append: 'beta' D
    /// //-----------------------------------------------------
    /// ```
    pub version: U32,
    /// If the reading program supports the version of WIA indicated here, it can read the file.
    ///
    /// [version](Self::version) can be higher than `version_compatible`.
    pub version_compatible: U32,
    /// The size of the [WIADisc] struct.
    pub disc_size: U32,
    /// The SHA-1 hash of the [WIADisc] struct.
    ///
    /// The number of bytes to hash is determined by [disc_size](Self::disc_size).
    pub disc_hash: HashBytes,
    /// The original size of the ISO.
    pub iso_file_size: U64,
    /// The size of this file.
    pub wia_file_size: U64,
    /// The SHA-1 hash of this struct, up to but not including `file_head_hash` itself.
    pub file_head_hash: HashBytes,
}

static_assert!(size_of::<WIAFileHeader>() == 0x48);

impl WIAFileHeader {
    /// Checks the magic, the header's own hash and the version.
    pub fn validate(&self) -> Result<()> {
        if self.magic != WIA_MAGIC {
            return Err(Error::Format(format!("Invalid WIA magic: {:#X?}", self.magic)));
        }
        let bytes = self.as_bytes();
        let hashed = &bytes[..bytes.len() - size_of::<HashBytes>()];
        verify_hash(hashed, &self.file_head_hash, "file header")?;
        let version = self.version.get();
        if version < WIA_VERSION_READ_COMPATIBLE {
            return Err(Error::Format(format!(
                "WIA version {} is not supported (minimum {})",
                version_string(version),
                version_string(WIA_VERSION_READ_COMPATIBLE)
            )));
        }
        let version_compatible = self.version_compatible.get();
        if version_compatible > WIA_VERSION_WRITE_COMPATIBLE {
            log::warn!(
                "WIA version {} requires reader version {}, reading on a best-effort basis",
                version_string(version),
                version_string(version_compatible)
            );
        }
        Ok(())
    }
}

/// Formats a WIA version number the way wit does.
pub fn version_string(version: u32) -> String {
    let [a, b, c, d] = version.to_be_bytes();
    let mut out =
        if c == 0 { format!("{}.{:02x}", a, b) } else { format!("{}.{:02x}.{:02x}", a, b, c) };
    if d != 0 && d != 0xFF {
        out.push_str(&format!(" beta {}", d));
    }
    out
}

/// Disc type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscType {
    /// GameCube disc
    GameCube,
    /// Wii disc
    Wii,
}

impl TryFrom<u32> for DiscType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            1 => Ok(Self::GameCube),
            2 => Ok(Self::Wii),
            v => Err(Error::Format(format!("Invalid disc type {}", v))),
        }
    }
}

impl fmt::Display for DiscType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscType::GameCube => write!(f, "GameCube"),
            DiscType::Wii => write!(f, "Wii"),
        }
    }
}

/// Compression type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Compression {
    /// No compression.
    #[default]
    None,
    /// Non-zero runs stored verbatim. See [WIASegment].
    Purge,
    /// BZIP2 compression
    Bzip2,
    /// LZMA compression
    Lzma,
    /// LZMA2 compression
    Lzma2,
}

impl TryFrom<u32> for Compression {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Purge),
            2 => Ok(Self::Bzip2),
            3 => Ok(Self::Lzma),
            4 => Ok(Self::Lzma2),
            v => Err(Error::Format(format!("Invalid compression type {}", v))),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => write!(f, "None"),
            Compression::Purge => write!(f, "Purge"),
            Compression::Bzip2 => write!(f, "BZIP2"),
            Compression::Lzma => write!(f, "LZMA"),
            Compression::Lzma2 => write!(f, "LZMA2"),
        }
    }
}

/// This struct is stored at offset 0x48, immediately after [WIAFileHeader].
#[derive(Clone, Debug, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, align(4))]
pub struct WIADisc {
    /// The disc type. (1 = GameCube, 2 = Wii)
    pub disc_type: U32,
    /// The compression type.
    pub compression: U32,
    /// The compression level used by the compressor.
    ///
    /// The possible values are compressor-specific. Informational only.
    pub compression_level: I32,
    /// The size of the chunks that data is divided into. Must be a multiple of 2 MiB.
    pub chunk_size: U32,
    /// The first 0x80 bytes of the disc image.
    pub disc_head: [u8; DISC_HEAD_SIZE],
    /// The number of [WIAPartition] structs.
    pub num_partitions: U32,
    /// The size of one [WIAPartition] struct.
    ///
    /// If this is smaller than the size of [WIAPartition], fill the missing bytes with 0x00.
    pub partition_type_size: U32,
    /// The offset in the file where the [WIAPartition] structs are stored (uncompressed).
    pub partition_offset: U64,
    /// The SHA-1 hash of the [WIAPartition] structs.
    ///
    /// The number of bytes to hash is determined by `num_partitions * partition_type_size`.
    pub partition_hash: HashBytes,
    /// The number of [WIARawData] structs.
    pub num_raw_data: U32,
    /// The offset in the file where the [WIARawData] structs are stored (compressed).
    pub raw_data_offset: U64,
    /// The total compressed size of the [WIARawData] structs.
    pub raw_data_size: U32,
    /// The number of [WIAGroup] structs.
    pub num_groups: U32,
    /// The offset in the file where the [WIAGroup] structs are stored (compressed).
    pub group_offset: U64,
    /// The total compressed size of the [WIAGroup] structs.
    pub group_size: U32,
    /// The number of used bytes in the [compr_data](Self::compr_data) array.
    pub compr_data_len: u8,
    /// Compressor specific data.
    ///
    /// If the compression method is [None](Compression::None), [Purge](Compression::Purge) or
    /// [Bzip2](Compression::Bzip2), [compr_data_len](Self::compr_data_len) is 0. If the
    /// compression method is [Lzma](Compression::Lzma) or [Lzma2](Compression::Lzma2), the
    /// compressor specific data is stored in the format used by the 7-Zip SDK.
    ///
    /// For [Lzma](Compression::Lzma), the data is 5 bytes long. The first byte encodes the `lc`,
    /// `pb`, and `lp` parameters, and the four other bytes encode the dictionary size in little
    /// endian. For [Lzma2](Compression::Lzma2), the single byte encodes the dictionary size.
    pub compr_data: [u8; 7],
}

static_assert!(size_of::<WIADisc>() == 0xDC);

/// The smallest [WIADisc] a writer may emit: everything up to the compressor data.
pub const WIA_DISC_MIN_SIZE: usize = size_of::<WIADisc>() - 7;

impl WIADisc {
    /// Validates the struct, given the number of bytes it was read from.
    pub fn validate(&self, stored_size: usize) -> Result<()> {
        DiscType::try_from(self.disc_type.get())?;
        Compression::try_from(self.compression.get())?;
        let compr_data_len = self.compr_data_len as usize;
        if compr_data_len > self.compr_data.len()
            || stored_size < WIA_DISC_MIN_SIZE + compr_data_len
        {
            return Err(Error::Format(format!(
                "Invalid WIA compressor data size {} (disc struct size {})",
                compr_data_len, stored_size
            )));
        }
        let chunk_size = self.chunk_size.get();
        if chunk_size == 0 || chunk_size as usize % EXCEPTION_LIST_SPAN != 0 {
            return Err(Error::Format(format!(
                "WIA chunk size {:#X} is not a multiple of {:#X}",
                chunk_size, EXCEPTION_LIST_SPAN
            )));
        }
        let partition_type_size = self.partition_type_size.get();
        if self.num_partitions.get() != 0 && partition_type_size == 0 {
            return Err(Error::Format("WIA partition type size is 0".to_string()));
        }
        Ok(())
    }

    /// The disc type.
    pub fn disc_type(&self) -> DiscType {
        // Checked by validate
        DiscType::try_from(self.disc_type.get()).unwrap_or(DiscType::GameCube)
    }

    /// The compression method.
    pub fn compression(&self) -> Compression {
        // Checked by validate
        Compression::try_from(self.compression.get()).unwrap_or_default()
    }

    /// The used part of the compressor data.
    pub fn compr_data(&self) -> &[u8] {
        &self.compr_data[..(self.compr_data_len as usize).min(self.compr_data.len())]
    }

    /// Size of a group's data for Wii partition data, where hashes are excluded.
    pub fn partition_chunk_size(&self) -> u64 {
        self.chunk_size.get() as u64 / SECTOR_SIZE as u64 * SECTOR_DATA_SIZE as u64
    }

    /// The number of [WIAExceptionList] structs stored with each partition group.
    pub fn exception_lists_per_group(&self) -> usize {
        (self.chunk_size.get() as usize).div_ceil(EXCEPTION_LIST_SPAN)
    }
}

/// One of the two sub-ranges of a [WIAPartition].
#[derive(Clone, Debug, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, align(4))]
pub struct WIAPartitionData {
    /// The sector on the disc at which this data starts.
    /// One sector is 32 KiB (or 31 KiB excluding hashes).
    pub first_sector: U32,
    /// The number of sectors on the disc covered by this struct.
    /// One sector is 32 KiB (or 31 KiB excluding hashes).
    pub num_sectors: U32,
    /// The index of the first [WIAGroup] struct that points to the data covered by this struct.
    /// The other [WIAGroup] indices follow sequentially.
    pub group_index: U32,
    /// The number of [WIAGroup] structs used for this data.
    pub num_groups: U32,
}

static_assert!(size_of::<WIAPartitionData>() == 0x10);

impl WIAPartitionData {
    /// The first disc sector covered.
    pub fn start_sector(&self) -> u32 { self.first_sector.get() }

    /// The disc sector after the last one covered.
    pub fn end_sector(&self) -> u64 {
        self.first_sector.get() as u64 + self.num_sectors.get() as u64
    }
}

/// This struct is used for keeping track of Wii partition data that on the actual disc is encrypted
/// and hashed. This does not include the unencrypted area at the beginning of partitions that
/// contains the ticket, TMD, certificate chain, and H3 table. So for a typical game partition,
/// `pd[0].first_sector * 0x8000` would be 0x0F820000, not 0x0F800000.
///
/// Wii partition data is stored decrypted and with hashes removed. For each 0x8000 bytes on the
/// disc, 0x7C00 bytes are stored in the WIA file (prior to compression). If the hashes are desired,
/// the reading program must first recalculate the hashes as done when creating a Wii disc image
/// from scratch, and must then apply the hash exceptions which are stored along with the data
/// (see [WIAExceptionList]).
#[derive(Clone, Debug, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, align(4))]
pub struct WIAPartition {
    /// The title key for this partition (128-bit AES). Opaque to this crate.
    pub partition_key: KeyBytes,
    /// To quote the wit source code: `segment 0 is small and defined for management data (boot ..
    /// fst). segment 1 takes the remaining data.`
    pub partition_data: [WIAPartitionData; 2],
}

static_assert!(size_of::<WIAPartition>() == 0x30);

impl WIAPartition {
    /// The disc offset of the partition's data, as passed to the decrypted read functions.
    pub fn data_offset(&self) -> u64 {
        self.partition_data[0].first_sector.get() as u64 * SECTOR_SIZE as u64
    }

    /// The number of disc sectors spanned by both partition data ranges.
    pub fn num_sectors(&self) -> u64 {
        let start = self.partition_data[0].first_sector.get() as u64;
        self.partition_data
            .iter()
            .filter(|pd| pd.num_sectors.get() != 0)
            .map(|pd| pd.end_sector())
            .max()
            .unwrap_or(start)
            .saturating_sub(start)
    }
}

/// This struct is used for keeping track of disc data that is not stored as [WIAPartition].
/// The data is stored as is (other than compression being applied).
///
/// The first [WIARawData] has `raw_data_offset` set to 0x80 and `raw_data_size` set to 0x4FF80,
/// but despite this, it actually contains 0x50000 bytes of data. (However, the first 0x80 bytes
/// should be read from [WIADisc] instead.) This is handled by rounding the offset down to the
/// previous multiple of 0x8000 (and adding the equivalent amount to the size so that the end
/// offset stays the same), not by special casing the first [WIARawData].
#[derive(Clone, Debug, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, align(4))]
pub struct WIARawData {
    /// The offset on the disc at which this data starts.
    pub raw_data_offset: U64,
    /// The number of bytes on the disc covered by this struct.
    pub raw_data_size: U64,
    /// The index of the first [WIAGroup] struct that points to the data covered by this struct.
    /// The other [WIAGroup] indices follow sequentially.
    pub group_index: U32,
    /// The number of [WIAGroup] structs used for this data.
    pub num_groups: U32,
}

static_assert!(size_of::<WIARawData>() == 0x18);

impl WIARawData {
    /// The disc offset at which the data starts, rounded down to a sector boundary.
    pub fn start_offset(&self) -> u64 { self.raw_data_offset.get() & !(SECTOR_SIZE as u64 - 1) }

    /// The disc offset at which the data ends.
    pub fn end_offset(&self) -> u64 {
        self.raw_data_offset.get().saturating_add(self.raw_data_size.get())
    }
}

/// This struct points directly to the actual disc data, stored compressed.
///
/// A [WIAGroup] normally contains chunk_size bytes of decompressed data
/// (or `chunk_size / 0x8000 * 0x7C00` for Wii partition data when not counting hashes), not
/// counting any [WIAExceptionList] structs. However, the last [WIAGroup] of a [WIAPartitionData]
/// or [WIARawData] contains less data than that if `num_sectors * 0x8000` (for [WIAPartitionData])
/// or `raw_data_size` (for [WIARawData]) is not evenly divisible by `chunk_size`.
#[derive(Clone, Debug, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, align(4))]
pub struct WIAGroup {
    /// The offset in the file where the compressed data is stored.
    ///
    /// Stored as a `u32`, divided by 4.
    pub data_offset: U32,
    /// The size of the compressed data, including any [WIAExceptionList] structs. 0 is a special
    /// case meaning that every byte of the decompressed data is 0x00 and the [WIAExceptionList]
    /// structs (if there are supposed to be any) contain 0 exceptions.
    pub data_size: U32,
}

static_assert!(size_of::<WIAGroup>() == 0x8);

impl WIAGroup {
    /// The offset in the file where the compressed data is stored.
    pub fn file_offset(&self) -> u64 { self.data_offset.get() as u64 * 4 }

    /// The size of the stored data, including any exception lists.
    pub fn compressed_size(&self) -> u32 { self.data_size.get() }

    /// Whether the group decompresses to zeros without being stored.
    pub fn is_sparse(&self) -> bool { self.data_size.get() == 0 }
}

/// This struct represents a 20-byte difference between the recalculated hash data and the original
/// hash data. (See also [WIAExceptionList])
///
/// When Dolphin needs to write [WIAException] structs for a padding area which is 32 bytes long,
/// it writes one which covers the first 20 bytes of the padding area and one which covers the last
/// 20 bytes of the padding area, generating 12 bytes of overlap between the [WIAException] structs.
#[derive(Clone, Debug, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, align(2))]
pub struct WIAException {
    /// The offset among the hashes. The offsets 0x0000-0x0400 here map to the offsets 0x0000-0x0400
    /// in the full 2 MiB of data, the offsets 0x0400-0x0800 here map to the offsets 0x8000-0x8400
    /// in the full 2 MiB of data, and so on.
    ///
    /// The offsets start over at 0 for each new [WIAExceptionList].
    pub offset: U16,
    /// The hash that the automatically generated hash at the given offset needs to be replaced
    /// with.
    pub hash: HashBytes,
}

static_assert!(size_of::<WIAException>() == 0x16);

/// Each [WIAGroup] of Wii partition data contains one or more [WIAExceptionList] structs before
/// the actual data, one for each 2 MiB of data in the [WIAGroup]. The number of [WIAExceptionList]
/// structs per [WIAGroup] is always `chunk_size / 0x200000`, even for a [WIAGroup] which contains
/// less data than normal due to it being at the end of a partition.
///
/// For the compression method [Purge](Compression::Purge), the [WIAExceptionList] structs are
/// stored uncompressed (in other words, before the first [WIASegment]). For
/// [Bzip2](Compression::Bzip2), [Lzma](Compression::Lzma) and [Lzma2](Compression::Lzma2), they
/// are compressed along with the rest of the data.
///
/// For the compression methods [None](Compression::None) and [Purge](Compression::Purge), if the
/// end offset of the last [WIAExceptionList] is not evenly divisible by 4, padding is inserted
/// after it so that the data afterwards will start at a 4 byte boundary. This padding is not
/// inserted for the other compression methods.
pub type WIAExceptionList = Box<[WIAException]>;

/// This struct is used by the simple compression method [Purge](Compression::Purge), which stores
/// runs of data verbatim along with their position.
///
/// Each [Purge](Compression::Purge) chunk contains zero or more [WIASegment] structs stored in
/// order of ascending offset, followed by a SHA-1 hash (0x14 bytes) of the [WIAExceptionList]
/// structs (if any) and the [WIASegment] structs. Bytes in the decompressed data that are not
/// covered by any [WIASegment] struct are set to 0x00.
#[derive(Clone, Debug, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, align(4))]
pub struct WIASegment {
    /// The offset of data within the decompressed data.
    ///
    /// Any [WIAExceptionList] structs are not counted as part of the decompressed data.
    pub offset: U32,
    /// The number of bytes of data in this [WIASegment]. The data follows immediately.
    pub size: U32,
}

static_assert!(size_of::<WIASegment>() == 0x8);
