//! A minimal WIA writer for building test archives in memory.
#![allow(dead_code)]

use std::io::Cursor;

use sha1::{Digest, Sha1};
use wia::{Archive, HashBytes};

pub const SECTOR_SIZE: usize = 0x8000;
pub const SECTOR_DATA_SIZE: usize = 0x7C00;
pub const HASHES_SIZE: usize = 0x400;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Codec {
    None,
    Purge,
    Bzip2,
    Lzma,
    Lzma2,
}

impl Codec {
    fn id(self) -> u32 {
        match self {
            Codec::None => 0,
            Codec::Purge => 1,
            Codec::Bzip2 => 2,
            Codec::Lzma => 3,
            Codec::Lzma2 => 4,
        }
    }

    fn compr_data(self) -> &'static [u8] {
        match self {
            // lc=3, lp=0, pb=2, 1 MiB dictionary
            Codec::Lzma => &[0x5D, 0x00, 0x00, 0x10, 0x00],
            // 1 MiB dictionary
            Codec::Lzma2 => &[16],
            _ => &[],
        }
    }

    fn uncompressed_exception_lists(self) -> bool { matches!(self, Codec::None | Codec::Purge) }
}

/// The codecs compiled into the library.
pub fn codecs() -> Vec<Codec> {
    let mut out = vec![Codec::None, Codec::Purge];
    if cfg!(feature = "compress-bzip2") {
        out.push(Codec::Bzip2);
    }
    if cfg!(feature = "compress-lzma") {
        out.push(Codec::Lzma);
        out.push(Codec::Lzma2);
    }
    out
}

pub fn sha1(data: &[u8]) -> HashBytes {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// A Wii partition stored decrypted with its hash blocks removed.
#[derive(Clone, Debug, Default)]
pub struct TestPartition {
    /// (first disc sector, number of sectors) for both sub-ranges.
    pub ranges: [(u32, u32); 2],
    /// Partition data in data space, 0x7C00 bytes per sector starting at `ranges[0].0`.
    pub data: Vec<u8>,
    /// (sector relative to the partition start, offset in its hash block, hash)
    pub exceptions: Vec<(u32, u16, HashBytes)>,
}

impl TestPartition {
    pub fn data_offset(&self) -> u64 { self.ranges[0].0 as u64 * SECTOR_SIZE as u64 }

    pub fn num_sectors(&self) -> u32 {
        let (first, count) = self.ranges[1];
        if count == 0 {
            self.ranges[0].1
        } else {
            first + count - self.ranges[0].0
        }
    }
}

#[derive(Clone, Debug)]
pub struct ArchiveBuilder {
    pub codec: Codec,
    pub chunk_size: u32,
    pub disc_type: u32,
    pub version: u32,
    pub version_compatible: u32,
    /// Declared size of the disc header struct. Bytes past it are still written but not hashed.
    pub disc_header_size: u32,
    /// The logical disc image. Raw data entries take their bytes from here.
    pub disc: Vec<u8>,
    /// (offset, size) of each raw data entry, as stored.
    pub raw: Vec<(u64, u64)>,
    pub partitions: Vec<TestPartition>,
}

impl ArchiveBuilder {
    pub fn new(codec: Codec, disc: Vec<u8>) -> Self {
        let size = disc.len() as u64;
        Self {
            codec,
            chunk_size: 0x200000,
            disc_type: 1,
            version: 0x01000000,
            version_compatible: 0x00090000,
            disc_header_size: 0xDC,
            disc,
            raw: vec![(0x80, size - 0x80)],
            partitions: vec![],
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let num_partitions = self.partitions.len();
        let mut file = vec![0u8; 0x48 + 0xDC + num_partitions * 0x30];
        let mut groups: Vec<(u32, u32)> = vec![];

        let mut raw_table = vec![];
        for &(offset, size) in &self.raw {
            let start = offset & !(SECTOR_SIZE as u64 - 1);
            let end = offset + size;
            let mut data = self.disc[start as usize..end as usize].to_vec();
            if start == 0 {
                // Read from the disc header copy instead
                data[..0x80].fill(0);
            }
            let group_index = groups.len() as u32;
            for chunk in data.chunks(self.chunk_size as usize) {
                let group = self.write_group(&mut file, chunk, None);
                groups.push(group);
            }
            raw_table.extend_from_slice(&offset.to_be_bytes());
            raw_table.extend_from_slice(&size.to_be_bytes());
            raw_table.extend_from_slice(&group_index.to_be_bytes());
            raw_table.extend_from_slice(&(groups.len() as u32 - group_index).to_be_bytes());
        }

        let sectors_per_group = self.chunk_size as usize / SECTOR_SIZE;
        let lists_per_group = self.chunk_size as usize / 0x200000;
        let group_data_size = sectors_per_group * SECTOR_DATA_SIZE;
        let mut partition_table = vec![];
        for part in &self.partitions {
            let base = part.ranges[0].0;
            partition_table.extend_from_slice(&[0x42; 16]);
            for &(first_sector, num_sectors) in &part.ranges {
                let group_index = groups.len() as u32;
                let rel_sector = (first_sector - base.min(first_sector)) as usize;
                let start = rel_sector * SECTOR_DATA_SIZE;
                let data = &part.data[start..start + num_sectors as usize * SECTOR_DATA_SIZE];
                for (g, chunk) in data.chunks(group_data_size).enumerate() {
                    let group_sector = rel_sector + g * sectors_per_group;
                    let group_end = (group_sector + chunk.len() / SECTOR_DATA_SIZE) as u32;
                    let lists = (0..lists_per_group)
                        .map(|k| {
                            let list_sector = (group_sector + k * 64) as u32;
                            let list_end = group_end.min(list_sector + 64);
                            part.exceptions
                                .iter()
                                .filter(|(s, _, _)| *s >= list_sector && *s < list_end)
                                .map(|(s, o, h)| {
                                    ((s - list_sector) as u16 * HASHES_SIZE as u16 + o, *h)
                                })
                                .collect::<Vec<_>>()
                        })
                        .collect::<Vec<_>>();
                    let group = self.write_group(&mut file, chunk, Some(&lists));
                    groups.push(group);
                }
                partition_table.extend_from_slice(&first_sector.to_be_bytes());
                partition_table.extend_from_slice(&num_sectors.to_be_bytes());
                partition_table.extend_from_slice(&group_index.to_be_bytes());
                let num_groups = groups.len() as u32 - group_index;
                partition_table.extend_from_slice(&num_groups.to_be_bytes());
            }
        }
        file[0x124..0x124 + partition_table.len()].copy_from_slice(&partition_table);

        let raw_data_offset = file.len() as u64;
        let raw_data = self.compress(&raw_table, &[]);
        file.extend_from_slice(&raw_data);
        let group_offset = file.len() as u64;
        let mut group_table = vec![];
        for (offset, size) in &groups {
            group_table.extend_from_slice(&offset.to_be_bytes());
            group_table.extend_from_slice(&size.to_be_bytes());
        }
        let group_data = self.compress(&group_table, &[]);
        file.extend_from_slice(&group_data);

        let mut disc = Vec::with_capacity(0xDC);
        disc.extend_from_slice(&self.disc_type.to_be_bytes());
        disc.extend_from_slice(&self.codec.id().to_be_bytes());
        disc.extend_from_slice(&5i32.to_be_bytes());
        disc.extend_from_slice(&self.chunk_size.to_be_bytes());
        disc.extend_from_slice(&self.disc[..0x80]);
        disc.extend_from_slice(&(num_partitions as u32).to_be_bytes());
        disc.extend_from_slice(&0x30u32.to_be_bytes());
        disc.extend_from_slice(&0x124u64.to_be_bytes());
        disc.extend_from_slice(&sha1(&partition_table));
        disc.extend_from_slice(&(self.raw.len() as u32).to_be_bytes());
        disc.extend_from_slice(&raw_data_offset.to_be_bytes());
        disc.extend_from_slice(&(raw_data.len() as u32).to_be_bytes());
        disc.extend_from_slice(&(groups.len() as u32).to_be_bytes());
        disc.extend_from_slice(&group_offset.to_be_bytes());
        disc.extend_from_slice(&(group_data.len() as u32).to_be_bytes());
        let compr_data = self.codec.compr_data();
        disc.push(compr_data.len() as u8);
        disc.extend_from_slice(compr_data);
        disc.resize(0xDC, 0);
        file[0x48..0x124].copy_from_slice(&disc);

        let mut header = Vec::with_capacity(0x48);
        header.extend_from_slice(b"WIA\x01");
        header.extend_from_slice(&self.version.to_be_bytes());
        header.extend_from_slice(&self.version_compatible.to_be_bytes());
        header.extend_from_slice(&self.disc_header_size.to_be_bytes());
        header.extend_from_slice(&sha1(&disc[..self.disc_header_size as usize]));
        header.extend_from_slice(&(self.disc.len() as u64).to_be_bytes());
        header.extend_from_slice(&(file.len() as u64).to_be_bytes());
        let hash = sha1(&header);
        header.extend_from_slice(&hash);
        file[..0x48].copy_from_slice(&header);
        file
    }

    pub fn open(&self) -> Archive { open_bytes(self.build()).expect("Failed to open archive") }

    fn write_group(
        &self,
        file: &mut Vec<u8>,
        data: &[u8],
        exception_lists: Option<&[Vec<(u16, HashBytes)>]>,
    ) -> (u32, u32) {
        let lists = exception_lists.unwrap_or(&[]);
        if data.iter().all(|&b| b == 0) && lists.iter().all(|l| l.is_empty()) {
            return (0, 0);
        }
        let mut list_bytes = vec![];
        for list in lists {
            list_bytes.extend_from_slice(&(list.len() as u16).to_be_bytes());
            for (offset, hash) in list {
                list_bytes.extend_from_slice(&offset.to_be_bytes());
                list_bytes.extend_from_slice(hash);
            }
        }
        let stored = if self.codec.uncompressed_exception_lists() {
            if !lists.is_empty() {
                list_bytes.resize(list_bytes.len().next_multiple_of(4), 0);
            }
            self.compress(data, &list_bytes)
        } else {
            list_bytes.extend_from_slice(data);
            self.compress(&list_bytes, &[])
        };
        file.resize(file.len().next_multiple_of(4), 0);
        let offset = file.len();
        file.extend_from_slice(&stored);
        ((offset / 4) as u32, stored.len() as u32)
    }

    /// Compresses `data`, placing `prefix` uncompressed before it.
    fn compress(&self, data: &[u8], prefix: &[u8]) -> Vec<u8> {
        match self.codec {
            Codec::None => [prefix, data].concat(),
            Codec::Purge => purge_encode(data, prefix),
            Codec::Bzip2 => {
                assert!(prefix.is_empty());
                bzip2_encode(data)
            }
            Codec::Lzma | Codec::Lzma2 => {
                assert!(prefix.is_empty());
                lzma_encode(data, self.codec == Codec::Lzma2)
            }
        }
    }
}

/// Recomputes both header hashes after the headers of `file` were edited.
pub fn rehash_headers(file: &mut [u8]) {
    let disc_header_size = u32::from_be_bytes(file[0x0C..0x10].try_into().unwrap()) as usize;
    let disc_hash = sha1(&file[0x48..0x48 + disc_header_size]);
    file[0x10..0x24].copy_from_slice(&disc_hash);
    let header_hash = sha1(&file[..0x34]);
    file[0x34..0x48].copy_from_slice(&header_hash);
}

pub fn open_bytes(bytes: Vec<u8>) -> wia::Result<Archive> {
    Archive::new_stream(Box::new(Cursor::new(bytes)))
}

pub fn purge_encode(data: &[u8], prefix: &[u8]) -> Vec<u8> {
    let mut out = prefix.to_vec();
    let mut i = 0;
    while i < data.len() {
        if data[i] == 0 {
            i += 1;
            continue;
        }
        let start = i;
        let mut end = i + 1;
        let mut j = end;
        // Merge runs separated by fewer zeros than a segment header
        while j < data.len() && j - end < 8 {
            if data[j] != 0 {
                end = j + 1;
            }
            j += 1;
        }
        out.extend_from_slice(&(start as u32).to_be_bytes());
        out.extend_from_slice(&((end - start) as u32).to_be_bytes());
        out.extend_from_slice(&data[start..end]);
        i = end;
    }
    let hash = sha1(&out);
    out.extend_from_slice(&hash);
    out
}

#[cfg(feature = "compress-bzip2")]
fn bzip2_encode(data: &[u8]) -> Vec<u8> {
    use std::io::Write;

    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::best());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[cfg(not(feature = "compress-bzip2"))]
fn bzip2_encode(_data: &[u8]) -> Vec<u8> { unimplemented!("bzip2 support is disabled") }

#[cfg(feature = "compress-lzma")]
fn lzma_encode(data: &[u8], lzma2: bool) -> Vec<u8> {
    use std::io::Write;

    use liblzma::stream::{Filters, LzmaOptions, Stream};

    let mut options = LzmaOptions::new_preset(1).unwrap();
    options.dict_size(1 << 20);
    options.literal_context_bits(3);
    options.literal_position_bits(0);
    options.position_bits(2);
    let mut filters = Filters::new();
    if lzma2 {
        filters.lzma2(&options);
    } else {
        filters.lzma1(&options);
    }
    let stream = Stream::new_raw_encoder(&filters).unwrap();
    let mut encoder = liblzma::write::XzEncoder::new_stream(Vec::new(), stream);
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[cfg(not(feature = "compress-lzma"))]
fn lzma_encode(_data: &[u8], _lzma2: bool) -> Vec<u8> { unimplemented!("LZMA support is disabled") }

/// Deterministic test data with some compressible structure.
pub fn pattern(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(0x9E3779B9) | 1;
    (0..len)
        .map(|i| {
            if i % 0x1000 < 0x800 {
                (i / 0x1000) as u8 ^ seed as u8
            } else {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            }
        })
        .collect()
}
