use std::{
    cmp::{max, min},
    io,
    io::{Seek, SeekFrom},
    mem::size_of,
    sync::Arc,
};

use rayon::prelude::*;
use zerocopy::{FromBytes, FromZeros, IntoBytes};

use crate::{
    hashes::{verify_hash, HashBlockSource},
    io::{
        decompress::Decompressor,
        header::{
            WIADisc, WIAException, WIAExceptionList, WIAFileHeader, WIAGroup, WIAPartition,
            WIARawData, DISC_HEAD_SIZE, HASHES_SIZE, SECTOR_DATA_SIZE, SECTOR_SIZE,
            WIA_DISC_MIN_SIZE,
        },
        index::{LayoutIndex, Section},
        ArchiveMeta, ArchiveStream, HashBytes,
    },
    util::{
        div_rem,
        read::{read_box_slice, read_fill, read_from, read_u16_be, read_vec},
    },
    Error, Result, ResultContext,
};

/// Tables loaded at open, shared between clones.
struct Tables {
    header: WIAFileHeader,
    disc: WIADisc,
    partitions: Box<[WIAPartition]>,
    raw_data: Box<[WIARawData]>,
    groups: Box<[WIAGroup]>,
    index: LayoutIndex,
    decompressor: Decompressor,
    stream_len: u64,
}

/// The most recently loaded group.
#[derive(Default)]
struct GroupCache {
    group: Option<u32>,
    window: Vec<u8>,
    data: Vec<u8>,
    exception_lists: Vec<WIAExceptionList>,
}

/// A group that failed to load during [`WiaReader::verify_groups`].
#[derive(Debug)]
pub struct GroupError {
    /// Index into the group table.
    pub group: u32,
    /// The load failure.
    pub error: Error,
}

pub struct WiaReader {
    stream: Box<dyn ArchiveStream>,
    tables: Arc<Tables>,
    cache: GroupCache,
}

impl Clone for WiaReader {
    fn clone(&self) -> Self {
        Self {
            stream: self.stream.clone(),
            tables: self.tables.clone(),
            cache: GroupCache::default(),
        }
    }
}

fn check_bounds(offset: u64, size: u64, stream_len: u64, what: &str) -> Result<()> {
    match offset.checked_add(size) {
        Some(end) if end <= stream_len => Ok(()),
        _ => Err(Error::Format(format!(
            "{} at {:#X}+{:#X} extends past the end of the file ({:#X})",
            what, offset, size, stream_len
        ))),
    }
}

fn check_range(offset: u64, size: usize, limit: u64, what: &str) -> Result<u64> {
    match offset.checked_add(size as u64) {
        Some(end) if end <= limit => Ok(end),
        _ => Err(Error::Other(format!(
            "{} read {:#X}+{:#X} is out of range (size {:#X})",
            what, offset, size, limit
        ))),
    }
}

fn read_partitions(
    stream: &mut dyn ArchiveStream,
    disc: &WIADisc,
    stream_len: u64,
) -> Result<Box<[WIAPartition]>> {
    let count = disc.num_partitions.get() as usize;
    let entry_size = disc.partition_type_size.get() as usize;
    let offset = disc.partition_offset.get();
    let table_size = count
        .checked_mul(entry_size)
        .ok_or_else(|| Error::Format("WIA partition table size overflow".to_string()))?;
    check_bounds(offset, table_size as u64, stream_len, "Partition table")?;
    stream.seek(SeekFrom::Start(offset)).context("Seeking to WIA partition table")?;
    let buf: Vec<u8> = read_vec(stream, table_size).context("Reading WIA partition table")?;
    verify_hash(&buf, &disc.partition_hash, "partition table")?;

    let mut partitions = <[WIAPartition]>::new_box_zeroed_with_elems(count)
        .map_err(|_| Error::Other("Failed to allocate partition table".to_string()))?;
    let copy_size = min(entry_size, size_of::<WIAPartition>());
    if count > 0 && entry_size != size_of::<WIAPartition>() {
        log::debug!("Partition entry size {:#X}, using {:#X} bytes", entry_size, copy_size);
    }
    for (part, src) in partitions.iter_mut().zip(buf.chunks_exact(entry_size.max(1))) {
        part.as_mut_bytes()[..copy_size].copy_from_slice(&src[..copy_size]);
    }
    Ok(partitions)
}

fn read_compressed_table<T>(
    stream: &mut dyn ArchiveStream,
    decompressor: &Decompressor,
    offset: u64,
    compressed_size: u32,
    count: u32,
    stream_len: u64,
    what: &str,
) -> Result<Box<[T]>>
where
    T: FromBytes + IntoBytes,
{
    if count == 0 {
        return <[T]>::new_box_zeroed_with_elems(0)
            .map_err(|_| Error::Other(format!("Failed to allocate {} table", what)));
    }
    check_bounds(offset, compressed_size as u64, stream_len, what)?;
    stream.seek(SeekFrom::Start(offset)).context(format!("Seeking to {} table", what))?;
    let window: Vec<u8> =
        read_vec(stream, compressed_size as usize).context(format!("Reading {} table", what))?;
    let err = |e: io::Error| Error::Decompression(format!("Decompressing {} table", what), e);
    let size = count as u64 * size_of::<T>() as u64;
    let mut reader = decompressor.start(&window, 0, size).map_err(err)?;
    let table: Box<[T]> = read_box_slice(&mut reader, count as usize).map_err(err)?;
    reader.finish().map_err(err)?;
    log::debug!("Read {} {} entries", count, what);
    Ok(table)
}

fn read_exception_lists<R>(reader: &mut R, count: usize) -> io::Result<Vec<WIAExceptionList>>
where R: io::Read + ?Sized {
    let mut exception_lists = Vec::with_capacity(count);
    for i in 0..count {
        let num_exceptions = read_u16_be(reader)?;
        let exceptions: Box<[WIAException]> = read_box_slice(reader, num_exceptions as usize)?;
        if !exceptions.is_empty() {
            log::debug!("Exception list {}: {} exceptions", i, exceptions.len());
        }
        exception_lists.push(exceptions);
    }
    Ok(exception_lists)
}

impl GroupCache {
    /// Loads the section-local group `group` of `section`, unless it is already loaded.
    fn load(
        &mut self,
        stream: &mut dyn ArchiveStream,
        tables: &Tables,
        section: &Section,
        group: u32,
    ) -> Result<()> {
        if group >= section.num_groups {
            return Err(Error::Index(format!(
                "Group {} is outside the section's {} groups",
                group, section.num_groups
            )));
        }
        // Overflow is rejected when the index is built
        let index = section.group_index + group;
        if self.group == Some(index) {
            return Ok(());
        }
        self.group = None;
        let entry = tables.groups.get(index as usize).ok_or_else(|| {
            Error::Index(format!(
                "Group {} is beyond the group table ({} entries)",
                index,
                tables.groups.len()
            ))
        })?;
        let size = section.group_data_size(group) as usize;
        let num_lists =
            if section.in_partition { tables.index.exception_lists_per_group } else { 0 };

        self.data.clear();
        self.data.resize(size, 0);
        self.exception_lists.clear();
        if entry.is_sparse() {
            self.exception_lists.resize_with(num_lists, WIAExceptionList::default);
            self.group = Some(index);
            return Ok(());
        }

        let offset = entry.file_offset();
        let compressed_size = entry.compressed_size() as usize;
        check_bounds(offset, compressed_size as u64, tables.stream_len, "Group data")?;
        stream
            .seek(SeekFrom::Start(offset))
            .context(format!("Seeking to group {} at {:#X}", index, offset))?;
        self.window.resize(compressed_size, 0);
        stream
            .read_exact(&mut self.window)
            .with_context(|| {
                format!("Reading group {} ({:#X} bytes at {:#X})", index, compressed_size, offset)
            })?;

        let err = |e: io::Error| Error::Decompression(format!("Group {}", index), e);
        let decompressor = &tables.decompressor;
        let mut prefix = 0;
        if num_lists > 0 && !decompressor.compressed_exception_lists() {
            let mut reader: &[u8] = &self.window;
            self.exception_lists = read_exception_lists(&mut reader, num_lists).map_err(err)?;
            prefix = (self.window.len() - reader.len()).next_multiple_of(4);
        }
        let mut reader = decompressor.start(&self.window, prefix, size as u64).map_err(err)?;
        if num_lists > 0 && decompressor.compressed_exception_lists() {
            self.exception_lists = read_exception_lists(&mut reader, num_lists).map_err(err)?;
        }
        let read = read_fill(&mut reader, &mut self.data).map_err(err)?;
        if read != size {
            return Err(err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("Decompressed {:#X} bytes, expected {:#X}", read, size),
            )));
        }
        reader.finish().map_err(err)?;
        log::debug!(
            "Loaded group {} ({:#X} -> {:#X} bytes) from {:#X}",
            index,
            compressed_size,
            size,
            offset
        );
        self.group = Some(index);
        Ok(())
    }
}

/// Copies the parts of `sections` overlapping `offset..offset + out.len()` into `out`.
fn copy_sections(
    stream: &mut dyn ArchiveStream,
    cache: &mut GroupCache,
    tables: &Tables,
    sections: &[Section],
    offset: u64,
    out: &mut [u8],
) -> Result<()> {
    let end = offset + out.len() as u64;
    for section in sections.iter().filter(|s| s.overlaps(offset, end)) {
        let mut pos = max(offset, section.start);
        let stop = min(end, section.end);
        while pos < stop {
            let (group, group_offset) = div_rem(pos - section.start, section.group_size);
            let len = min(section.group_size - group_offset, stop - pos) as usize;
            cache.load(stream, tables, section, group as u32)?;
            let src = cache.data.get(group_offset as usize..group_offset as usize + len).ok_or_else(
                || Error::Index(format!("Group {} is shorter than its section", group)),
            )?;
            let dst_offset = (pos - offset) as usize;
            out[dst_offset..dst_offset + len].copy_from_slice(src);
            pos += len as u64;
        }
    }
    Ok(())
}

fn apply_exceptions(hash_blocks: &mut [u8], exceptions: &[WIAException]) -> Result<()> {
    for exception in exceptions {
        let offset = exception.offset.get() as usize;
        let (sector, pos) = div_rem(offset, HASHES_SIZE);
        let end = offset + size_of::<HashBytes>();
        if pos + size_of::<HashBytes>() > HASHES_SIZE || end > hash_blocks.len() {
            return Err(Error::Index(format!(
                "Hash exception at {:#X} (sector {}) is outside the group's hash blocks",
                offset, sector
            )));
        }
        hash_blocks[offset..end].copy_from_slice(&exception.hash);
    }
    Ok(())
}

impl WiaReader {
    pub fn new(mut stream: Box<dyn ArchiveStream>) -> Result<Self> {
        let stream_len = stream.seek(SeekFrom::End(0)).context("Determining stream length")?;
        stream.seek(SeekFrom::Start(0)).context("Seeking to start")?;

        let header: WIAFileHeader =
            read_from(stream.as_mut()).context("Reading WIA file header")?;
        header.validate()?;
        let disc_size = header.disc_size.get() as usize;
        if disc_size < WIA_DISC_MIN_SIZE {
            return Err(Error::Format(format!("WIA disc header too small: {:#X}", disc_size)));
        }
        check_bounds(
            size_of::<WIAFileHeader>() as u64,
            disc_size as u64,
            stream_len,
            "Disc header",
        )?;
        let disc_buf: Vec<u8> =
            read_vec(stream.as_mut(), disc_size).context("Reading WIA disc header")?;
        verify_hash(&disc_buf, &header.disc_hash, "disc header")?;
        let mut disc = WIADisc::new_zeroed();
        let copy_size = min(disc_size, size_of::<WIADisc>());
        disc.as_mut_bytes()[..copy_size].copy_from_slice(&disc_buf[..copy_size]);
        disc.validate(disc_size)?;
        log::debug!("Disc header: {:?}", disc);

        if header.wia_file_size.get() != stream_len {
            log::warn!(
                "WIA file size mismatch: header says {:#X}, stream is {:#X}",
                header.wia_file_size.get(),
                stream_len
            );
        }

        let decompressor = Decompressor::new(&disc)?;
        let partitions = read_partitions(stream.as_mut(), &disc, stream_len)?;
        let raw_data: Box<[WIARawData]> = read_compressed_table(
            stream.as_mut(),
            &decompressor,
            disc.raw_data_offset.get(),
            disc.raw_data_size.get(),
            disc.num_raw_data.get(),
            stream_len,
            "raw data",
        )?;
        let groups: Box<[WIAGroup]> = read_compressed_table(
            stream.as_mut(),
            &decompressor,
            disc.group_offset.get(),
            disc.group_size.get(),
            disc.num_groups.get(),
            stream_len,
            "group",
        )?;
        let index = LayoutIndex::new(&disc, &partitions, &raw_data, groups.len() as u32)?;

        Ok(Self {
            stream,
            tables: Arc::new(Tables {
                header,
                disc,
                partitions,
                raw_data,
                groups,
                index,
                decompressor,
                stream_len,
            }),
            cache: GroupCache::default(),
        })
    }

    #[inline]
    pub fn header(&self) -> &WIAFileHeader { &self.tables.header }

    #[inline]
    pub fn disc(&self) -> &WIADisc { &self.tables.disc }

    #[inline]
    pub fn partitions(&self) -> &[WIAPartition] { &self.tables.partitions }

    #[inline]
    pub fn raw_data(&self) -> &[WIARawData] { &self.tables.raw_data }

    #[inline]
    pub fn groups(&self) -> &[WIAGroup] { &self.tables.groups }

    #[inline]
    pub fn disc_size(&self) -> u64 { self.tables.header.iso_file_size.get() }

    #[inline]
    pub fn chunk_size(&self) -> u32 { self.tables.disc.chunk_size.get() }

    pub fn meta(&self) -> ArchiveMeta {
        let Tables { header, disc, stream_len, .. } = &*self.tables;
        ArchiveMeta {
            disc_type: disc.disc_type(),
            compression: disc.compression(),
            compression_level: disc.compression_level.get(),
            chunk_size: disc.chunk_size.get(),
            version: header.version.get(),
            version_compatible: header.version_compatible.get(),
            disc_size: header.iso_file_size.get(),
            archive_size: header.wia_file_size.get(),
            stream_len: *stream_len,
            num_partitions: disc.num_partitions.get(),
            num_raw_data: disc.num_raw_data.get(),
            num_groups: disc.num_groups.get(),
        }
    }

    /// Reads disc bytes at `offset`. Areas without raw data, including Wii partition data, read
    /// as zeros.
    pub fn read_at(&mut self, offset: u64, out: &mut [u8]) -> Result<()> {
        let Self { stream, tables, cache } = self;
        let end = check_range(offset, out.len(), tables.header.iso_file_size.get(), "Disc")?;
        out.fill(0);
        copy_sections(stream.as_mut(), cache, tables, &tables.index.raw, offset, out)?;
        if offset < DISC_HEAD_SIZE as u64 {
            let start = offset as usize;
            let stop = min(end, DISC_HEAD_SIZE as u64) as usize;
            out[..stop - start].copy_from_slice(&tables.disc.disc_head[start..stop]);
        }
        Ok(())
    }

    /// Reads partition data, excluding hash blocks, at `offset` in the partition's data space.
    pub fn read_partition_data_at(
        &mut self,
        offset: u64,
        out: &mut [u8],
        partition_data_offset: u64,
    ) -> Result<()> {
        let Self { stream, tables, cache } = self;
        let layout =
            tables.index.partition_by_data_offset(partition_data_offset).ok_or_else(|| {
                Error::Index(format!("No partition with data at {:#X}", partition_data_offset))
            })?;
        check_range(offset, out.len(), layout.data_size(), "Partition data")?;
        out.fill(0);
        copy_sections(stream.as_mut(), cache, tables, &layout.sections, offset, out)
    }

    /// Reads full partition sectors (hash block and data) at `offset`, relative to the start of
    /// the partition's data.
    pub fn read_decrypted_at(
        &mut self,
        offset: u64,
        out: &mut [u8],
        partition_data_offset: u64,
        hash_source: &mut dyn HashBlockSource,
    ) -> Result<()> {
        let Self { stream, tables, cache } = self;
        let layout =
            tables.index.partition_by_data_offset(partition_data_offset).ok_or_else(|| {
                Error::Index(format!("No partition with data at {:#X}", partition_data_offset))
            })?;
        let end = check_range(offset, out.len(), layout.full_size(), "Partition")?;
        out.fill(0);

        let sectors_per_group = tables.index.sectors_per_group;
        let sectors_per_list = tables.index.sectors_per_exception_list();
        let mut hash_blocks = Vec::new();
        let mut pos = offset;
        while pos < end {
            let sector = (pos / SECTOR_SIZE as u64) as u32;
            let Some(section) = layout.section_for_sector(sector) else {
                // Gap between sub-ranges
                pos = min((sector as u64 + 1) * SECTOR_SIZE as u64, end);
                continue;
            };
            let (group, group_sector) = div_rem(sector - section.first_sector, sectors_per_group);
            let list = group_sector / sectors_per_list;
            let list_sector = list * sectors_per_list;
            let first_sector = section.first_sector + group * sectors_per_group + list_sector;
            let num_sectors =
                min(sectors_per_list, section.first_sector + section.num_sectors() - first_sector);

            cache.load(stream.as_mut(), tables, section, group)?;
            let data_start = list_sector as usize * SECTOR_DATA_SIZE;
            let data = cache
                .data
                .get(data_start..data_start + num_sectors as usize * SECTOR_DATA_SIZE)
                .ok_or_else(|| {
                    Error::Index(format!("Group {} is shorter than its section", group))
                })?;
            hash_blocks.clear();
            hash_blocks.resize(num_sectors as usize * HASHES_SIZE, 0);
            hash_source.fill_hash_blocks(first_sector, data, &mut hash_blocks)?;
            let exceptions = cache.exception_lists.get(list as usize).ok_or_else(|| {
                Error::Index(format!("Group {} has no exception list {}", group, list))
            })?;
            apply_exceptions(&mut hash_blocks, exceptions)?;

            let hash_group_start = first_sector as u64 * SECTOR_SIZE as u64;
            let stop = min(end, hash_group_start + num_sectors as u64 * SECTOR_SIZE as u64);
            while pos < stop {
                let (idx, sector_offset) =
                    div_rem((pos - hash_group_start) as usize, SECTOR_SIZE);
                let len = min(SECTOR_SIZE - sector_offset, (stop - pos) as usize);
                let dst = &mut out[(pos - offset) as usize..][..len];
                let hashes = &hash_blocks[idx * HASHES_SIZE..][..HASHES_SIZE];
                let sector_data = &data[idx * SECTOR_DATA_SIZE..][..SECTOR_DATA_SIZE];
                let mut written = 0;
                if sector_offset < HASHES_SIZE {
                    written = min(HASHES_SIZE - sector_offset, len);
                    dst[..written].copy_from_slice(&hashes[sector_offset..sector_offset + written]);
                }
                if written < len {
                    let data_offset = sector_offset + written - HASHES_SIZE;
                    dst[written..]
                        .copy_from_slice(&sector_data[data_offset..data_offset + len - written]);
                }
                pos += len as u64;
            }
        }
        Ok(())
    }

    /// Loads every group referenced by the layout on a rayon thread pool, returning the failures.
    pub fn verify_groups(&self) -> Vec<GroupError> {
        let jobs: Vec<(Section, u32)> =
            self.tables.index.groups().map(|(section, group)| (section.clone(), group)).collect();
        log::info!("Verifying {} groups", jobs.len());
        let mut errors: Vec<GroupError> = jobs
            .par_iter()
            .map_with(self.clone(), |reader, (section, group)| {
                let Self { stream, tables, cache } = reader;
                cache.load(stream.as_mut(), tables, section, *group).err().map(|error| {
                    GroupError { group: section.group_index.saturating_add(*group), error }
                })
            })
            .flatten()
            .collect();
        errors.sort_by_key(|e| e.group);
        errors
    }
}
