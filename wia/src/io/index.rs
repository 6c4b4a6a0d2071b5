//! The layout index: raw data and partition entries resolved into group-backed sections.

use std::cmp::min;

use crate::{
    io::header::{
        WIADisc, WIAPartition, WIARawData, HASH_GROUP_SECTORS, SECTOR_DATA_SIZE, SECTOR_SIZE,
    },
    Error, Result,
};

/// A range of some coordinate space backed by consecutive groups of a fixed size.
///
/// Raw data sections live in disc space. Partition sections live in the partition's data space,
/// where each sector contributes 0x7C00 bytes and offset 0 is the partition's first sector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    pub start: u64,
    pub end: u64,
    /// Index of the first group in the group table.
    pub group_index: u32,
    pub num_groups: u32,
    /// Decompressed size of every group but the last.
    pub group_size: u64,
    /// First sector of a partition section, relative to the partition's first sector.
    pub first_sector: u32,
    /// Whether the groups carry exception lists.
    pub in_partition: bool,
}

impl Section {
    #[inline]
    pub fn len(&self) -> u64 { self.end - self.start }

    #[inline]
    pub fn overlaps(&self, start: u64, end: u64) -> bool { self.start < end && start < self.end }

    /// Decompressed size of the section-local group `group`.
    #[inline]
    pub fn group_data_size(&self, group: u32) -> u64 {
        min(self.group_size, self.len().saturating_sub(group as u64 * self.group_size))
    }

    /// Number of sectors covered by a partition section.
    #[inline]
    pub fn num_sectors(&self) -> u32 { (self.len() / SECTOR_DATA_SIZE as u64) as u32 }

    fn validate(&self, total_groups: u32, what: &str) -> Result<()> {
        match self.group_index.checked_add(self.num_groups) {
            Some(end) if end <= total_groups => {}
            _ => {
                return Err(Error::Index(format!(
                    "{} references groups {}+{}, but only {} exist",
                    what, self.group_index, self.num_groups, total_groups
                )))
            }
        }
        if (self.num_groups as u64) * self.group_size < self.len() {
            return Err(Error::Index(format!(
                "{} covers {:#X} bytes with only {} groups of {:#X}",
                what,
                self.len(),
                self.num_groups,
                self.group_size
            )));
        }
        Ok(())
    }
}

/// The resolved layout of one partition entry.
#[derive(Clone, Debug)]
pub struct PartitionLayout {
    /// Disc offset of the partition's first data sector.
    pub data_offset: u64,
    /// Number of sectors from the first sector to the end of the last sub-range.
    pub num_sectors: u32,
    /// Non-empty sub-ranges in ascending order.
    pub sections: Vec<Section>,
}

impl PartitionLayout {
    /// Size of the partition in data space.
    #[inline]
    pub fn data_size(&self) -> u64 { self.num_sectors as u64 * SECTOR_DATA_SIZE as u64 }

    /// Size of the partition including hash blocks.
    #[inline]
    pub fn full_size(&self) -> u64 { self.num_sectors as u64 * SECTOR_SIZE as u64 }

    pub fn section_for_sector(&self, sector: u32) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| sector >= s.first_sector && sector - s.first_sector < s.num_sectors())
    }
}

/// Immutable section tables, built once when an archive is opened.
#[derive(Clone, Debug)]
pub struct LayoutIndex {
    /// Raw data sections in ascending disc order.
    pub raw: Vec<Section>,
    pub partitions: Vec<PartitionLayout>,
    /// Number of disc sectors per group.
    pub sectors_per_group: u32,
    pub exception_lists_per_group: usize,
}

impl LayoutIndex {
    pub fn new(
        disc: &WIADisc,
        partitions: &[WIAPartition],
        raw_data: &[WIARawData],
        total_groups: u32,
    ) -> Result<Self> {
        let chunk_size = disc.chunk_size.get() as u64;

        let mut raw: Vec<Section> = Vec::with_capacity(raw_data.len());
        for (i, rd) in raw_data.iter().enumerate() {
            let section = Section {
                start: rd.start_offset(),
                end: rd.end_offset(),
                group_index: rd.group_index.get(),
                num_groups: rd.num_groups.get(),
                group_size: chunk_size,
                first_sector: 0,
                in_partition: false,
            };
            section.validate(total_groups, &format!("Raw data entry {}", i))?;
            if section.len() == 0 {
                continue;
            }
            if let Some(prev) = raw.last() {
                if section.start < prev.end {
                    return Err(Error::Index(format!(
                        "Raw data entry {} at {:#X} overlaps previous entry ending at {:#X}",
                        i, section.start, prev.end
                    )));
                }
            }
            raw.push(section);
        }

        let mut layouts = Vec::with_capacity(partitions.len());
        for (i, part) in partitions.iter().enumerate() {
            let base = part.partition_data[0].start_sector();
            let mut sections = Vec::with_capacity(2);
            let mut end_sector = base as u64;
            for (j, pd) in part.partition_data.iter().enumerate() {
                let what = format!("Partition {} data {}", i, j);
                let num_sectors = pd.num_sectors.get();
                let first_sector = pd.start_sector();
                if num_sectors != 0 && (first_sector as u64) < end_sector {
                    return Err(Error::Index(format!(
                        "{} starts at sector {:#X}, before the end of the previous range {:#X}",
                        what, first_sector, end_sector
                    )));
                }
                let first_sector = first_sector - base.min(first_sector);
                let start = first_sector as u64 * SECTOR_DATA_SIZE as u64;
                let section = Section {
                    start,
                    end: start + num_sectors as u64 * SECTOR_DATA_SIZE as u64,
                    group_index: pd.group_index.get(),
                    num_groups: pd.num_groups.get(),
                    group_size: disc.partition_chunk_size(),
                    first_sector,
                    in_partition: true,
                };
                section.validate(total_groups, &what)?;
                if num_sectors != 0 {
                    end_sector = pd.end_sector();
                    sections.push(section);
                }
            }
            let num_sectors = u32::try_from(end_sector - base as u64).map_err(|_| {
                Error::Index(format!("Partition {} spans too many sectors", i))
            })?;
            layouts.push(PartitionLayout {
                data_offset: part.data_offset(),
                num_sectors,
                sections,
            });
        }

        log::debug!(
            "Layout: {} raw data sections, {} partitions, {} groups",
            raw.len(),
            layouts.len(),
            total_groups
        );
        Ok(Self {
            raw,
            partitions: layouts,
            sectors_per_group: (chunk_size / SECTOR_SIZE as u64) as u32,
            exception_lists_per_group: disc.exception_lists_per_group(),
        })
    }

    /// Finds the partition whose first sub-range starts at `data_offset` on the disc.
    pub fn partition_by_data_offset(&self, data_offset: u64) -> Option<&PartitionLayout> {
        self.partitions.iter().find(|p| p.data_offset == data_offset)
    }

    /// All sections, each paired with every section-local group it references.
    pub fn groups(&self) -> impl Iterator<Item = (&Section, u32)> + '_ {
        self.raw
            .iter()
            .chain(self.partitions.iter().flat_map(|p| p.sections.iter()))
            .flat_map(|s| {
                let count = s.len().div_ceil(s.group_size) as u32;
                (0..count).map(move |g| (s, g))
            })
    }

    /// Number of sectors covered by one exception list.
    #[inline]
    pub fn sectors_per_exception_list(&self) -> u32 {
        min(HASH_GROUP_SECTORS as u32, self.sectors_per_group)
    }
}
