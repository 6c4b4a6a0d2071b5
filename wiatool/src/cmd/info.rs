use std::path::{Path, PathBuf};

use argp::FromArgs;
use size::Size;
use wia::{Archive, SECTOR_SIZE};

use crate::util::{display, shared::print_header};

#[derive(FromArgs, Debug)]
/// Displays information about WIA archives.
#[argp(subcommand, name = "info")]
pub struct Args {
    #[argp(positional)]
    /// Path to archive(s)
    file: Vec<PathBuf>,
    #[argp(switch, short = 't')]
    /// List raw data and group tables
    tables: bool,
}

pub fn run(args: Args) -> wia::Result<()> {
    for file in &args.file {
        info_file(file, args.tables)?;
    }
    Ok(())
}

fn info_file(path: &Path, tables: bool) -> wia::Result<()> {
    log::info!("Loading {}", display(path));
    let archive = Archive::new(path)?;
    print_header(&archive);

    for (idx, partition) in archive.partitions().iter().enumerate() {
        println!();
        println!("Partition {}", idx);
        let data_size = partition.num_sectors() * SECTOR_SIZE as u64;
        println!(
            "\tData offset / size: {:#X} / {:#X} ({})",
            partition.data_offset(),
            data_size,
            Size::from_bytes(data_size)
        );
        println!("\tKey: {}", base16ct::lower::encode_string(&partition.partition_key));
        for (pd_idx, pd) in partition.partition_data.iter().enumerate() {
            if pd.num_sectors.get() == 0 {
                continue;
            }
            println!(
                "\tRange {}: sectors {:#X}..{:#X}, groups {}..{}",
                pd_idx,
                pd.start_sector(),
                pd.end_sector(),
                pd.group_index.get(),
                pd.group_index.get() as u64 + pd.num_groups.get() as u64
            );
        }
    }

    let groups = archive.groups();
    let sparse = groups.iter().filter(|g| g.is_sparse()).count();
    let stored: u64 = groups.iter().map(|g| g.compressed_size() as u64).sum();
    println!();
    println!("Raw data entries: {}", archive.raw_data().len());
    println!("Groups: {} ({} sparse, {} stored)", groups.len(), sparse, Size::from_bytes(stored));

    if tables {
        println!();
        for (idx, raw) in archive.raw_data().iter().enumerate() {
            println!(
                "Raw {}: {:#X}..{:#X}, groups {}..{}",
                idx,
                raw.start_offset(),
                raw.end_offset(),
                raw.group_index.get(),
                raw.group_index.get() as u64 + raw.num_groups.get() as u64
            );
        }
        for (idx, group) in groups.iter().enumerate() {
            if group.is_sparse() {
                println!("Group {}: sparse", idx);
            } else {
                println!(
                    "Group {}: offset {:#X}, size {:#X}",
                    idx,
                    group.file_offset(),
                    group.compressed_size()
                );
            }
        }
    }

    println!();
    Ok(())
}
