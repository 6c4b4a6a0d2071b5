use std::path::{Path, PathBuf};

use argp::FromArgs;
use wia::Archive;

use crate::util::{
    display,
    shared::{print_digests, print_header, read_and_digest},
};

#[derive(FromArgs, Debug)]
/// Verifies WIA archives.
#[argp(subcommand, name = "verify")]
pub struct Args {
    #[argp(positional)]
    /// path to archive(s)
    file: Vec<PathBuf>,
    #[argp(switch, short = 'g')]
    /// only check group data, skip full image digests
    groups_only: bool,
}

pub fn run(args: Args) -> wia::Result<()> {
    let mut failed = 0usize;
    for file in &args.file {
        if !verify_file(file, args.groups_only)? {
            failed += 1;
        }
        println!();
    }
    if failed > 0 {
        return Err(wia::Error::Other(format!("{} archive(s) failed verification", failed)));
    }
    Ok(())
}

fn verify_file(path: &Path, groups_only: bool) -> wia::Result<bool> {
    log::info!("Loading {}", display(path));
    let archive = Archive::new(path)?;
    print_header(&archive);
    println!();

    let errors = archive.verify_groups();
    for e in &errors {
        log::error!("Group {}: {}", e.group, e.error);
    }
    if errors.is_empty() {
        println!("Groups: {} OK", archive.groups().len());
    } else {
        println!("Groups: {} of {} failed", errors.len(), archive.groups().len());
        return Ok(false);
    }

    if !groups_only {
        let results = read_and_digest(&archive, None)?;
        print_digests(&results);
    }
    Ok(true)
}
