use std::path::PathBuf;

use argp::FromArgs;
use wia::Archive;

use crate::util::{
    display,
    shared::{print_digests, print_header, read_and_digest},
};

#[derive(FromArgs, Debug)]
/// Extracts the disc image stored in a WIA archive.
#[argp(subcommand, name = "extract")]
pub struct Args {
    #[argp(positional)]
    /// Path to archive
    file: PathBuf,
    #[argp(positional)]
    /// Output disc image (default: archive path with .iso extension)
    out: Option<PathBuf>,
    #[argp(switch, short = 'q')]
    /// Quiet output
    quiet: bool,
}

pub fn run(args: Args) -> wia::Result<()> {
    let out = args.out.unwrap_or_else(|| args.file.with_extension("iso"));
    if out == args.file {
        return Err(wia::Error::Other(format!(
            "Output path {} is the same as the input",
            display(&out)
        )));
    }
    log::info!("Loading {}", display(&args.file));
    let archive = Archive::new(&args.file)?;
    if !args.quiet {
        print_header(&archive);
        println!();
    }
    let results = read_and_digest(&archive, Some(&out))?;
    if !args.quiet {
        print_digests(&results);
    }
    Ok(())
}
