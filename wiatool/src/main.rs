use std::{env, error::Error, path::PathBuf, process::ExitCode};

use argp::FromArgs;
use supports_color::Stream;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use wiatool::{run, SubCommand};

#[derive(FromArgs, Debug)]
/// Inspects, verifies and extracts WIA disc images.
struct TopLevel {
    #[argp(subcommand)]
    command: SubCommand,
    #[argp(option, short = 'C')]
    /// Change working directory.
    chdir: Option<PathBuf>,
    #[argp(option, short = 'L', from_str_fn(parse_level))]
    /// Minimum logging level: off, error, warn, info, debug, trace. (Default: info, or RUST_LOG)
    log_level: Option<LevelFilter>,
    #[argp(switch)]
    /// Disable color output. (env: NO_COLOR)
    no_color: bool,
}

fn parse_level(value: &str) -> Result<LevelFilter, String> {
    value.parse().map_err(|e| format!("{}: {}", value, e))
}

/// Whether log output should use ANSI colors.
fn color_enabled(no_color: bool) -> bool {
    if no_color || env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty() && v != "0") {
        return false;
    }
    // Needed on Windows consoles
    let _ = enable_ansi_support::enable_ansi_support();
    supports_color::on(Stream::Stderr).is_some_and(|level| level.has_basic)
}

fn init_logging(args: &TopLevel) {
    let filter = match args.log_level {
        Some(level) => EnvFilter::default().add_directive(level.into()),
        None => EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy(),
    };
    tracing_subscriber::fmt()
        .with_ansi(color_enabled(args.no_color))
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn main() -> ExitCode {
    let args: TopLevel = argp::parse_args_or_exit(argp::DEFAULT);
    init_logging(&args);

    if let Some(dir) = &args.chdir {
        if let Err(e) = env::set_current_dir(dir) {
            eprintln!("Failed to change working directory to {}: {}", dir.display(), e);
            return ExitCode::FAILURE;
        }
    }
    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Failed: {}", e);
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("Caused by: {}", cause);
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
