use argp::FromArgs;

pub mod cmd;
pub(crate) mod util;

#[derive(FromArgs, Debug)]
#[argp(subcommand)]
pub enum SubCommand {
    Info(cmd::info::Args),
    Extract(cmd::extract::Args),
    Verify(cmd::verify::Args),
}

pub fn run(command: SubCommand) -> wia::Result<()> {
    match command {
        SubCommand::Info(c_args) => cmd::info::run(c_args),
        SubCommand::Extract(c_args) => cmd::extract::run(c_args),
        SubCommand::Verify(c_args) => cmd::verify::run(c_args),
    }
}
