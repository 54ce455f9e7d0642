mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use crate::cli::{Cli, Command};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();
    let output = match &cli.command {
        Command::Init(args) => commands::run_init(args)?,
        Command::Fail(args) => commands::run_fail(args)?,
        Command::Corrupt(args) => commands::run_corrupt(args)?,
        Command::Read(args) => commands::run_read(args)?,
        Command::Status(args) => commands::run_status(args)?,
    };
    print!("{output}");
    Ok(())
}
