use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use parity_rs::layout::geometry::RaidType;

#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create and format member images, then fill them with a seeded payload.
    Init(InitArgs),

    /// Fail a member; its image is renamed aside.
    Fail(FailArgs),

    /// Damage one member block without fixing its checksum.
    Corrupt(CorruptArgs),

    /// Read host blocks, rebuilding dead members.
    Read(ReadArgs),

    /// Print per-member state.
    Status(ArrayArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ArrayArgs {
    #[arg(long, env = "PARITY_DISK_DIR")]
    pub disk_dir: PathBuf,

    #[arg(long, env = "PARITY_RAID", value_enum, default_value_t = RaidMode::Raid5)]
    pub raid: RaidMode,

    #[arg(long, env = "PARITY_WIDTH", default_value_t = 5)]
    pub width: usize,

    #[arg(long, env = "PARITY_ELEMENT_BLOCKS", default_value_t = 16)]
    pub element_blocks: u64,

    #[arg(long, env = "PARITY_ELEMENTS_PER_PARITY", default_value_t = 4)]
    pub elements_per_parity: u64,

    #[arg(long, env = "PARITY_DISK_BLOCKS", default_value_t = 1024)]
    pub disk_blocks: u64,

    #[arg(long, env = "PARITY_PAGE_BLOCKS", default_value_t = 64)]
    pub page_blocks: u64,

    #[arg(long, env = "PARITY_MAX_PAGES", default_value_t = 256)]
    pub max_pages: usize,
}

#[derive(Args)]
pub struct InitArgs {
    #[command(flatten)]
    pub array: ArrayArgs,

    /// Host blocks of random payload written after formatting.
    #[arg(long, default_value_t = 0)]
    pub blocks: u64,

    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

#[derive(Args)]
pub struct FailArgs {
    #[command(flatten)]
    pub array: ArrayArgs,

    #[arg(long)]
    pub position: usize,
}

#[derive(Args)]
pub struct CorruptArgs {
    #[command(flatten)]
    pub array: ArrayArgs,

    #[arg(long)]
    pub position: usize,

    /// Member row, counted from the start of the array area.
    #[arg(long)]
    pub lba: u64,
}

#[derive(Args)]
pub struct ReadArgs {
    #[command(flatten)]
    pub array: ArrayArgs,

    #[arg(long)]
    pub lba: u64,

    #[arg(long)]
    pub count: u64,

    /// Invalidate what cannot be rebuilt instead of asking for a retry.
    #[arg(long)]
    pub final_attempt: bool,

    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum RaidMode {
    Raid5,
    Raid6,
}

impl From<RaidMode> for RaidType {
    fn from(mode: RaidMode) -> Self {
        match mode {
            RaidMode::Raid5 => Self::Raid5,
            RaidMode::Raid6 => Self::Raid6,
        }
    }
}
