use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "nprcli",
    version,
    about = "Play today's NPR program episodes from the terminal"
)]
pub struct Cli {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub player: PlayerArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[command(about = "Play interactively (n: next, p: previous, q: quit)")]
    Play,
    List {
        #[arg(long)]
        json: bool,
    },
    Download {
        #[arg(long, default_value_t = 0, help = "Zero-based playlist position")]
        index: usize,
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    #[arg(long, value_enum, global = true)]
    pub program: Option<ProgramArg>,

    #[arg(long, global = true, help = "RSS feed URL, overriding --program")]
    pub feed: Option<String>,
}

#[derive(Debug, Args)]
pub struct PlayerArgs {
    #[arg(
        long,
        global = true,
        help = "Player executable (env: NPRCLI_PLAYER_BIN, default: mplayer)"
    )]
    pub player: Option<PathBuf>,

    #[arg(long, default_value_t = 20, global = true)]
    pub cache_min: u32,

    #[arg(long, global = true)]
    pub console_controls: bool,

    #[arg(long, default_value_t = 500, global = true)]
    pub poll_ms: u64,

    #[arg(long, short, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProgramArg {
    MorningEdition,
    WeekendEditionSaturday,
    WeekendEditionSunday,
}
