//! Command-line interface definitions.

pub mod check;
pub mod lookup;
pub mod output;
pub mod price;
pub mod watch;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Oddsync - Real-time odds synchronization for live betting markets.
#[derive(Parser, Debug)]
#[command(name = "oddsync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream odds, status and statistics updates until interrupted
    Watch(WatchArgs),

    /// Price a stake against a condition snapshot
    Price(PriceArgs),

    /// Lowest acceptable odds after slippage
    MinOdds(MinOddsArgs),

    /// Fetch condition records from the API in one batch
    Lookup(LookupArgs),

    /// Run diagnostic checks
    #[command(subcommand)]
    Check(CheckCommand),
}

/// Subcommands for `oddsync check`
#[derive(Subcommand, Debug)]
pub enum CheckCommand {
    /// Validate configuration file
    Config(ConfigPathArg),
}

/// Shared argument for commands that only need a config path.
#[derive(Parser, Debug)]
pub struct ConfigPathArg {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,
}

/// Arguments for the `watch` subcommand.
#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Comma-separated condition ids to watch
    #[arg(long, value_delimiter = ',')]
    pub conditions: Vec<String>,

    /// Comma-separated game ids to watch live statistics for
    #[arg(long, value_delimiter = ',')]
    pub games: Vec<String>,

    /// Override log level (debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Use JSON log format instead of pretty
    #[arg(long)]
    pub json_logs: bool,
}

/// Arguments for the `price` subcommand.
#[derive(Parser, Debug)]
pub struct PriceArgs {
    /// JSON file holding one condition record as sent by the feed
    #[arg(long)]
    pub snapshot: PathBuf,

    /// Outcome to price
    #[arg(long)]
    pub outcome: String,

    /// Stake to place on the outcome
    #[arg(long)]
    pub stake: Decimal,

    /// Core address of the market; defaults to the configured live core
    #[arg(long)]
    pub core: Option<String>,

    /// Slippage percentage for minimum odds [default: pricing.default_slippage_percent]
    #[arg(long)]
    pub slippage: Option<Decimal>,

    /// Configuration file supplying pricing defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the `min-odds` subcommand.
#[derive(Parser, Debug)]
pub struct MinOddsArgs {
    /// Quoted decimal odds
    #[arg(long)]
    pub odds: Decimal,

    /// Accepted slippage in percent [default: pricing.default_slippage_percent]
    #[arg(long)]
    pub slippage: Option<Decimal>,

    /// Configuration file supplying pricing defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the `lookup` subcommand.
#[derive(Parser, Debug)]
pub struct LookupArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Comma-separated condition ids to fetch
    #[arg(long, value_delimiter = ',', required = true)]
    pub conditions: Vec<String>,

    /// Environment or chain the conditions belong to
    #[arg(long)]
    pub environment: Option<String>,
}
