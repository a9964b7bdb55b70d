use clap::Parser;
use oddsync::cli::{self, CheckCommand, Cli, Commands};
use oddsync::error::Result;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    // Err only when a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        cli::output::error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Watch(args) => cli::watch::execute(&args).await,
        Commands::Price(args) => cli::price::execute_price(&args),
        Commands::MinOdds(args) => cli::price::execute_min_odds(&args),
        Commands::Lookup(args) => cli::lookup::execute(&args).await,
        Commands::Check(CheckCommand::Config(args)) => cli::check::execute_config(&args.config),
    }
}
