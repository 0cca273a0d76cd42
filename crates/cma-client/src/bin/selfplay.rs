//! cma-selfplay: run the citizen governor against a simulated server.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use cma_client::{run_selfplay, SelfPlayConfig};

#[derive(Parser)]
#[command(name = "cma-selfplay")]
#[command(about = "Headless self-play for the citizen governor", version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the number of turns
    #[arg(long)]
    turns: Option<u32>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => SelfPlayConfig::load(path)?,
        None => SelfPlayConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if let Some(turns) = cli.turns {
        config.turns = turns;
    }

    tracing::info!(seed = config.seed, turns = config.turns, "Starting self-play");
    let summary = run_selfplay(&config)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
