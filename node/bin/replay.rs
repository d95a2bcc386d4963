//! Replays a scripted block sequence through the validator set application
//! and prints one JSON line per block.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use protocol_identity::{staking_currencies, ManagerState};
use protocol_node::logging::init_tracing;
use protocol_node::scenario::run_block;
use protocol_node::{version_info, Application, NodeConfig, Scenario};

#[derive(Parser)]
#[command(author, version, about = "Validator set lifecycle replay tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default node configuration file
    GenerateConfig {
        #[arg(short, long, default_value = "config/node.toml")]
        path: PathBuf,
    },
    /// Run a scenario file and print the outcome of every block
    Replay {
        /// Node configuration; defaults and `VALSET_*` overrides apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        scenario: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::GenerateConfig { path } => generate_config(path),
        Commands::Replay { config, scenario } => replay(config, scenario),
    }
}

fn generate_config(path: PathBuf) -> Result<()> {
    init_tracing("info");
    NodeConfig::default()
        .save(&path)
        .with_context(|| format!("writing {}", path.display()))?;
    info!(?path, "wrote default configuration");
    Ok(())
}

fn replay(config_path: Option<PathBuf>, scenario_path: PathBuf) -> Result<()> {
    let config = NodeConfig::load(config_path.as_deref()).context("loading node configuration")?;
    init_tracing(&config.log_filter);
    info!(version = %version_info(), scenario = %scenario_path.display(), "starting replay");

    let scenario = Scenario::load(&scenario_path)
        .with_context(|| format!("reading scenario {}", scenario_path.display()))?;
    let currencies = staking_currencies(&config.identity);
    let mut app = Application::new(config)?;

    if app.manager().state() == ManagerState::Uninitialized {
        app.init_chain(&scenario.genesis_validators()?, &currencies)?;
    }

    // One line per block, written before the next block runs.
    for block in &scenario.blocks {
        let outcome = run_block(&mut app, block).with_context(|| format!("block at height {}", block.height))?;
        println!("{}", serde_json::to_string(&outcome)?);
    }

    info!(blocks = scenario.blocks.len(), last_commit = ?app.last_commit(), "replay finished");
    Ok(())
}
