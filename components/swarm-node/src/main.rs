use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use corpus_swarm::{ShardService, SwarmConfig};
use prism::ShardSet;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

mod gateway;
mod worker;

/// Sharded corpus query node: HTTP gateway plus in-process workers.
#[derive(Parser)]
#[command(name = "swarm-node", version, propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Gateway {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Split a corpus into fixed-size chunks
    Split { corpus_id: String },
    /// Draw random fixed-size samples of a corpus
    Multisample {
        corpus_id: String,
        #[arg(long)]
        num_samples: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<SwarmConfig> {
    let config = match path {
        Some(path) => SwarmConfig::from_file(path)?,
        None => SwarmConfig::default(),
    }
    .with_env_overrides();
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn print_set(set: &ShardSet) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(set)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = Arc::new(load_config(cli.config.as_ref())?);

    match cli.command {
        Commands::Gateway { port } => gateway::run_gateway(config, port).await?,
        Commands::Split { corpus_id } => {
            let (executor, pool) = worker::start_local(&config, CancellationToken::new());
            let service = ShardService::new(config.clone(), executor);
            let corpus_path = config.registry_path(&corpus_id)?;
            let outcome = service.create_split(&corpus_path).await;
            pool.shutdown().await;
            let set = outcome.with_context(|| format!("failed to split '{}'", corpus_id))?;
            info!(corpus = %corpus_id, chunks = set.len(), "done");
            print_set(&set)?;
        }
        Commands::Multisample {
            corpus_id,
            num_samples,
            seed,
        } => {
            let (executor, pool) = worker::start_local(&config, CancellationToken::new());
            let service = ShardService::new(config.clone(), executor);
            let corpus_path = config.registry_path(&corpus_id)?;
            let outcome = service.create_multisample(&corpus_path, num_samples, seed).await;
            pool.shutdown().await;
            let set = outcome.with_context(|| format!("failed to multisample '{}'", corpus_id))?;
            info!(corpus = %corpus_id, samples = set.len(), "done");
            print_set(&set)?;
        }
    }
    Ok(())
}
