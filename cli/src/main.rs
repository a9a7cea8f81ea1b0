//! ChainExtender CLI: follow a node into Postgres.
//!
//! # Commands
//! ```text
//! chainextender run                  # follow the node until Ctrl-C or a fatal error
//! chainextender reindex --blocks N   # rebuild the address/transaction index of the last N blocks
//! chainextender info                 # print build and default settings
//! ```
//!
//! Every flag can also be set through the environment variable shown in
//! `--help` (`DATABASE_URL`, `NODE_API_URL`, `BROADCAST_URL`, ...).

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use chainextender_core::config::ExtenderConfig;
use chainextender_core::store::Store;
use chainextender_node::{CentrifugoBroadcaster, HttpNodeClient};
use chainextender_pipeline::{supervise, ExtenderBuilder};
use chainextender_storage::PostgresStore;

mod config;
mod telemetry;

use config::{DatabaseArgs, LogArgs, RunArgs};

#[derive(Parser)]
#[command(
    name = "chainextender",
    about = "Continuous blockchain extender that mirrors a node into Postgres",
    version
)]
struct Cli {
    #[command(flatten)]
    log: LogArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the node, starting after the last stored block
    Run(RunArgs),

    /// Rebuild the address/transaction index for the most recent blocks
    Reindex {
        #[command(flatten)]
        database: DatabaseArgs,

        /// Number of most recent blocks to reindex
        #[arg(long, default_value_t = 1000)]
        blocks: u64,
    },

    /// Show build and default settings
    Info,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    telemetry::init_tracing(&cli.log.log_config());

    if let Err(e) = dispatch(cli.command).await {
        error!("chainextender stopped: {e:#}");
        std::process::exit(1);
    }
}

async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Reindex { database, blocks } => cmd_reindex(&database, blocks).await,
        Commands::Info => {
            cmd_info();
            Ok(())
        }
    }
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let config = args.extender_config();
    config.validate().context("invalid configuration")?;

    let store = PostgresStore::connect_with_options(&args.database.database_url, args.database.options())
        .await
        .context("connecting to Postgres")?;
    let node = HttpNodeClient::new(&args.node_api_url, args.node_config())
        .with_context(|| format!("creating node client for {}", args.node_api_url))?;

    let mut builder = ExtenderBuilder::new()
        .config(config)
        .node(Arc::new(node))
        .store(Arc::new(store));
    if let Some(url) = &args.broadcast_url {
        let broadcaster =
            CentrifugoBroadcaster::new(url.as_str(), args.broadcast_key.as_str()).context("creating broadcaster")?;
        builder = builder.broadcaster(Arc::new(broadcaster));
        info!(url = %url, "broadcasting enabled");
    }

    let extender = builder.build().await.context("starting the extender")?;
    supervise(extender).await?;
    info!("chainextender stopped");
    Ok(())
}

async fn cmd_reindex(database: &DatabaseArgs, blocks: u64) -> Result<()> {
    let store = PostgresStore::connect_with_options(&database.database_url, database.options())
        .await
        .context("connecting to Postgres")?;
    let rows = store
        .index_recent_transaction_addresses(blocks)
        .await
        .context("rebuilding the address index")?;
    info!(blocks, rows, "address index rebuilt");
    println!("Reindexed {rows} address/transaction rows over the last {blocks} blocks");
    Ok(())
}

fn cmd_info() {
    let cfg = ExtenderConfig::default();
    println!("ChainExtender v{}", env!("CARGO_PKG_VERSION"));
    println!("  Start height (empty store): {}", cfg.start_height);
    println!("  Chasing threshold: {} blocks", cfg.chasing_threshold);
    println!("  Live re-check: every {} heights", cfg.live_recheck_interval);
    println!("  Stake refresh: every {} heights", cfg.stake_refresh_interval);
    println!("  Validator refresh: every {} heights", cfg.validator_refresh_interval);
    println!("  Block retry delay: {} ms", cfg.block_retry_delay_ms);
    println!("  Storage backends: Postgres, memory (tests)");
    println!("  Streams:");
    for (name, stream) in cfg.streams.iter() {
        println!(
            "    {name:<17} workers={:<2} queue={:<4} chunk={}",
            stream.workers, stream.queue_capacity, stream.chunk_size
        );
    }
}
