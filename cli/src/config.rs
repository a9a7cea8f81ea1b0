//! Command-line and environment settings.

use std::time::Duration;

use clap::Args;

use chainextender_core::config::{ExtenderConfig, StreamsConfig};
use chainextender_core::retry::RetryConfig;
use chainextender_node::NodeClientConfig;
use chainextender_storage::PostgresOptions;

use crate::telemetry::LogConfig;

#[derive(Debug, Args)]
pub struct DatabaseArgs {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Maximum pooled connections
    #[arg(long, env = "DB_POOL_SIZE", default_value_t = 20)]
    pub db_pool_size: u32,
}

impl DatabaseArgs {
    pub fn options(&self) -> PostgresOptions {
        PostgresOptions {
            max_connections: self.db_pool_size,
            ..PostgresOptions::default()
        }
    }
}

#[derive(Debug, Args)]
pub struct LogArgs {
    /// Log filter directives
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Log as JSON lines
    #[arg(long, env = "LOG_JSON", global = true)]
    pub log_json: bool,
}

impl LogArgs {
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone(),
            json: self.log_json,
        }
    }
}

macro_rules! stream_args {
    ($($stream:ident { $workers:ident = $w_env:literal, $queue:ident = $q_env:literal, $chunk:ident = $c_env:literal })*) => {
        /// Per-stream pool sizing. Unset values keep the defaults.
        #[derive(Debug, Default, Args)]
        pub struct StreamArgs {
            $(
                #[arg(long, env = $w_env)]
                pub $workers: Option<usize>,
                #[arg(long, env = $q_env)]
                pub $queue: Option<usize>,
                #[arg(long, env = $c_env)]
                pub $chunk: Option<usize>,
            )*
        }

        impl StreamArgs {
            pub fn apply(&self, streams: &mut StreamsConfig) {
                $(
                    if let Some(v) = self.$workers {
                        streams.$stream.workers = v;
                    }
                    if let Some(v) = self.$queue {
                        streams.$stream.queue_capacity = v;
                    }
                    if let Some(v) = self.$chunk {
                        streams.$stream.chunk_size = v;
                    }
                )*
            }
        }
    };
}

stream_args! {
    addresses { addresses_workers = "ADDRESSES_WORKERS", addresses_queue = "ADDRESSES_QUEUE", addresses_chunk = "ADDRESSES_CHUNK" }
    transactions { transactions_workers = "TRANSACTIONS_WORKERS", transactions_queue = "TRANSACTIONS_QUEUE", transactions_chunk = "TRANSACTIONS_CHUNK" }
    tx_outputs { tx_outputs_workers = "TX_OUTPUTS_WORKERS", tx_outputs_queue = "TX_OUTPUTS_QUEUE", tx_outputs_chunk = "TX_OUTPUTS_CHUNK" }
    invalid_txs { invalid_txs_workers = "INVALID_TXS_WORKERS", invalid_txs_queue = "INVALID_TXS_QUEUE", invalid_txs_chunk = "INVALID_TXS_CHUNK" }
    tx_validators { tx_validators_workers = "TX_VALIDATORS_WORKERS", tx_validators_queue = "TX_VALIDATORS_QUEUE", tx_validators_chunk = "TX_VALIDATORS_CHUNK" }
    block_validators { block_validators_workers = "BLOCK_VALIDATORS_WORKERS", block_validators_queue = "BLOCK_VALIDATORS_QUEUE", block_validators_chunk = "BLOCK_VALIDATORS_CHUNK" }
    rewards { rewards_workers = "REWARDS_WORKERS", rewards_queue = "REWARDS_QUEUE", rewards_chunk = "REWARDS_CHUNK" }
    slashes { slashes_workers = "SLASHES_WORKERS", slashes_queue = "SLASHES_QUEUE", slashes_chunk = "SLASHES_CHUNK" }
    balances { balances_workers = "BALANCES_WORKERS", balances_queue = "BALANCES_QUEUE", balances_chunk = "BALANCES_CHUNK" }
    events { events_workers = "EVENTS_WORKERS", events_queue = "EVENTS_QUEUE", events_chunk = "EVENTS_CHUNK" }
    coin_info { coin_info_workers = "COIN_INFO_WORKERS", coin_info_queue = "COIN_INFO_QUEUE", coin_info_chunk = "COIN_INFO_CHUNK" }
    validators { validators_workers = "VALIDATORS_WORKERS", validators_queue = "VALIDATORS_QUEUE", validators_chunk = "VALIDATORS_CHUNK" }
}

/// Settings of the `run` command.
#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub database: DatabaseArgs,

    /// Node API base URL
    #[arg(long, env = "NODE_API_URL")]
    pub node_api_url: String,

    /// Broadcast server API URL; nothing is published when unset
    #[arg(long, env = "BROADCAST_URL")]
    pub broadcast_url: Option<String>,

    /// Broadcast server API key
    #[arg(long, env = "BROADCAST_KEY", default_value = "")]
    pub broadcast_key: String,

    /// First height for an empty database
    #[arg(long, env = "START_HEIGHT", default_value_t = 1)]
    pub start_height: u64,

    /// Symbol of the base coin (id 0)
    #[arg(long, env = "BASE_COIN", default_value = "BIP")]
    pub base_coin: String,

    /// Node lead (blocks) up to which the extender counts as live
    #[arg(long, env = "CHASING_THRESHOLD", default_value_t = 2)]
    pub chasing_threshold: u64,

    /// In live mode, re-sample the node height every N heights
    #[arg(long, env = "LIVE_RECHECK_INTERVAL", default_value_t = 10)]
    pub live_recheck_interval: u64,

    #[arg(long, env = "STAKE_REFRESH_INTERVAL", default_value_t = 12)]
    pub stake_refresh_interval: u64,

    #[arg(long, env = "VALIDATOR_REFRESH_INTERVAL", default_value_t = 1)]
    pub validator_refresh_interval: u64,

    /// Wait before asking again for a block the node does not have yet
    #[arg(long, env = "BLOCK_RETRY_DELAY_MS", default_value_t = 1000)]
    pub block_retry_delay_ms: u64,

    /// Stop on unresolvable references instead of skipping the row
    #[arg(long, env = "STRICT_RESOLUTION", default_value_t = true, action = clap::ArgAction::Set)]
    pub strict_resolution: bool,

    /// Cap on cached ids per resolver (unbounded when unset)
    #[arg(long, env = "IDENTITY_CACHE_CAPACITY")]
    pub identity_cache_capacity: Option<usize>,

    /// Retries for node calls and worker jobs
    #[arg(long, env = "MAX_RETRIES", default_value_t = 5)]
    pub max_retries: u32,

    #[arg(long, env = "RETRY_BACKOFF_MS", default_value_t = 200)]
    pub retry_backoff_ms: u64,

    #[command(flatten)]
    pub streams: StreamArgs,
}

impl RunArgs {
    pub fn extender_config(&self) -> ExtenderConfig {
        let mut streams = StreamsConfig::default();
        self.streams.apply(&mut streams);
        ExtenderConfig {
            start_height: self.start_height,
            base_coin: self.base_coin.clone(),
            chasing_threshold: self.chasing_threshold,
            live_recheck_interval: self.live_recheck_interval,
            stake_refresh_interval: self.stake_refresh_interval,
            validator_refresh_interval: self.validator_refresh_interval,
            block_retry_delay_ms: self.block_retry_delay_ms,
            strict_resolution: self.strict_resolution,
            identity_cache_capacity: self.identity_cache_capacity,
            max_retries: self.max_retries,
            retry_backoff_ms: self.retry_backoff_ms,
            streams,
        }
    }

    pub fn node_config(&self) -> NodeClientConfig {
        NodeClientConfig {
            retry: RetryConfig {
                max_retries: self.max_retries,
                initial_backoff: Duration::from_millis(self.retry_backoff_ms),
                ..RetryConfig::default()
            },
            ..NodeClientConfig::default()
        }
    }
}
