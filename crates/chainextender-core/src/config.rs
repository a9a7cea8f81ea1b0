//! Extender configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ExtenderError;
use crate::retry::{RetryConfig, RetryPolicy};

/// Sizing of one worker stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Number of worker tasks draining the queue.
    pub workers: usize,
    /// Bounded queue capacity; a full queue blocks the producer.
    pub queue_capacity: usize,
    /// Items per chunk handed to one worker invocation.
    pub chunk_size: usize,
}

impl StreamConfig {
    pub const fn new(workers: usize, queue_capacity: usize, chunk_size: usize) -> Self {
        Self {
            workers,
            queue_capacity,
            chunk_size,
        }
    }

    fn validate(&self, name: &str) -> Result<(), ExtenderError> {
        if self.workers == 0 || self.queue_capacity == 0 || self.chunk_size == 0 {
            return Err(ExtenderError::Config(format!(
                "stream '{name}' needs workers, queue capacity and chunk size above zero"
            )));
        }
        Ok(())
    }
}

/// Per-stream sizing for every worker pool of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamsConfig {
    pub addresses: StreamConfig,
    pub transactions: StreamConfig,
    pub tx_outputs: StreamConfig,
    pub invalid_txs: StreamConfig,
    pub tx_validators: StreamConfig,
    pub block_validators: StreamConfig,
    pub rewards: StreamConfig,
    pub slashes: StreamConfig,
    pub balances: StreamConfig,
    pub events: StreamConfig,
    pub coin_info: StreamConfig,
    pub validators: StreamConfig,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            addresses: StreamConfig::new(4, 64, 100),
            transactions: StreamConfig::new(4, 64, 100),
            tx_outputs: StreamConfig::new(4, 64, 100),
            invalid_txs: StreamConfig::new(2, 32, 100),
            tx_validators: StreamConfig::new(2, 32, 100),
            block_validators: StreamConfig::new(2, 32, 100),
            rewards: StreamConfig::new(2, 32, 100),
            slashes: StreamConfig::new(2, 32, 100),
            balances: StreamConfig::new(4, 128, 50),
            events: StreamConfig::new(2, 16, 1),
            coin_info: StreamConfig::new(2, 64, 1),
            validators: StreamConfig::new(1, 8, 1),
        }
    }
}

impl StreamsConfig {
    /// Streams by name, for validation and logging.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &StreamConfig)> {
        [
            ("addresses", &self.addresses),
            ("transactions", &self.transactions),
            ("tx_outputs", &self.tx_outputs),
            ("invalid_txs", &self.invalid_txs),
            ("tx_validators", &self.tx_validators),
            ("block_validators", &self.block_validators),
            ("rewards", &self.rewards),
            ("slashes", &self.slashes),
            ("balances", &self.balances),
            ("events", &self.events),
            ("coin_info", &self.coin_info),
            ("validators", &self.validators),
        ]
        .into_iter()
    }
}

/// Configuration for an extender instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtenderConfig {
    /// First height to process when the store is empty.
    pub start_height: u64,
    /// Symbol of the chain's base coin (id 0).
    pub base_coin: String,
    /// Maximum node lead (in blocks) at which the extender counts as live.
    pub chasing_threshold: u64,
    /// In live mode, re-sample the node height every N processed heights.
    pub live_recheck_interval: u64,
    /// Refresh stakes on heights divisible by this.
    pub stake_refresh_interval: u64,
    /// Refresh the validator set on heights divisible by this (when no
    /// stake refresh is due).
    pub validator_refresh_interval: u64,
    /// Delay before asking the node again for a block it does not have yet.
    pub block_retry_delay_ms: u64,
    /// Treat unresolvable references as fatal instead of skipping the row.
    pub strict_resolution: bool,
    /// Upper bound on cached ids per resolver. `None` = unbounded.
    pub identity_cache_capacity: Option<usize>,
    /// Retry attempts for worker jobs (not counting the first try).
    pub max_retries: u32,
    /// Initial worker retry backoff.
    pub retry_backoff_ms: u64,
    pub streams: StreamsConfig,
}

impl Default for ExtenderConfig {
    fn default() -> Self {
        Self {
            start_height: 1,
            base_coin: "BIP".into(),
            chasing_threshold: 2,
            live_recheck_interval: 10,
            stake_refresh_interval: 12,
            validator_refresh_interval: 1,
            block_retry_delay_ms: 1000,
            strict_resolution: true,
            identity_cache_capacity: None,
            max_retries: 5,
            retry_backoff_ms: 200,
            streams: StreamsConfig::default(),
        }
    }
}

impl ExtenderConfig {
    pub fn block_retry_delay(&self) -> Duration {
        Duration::from_millis(self.block_retry_delay_ms)
    }

    /// Backoff policy for worker retries.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.retry_backoff_ms),
            ..RetryConfig::default()
        })
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ExtenderError> {
        if self.start_height == 0 {
            return Err(ExtenderError::Config("start_height must be at least 1".into()));
        }
        if self.live_recheck_interval == 0
            || self.stake_refresh_interval == 0
            || self.validator_refresh_interval == 0
        {
            return Err(ExtenderError::Config(
                "refresh and recheck intervals must be above zero".into(),
            ));
        }
        if self.base_coin.is_empty() {
            return Err(ExtenderError::Config("base_coin must not be empty".into()));
        }
        for (name, stream) in self.streams.iter() {
            stream.validate(name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = ExtenderConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.chasing_threshold, 2);
        assert_eq!(cfg.stake_refresh_interval, 12);
        assert_eq!(cfg.streams.iter().count(), 12);
    }

    #[test]
    fn zero_sized_stream_is_rejected() {
        let mut cfg = ExtenderConfig::default();
        cfg.streams.balances.chunk_size = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("balances"));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: ExtenderConfig =
            serde_json::from_str(r#"{"start_height": 500, "strict_resolution": false}"#).unwrap();
        assert_eq!(cfg.start_height, 500);
        assert!(!cfg.strict_resolution);
        assert_eq!(cfg.live_recheck_interval, 10);
    }
}
