//! Fluent builder for [`Extender`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chainextender_pipeline::ExtenderBuilder;
//! # async fn example(
//! #     node: Arc<dyn chainextender_core::NodeClient>,
//! #     store: Arc<dyn chainextender_core::Store>,
//! # ) -> Result<(), chainextender_core::ExtenderError> {
//! let mut extender = ExtenderBuilder::new()
//!     .node(node)
//!     .store(store)
//!     .start_height(1)
//!     .chasing_threshold(2)
//!     .block_retry_delay_ms(500)
//!     .build()
//!     .await?;
//! extender.run_until(100).await?;
//! extender.shutdown().await
//! # }
//! ```

use std::sync::Arc;

use chainextender_core::broadcast::{BroadcastService, Broadcaster};
use chainextender_core::config::{ExtenderConfig, StreamsConfig};
use chainextender_core::error::ExtenderError;
use chainextender_core::node::NodeClient;
use chainextender_core::store::Store;

use crate::extender::Extender;

/// Fluent builder for an [`Extender`].
#[derive(Default)]
pub struct ExtenderBuilder {
    config: ExtenderConfig,
    node: Option<Arc<dyn NodeClient>>,
    store: Option<Arc<dyn Store>>,
    broadcaster: Option<Arc<dyn Broadcaster>>,
}

impl ExtenderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ExtenderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn node(mut self, node: Arc<dyn NodeClient>) -> Self {
        self.node = Some(node);
        self
    }

    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Publish blocks, status and balances. Without one nothing is published.
    pub fn broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    /// First height for an empty store.
    pub fn start_height(mut self, height: u64) -> Self {
        self.config.start_height = height;
        self
    }

    pub fn base_coin(mut self, symbol: impl Into<String>) -> Self {
        self.config.base_coin = symbol.into();
        self
    }

    /// Node lead (in blocks) up to which the extender counts as live.
    pub fn chasing_threshold(mut self, blocks: u64) -> Self {
        self.config.chasing_threshold = blocks;
        self
    }

    pub fn live_recheck_interval(mut self, heights: u64) -> Self {
        self.config.live_recheck_interval = heights;
        self
    }

    pub fn stake_refresh_interval(mut self, heights: u64) -> Self {
        self.config.stake_refresh_interval = heights;
        self
    }

    pub fn validator_refresh_interval(mut self, heights: u64) -> Self {
        self.config.validator_refresh_interval = heights;
        self
    }

    /// Wait between polls for a block the node does not have yet.
    pub fn block_retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.block_retry_delay_ms = ms;
        self
    }

    pub fn strict_resolution(mut self, strict: bool) -> Self {
        self.config.strict_resolution = strict;
        self
    }

    pub fn identity_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.identity_cache_capacity = Some(capacity);
        self
    }

    pub fn streams(mut self, streams: StreamsConfig) -> Self {
        self.config.streams = streams;
        self
    }

    /// The configuration as built so far.
    pub fn build_config(&self) -> &ExtenderConfig {
        &self.config
    }

    /// Validate the configuration, load the resume point and start the
    /// worker streams.
    pub async fn build(self) -> Result<Extender, ExtenderError> {
        let node = self
            .node
            .ok_or_else(|| ExtenderError::Config("a node client is required".into()))?;
        let store = self
            .store
            .ok_or_else(|| ExtenderError::Config("a store is required".into()))?;
        let broadcast = match self.broadcaster {
            Some(b) => BroadcastService::new(b),
            None => BroadcastService::noop(),
        };
        Extender::new(self.config, node, store, broadcast).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let builder = ExtenderBuilder::new();
        let cfg = builder.build_config();
        assert_eq!(cfg.start_height, 1);
        assert_eq!(cfg.chasing_threshold, 2);
        assert_eq!(cfg.live_recheck_interval, 10);
        assert!(cfg.strict_resolution);
    }

    #[test]
    fn builder_custom() {
        let builder = ExtenderBuilder::new()
            .start_height(5_000)
            .base_coin("MNT")
            .chasing_threshold(4)
            .stake_refresh_interval(24)
            .block_retry_delay_ms(50)
            .strict_resolution(false)
            .identity_cache_capacity(10_000);
        let cfg = builder.build_config();
        assert_eq!(cfg.start_height, 5_000);
        assert_eq!(cfg.base_coin, "MNT");
        assert_eq!(cfg.chasing_threshold, 4);
        assert_eq!(cfg.stake_refresh_interval, 24);
        assert_eq!(cfg.block_retry_delay_ms, 50);
        assert!(!cfg.strict_resolution);
        assert_eq!(cfg.identity_cache_capacity, Some(10_000));
    }

    #[tokio::test]
    async fn build_without_node_is_a_config_error() {
        let err = ExtenderBuilder::new().build().await.err().unwrap();
        assert!(matches!(err, ExtenderError::Config(_)));
    }
}
