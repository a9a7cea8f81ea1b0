//! The ingestion loop.
//!
//! # Per height
//!
//! ```text
//! status sample (when due) → block → events → coin ids → addresses (awaited)
//!   → validators → coins → pools/orders + block row (one commit)
//!   → transactions (detached) → events (detached) → balances (detached)
//!   → coin info → validator refresh → broadcast
//! ```
//!
//! Everything a later row references is written before the stream that
//! writes that row is fed, so detached workers never race the loop.
//!
//! The block row is the resume point and the last synchronous write of a
//! height. Writes before it are either idempotent (addresses, validators) or
//! undone on startup (coins, see [`CoinRegistry::init`]); pool and order rows
//! are committed together with it.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use chainextender_core::broadcast::{BroadcastService, BLOCKS_CHANNEL, STATUS_CHANNEL};
use chainextender_core::coins::CoinRegistry;
use chainextender_core::config::ExtenderConfig;
use chainextender_core::error::ExtenderError;
use chainextender_core::event::NodeEvent;
use chainextender_core::identity::Resolvers;
use chainextender_core::mode::{ModeTracker, SyncMode};
use chainextender_core::model::{Block, BlockValidator};
use chainextender_core::node::NodeClient;
use chainextender_core::queue::{FaultReporter, PoolContext};
use chainextender_core::store::Store;
use chainextender_core::types::{NodeBlock, NodeStatus};

use crate::jobs::{EventsJob, TxJob, ValidatorRefresh};
use crate::pools::PoolBook;
use crate::streams::{Queues, Streams};

/// Block time recorded for the first block of an empty store.
const FIRST_BLOCK_TIME_NS: u64 = 1_000_000_000;

/// Handles every worker needs.
#[derive(Clone)]
pub struct Shared {
    pub store: Arc<dyn Store>,
    pub node: Arc<dyn NodeClient>,
    pub resolvers: Arc<Resolvers>,
    pub broadcast: BroadcastService,
    pub strict_resolution: bool,
}

/// Follows the node one height at a time and feeds the worker streams.
pub struct Extender {
    config: ExtenderConfig,
    shared: Shared,
    coins: CoinRegistry,
    pools: PoolBook,
    mode: ModeTracker,
    streams: Option<Streams>,
    faults: mpsc::UnboundedReceiver<ExtenderError>,
    last_block: Option<Block>,
    next_height: u64,
}

impl Extender {
    /// Load the resume point from the store and start the worker streams.
    pub async fn new(
        config: ExtenderConfig,
        node: Arc<dyn NodeClient>,
        store: Arc<dyn Store>,
        broadcast: BroadcastService,
    ) -> Result<Self, ExtenderError> {
        config.validate()?;

        let last_block = store.last_block().await?;
        let next_height = last_block
            .as_ref()
            .map_or(config.start_height, |b| b.id + 1);
        let resolvers = Arc::new(Resolvers::new(Arc::clone(&store), config.identity_cache_capacity));
        let coins = CoinRegistry::init(
            Arc::clone(&store),
            &config.base_coin,
            &resolvers.coins,
            next_height,
        )
        .await?;

        let shared = Shared {
            store: Arc::clone(&store),
            node,
            resolvers,
            broadcast,
            strict_resolution: config.strict_resolution,
        };
        let (reporter, faults) = FaultReporter::channel();
        let ctx = PoolContext {
            retry: config.retry_policy(),
            strict_resolution: config.strict_resolution,
            faults: reporter,
        };
        let streams = Streams::spawn(&config.streams, &shared, &ctx);

        info!(
            next_height,
            last_coin_id = coins.last_id(),
            strict = config.strict_resolution,
            "extender ready"
        );
        Ok(Self {
            pools: PoolBook::new(store, config.strict_resolution),
            mode: ModeTracker::new(config.chasing_threshold, config.live_recheck_interval),
            config,
            shared,
            coins,
            streams: Some(streams),
            faults,
            last_block,
            next_height,
        })
    }

    /// Height the loop will process next.
    pub fn next_height(&self) -> u64 {
        self.next_height
    }

    pub fn mode(&self) -> SyncMode {
        self.mode.mode()
    }

    pub fn last_block(&self) -> Option<&Block> {
        self.last_block.as_ref()
    }

    pub fn shared(&self) -> &Shared {
        &self.shared
    }

    /// Follow the node until a fatal error.
    pub async fn run(&mut self) -> Result<(), ExtenderError> {
        self.run_until(u64::MAX).await
    }

    /// Process heights up to and including `last`.
    pub async fn run_until(&mut self, last: u64) -> Result<(), ExtenderError> {
        info!(from = self.next_height, "extender running");
        while self.next_height <= last {
            self.check_faults()?;
            let height = self.next_height;
            self.process_height(height).await?;
            self.next_height = height.saturating_add(1);
        }
        self.check_faults()
    }

    /// Stop the streams, waiting for queued work. Returns the first fault a
    /// detached job reported, if any.
    pub async fn shutdown(&mut self) -> Result<(), ExtenderError> {
        if let Some(streams) = self.streams.take() {
            streams.shutdown().await;
        }
        let first = self.faults.try_recv().ok();
        while let Ok(extra) = self.faults.try_recv() {
            warn!(error = %extra, "additional worker fault");
        }
        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn check_faults(&mut self) -> Result<(), ExtenderError> {
        match self.faults.try_recv() {
            Ok(e) => Err(e),
            Err(_) => Ok(()),
        }
    }

    fn queues(&self) -> Result<Queues, ExtenderError> {
        self.streams
            .as_ref()
            .map(|s| s.queues.clone())
            .ok_or_else(|| ExtenderError::Aborted {
                reason: "extender is shut down".into(),
            })
    }

    /// Run `op` until it yields a value, sleeping `block_retry_delay` after
    /// an empty answer or a transient failure.
    async fn until_available<T, F, Fut>(&mut self, height: u64, what: &'static str, mut op: F) -> Result<T, ExtenderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, ExtenderError>>,
    {
        let delay = self.config.block_retry_delay();
        loop {
            match op().await {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => debug!(height, what, "not available yet"),
                Err(e) if is_transient(&e) => warn!(height, what, error = %e, "node unavailable, retrying"),
                Err(e) => return Err(e),
            }
            self.check_faults()?;
            tokio::time::sleep(delay).await;
        }
    }

    async fn sample_node(&mut self, height: u64) -> Result<(), ExtenderError> {
        if !self.mode.needs_sample(height) {
            return Ok(());
        }
        let node = Arc::clone(&self.shared.node);
        let status: NodeStatus = self
            .until_available(height, "status", || {
                let node = Arc::clone(&node);
                async move { node.status().await.map(Some) }
            })
            .await?;
        let mode = self.mode.observe(height, status.latest_block_height);
        self.shared.broadcast.publish(
            STATUS_CHANNEL,
            json!({
                "latest_block_height": status.latest_block_height,
                "latest_block_time": status.latest_block_time,
                "height": height,
                "mode": mode.to_string(),
            }),
        );
        Ok(())
    }

    async fn process_height(&mut self, height: u64) -> Result<(), ExtenderError> {
        self.sample_node(height).await?;

        let node = Arc::clone(&self.shared.node);
        let block: NodeBlock = self
            .until_available(height, "block", || {
                let node = Arc::clone(&node);
                async move { node.block(height).await }
            })
            .await?;
        let events = self
            .until_available(height, "events", || {
                let node = Arc::clone(&node);
                async move { node.events(height).await.map(Some) }
            })
            .await?
            .events;

        let batch = self.coins.assign(&block).await?;
        let queues = self.queues()?;
        let resolvers = Arc::clone(&self.shared.resolvers);
        let store = Arc::clone(&self.shared.store);

        // Addresses, through the awaited stream.
        let addresses: BTreeSet<&str> = block
            .transactions
            .iter()
            .flat_map(|tx| tx.referenced_addresses())
            .chain(events.iter().filter_map(NodeEvent::address))
            .chain(batch.owner_addresses())
            .collect();
        let addresses: Vec<&str> = addresses.into_iter().collect();
        let missing = resolvers.addresses.uncached(&addresses);
        if !missing.is_empty() {
            debug!(height, addresses = missing.len(), "creating addresses");
            queues.addresses.submit_chunks_and_wait(missing).await?;
        }

        // Validators.
        let mut keys: BTreeSet<&str> = block.proposer.iter().map(String::as_str).collect();
        keys.extend(block.signatures.iter().map(|s| s.public_key.as_str()));
        keys.extend(block.valid_transactions().flat_map(|tx| tx.data.public_keys()));
        keys.extend(events.iter().filter_map(NodeEvent::validator_pub_key));
        let keys: Vec<&str> = keys.into_iter().collect();
        let validator_ids = resolvers.validators.resolve_many_or_create(&keys).await?;

        let created = self.coins.persist(batch, &resolvers).await?;
        if !created.is_empty() {
            debug!(height, coins = created.len(), "coins stored");
        }

        // Pools and orders, in transaction order.
        let changes = self.pools.apply(&block, &resolvers).await?;

        // Block row, committed with the pool and order rows.
        let block_time = match &self.last_block {
            Some(prev) => (block.time - prev.created_at)
                .num_nanoseconds()
                .map_or(0, |ns| ns.max(0) as u64),
            None => FIRST_BLOCK_TIME_NS,
        };
        let row = Block {
            id: height,
            hash: block.hash.clone(),
            size: block.size,
            num_txs: u32::try_from(block.transactions.len()).unwrap_or(u32::MAX),
            block_time,
            block_reward: block.block_reward.clone(),
            proposer_validator_id: block.proposer.as_ref().and_then(|k| validator_ids.get(k).copied()),
            created_at: block.time,
        };
        let activated = store.commit_block(&row, &changes.pools, &changes.orders).await?;
        if activated > 0 {
            debug!(height, orders = activated, "orders activated");
        }

        let links: Vec<BlockValidator> = block
            .signatures
            .iter()
            .filter_map(|s| {
                validator_ids.get(&s.public_key).map(|&validator_id| BlockValidator {
                    block_id: height,
                    validator_id,
                    signed: s.signed,
                })
            })
            .collect();
        if !links.is_empty() {
            queues.block_validators.submit_chunks(links).await?;
        }

        // Work derived from the block before its transactions move out.
        let touched: BTreeSet<String> = block
            .transactions
            .iter()
            .flat_map(|tx| tx.referenced_addresses())
            .chain(events.iter().filter(|e| e.touches_balance()).filter_map(NodeEvent::address))
            .map(str::to_string)
            .collect();
        let traded: BTreeSet<u64> = block
            .valid_transactions()
            .flat_map(|tx| tx.data.traded_coins())
            .collect();
        let summary = json!({
            "height": height,
            "hash": block.hash,
            "size": block.size,
            "num_txs": row.num_txs,
            "block_time": block_time,
            "block_reward": block.block_reward,
            "proposer": block.proposer,
            "timestamp": block.time,
        });

        let created_at = block.time;
        let (valid, invalid): (Vec<TxJob>, Vec<TxJob>) = block
            .transactions
            .into_iter()
            .map(|tx| TxJob {
                block_id: height,
                created_at,
                tx,
            })
            .partition(|job| job.tx.is_valid());
        let num_valid = valid.len();
        if !valid.is_empty() {
            queues.transactions.submit_chunks(valid).await?;
        }
        if !invalid.is_empty() {
            queues.invalid_txs.submit_chunks(invalid).await?;
        }

        if !events.is_empty() {
            queues
                .events
                .submit(EventsJob {
                    block_id: height,
                    events,
                })
                .await?;
        }
        if !touched.is_empty() {
            queues.balances.submit_chunks(touched.into_iter().collect()).await?;
        }
        if !traded.is_empty() {
            queues.coin_info.submit_chunks(traded.into_iter().collect()).await?;
        }

        if height % self.config.stake_refresh_interval == 0 {
            queues
                .validators
                .submit(ValidatorRefresh {
                    height,
                    with_stakes: true,
                })
                .await?;
        } else if height % self.config.validator_refresh_interval == 0 {
            queues
                .validators
                .submit(ValidatorRefresh {
                    height,
                    with_stakes: false,
                })
                .await?;
        }

        self.shared.broadcast.publish(BLOCKS_CHANNEL, summary);

        let mode = self.mode.mode();
        if mode == SyncMode::Live {
            info!(height, txs = row.num_txs, valid = num_valid, %mode, "block processed");
        } else {
            debug!(height, txs = row.num_txs, valid = num_valid, %mode, "block processed");
        }
        self.last_block = Some(row);
        Ok(())
    }
}

/// Transient node failures, including ones the client already retried.
fn is_transient(err: &ExtenderError) -> bool {
    match err {
        ExtenderError::RetriesExhausted { source, .. } => source.is_retryable(),
        other => other.is_retryable(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_node_retries_stay_transient() {
        let err = ExtenderError::RetriesExhausted {
            attempts: 3,
            source: Box::new(ExtenderError::Node("connection reset".into())),
        };
        assert!(is_transient(&err));

        let err = ExtenderError::RetriesExhausted {
            attempts: 3,
            source: Box::new(ExtenderError::Config("bad".into())),
        };
        assert!(!is_transient(&err));
        assert!(!is_transient(&ExtenderError::decode("garbage")));
    }
}
