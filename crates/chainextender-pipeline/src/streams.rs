//! Wiring of the twelve worker streams.

use std::sync::Arc;

use tracing::info;

use chainextender_core::config::StreamsConfig;
use chainextender_core::model::{BlockValidator, Reward, Slash, TransactionValidator};
use chainextender_core::queue::{PoolContext, TaskQueue, WorkerPool};

use crate::extender::Shared;
use crate::jobs::{EventsJob, OutputJob, TxJob, ValidatorRefresh};
use crate::workers::{
    AddressWorker, BalanceWorker, BlockValidatorWriter, CoinInfoWorker, EventWorker, InvalidTxWorker,
    OutputWorker, RewardWriter, SlashWriter, TransactionWorker, TxValidatorWriter, ValidatorWorker,
};

/// Producer handles of every stream.
#[derive(Clone)]
pub struct Queues {
    pub addresses: TaskQueue<Vec<String>>,
    pub transactions: TaskQueue<Vec<TxJob>>,
    pub tx_outputs: TaskQueue<Vec<OutputJob>>,
    pub invalid_txs: TaskQueue<Vec<TxJob>>,
    pub tx_validators: TaskQueue<Vec<TransactionValidator>>,
    pub block_validators: TaskQueue<Vec<BlockValidator>>,
    pub rewards: TaskQueue<Vec<Reward>>,
    pub slashes: TaskQueue<Vec<Slash>>,
    pub balances: TaskQueue<Vec<String>>,
    pub events: TaskQueue<EventsJob>,
    pub coin_info: TaskQueue<Vec<u64>>,
    pub validators: TaskQueue<ValidatorRefresh>,
}

/// Running streams: the queues plus the worker pools behind them.
pub struct Streams {
    pub queues: Queues,
    /// Upstream pools first; see [`Streams::shutdown`].
    pools: Vec<WorkerPool>,
}

impl Streams {
    /// Spawn every worker pool. Streams that feed other streams are spawned
    /// after the streams they feed.
    pub fn spawn(config: &StreamsConfig, shared: &Shared, ctx: &PoolContext) -> Self {
        let store = &shared.store;

        let (tx_validators, tx_validators_pool) = TaskQueue::spawn(
            "tx_validators",
            config.tx_validators,
            Arc::new(TxValidatorWriter::new(Arc::clone(store))),
            ctx.clone(),
        );
        let (tx_outputs, tx_outputs_pool) = TaskQueue::spawn(
            "tx_outputs",
            config.tx_outputs,
            Arc::new(OutputWorker::new(shared.clone())),
            ctx.clone(),
        );
        let (block_validators, block_validators_pool) = TaskQueue::spawn(
            "block_validators",
            config.block_validators,
            Arc::new(BlockValidatorWriter::new(Arc::clone(store))),
            ctx.clone(),
        );
        let (rewards, rewards_pool) = TaskQueue::spawn(
            "rewards",
            config.rewards,
            Arc::new(RewardWriter::new(Arc::clone(store))),
            ctx.clone(),
        );
        let (slashes, slashes_pool) = TaskQueue::spawn(
            "slashes",
            config.slashes,
            Arc::new(SlashWriter::new(Arc::clone(store))),
            ctx.clone(),
        );
        let (coin_info, coin_info_pool) = TaskQueue::spawn(
            "coin_info",
            config.coin_info,
            Arc::new(CoinInfoWorker::new(shared.clone())),
            ctx.clone(),
        );
        let (balances, balances_pool) = TaskQueue::spawn(
            "balances",
            config.balances,
            Arc::new(BalanceWorker::new(shared.clone())),
            ctx.clone(),
        );
        let (addresses, addresses_pool) = TaskQueue::spawn(
            "addresses",
            config.addresses,
            Arc::new(AddressWorker::new(Arc::clone(&shared.resolvers))),
            ctx.clone(),
        );
        let (validators, validators_pool) = TaskQueue::spawn(
            "validators",
            config.validators,
            Arc::new(ValidatorWorker::new(shared.clone())),
            ctx.clone(),
        );
        let (invalid_txs, invalid_txs_pool) = TaskQueue::spawn(
            "invalid_txs",
            config.invalid_txs,
            Arc::new(InvalidTxWorker::new(shared.clone())),
            ctx.clone(),
        );
        let (transactions, transactions_pool) = TaskQueue::spawn(
            "transactions",
            config.transactions,
            Arc::new(TransactionWorker::new(
                shared.clone(),
                tx_outputs.clone(),
                tx_validators.clone(),
            )),
            ctx.clone(),
        );
        let (events, events_pool) = TaskQueue::spawn(
            "events",
            config.events,
            Arc::new(EventWorker::new(
                shared.clone(),
                rewards.clone(),
                slashes.clone(),
                coin_info.clone(),
            )),
            ctx.clone(),
        );

        let pools = vec![
            addresses_pool,
            validators_pool,
            transactions_pool,
            invalid_txs_pool,
            events_pool,
            block_validators_pool,
            tx_outputs_pool,
            tx_validators_pool,
            rewards_pool,
            slashes_pool,
            coin_info_pool,
            balances_pool,
        ];
        info!(streams = pools.len(), "worker streams started");

        Self {
            queues: Queues {
                addresses,
                transactions,
                tx_outputs,
                invalid_txs,
                tx_validators,
                block_validators,
                rewards,
                slashes,
                balances,
                events,
                coin_info,
                validators,
            },
            pools,
        }
    }

    /// Drop the producer handles and wait for every queued job to finish.
    ///
    /// Pools are joined upstream first: a transaction worker holds handles to
    /// the output and validator-link streams, which only close once it exits.
    pub async fn shutdown(self) {
        let Self { queues, pools } = self;
        drop(queues);
        for pool in pools {
            pool.join().await;
        }
        info!("worker streams stopped");
    }
}
