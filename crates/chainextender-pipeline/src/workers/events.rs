use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use chainextender_core::error::ExtenderError;
use chainextender_core::event::NodeEvent;
use chainextender_core::model::{OrderStatus, Reward, Slash};
use chainextender_core::queue::{TaskQueue, Worker};

use super::resolve_known;
use crate::extender::Shared;
use crate::jobs::EventsJob;

/// Turns a block's events into reward and slash rows, and applies coin
/// liquidations and order expiries.
pub struct EventWorker {
    shared: Shared,
    rewards: TaskQueue<Vec<Reward>>,
    slashes: TaskQueue<Vec<Slash>>,
    coin_info: TaskQueue<Vec<u64>>,
}

impl EventWorker {
    pub fn new(
        shared: Shared,
        rewards: TaskQueue<Vec<Reward>>,
        slashes: TaskQueue<Vec<Slash>>,
        coin_info: TaskQueue<Vec<u64>>,
    ) -> Self {
        Self {
            shared,
            rewards,
            slashes,
            coin_info,
        }
    }

    async fn liquidate(&self, coin_id: u64) -> Result<(), ExtenderError> {
        let Some(coin) = self.shared.store.find_coin_by_id(coin_id).await? else {
            warn!(coin_id, "liquidation of unknown coin");
            return Ok(());
        };
        self.shared.resolvers.coins.forget(&coin.ticker());
        let balances = self.shared.store.liquidate_coin(coin_id).await?;
        info!(coin_id, symbol = %coin.symbol, balances, "coin liquidated");
        Ok(())
    }

    /// Coins among `ids` that exist locally.
    async fn known_coins(&self, ids: BTreeSet<u64>) -> Result<BTreeSet<u64>, ExtenderError> {
        let mut known = BTreeSet::new();
        for id in ids {
            if self.shared.store.find_coin_by_id(id).await?.is_some() {
                known.insert(id);
            } else {
                warn!(coin_id = id, "slash in unknown coin skipped");
            }
        }
        Ok(known)
    }

    async fn expire_order(&self, id: u64) -> Result<(), ExtenderError> {
        let Some(mut order) = self.shared.store.find_order(id).await? else {
            warn!(order_id = id, "expiry for unknown order");
            return Ok(());
        };
        if !order.status.can_transition_to(OrderStatus::Expired) {
            debug!(order_id = id, status = order.status.as_str(), "order already closed");
            return Ok(());
        }
        order.status = OrderStatus::Expired;
        self.shared.store.upsert_orders(&[order]).await
    }
}

#[async_trait]
impl Worker<EventsJob> for EventWorker {
    async fn handle(&self, job: &EventsJob) -> Result<(), ExtenderError> {
        let strict = self.shared.strict_resolution;
        let addresses: Vec<&str> = job.events.iter().filter_map(NodeEvent::address).collect();
        let keys: Vec<&str> = job.events.iter().filter_map(NodeEvent::validator_pub_key).collect();
        let address_ids = resolve_known(&self.shared.resolvers.addresses, &addresses, strict).await?;
        let validator_ids = resolve_known(&self.shared.resolvers.validators, &keys, strict).await?;
        let slashed_coins = job
            .events
            .iter()
            .filter_map(|e| match e {
                NodeEvent::Slash { coin, .. } => Some(*coin),
                _ => None,
            })
            .collect();
        let slashed_coins = self.known_coins(slashed_coins).await?;

        let mut rewards = Vec::new();
        let mut slashes = Vec::new();
        for event in &job.events {
            match event {
                NodeEvent::Reward {
                    role,
                    address,
                    amount,
                    validator_pub_key,
                    ..
                } => {
                    if let (Some(&address_id), Some(&validator_id)) =
                        (address_ids.get(address), validator_ids.get(validator_pub_key))
                    {
                        rewards.push(Reward {
                            block_id: job.block_id,
                            address_id,
                            validator_id,
                            role: *role,
                            amount: amount.clone(),
                        });
                    }
                }
                NodeEvent::Slash {
                    address,
                    amount,
                    coin,
                    validator_pub_key,
                } => {
                    if !slashed_coins.contains(coin) {
                        continue;
                    }
                    if let (Some(&address_id), Some(&validator_id)) =
                        (address_ids.get(address), validator_ids.get(validator_pub_key))
                    {
                        slashes.push(Slash {
                            block_id: job.block_id,
                            address_id,
                            validator_id,
                            coin_id: *coin,
                            amount: amount.clone(),
                        });
                    }
                }
                NodeEvent::CoinLiquidation { coin } => self.liquidate(*coin).await?,
                NodeEvent::OrderExpired { id, .. } => self.expire_order(*id).await?,
                // Balance effects are picked up by the balance stream.
                NodeEvent::Unbond { .. } | NodeEvent::StakeKick { .. } => {}
            }
        }

        debug!(
            stream = "events",
            block_id = job.block_id,
            rewards = rewards.len(),
            slashes = slashes.len(),
            "events split"
        );
        if !rewards.is_empty() {
            self.rewards.submit_chunks(rewards).await?;
        }
        if !slashes.is_empty() {
            self.slashes.submit_chunks(slashes).await?;
        }
        if !slashed_coins.is_empty() {
            self.coin_info.submit_chunks(slashed_coins.into_iter().collect()).await?;
        }
        Ok(())
    }
}
