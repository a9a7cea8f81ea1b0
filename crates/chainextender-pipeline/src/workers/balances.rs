use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use chainextender_core::error::ExtenderError;
use chainextender_core::model::Balance;
use chainextender_core::queue::Worker;

use super::resolve_known;
use crate::extender::Shared;

/// Replaces the balance rows of a chunk of addresses with the node's
/// current snapshot and publishes each address's balances on its channel.
pub struct BalanceWorker {
    shared: Shared,
}

impl BalanceWorker {
    pub fn new(shared: Shared) -> Self {
        Self { shared }
    }
}

#[async_trait]
impl Worker<Vec<String>> for BalanceWorker {
    async fn handle(&self, job: &Vec<String>) -> Result<(), ExtenderError> {
        let snapshots = self.shared.node.balances(job).await?;

        let address_ids = resolve_known(
            &self.shared.resolvers.addresses,
            job,
            self.shared.strict_resolution,
        )
        .await?;
        let tickers: Vec<&str> = snapshots
            .iter()
            .flat_map(|s| s.balances.iter().map(|b| b.coin.symbol.as_str()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        // Coins the store has never seen are skipped, never fatal.
        let coin_ids = resolve_known(&self.shared.resolvers.coins, &tickers, false).await?;

        let mut rows = Vec::new();
        let mut replaced = Vec::new();
        for snapshot in &snapshots {
            let Some(&address_id) = address_ids.get(&snapshot.address) else {
                continue;
            };
            replaced.push(address_id);
            for entry in &snapshot.balances {
                if let Some(&coin_id) = coin_ids.get(&entry.coin.symbol) {
                    rows.push(Balance {
                        address_id,
                        coin_id,
                        value: entry.value.clone(),
                    });
                }
            }
        }
        self.shared.store.replace_balances(&replaced, &rows).await?;
        debug!(stream = "balances", addresses = replaced.len(), rows = rows.len(), "balances replaced");

        for snapshot in snapshots {
            let balances: Vec<_> = snapshot
                .balances
                .iter()
                .map(|b| json!({"coin": b.coin.symbol, "coin_id": b.coin.id, "value": b.value}))
                .collect();
            self.shared
                .broadcast
                .publish(snapshot.address.clone(), json!({"address": snapshot.address, "balances": balances}));
        }
        Ok(())
    }
}
