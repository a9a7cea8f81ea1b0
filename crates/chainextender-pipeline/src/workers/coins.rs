use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::{debug, warn};

use chainextender_core::error::ExtenderError;
use chainextender_core::queue::Worker;
use chainextender_core::types::CoinInfo;

use crate::extender::Shared;

/// Re-reads supply and reserve of traded or slashed coins from the node.
pub struct CoinInfoWorker {
    shared: Shared,
}

impl CoinInfoWorker {
    pub fn new(shared: Shared) -> Self {
        Self { shared }
    }

    /// Look the coin up by id, falling back to its ticker for nodes that
    /// only index current coins by symbol.
    async fn coin_info(&self, id: u64, ticker: &str) -> Result<Option<CoinInfo>, ExtenderError> {
        match self.shared.node.coin_info_by_id(id).await {
            Ok(info) => Ok(Some(info)),
            Err(ExtenderError::NotFound { .. }) => match self.shared.node.coin_info_by_symbol(ticker).await {
                Ok(info) => Ok(Some(info)),
                Err(ExtenderError::NotFound { .. }) => Ok(None),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Worker<Vec<u64>> for CoinInfoWorker {
    async fn handle(&self, job: &Vec<u64>) -> Result<(), ExtenderError> {
        let ids: BTreeSet<u64> = job.iter().copied().collect();
        let mut updated = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(mut coin) = self.shared.store.find_coin_by_id(id).await? else {
                warn!(coin_id = id, "coin info refresh for unknown coin");
                continue;
            };
            let Some(info) = self.coin_info(id, &coin.ticker()).await? else {
                warn!(coin_id = id, symbol = %coin.symbol, "node no longer knows coin");
                continue;
            };
            for (field, value) in [
                (&mut coin.volume, info.volume),
                (&mut coin.reserve, info.reserve_balance),
                (&mut coin.max_supply, info.max_supply),
            ] {
                if !value.is_empty() {
                    *field = value;
                }
            }
            updated.push(coin);
        }
        if !updated.is_empty() {
            self.shared.store.upsert_coins(&updated).await?;
        }
        debug!(stream = "coin_info", coins = updated.len(), "coin info refreshed");
        Ok(())
    }
}
