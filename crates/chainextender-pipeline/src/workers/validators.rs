use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use chainextender_core::error::ExtenderError;
use chainextender_core::model::{Stake, ValidatorUpdate};
use chainextender_core::queue::Worker;
use chainextender_core::types::Candidate;

use super::resolve_known;
use crate::extender::Shared;
use crate::jobs::ValidatorRefresh;

/// Rewrites the validator table (and optionally the stake table) from the
/// node's candidate list.
pub struct ValidatorWorker {
    shared: Shared,
}

impl ValidatorWorker {
    pub fn new(shared: Shared) -> Self {
        Self { shared }
    }

    async fn refresh_stakes(&self, candidates: &[Candidate]) -> Result<(), ExtenderError> {
        let resolvers = &self.shared.resolvers;
        let stakes: Vec<(&Candidate, &chainextender_core::types::CandidateStake)> = candidates
            .iter()
            .flat_map(|c| c.stakes.iter().flatten().map(move |s| (c, s)))
            .collect();

        let keys: Vec<&str> = candidates.iter().map(|c| c.public_key.as_str()).collect();
        let validator_ids = resolvers.validators.resolve_many(&keys).await?;
        let owners: Vec<&str> = stakes.iter().map(|(_, s)| s.owner.as_str()).collect();
        let owner_ids = resolvers.addresses.resolve_many_or_create(&owners).await?;
        let tickers: Vec<&str> = stakes
            .iter()
            .map(|(_, s)| s.coin.symbol.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let coin_ids = resolve_known(&resolvers.coins, &tickers, false).await?;

        let mut rows = Vec::with_capacity(stakes.len());
        for (candidate, stake) in stakes {
            let (Some(&validator_id), Some(&owner_address_id)) = (
                validator_ids.get(&candidate.public_key),
                owner_ids.get(&stake.owner),
            ) else {
                continue;
            };
            let Some(&coin_id) = coin_ids.get(&stake.coin.symbol) else {
                warn!(symbol = %stake.coin.symbol, "stake in unknown coin skipped");
                continue;
            };
            rows.push(Stake {
                validator_id,
                owner_address_id,
                coin_id,
                value: stake.value.clone(),
                bip_value: stake.bip_value.clone(),
                is_kicked: false,
            });
        }

        let kept = self.shared.store.upsert_stakes(&rows).await?;
        let deleted = self.shared.store.delete_stakes_except(&kept).await?;
        info!(stakes = kept.len(), deleted, "stakes refreshed");
        Ok(())
    }
}

#[async_trait]
impl Worker<ValidatorRefresh> for ValidatorWorker {
    async fn handle(&self, job: &ValidatorRefresh) -> Result<(), ExtenderError> {
        let resolvers = &self.shared.resolvers;
        let candidates = self.shared.node.candidates(job.height, job.with_stakes).await?;

        let keys: Vec<&str> = candidates.iter().map(|c| c.public_key.as_str()).collect();
        let validator_ids = resolvers.validators.resolve_many_or_create(&keys).await?;
        let addresses: Vec<&str> = candidates
            .iter()
            .flat_map(|c| {
                [
                    c.reward_address.as_str(),
                    c.owner_address.as_str(),
                    c.control_address.as_str(),
                ]
            })
            .collect();
        let address_ids = resolvers.addresses.resolve_many_or_create(&addresses).await?;

        let now = Utc::now();
        let mut updates = Vec::with_capacity(candidates.len());
        for c in &candidates {
            let ids = (
                validator_ids.get(&c.public_key),
                address_ids.get(&c.reward_address),
                address_ids.get(&c.owner_address),
                address_ids.get(&c.control_address),
            );
            let (Some(&id), Some(&reward), Some(&owner), Some(&control)) = ids else {
                warn!(public_key = %c.public_key, "candidate with malformed keys skipped");
                continue;
            };
            updates.push(ValidatorUpdate {
                id,
                status: c.status,
                commission: c.commission,
                total_stake: c.total_stake.clone(),
                reward_address_id: reward,
                owner_address_id: owner,
                control_address_id: control,
                updated_at: now,
            });
        }

        self.shared.store.refresh_validators(&updates).await?;
        info!(height = job.height, validators = updates.len(), "validator set refreshed");

        if job.with_stakes {
            self.refresh_stakes(&candidates).await?;
        }
        Ok(())
    }
}
