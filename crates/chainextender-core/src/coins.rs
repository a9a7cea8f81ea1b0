//! Coin id sequencing.
//!
//! Coin ids are assigned by the extender, not the store: the node numbers
//! coins in creation order, and the registry replays that numbering from the
//! highest id already stored. The registry is owned by the ingestion loop,
//! which processes one block at a time, so the counter needs no locking.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::ExtenderError;
use crate::identity::{IdentityResolver, Resolvers};
use crate::model::{Coin, BASE_COIN_ID};
use crate::store::Store;
use crate::tx::{CreateCoinData, CreateTokenData, TxData};
use crate::types::{NodeBlock, NodeTransaction};

/// Tag the node attaches to coin-creating transactions.
const COIN_ID_TAG: &str = "tx.coin_id";

/// A coin created in the current block, waiting for its owner id.
#[derive(Debug, Clone)]
pub struct PendingCoin {
    pub coin: Coin,
    /// Address to resolve as owner, unless the owner id is already known.
    pub owner: Option<String>,
}

/// Coin changes derived from one block.
#[derive(Debug, Default)]
pub struct CoinBatch {
    pub created: Vec<PendingCoin>,
    /// Previously stored coins retired by a recreate, with their new version.
    pub superseded: Vec<Coin>,
    /// `(symbol, new owner address)` in transaction order.
    pub owner_changes: Vec<(String, String)>,
}

impl CoinBatch {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.superseded.is_empty() && self.owner_changes.is_empty()
    }

    /// Addresses that must be resolved before the batch is persisted.
    pub fn owner_addresses(&self) -> Vec<&str> {
        self.created
            .iter()
            .filter_map(|p| p.owner.as_deref())
            .chain(self.owner_changes.iter().map(|(_, owner)| owner.as_str()))
            .collect()
    }
}

/// In-process coin id counter.
pub struct CoinRegistry {
    store: Arc<dyn Store>,
    last_id: u64,
}

impl CoinRegistry {
    /// Load the counter from the store, creating the base coin in an empty
    /// store.
    ///
    /// `next_height` is the first height the loop will process. Coins stored
    /// for that height or later belong to a block that was never committed;
    /// they are discarded so the height can be replayed from a clean counter.
    pub async fn init(
        store: Arc<dyn Store>,
        base_coin: &str,
        coins: &IdentityResolver,
        next_height: u64,
    ) -> Result<Self, ExtenderError> {
        let discarded = store.discard_coins_from(next_height).await?;
        if !discarded.is_empty() {
            let ids: Vec<u64> = discarded.iter().map(|c| c.id).collect();
            warn!(next_height, ?ids, "discarded coins of an uncommitted block");
        }
        let last_id = match store.max_coin_id().await? {
            Some(id) => id,
            None => {
                info!(symbol = base_coin, "creating base coin");
                store.upsert_coins(&[base(base_coin)]).await?;
                BASE_COIN_ID
            }
        };
        coins.remember(base_coin, BASE_COIN_ID)?;
        debug!(last_id, "coin registry ready");
        Ok(Self { store, last_id })
    }

    pub fn last_id(&self) -> u64 {
        self.last_id
    }

    /// Assign ids to the coins created by `block`'s valid transactions, in
    /// transaction order.
    ///
    /// Fails with [`ExtenderError::CoinSequence`] if the node reports a
    /// different id than the counter produces. The counter only advances
    /// when the whole block is consistent.
    pub async fn assign(&mut self, block: &NodeBlock) -> Result<CoinBatch, ExtenderError> {
        let mut batch = CoinBatch::default();
        let mut next_id = self.last_id;
        // Highest version handed out per symbol within this block.
        let mut versions: HashMap<String, u32> = HashMap::new();

        for tx in block.valid_transactions() {
            match &tx.data {
                TxData::CreateCoin(d) => {
                    next_id = expect_next(tx, next_id)?;
                    batch.created.push(pending(from_coin_data(next_id, d, block.height), tx));
                }
                TxData::CreateToken(d) => {
                    next_id = expect_next(tx, next_id)?;
                    batch.created.push(pending(from_token_data(next_id, d, block.height), tx));
                }
                TxData::RecreateCoin(d) => {
                    next_id = expect_next(tx, next_id)?;
                    let coin = from_coin_data(next_id, d, block.height);
                    self.recreate(&mut batch, &mut versions, coin, tx).await?;
                }
                TxData::RecreateToken(d) => {
                    next_id = expect_next(tx, next_id)?;
                    let coin = from_token_data(next_id, d, block.height);
                    self.recreate(&mut batch, &mut versions, coin, tx).await?;
                }
                TxData::EditCoinOwner(d) => {
                    batch
                        .owner_changes
                        .push((d.symbol.to_ascii_uppercase(), d.new_owner.clone()));
                }
                _ => {}
            }
        }

        if next_id != self.last_id {
            debug!(
                height = block.height,
                from = self.last_id + 1,
                to = next_id,
                "assigned coin ids"
            );
        }
        self.last_id = next_id;
        Ok(batch)
    }

    /// Retire the current version of `coin.symbol` and queue `coin` as its
    /// replacement.
    async fn recreate(
        &self,
        batch: &mut CoinBatch,
        versions: &mut HashMap<String, u32>,
        mut coin: Coin,
        tx: &NodeTransaction,
    ) -> Result<(), ExtenderError> {
        let symbol = coin.symbol.clone();
        let stored_max = match versions.get(&symbol) {
            Some(v) => *v,
            None => self.store.max_coin_version(&symbol).await?.unwrap_or(0),
        };
        let version = stored_max + 1;
        let mut owner = Some(tx.from.clone());

        let same_block = batch
            .created
            .iter_mut()
            .find(|p| p.coin.symbol == symbol && p.coin.version == 0);
        if let Some(previous) = same_block {
            previous.coin.version = version;
            owner = previous.owner.clone();
            coin.owner_address_id = previous.coin.owner_address_id;
        } else if let Some(mut previous) = self.store.find_coin(&symbol, 0).await? {
            previous.version = version;
            if previous.owner_address_id.is_some() {
                owner = None;
                coin.owner_address_id = previous.owner_address_id;
            }
            batch.superseded.push(previous);
        } else {
            warn!(symbol = %symbol, hash = %tx.hash, "recreated coin has no current version on record");
        }

        versions.insert(symbol, version);
        batch.created.push(PendingCoin { coin, owner });
        Ok(())
    }

    /// Write a block's coin changes and update the coin cache.
    ///
    /// Owner addresses must already exist (see [`CoinBatch::owner_addresses`]).
    pub async fn persist(&self, batch: CoinBatch, resolvers: &Resolvers) -> Result<Vec<Coin>, ExtenderError> {
        if batch.is_empty() {
            return Ok(vec![]);
        }
        let owners = resolvers.addresses.resolve_many(&batch.owner_addresses()).await?;

        if !batch.superseded.is_empty() {
            self.store.upsert_coins(&batch.superseded).await?;
            for old in &batch.superseded {
                resolvers.coins.forget(&old.symbol);
                resolvers.coins.remember(&old.ticker(), old.id)?;
            }
        }

        let mut created: Vec<Coin> = batch
            .created
            .into_iter()
            .map(|p| {
                let mut coin = p.coin;
                if let Some(owner) = p.owner {
                    coin.owner_address_id = owners.get(&owner).copied();
                }
                coin
            })
            .collect();

        // Owner edits that target a coin created in this same block.
        let mut edits = Vec::new();
        for (symbol, owner) in &batch.owner_changes {
            let Some(&owner_id) = owners.get(owner) else {
                continue;
            };
            if let Some(coin) = created.iter_mut().find(|c| &c.symbol == symbol && c.version == 0) {
                coin.owner_address_id = Some(owner_id);
            } else {
                edits.push((symbol.as_str(), owner_id));
            }
        }

        // Retired versions go first so the symbol's current slot is free.
        created.sort_by_key(|c| c.version == 0);
        self.store.upsert_coins(&created).await?;
        for coin in &created {
            resolvers.coins.remember(&coin.ticker(), coin.id)?;
        }

        let mut edited = Vec::new();
        for (symbol, owner_id) in edits {
            match self.store.find_coin(symbol, 0).await? {
                Some(mut coin) => {
                    coin.owner_address_id = Some(owner_id);
                    edited.push(coin);
                }
                None => warn!(symbol, "owner change for unknown coin"),
            }
        }
        if !edited.is_empty() {
            self.store.upsert_coins(&edited).await?;
        }

        created.extend(edited);
        Ok(created)
    }
}

fn base(symbol: &str) -> Coin {
    Coin {
        id: BASE_COIN_ID,
        name: symbol.to_string(),
        symbol: symbol.to_string(),
        crr: 0,
        volume: "0".into(),
        reserve: "0".into(),
        max_supply: "0".into(),
        mintable: false,
        burnable: false,
        owner_address_id: None,
        created_at_block_id: None,
        version: 0,
    }
}

/// Advance the counter for a coin-creating transaction, checking it against
/// the id the node reports.
fn expect_next(tx: &NodeTransaction, last_id: u64) -> Result<u64, ExtenderError> {
    let expected = last_id + 1;
    if let Some(tag) = tx.tag(COIN_ID_TAG) {
        let reported: u64 = tag
            .parse()
            .map_err(|_| ExtenderError::decode(format!("bad {COIN_ID_TAG} tag '{tag}'")))?;
        if reported != expected {
            return Err(ExtenderError::CoinSequence { expected, reported });
        }
    }
    Ok(expected)
}

fn pending(coin: Coin, tx: &NodeTransaction) -> PendingCoin {
    PendingCoin {
        coin,
        owner: Some(tx.from.clone()),
    }
}

fn from_coin_data(id: u64, d: &CreateCoinData, height: u64) -> Coin {
    Coin {
        id,
        name: d.name.clone(),
        symbol: d.symbol.to_ascii_uppercase(),
        crr: d.constant_reserve_ratio,
        volume: d.initial_amount.clone(),
        reserve: d.initial_reserve.clone(),
        max_supply: d.max_supply.clone(),
        mintable: false,
        burnable: false,
        owner_address_id: None,
        created_at_block_id: Some(height),
        version: 0,
    }
}

fn from_token_data(id: u64, d: &CreateTokenData, height: u64) -> Coin {
    Coin {
        id,
        name: d.name.clone(),
        symbol: d.symbol.to_ascii_uppercase(),
        crr: 0,
        volume: d.initial_amount.clone(),
        reserve: "0".into(),
        max_supply: d.max_supply.clone(),
        mintable: d.mintable,
        burnable: d.burnable,
        owner_address_id: None,
        created_at_block_id: Some(height),
        version: 0,
    }
}
