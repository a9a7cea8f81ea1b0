//! In-memory storage backend.
//!
//! Holds every table in RAM behind a single lock and enforces the same
//! foreign keys as the Postgres schema: a write that references an address,
//! coin, validator, block or transaction that has not been written yet fails
//! with [`ExtenderError::ForeignKey`]. Useful for tests and dry runs.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use chainextender_core::error::{EntityKind, ExtenderError};
use chainextender_core::model::{
    split_ticker, Balance, Block, BlockValidator, Coin, InvalidTransaction, LiquidityPool,
    NewTransaction, Order, OrderStatus, Reward, Slash, Stake, TransactionOutput,
    TransactionValidator, Validator, ValidatorUpdate,
};
use chainextender_core::store::Store;

#[derive(Default)]
struct Tables {
    addresses: HashMap<String, u64>,
    address_seq: u64,

    validators: BTreeMap<u64, Validator>,
    validator_keys: HashMap<String, u64>,
    validator_seq: u64,

    stakes: BTreeMap<u64, Stake>,
    stake_keys: HashMap<(u64, u64, u64), u64>,
    stake_seq: u64,

    coins: BTreeMap<u64, Coin>,
    /// Liquidated coins keep their row so the id is never reused.
    deleted_coins: HashSet<u64>,

    blocks: BTreeMap<u64, Block>,
    block_validators: BTreeMap<(u64, u64), bool>,

    transactions: BTreeMap<u64, NewTransaction>,
    tx_hashes: HashMap<String, u64>,
    tx_seq: u64,
    outputs: Vec<TransactionOutput>,
    invalid_txs: BTreeMap<String, InvalidTransaction>,
    tx_validators: BTreeSet<(u64, u64)>,
    /// `(address_id, transaction_id, block_id)`
    address_index: BTreeSet<(u64, u64, u64)>,

    balances: BTreeMap<(u64, u64), String>,
    rewards: Vec<Reward>,
    slashes: Vec<Slash>,

    pools: BTreeMap<u64, LiquidityPool>,
    orders: BTreeMap<u64, Order>,
}

impl Tables {
    fn need_address(&self, id: u64) -> Result<(), ExtenderError> {
        // Ids are handed out sequentially from 1 and never deleted.
        if id == 0 || id > self.address_seq {
            return Err(ExtenderError::ForeignKey {
                kind: EntityKind::Address,
                id,
            });
        }
        Ok(())
    }

    fn need_coin(&self, id: u64) -> Result<(), ExtenderError> {
        if !self.coins.contains_key(&id) {
            return Err(ExtenderError::ForeignKey {
                kind: EntityKind::Coin,
                id,
            });
        }
        Ok(())
    }

    fn need_validator(&self, id: u64) -> Result<(), ExtenderError> {
        if !self.validators.contains_key(&id) {
            return Err(ExtenderError::ForeignKey {
                kind: EntityKind::Validator,
                id,
            });
        }
        Ok(())
    }

    fn need_block(&self, id: u64) -> Result<(), ExtenderError> {
        if !self.blocks.contains_key(&id) {
            return Err(ExtenderError::Storage(format!(
                "foreign key violation: block {id} not written"
            )));
        }
        Ok(())
    }

    fn need_transaction(&self, id: u64) -> Result<(), ExtenderError> {
        if !self.transactions.contains_key(&id) {
            return Err(ExtenderError::Storage(format!(
                "foreign key violation: transaction {id} not written"
            )));
        }
        Ok(())
    }

    fn live_coin(&self, symbol: &str, version: u32) -> Option<&Coin> {
        self.coins.values().find(|c| {
            c.symbol == symbol && c.version == version && !self.deleted_coins.contains(&c.id)
        })
    }

    fn index_transactions(&mut self, ids: &[u64]) -> u64 {
        let mut written = 0;
        for &id in ids {
            let Some(tx) = self.transactions.get(&id) else {
                continue;
            };
            let block_id = tx.block_id;
            let mut addresses = vec![tx.from_address_id];
            addresses.extend(
                self.outputs
                    .iter()
                    .filter(|o| o.transaction_id == id)
                    .map(|o| o.to_address_id),
            );
            for address_id in addresses {
                if self.address_index.insert((address_id, id, block_id)) {
                    written += 1;
                }
            }
        }
        written
    }
}

/// In-memory extender storage.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── inspection ─────────────────────────────────────────────────────────

    pub fn address_count(&self) -> usize {
        self.tables.lock().addresses.len()
    }

    /// Id of a normalized address.
    pub fn address_id(&self, normalized: &str) -> Option<u64> {
        self.tables.lock().addresses.get(normalized).copied()
    }

    pub fn validators(&self) -> Vec<Validator> {
        self.tables.lock().validators.values().cloned().collect()
    }

    pub fn stakes(&self) -> Vec<Stake> {
        self.tables.lock().stakes.values().cloned().collect()
    }

    /// Coins that have not been liquidated.
    pub fn coins(&self) -> Vec<Coin> {
        let t = self.tables.lock();
        t.coins
            .values()
            .filter(|c| !t.deleted_coins.contains(&c.id))
            .cloned()
            .collect()
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.tables.lock().blocks.values().cloned().collect()
    }

    pub fn block_validators(&self) -> Vec<BlockValidator> {
        self.tables
            .lock()
            .block_validators
            .iter()
            .map(|(&(block_id, validator_id), &signed)| BlockValidator {
                block_id,
                validator_id,
                signed,
            })
            .collect()
    }

    /// Transactions with their ids, in id order.
    pub fn transactions(&self) -> Vec<(u64, NewTransaction)> {
        self.tables
            .lock()
            .transactions
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect()
    }

    pub fn transaction_outputs(&self) -> Vec<TransactionOutput> {
        self.tables.lock().outputs.clone()
    }

    pub fn invalid_transactions(&self) -> Vec<InvalidTransaction> {
        self.tables.lock().invalid_txs.values().cloned().collect()
    }

    pub fn transaction_validators(&self) -> Vec<TransactionValidator> {
        self.tables
            .lock()
            .tx_validators
            .iter()
            .map(|&(transaction_id, validator_id)| TransactionValidator {
                transaction_id,
                validator_id,
            })
            .collect()
    }

    /// `(address_id, transaction_id, block_id)` index rows.
    pub fn address_transactions(&self) -> Vec<(u64, u64, u64)> {
        self.tables.lock().address_index.iter().copied().collect()
    }

    pub fn balances(&self) -> Vec<Balance> {
        self.tables
            .lock()
            .balances
            .iter()
            .map(|(&(address_id, coin_id), value)| Balance {
                address_id,
                coin_id,
                value: value.clone(),
            })
            .collect()
    }

    pub fn rewards(&self) -> Vec<Reward> {
        self.tables.lock().rewards.clone()
    }

    pub fn slashes(&self) -> Vec<Slash> {
        self.tables.lock().slashes.clone()
    }

    pub fn pools(&self) -> Vec<LiquidityPool> {
        self.tables.lock().pools.values().cloned().collect()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.tables.lock().orders.values().cloned().collect()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn find_address_ids(&self, addresses: &[String]) -> Result<HashMap<String, u64>, ExtenderError> {
        let t = self.tables.lock();
        Ok(addresses
            .iter()
            .filter_map(|a| t.addresses.get(a).map(|id| (a.clone(), *id)))
            .collect())
    }

    async fn insert_addresses(&self, addresses: &[String]) -> Result<HashMap<String, u64>, ExtenderError> {
        let mut t = self.tables.lock();
        let mut inserted = HashMap::new();
        for a in addresses {
            if !t.addresses.contains_key(a) {
                t.address_seq += 1;
                let id = t.address_seq;
                t.addresses.insert(a.clone(), id);
                inserted.insert(a.clone(), id);
            }
        }
        Ok(inserted)
    }

    async fn find_validator_ids(&self, public_keys: &[String]) -> Result<HashMap<String, u64>, ExtenderError> {
        let t = self.tables.lock();
        Ok(public_keys
            .iter()
            .filter_map(|k| t.validator_keys.get(k).map(|id| (k.clone(), *id)))
            .collect())
    }

    async fn insert_validators(&self, public_keys: &[String]) -> Result<HashMap<String, u64>, ExtenderError> {
        let mut t = self.tables.lock();
        let mut inserted = HashMap::new();
        for k in public_keys {
            if t.validator_keys.contains_key(k) {
                continue;
            }
            t.validator_seq += 1;
            let id = t.validator_seq;
            t.validator_keys.insert(k.clone(), id);
            t.validators.insert(
                id,
                Validator {
                    id,
                    public_key: k.clone(),
                    status: None,
                    commission: None,
                    total_stake: None,
                    reward_address_id: None,
                    owner_address_id: None,
                    control_address_id: None,
                    updated_at: None,
                },
            );
            inserted.insert(k.clone(), id);
        }
        Ok(inserted)
    }

    async fn refresh_validators(&self, updates: &[ValidatorUpdate]) -> Result<(), ExtenderError> {
        let mut t = self.tables.lock();
        for u in updates {
            t.need_validator(u.id)?;
            t.need_address(u.reward_address_id)?;
            t.need_address(u.owner_address_id)?;
            t.need_address(u.control_address_id)?;
        }
        for v in t.validators.values_mut() {
            v.status = None;
        }
        for u in updates {
            if let Some(v) = t.validators.get_mut(&u.id) {
                v.status = Some(u.status);
                v.commission = Some(u.commission);
                v.total_stake = Some(u.total_stake.clone());
                v.reward_address_id = Some(u.reward_address_id);
                v.owner_address_id = Some(u.owner_address_id);
                v.control_address_id = Some(u.control_address_id);
                v.updated_at = Some(u.updated_at);
            }
        }
        Ok(())
    }

    async fn upsert_stakes(&self, stakes: &[Stake]) -> Result<Vec<u64>, ExtenderError> {
        let mut t = self.tables.lock();
        for s in stakes {
            t.need_validator(s.validator_id)?;
            t.need_address(s.owner_address_id)?;
            t.need_coin(s.coin_id)?;
        }
        let mut ids = Vec::with_capacity(stakes.len());
        for s in stakes {
            let key = (s.validator_id, s.owner_address_id, s.coin_id);
            let id = match t.stake_keys.get(&key) {
                Some(id) => *id,
                None => {
                    t.stake_seq += 1;
                    let id = t.stake_seq;
                    t.stake_keys.insert(key, id);
                    id
                }
            };
            t.stakes.insert(id, s.clone());
            ids.push(id);
        }
        Ok(ids)
    }

    async fn delete_stakes_except(&self, keep: &[u64]) -> Result<u64, ExtenderError> {
        let keep: HashSet<u64> = keep.iter().copied().collect();
        let mut t = self.tables.lock();
        let before = t.stakes.len();
        t.stakes.retain(|id, _| keep.contains(id));
        let Tables {
            stakes, stake_keys, ..
        } = &mut *t;
        stake_keys.retain(|_, id| stakes.contains_key(id));
        Ok((before - t.stakes.len()) as u64)
    }

    async fn max_coin_id(&self) -> Result<Option<u64>, ExtenderError> {
        Ok(self.tables.lock().coins.keys().next_back().copied())
    }

    async fn find_coin_ids(&self, tickers: &[String]) -> Result<HashMap<String, u64>, ExtenderError> {
        let t = self.tables.lock();
        Ok(tickers
            .iter()
            .filter_map(|tk| {
                let (symbol, version) = split_ticker(tk);
                t.live_coin(symbol, version).map(|c| (tk.clone(), c.id))
            })
            .collect())
    }

    async fn find_coin(&self, symbol: &str, version: u32) -> Result<Option<Coin>, ExtenderError> {
        Ok(self.tables.lock().live_coin(symbol, version).cloned())
    }

    async fn find_coin_by_id(&self, id: u64) -> Result<Option<Coin>, ExtenderError> {
        let t = self.tables.lock();
        if t.deleted_coins.contains(&id) {
            return Ok(None);
        }
        Ok(t.coins.get(&id).cloned())
    }

    async fn max_coin_version(&self, symbol: &str) -> Result<Option<u32>, ExtenderError> {
        Ok(self
            .tables
            .lock()
            .coins
            .values()
            .filter(|c| c.symbol == symbol)
            .map(|c| c.version)
            .max())
    }

    async fn upsert_coins(&self, coins: &[Coin]) -> Result<(), ExtenderError> {
        let mut t = self.tables.lock();
        for c in coins {
            if let Some(owner) = c.owner_address_id {
                t.need_address(owner)?;
            }
        }
        for c in coins {
            let clash = t
                .coins
                .values()
                .any(|o| o.id != c.id && o.symbol == c.symbol && o.version == c.version);
            if clash {
                return Err(ExtenderError::Storage(format!(
                    "unique violation: coin ticker {} already taken",
                    c.ticker()
                )));
            }
            t.coins.insert(c.id, c.clone());
        }
        Ok(())
    }

    async fn liquidate_coin(&self, id: u64) -> Result<u64, ExtenderError> {
        let mut t = self.tables.lock();
        if !t.coins.contains_key(&id) {
            return Ok(0);
        }
        let before = t.balances.len();
        t.balances.retain(|&(_, coin), _| coin != id);
        t.deleted_coins.insert(id);
        Ok((before - t.balances.len()) as u64)
    }

    async fn discard_coins_from(&self, block_id: u64) -> Result<Vec<Coin>, ExtenderError> {
        let mut t = self.tables.lock();
        let discarded: Vec<Coin> = t
            .coins
            .values()
            .filter(|c| c.created_at_block_id.is_some_and(|b| b >= block_id))
            .cloned()
            .collect();
        for c in &discarded {
            let referenced = t.balances.keys().any(|&(_, coin)| coin == c.id)
                || t.stakes.values().any(|s| s.coin_id == c.id)
                || t.pools.values().any(|p| p.coin0_id == c.id || p.coin1_id == c.id);
            if referenced {
                return Err(ExtenderError::Storage(format!(
                    "foreign key violation: coin {} is still referenced",
                    c.id
                )));
            }
        }
        for c in &discarded {
            t.coins.remove(&c.id);
            t.deleted_coins.remove(&c.id);
        }

        let symbols: BTreeSet<&str> = discarded.iter().map(|c| c.symbol.as_str()).collect();
        for symbol in symbols {
            if t.live_coin(symbol, 0).is_some() {
                continue;
            }
            let latest = t
                .coins
                .values()
                .filter(|c| c.symbol == symbol && !t.deleted_coins.contains(&c.id))
                .max_by_key(|c| c.version)
                .map(|c| c.id);
            if let Some(coin) = latest.and_then(|id| t.coins.get_mut(&id)) {
                coin.version = 0;
            }
        }
        Ok(discarded)
    }

    async fn last_block(&self) -> Result<Option<Block>, ExtenderError> {
        Ok(self.tables.lock().blocks.values().next_back().cloned())
    }

    async fn commit_block(
        &self,
        block: &Block,
        pools: &[LiquidityPool],
        orders: &[Order],
    ) -> Result<u64, ExtenderError> {
        let mut t = self.tables.lock();
        if let Some(proposer) = block.proposer_validator_id {
            t.need_validator(proposer)?;
        }
        for p in pools {
            t.need_coin(p.coin0_id)?;
            t.need_coin(p.coin1_id)?;
        }
        for o in orders {
            t.need_address(o.address_id)?;
            t.need_coin(o.coin_sell_id)?;
            t.need_coin(o.coin_buy_id)?;
        }

        for p in pools {
            t.pools.insert(p.id, p.clone());
        }
        for o in orders {
            t.orders.insert(o.id, o.clone());
        }
        t.blocks.entry(block.id).or_insert_with(|| block.clone());

        let mut activated = 0;
        for o in t.orders.values_mut() {
            if o.created_at_block_id == block.id && o.status == OrderStatus::New {
                o.status = OrderStatus::Active;
                activated += 1;
            }
        }
        Ok(activated)
    }

    async fn link_block_validators(&self, links: &[BlockValidator]) -> Result<(), ExtenderError> {
        let mut t = self.tables.lock();
        for l in links {
            t.need_block(l.block_id)?;
            t.need_validator(l.validator_id)?;
        }
        for l in links {
            t.block_validators.insert((l.block_id, l.validator_id), l.signed);
        }
        Ok(())
    }

    async fn insert_transactions(&self, txs: &[NewTransaction]) -> Result<Vec<u64>, ExtenderError> {
        let mut t = self.tables.lock();
        for tx in txs {
            t.need_block(tx.block_id)?;
            t.need_address(tx.from_address_id)?;
            t.need_coin(tx.gas_coin_id)?;
        }
        let mut ids = Vec::with_capacity(txs.len());
        for tx in txs {
            let id = match t.tx_hashes.get(&tx.hash) {
                Some(id) => *id,
                None => {
                    t.tx_seq += 1;
                    let id = t.tx_seq;
                    t.tx_hashes.insert(tx.hash.clone(), id);
                    t.transactions.insert(id, tx.clone());
                    id
                }
            };
            ids.push(id);
        }
        Ok(ids)
    }

    async fn insert_transaction_outputs(&self, outputs: &[TransactionOutput]) -> Result<(), ExtenderError> {
        let mut t = self.tables.lock();
        for o in outputs {
            t.need_transaction(o.transaction_id)?;
            t.need_address(o.to_address_id)?;
            t.need_coin(o.coin_id)?;
        }
        // Replace per transaction so a retried chunk does not duplicate rows.
        let tx_ids: HashSet<u64> = outputs.iter().map(|o| o.transaction_id).collect();
        t.outputs.retain(|o| !tx_ids.contains(&o.transaction_id));
        t.outputs.extend(outputs.iter().cloned());
        Ok(())
    }

    async fn insert_invalid_transactions(&self, txs: &[InvalidTransaction]) -> Result<(), ExtenderError> {
        let mut t = self.tables.lock();
        for tx in txs {
            t.need_block(tx.block_id)?;
            t.need_address(tx.from_address_id)?;
        }
        for tx in txs {
            t.invalid_txs.entry(tx.hash.clone()).or_insert_with(|| tx.clone());
        }
        Ok(())
    }

    async fn link_transaction_validators(&self, links: &[TransactionValidator]) -> Result<(), ExtenderError> {
        let mut t = self.tables.lock();
        for l in links {
            t.need_transaction(l.transaction_id)?;
            t.need_validator(l.validator_id)?;
        }
        for l in links {
            t.tx_validators.insert((l.transaction_id, l.validator_id));
        }
        Ok(())
    }

    async fn index_transaction_addresses(&self, transaction_ids: &[u64]) -> Result<u64, ExtenderError> {
        Ok(self.tables.lock().index_transactions(transaction_ids))
    }

    async fn index_recent_transaction_addresses(&self, blocks: u64) -> Result<u64, ExtenderError> {
        let mut t = self.tables.lock();
        let Some(&last) = t.blocks.keys().next_back() else {
            return Ok(0);
        };
        let from = last.saturating_sub(blocks.saturating_sub(1));
        let ids: Vec<u64> = t
            .transactions
            .iter()
            .filter(|(_, tx)| tx.block_id >= from)
            .map(|(id, _)| *id)
            .collect();
        Ok(t.index_transactions(&ids))
    }

    async fn replace_balances(&self, address_ids: &[u64], balances: &[Balance]) -> Result<(), ExtenderError> {
        let mut t = self.tables.lock();
        for b in balances {
            t.need_address(b.address_id)?;
        }
        let replaced: HashSet<u64> = address_ids.iter().copied().collect();
        t.balances.retain(|(address, _), _| !replaced.contains(address));
        for b in balances {
            if !t.coins.contains_key(&b.coin_id) || t.deleted_coins.contains(&b.coin_id) {
                continue;
            }
            t.balances.insert((b.address_id, b.coin_id), b.value.clone());
        }
        Ok(())
    }

    async fn insert_rewards(&self, rewards: &[Reward]) -> Result<(), ExtenderError> {
        let mut t = self.tables.lock();
        for r in rewards {
            t.need_block(r.block_id)?;
            t.need_address(r.address_id)?;
            t.need_validator(r.validator_id)?;
        }
        t.rewards.extend(rewards.iter().cloned());
        Ok(())
    }

    async fn insert_slashes(&self, slashes: &[Slash]) -> Result<(), ExtenderError> {
        let mut t = self.tables.lock();
        for s in slashes {
            t.need_block(s.block_id)?;
            t.need_address(s.address_id)?;
            t.need_validator(s.validator_id)?;
            t.need_coin(s.coin_id)?;
        }
        t.slashes.extend(slashes.iter().cloned());
        Ok(())
    }

    async fn find_pool(&self, id: u64) -> Result<Option<LiquidityPool>, ExtenderError> {
        Ok(self.tables.lock().pools.get(&id).cloned())
    }

    async fn find_order(&self, id: u64) -> Result<Option<Order>, ExtenderError> {
        Ok(self.tables.lock().orders.get(&id).cloned())
    }

    async fn upsert_orders(&self, orders: &[Order]) -> Result<(), ExtenderError> {
        let mut t = self.tables.lock();
        for o in orders {
            t.need_address(o.address_id)?;
            t.need_coin(o.coin_sell_id)?;
            t.need_coin(o.coin_buy_id)?;
        }
        for o in orders {
            t.orders.insert(o.id, o.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn coin(id: u64, symbol: &str, version: u32) -> Coin {
        Coin {
            id,
            name: symbol.into(),
            symbol: symbol.into(),
            crr: 0,
            volume: "0".into(),
            reserve: "0".into(),
            max_supply: "0".into(),
            mintable: false,
            burnable: false,
            owner_address_id: None,
            created_at_block_id: None,
            version,
        }
    }

    fn block(id: u64) -> Block {
        Block {
            id,
            hash: format!("Mt{id:064x}"),
            size: 100,
            num_txs: 0,
            block_time: 1_000_000_000,
            block_reward: "0".into(),
            proposer_validator_id: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_addresses_reports_only_new_rows() {
        let store = InMemoryStore::new();
        let first = store.insert_addresses(&["aa".into(), "bb".into()]).await.unwrap();
        assert_eq!(first.len(), 2);
        let second = store.insert_addresses(&["bb".into(), "cc".into()]).await.unwrap();
        assert_eq!(second.len(), 1);
        assert!(second.contains_key("cc"));
        assert_eq!(store.address_count(), 3);
    }

    #[tokio::test]
    async fn balances_require_a_known_address_and_drop_unknown_coins() {
        let store = InMemoryStore::new();
        store.upsert_coins(&[coin(0, "BIP", 0)]).await.unwrap();
        let bad = Balance {
            address_id: 1,
            coin_id: 0,
            value: "1".into(),
        };
        let err = store.replace_balances(&[1], &[bad.clone()]).await.unwrap_err();
        assert!(matches!(err, ExtenderError::ForeignKey { kind: EntityKind::Address, id: 1 }));

        store.insert_addresses(&["aa".into()]).await.unwrap();
        let unknown_coin = Balance {
            address_id: 1,
            coin_id: 9,
            value: "3".into(),
        };
        store.replace_balances(&[1], &[bad.clone(), unknown_coin]).await.unwrap();
        assert_eq!(store.balances(), vec![bad]);
    }

    #[tokio::test]
    async fn replace_balances_is_a_snapshot() {
        let store = InMemoryStore::new();
        store.upsert_coins(&[coin(0, "BIP", 0), coin(1, "ABC", 0)]).await.unwrap();
        store.insert_addresses(&["aa".into()]).await.unwrap();
        let snapshot = vec![
            Balance { address_id: 1, coin_id: 0, value: "10".into() },
            Balance { address_id: 1, coin_id: 1, value: "5".into() },
        ];
        store.replace_balances(&[1], &snapshot).await.unwrap();
        store.replace_balances(&[1], &snapshot).await.unwrap();
        assert_eq!(store.balances(), snapshot);

        store.replace_balances(&[1], &snapshot[..1]).await.unwrap();
        assert_eq!(store.balances().len(), 1);
    }

    #[tokio::test]
    async fn transactions_are_idempotent_on_hash() {
        let store = InMemoryStore::new();
        store.upsert_coins(&[coin(0, "BIP", 0)]).await.unwrap();
        store.insert_addresses(&["aa".into()]).await.unwrap();
        store.commit_block(&block(1), &[], &[]).await.unwrap();
        let tx = NewTransaction {
            block_id: 1,
            from_address_id: 1,
            nonce: 1,
            gas_price: 1,
            gas: 10,
            gas_coin_id: 0,
            tx_type: 1,
            hash: "Mtabc".into(),
            payload: String::new(),
            service_data: String::new(),
            data: serde_json::json!({}),
            tags: serde_json::json!({}),
            raw_tx: "0xf8".into(),
            created_at: Utc::now(),
        };
        let a = store.insert_transactions(&[tx.clone()]).await.unwrap();
        let b = store.insert_transactions(&[tx]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.transactions().len(), 1);

        store
            .insert_transaction_outputs(&[TransactionOutput {
                transaction_id: a[0],
                to_address_id: 1,
                coin_id: 0,
                value: "1".into(),
            }])
            .await
            .unwrap();
        assert_eq!(store.index_transaction_addresses(&a).await.unwrap(), 1);
        // Already indexed.
        assert_eq!(store.index_recent_transaction_addresses(10).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn coin_tickers_and_liquidation() {
        let store = InMemoryStore::new();
        store
            .upsert_coins(&[coin(0, "BIP", 0), coin(1, "ABC", 1), coin(2, "ABC", 0)])
            .await
            .unwrap();
        let ids = store
            .find_coin_ids(&["ABC".into(), "ABC-1".into(), "XYZ".into()])
            .await
            .unwrap();
        assert_eq!(ids["ABC"], 2);
        assert_eq!(ids["ABC-1"], 1);
        assert!(!ids.contains_key("XYZ"));
        assert_eq!(store.max_coin_version("ABC").await.unwrap(), Some(1));

        // Ticker clash.
        assert!(store.upsert_coins(&[coin(3, "ABC", 0)]).await.is_err());

        store.liquidate_coin(2).await.unwrap();
        assert!(store.find_coin("ABC", 0).await.unwrap().is_none());
        // The id is never handed out again.
        assert_eq!(store.max_coin_id().await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn stale_stakes_are_deleted() {
        let store = InMemoryStore::new();
        store.upsert_coins(&[coin(0, "BIP", 0)]).await.unwrap();
        store.insert_addresses(&["aa".into(), "bb".into()]).await.unwrap();
        store.insert_validators(&["v1".into()]).await.unwrap();
        let stake = |owner| Stake {
            validator_id: 1,
            owner_address_id: owner,
            coin_id: 0,
            value: "1".into(),
            bip_value: "1".into(),
            is_kicked: false,
        };
        store.upsert_stakes(&[stake(1), stake(2)]).await.unwrap();
        let kept = store.upsert_stakes(&[stake(2)]).await.unwrap();
        assert_eq!(store.delete_stakes_except(&kept).await.unwrap(), 1);
        assert_eq!(store.stakes().len(), 1);
        // Re-adding the deleted stake gets a fresh id.
        let again = store.upsert_stakes(&[stake(1)]).await.unwrap();
        assert_ne!(again, kept);
    }

    fn pool(id: u64) -> LiquidityPool {
        LiquidityPool {
            id,
            coin0_id: 0,
            coin1_id: 1,
            volume0: "100".into(),
            volume1: "200".into(),
            liquidity: "10".into(),
            updated_at_block_id: 1,
        }
    }

    fn order(id: u64, created_at_block_id: u64) -> Order {
        Order {
            id,
            address_id: 1,
            pool_id: 1,
            coin_sell_id: 0,
            coin_sell_volume: "5".into(),
            coin_buy_id: 1,
            coin_buy_volume: "9".into(),
            created_at_block_id,
            status: OrderStatus::New,
        }
    }

    #[tokio::test]
    async fn liquidation_clears_balances_and_later_snapshots_skip_the_coin() {
        let store = InMemoryStore::new();
        store.upsert_coins(&[coin(0, "BIP", 0), coin(1, "ABC", 0)]).await.unwrap();
        store.insert_addresses(&["aa".into(), "bb".into()]).await.unwrap();
        let held = |address_id, coin_id| Balance {
            address_id,
            coin_id,
            value: "7".into(),
        };
        store
            .replace_balances(&[1, 2], &[held(1, 0), held(1, 1), held(2, 1)])
            .await
            .unwrap();

        assert_eq!(store.liquidate_coin(1).await.unwrap(), 2);
        assert!(store.find_coin_by_id(1).await.unwrap().is_none());
        assert_eq!(store.balances(), vec![held(1, 0)]);

        // A snapshot taken before the liquidation lands afterwards.
        store.replace_balances(&[2], &[held(2, 1)]).await.unwrap();
        assert_eq!(store.balances(), vec![held(1, 0)]);
        assert_eq!(store.liquidate_coin(42).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn commit_block_is_all_or_nothing() {
        let store = InMemoryStore::new();
        store.upsert_coins(&[coin(0, "BIP", 0), coin(1, "ABC", 0)]).await.unwrap();
        store.insert_addresses(&["aa".into()]).await.unwrap();

        let mut row = block(5);
        row.proposer_validator_id = Some(3);
        let err = store.commit_block(&row, &[pool(1)], &[order(1, 5)]).await.unwrap_err();
        assert!(matches!(err, ExtenderError::ForeignKey { kind: EntityKind::Validator, id: 3 }));
        assert!(store.blocks().is_empty());
        assert!(store.pools().is_empty());
        assert!(store.orders().is_empty());

        row.proposer_validator_id = None;
        let activated = store
            .commit_block(&row, &[pool(1)], &[order(1, 5), order(2, 4)])
            .await
            .unwrap();
        assert_eq!(activated, 1);
        assert_eq!(store.last_block().await.unwrap().map(|b| b.id), Some(5));
        assert_eq!(store.pools(), vec![pool(1)]);
        let statuses: Vec<OrderStatus> = store.orders().iter().map(|o| o.status).collect();
        assert_eq!(statuses, vec![OrderStatus::Active, OrderStatus::New]);
    }

    #[tokio::test]
    async fn discarding_coins_restores_the_retired_version() {
        let store = InMemoryStore::new();
        let created_at = |mut c: Coin, height| {
            c.created_at_block_id = Some(height);
            c
        };
        store
            .upsert_coins(&[
                coin(0, "BIP", 0),
                created_at(coin(1, "ABC", 1), 3),
                created_at(coin(2, "ABC", 0), 7),
                created_at(coin(3, "NEW", 0), 7),
                created_at(coin(4, "OLD", 0), 2),
            ])
            .await
            .unwrap();

        let discarded = store.discard_coins_from(7).await.unwrap();
        let ids: Vec<u64> = discarded.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(store.max_coin_id().await.unwrap(), Some(4));
        assert_eq!(store.find_coin("ABC", 0).await.unwrap().map(|c| c.id), Some(1));
        assert!(store.find_coin("NEW", 0).await.unwrap().is_none());
        assert_eq!(store.find_coin("OLD", 0).await.unwrap().map(|c| c.id), Some(4));

        // Nothing left past the committed height.
        assert!(store.discard_coins_from(7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn refresh_validators_clears_absent_statuses() {
        let store = InMemoryStore::new();
        store.insert_addresses(&["aa".into()]).await.unwrap();
        store.insert_validators(&["v1".into(), "v2".into()]).await.unwrap();
        let update = |id, status| ValidatorUpdate {
            id,
            status,
            commission: 10,
            total_stake: "100".into(),
            reward_address_id: 1,
            owner_address_id: 1,
            control_address_id: 1,
            updated_at: Utc::now(),
        };
        store.refresh_validators(&[update(1, 2), update(2, 1)]).await.unwrap();

        // An update that cannot be applied leaves the previous statuses.
        let mut bad = update(1, 1);
        bad.owner_address_id = 9;
        assert!(store.refresh_validators(&[bad]).await.is_err());
        let statuses: Vec<Option<u8>> = store.validators().iter().map(|v| v.status).collect();
        assert_eq!(statuses, vec![Some(2), Some(1)]);

        store.refresh_validators(&[update(1, 2)]).await.unwrap();
        let statuses: Vec<Option<u8>> = store.validators().iter().map(|v| v.status).collect();
        assert_eq!(statuses, vec![Some(2), None]);
    }
}
