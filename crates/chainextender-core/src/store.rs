//! The persistence collaborator.
//!
//! Every write is conflict-safe (insert-or-ignore / upsert), so a batch that
//! failed half-way can be retried without duplicating rows.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::ExtenderError;
use crate::model::{
    Balance, Block, BlockValidator, Coin, InvalidTransaction, LiquidityPool, NewTransaction,
    Order, Reward, Slash, Stake, TransactionOutput, TransactionValidator, ValidatorUpdate,
};

/// Relational store for extended chain data.
#[async_trait]
pub trait Store: Send + Sync {
    // ── addresses ──────────────────────────────────────────────────────────

    /// Ids of the given (normalized) addresses that already exist.
    async fn find_address_ids(&self, addresses: &[String]) -> Result<HashMap<String, u64>, ExtenderError>;

    /// Insert addresses, ignoring ones that already exist. Returns the ids of
    /// the rows this call actually inserted.
    async fn insert_addresses(&self, addresses: &[String]) -> Result<HashMap<String, u64>, ExtenderError>;

    // ── validators ─────────────────────────────────────────────────────────

    async fn find_validator_ids(&self, public_keys: &[String]) -> Result<HashMap<String, u64>, ExtenderError>;

    /// Insert validators by public key, ignoring ones that already exist.
    /// Returns the ids of the rows this call actually inserted.
    async fn insert_validators(&self, public_keys: &[String]) -> Result<HashMap<String, u64>, ExtenderError>;

    /// Null every validator's status, then apply `updates`, in one write.
    /// Validators missing from `updates` are left with no status.
    async fn refresh_validators(&self, updates: &[ValidatorUpdate]) -> Result<(), ExtenderError>;

    // ── stakes ─────────────────────────────────────────────────────────────

    /// Upsert stakes keyed by (validator, owner, coin); returns row ids in
    /// input order.
    async fn upsert_stakes(&self, stakes: &[Stake]) -> Result<Vec<u64>, ExtenderError>;

    /// Delete every stake whose id is not in `keep`. Returns rows deleted.
    async fn delete_stakes_except(&self, keep: &[u64]) -> Result<u64, ExtenderError>;

    // ── coins ──────────────────────────────────────────────────────────────

    async fn max_coin_id(&self) -> Result<Option<u64>, ExtenderError>;

    /// Ids of coins by ticker (`SYMBOL` or `SYMBOL-<version>`).
    async fn find_coin_ids(&self, tickers: &[String]) -> Result<HashMap<String, u64>, ExtenderError>;

    async fn find_coin(&self, symbol: &str, version: u32) -> Result<Option<Coin>, ExtenderError>;

    async fn find_coin_by_id(&self, id: u64) -> Result<Option<Coin>, ExtenderError>;

    /// Highest version recorded for `symbol`, `None` if the symbol is unknown.
    async fn max_coin_version(&self, symbol: &str) -> Result<Option<u32>, ExtenderError>;

    /// Insert or fully update coins by id.
    async fn upsert_coins(&self, coins: &[Coin]) -> Result<(), ExtenderError>;

    /// Mark a coin deleted and drop its balances in one write. Returns the
    /// number of balances removed.
    async fn liquidate_coin(&self, id: u64) -> Result<u64, ExtenderError>;

    /// Hard-delete coins created at `block_id` or later and give each
    /// affected symbol its current version back. Used on startup to undo
    /// coins written for a height whose block row never landed.
    async fn discard_coins_from(&self, block_id: u64) -> Result<Vec<Coin>, ExtenderError>;

    // ── blocks ─────────────────────────────────────────────────────────────

    async fn last_block(&self) -> Result<Option<Block>, ExtenderError>;

    /// Write the block row together with the pool and order rows its
    /// transactions produced, and activate the orders it created. The block
    /// row is the resume point, so none of these are visible without it.
    /// Returns the number of orders activated.
    async fn commit_block(
        &self,
        block: &Block,
        pools: &[LiquidityPool],
        orders: &[Order],
    ) -> Result<u64, ExtenderError>;

    async fn link_block_validators(&self, links: &[BlockValidator]) -> Result<(), ExtenderError>;

    // ── transactions ───────────────────────────────────────────────────────

    /// Insert transactions (ignoring known hashes); returns ids in input order.
    async fn insert_transactions(&self, txs: &[NewTransaction]) -> Result<Vec<u64>, ExtenderError>;

    async fn insert_transaction_outputs(&self, outputs: &[TransactionOutput]) -> Result<(), ExtenderError>;

    async fn insert_invalid_transactions(&self, txs: &[InvalidTransaction]) -> Result<(), ExtenderError>;

    async fn link_transaction_validators(&self, links: &[TransactionValidator]) -> Result<(), ExtenderError>;

    /// Backfill the address→transaction index for explicit transaction ids.
    /// Returns index rows written.
    async fn index_transaction_addresses(&self, transaction_ids: &[u64]) -> Result<u64, ExtenderError>;

    /// Rebuild the address→transaction index for the last `blocks` blocks.
    async fn index_recent_transaction_addresses(&self, blocks: u64) -> Result<u64, ExtenderError>;

    // ── balances ───────────────────────────────────────────────────────────

    /// Delete all balances of `address_ids` and insert `balances` instead.
    /// Balances in coins that are unknown or liquidated are dropped.
    async fn replace_balances(&self, address_ids: &[u64], balances: &[Balance]) -> Result<(), ExtenderError>;

    // ── rewards & slashes ──────────────────────────────────────────────────

    async fn insert_rewards(&self, rewards: &[Reward]) -> Result<(), ExtenderError>;

    async fn insert_slashes(&self, slashes: &[Slash]) -> Result<(), ExtenderError>;

    // ── pools & orders ─────────────────────────────────────────────────────

    async fn find_pool(&self, id: u64) -> Result<Option<LiquidityPool>, ExtenderError>;

    async fn find_order(&self, id: u64) -> Result<Option<Order>, ExtenderError>;

    async fn upsert_orders(&self, orders: &[Order]) -> Result<(), ExtenderError>;
}
