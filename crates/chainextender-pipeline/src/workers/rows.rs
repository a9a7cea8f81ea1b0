//! Plain row writers: the rows arrive fully resolved.

use std::sync::Arc;

use async_trait::async_trait;

use chainextender_core::error::ExtenderError;
use chainextender_core::model::{BlockValidator, Reward, Slash, TransactionValidator};
use chainextender_core::queue::Worker;
use chainextender_core::store::Store;

pub struct BlockValidatorWriter {
    store: Arc<dyn Store>,
}

impl BlockValidatorWriter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Worker<Vec<BlockValidator>> for BlockValidatorWriter {
    async fn handle(&self, job: &Vec<BlockValidator>) -> Result<(), ExtenderError> {
        self.store.link_block_validators(job).await
    }
}

pub struct TxValidatorWriter {
    store: Arc<dyn Store>,
}

impl TxValidatorWriter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Worker<Vec<TransactionValidator>> for TxValidatorWriter {
    async fn handle(&self, job: &Vec<TransactionValidator>) -> Result<(), ExtenderError> {
        self.store.link_transaction_validators(job).await
    }
}

/// Rewards are append-only; each chunk is written in one statement so a
/// failed chunk leaves nothing behind to duplicate on retry.
pub struct RewardWriter {
    store: Arc<dyn Store>,
}

impl RewardWriter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Worker<Vec<Reward>> for RewardWriter {
    async fn handle(&self, job: &Vec<Reward>) -> Result<(), ExtenderError> {
        self.store.insert_rewards(job).await
    }
}

pub struct SlashWriter {
    store: Arc<dyn Store>,
}

impl SlashWriter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Worker<Vec<Slash>> for SlashWriter {
    async fn handle(&self, job: &Vec<Slash>) -> Result<(), ExtenderError> {
        self.store.insert_slashes(job).await
    }
}
