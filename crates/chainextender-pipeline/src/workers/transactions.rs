//! Transaction, output and invalid-transaction streams.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;

use chainextender_core::error::ExtenderError;
use chainextender_core::model::{InvalidTransaction, NewTransaction, TransactionOutput, TransactionValidator};
use chainextender_core::queue::{TaskQueue, Worker};

use super::resolve_known;
use crate::extender::Shared;
use crate::jobs::{OutputJob, PendingOutput, TxJob};

/// Writes valid transactions, then hands their outputs and validator links
/// to the downstream streams.
pub struct TransactionWorker {
    shared: Shared,
    outputs: TaskQueue<Vec<OutputJob>>,
    validators: TaskQueue<Vec<TransactionValidator>>,
}

impl TransactionWorker {
    pub fn new(
        shared: Shared,
        outputs: TaskQueue<Vec<OutputJob>>,
        validators: TaskQueue<Vec<TransactionValidator>>,
    ) -> Self {
        Self {
            shared,
            outputs,
            validators,
        }
    }
}

#[async_trait]
impl Worker<Vec<TxJob>> for TransactionWorker {
    async fn handle(&self, job: &Vec<TxJob>) -> Result<(), ExtenderError> {
        let strict = self.shared.strict_resolution;
        let senders: Vec<&str> = job.iter().map(|j| j.tx.from.as_str()).collect();
        let from_ids = resolve_known(&self.shared.resolvers.addresses, &senders, strict).await?;

        let mut kept = Vec::with_capacity(job.len());
        let mut rows = Vec::with_capacity(job.len());
        for j in job {
            let Some(&from_address_id) = from_ids.get(&j.tx.from) else {
                continue;
            };
            rows.push(NewTransaction {
                block_id: j.block_id,
                from_address_id,
                nonce: j.tx.nonce,
                gas_price: j.tx.gas_price,
                gas: j.tx.gas,
                gas_coin_id: j.tx.gas_coin.id,
                tx_type: j.tx.tx_type().code(),
                hash: j.tx.hash.clone(),
                payload: j.tx.payload.clone(),
                service_data: j.tx.service_data.clone(),
                data: j.tx.raw_data.clone(),
                tags: serde_json::to_value(&j.tx.tags)?,
                raw_tx: j.tx.raw_tx.clone(),
                created_at: j.created_at,
            });
            kept.push(j);
        }
        let ids = self.shared.store.insert_transactions(&rows).await?;

        let keys: Vec<&str> = kept.iter().flat_map(|j| j.tx.data.public_keys()).collect();
        let validator_ids = resolve_known(&self.shared.resolvers.validators, &keys, strict).await?;

        let mut links = Vec::new();
        let mut seen = HashSet::new();
        let mut outputs = Vec::with_capacity(kept.len());
        for (j, &transaction_id) in kept.iter().zip(&ids) {
            for key in j.tx.data.public_keys() {
                if let Some(&validator_id) = validator_ids.get(key) {
                    if seen.insert((transaction_id, validator_id)) {
                        links.push(TransactionValidator {
                            transaction_id,
                            validator_id,
                        });
                    }
                }
            }
            outputs.push(OutputJob {
                transaction_id,
                outputs: j
                    .tx
                    .data
                    .outputs(&j.tx.from)
                    .into_iter()
                    .map(|o| PendingOutput {
                        to: o.to.to_string(),
                        coin_id: o.coin,
                        value: o.value.to_string(),
                    })
                    .collect(),
            });
        }

        debug!(
            stream = "transactions",
            chunk = job.len(),
            stored = ids.len(),
            links = links.len(),
            "transactions stored"
        );
        if !links.is_empty() {
            self.validators.submit_chunks(links).await?;
        }
        self.outputs.submit_chunks(outputs).await?;
        Ok(())
    }
}

/// Writes transaction outputs and indexes every address a transaction
/// touched.
pub struct OutputWorker {
    shared: Shared,
}

impl OutputWorker {
    pub fn new(shared: Shared) -> Self {
        Self { shared }
    }
}

#[async_trait]
impl Worker<Vec<OutputJob>> for OutputWorker {
    async fn handle(&self, job: &Vec<OutputJob>) -> Result<(), ExtenderError> {
        let recipients: Vec<&str> = job
            .iter()
            .flat_map(|j| j.outputs.iter().map(|o| o.to.as_str()))
            .collect();
        let ids = resolve_known(
            &self.shared.resolvers.addresses,
            &recipients,
            self.shared.strict_resolution,
        )
        .await?;

        let rows: Vec<TransactionOutput> = job
            .iter()
            .flat_map(|j| {
                j.outputs.iter().filter_map(|o| {
                    ids.get(&o.to).map(|&to_address_id| TransactionOutput {
                        transaction_id: j.transaction_id,
                        to_address_id,
                        coin_id: o.coin_id,
                        value: o.value.clone(),
                    })
                })
            })
            .collect();
        self.shared.store.insert_transaction_outputs(&rows).await?;

        let tx_ids: Vec<u64> = job.iter().map(|j| j.transaction_id).collect();
        let indexed = self.shared.store.index_transaction_addresses(&tx_ids).await?;
        debug!(stream = "tx_outputs", outputs = rows.len(), indexed, "outputs stored");
        Ok(())
    }
}

/// Writes transactions the chain rejected.
pub struct InvalidTxWorker {
    shared: Shared,
}

impl InvalidTxWorker {
    pub fn new(shared: Shared) -> Self {
        Self { shared }
    }
}

#[async_trait]
impl Worker<Vec<TxJob>> for InvalidTxWorker {
    async fn handle(&self, job: &Vec<TxJob>) -> Result<(), ExtenderError> {
        let senders: Vec<&str> = job.iter().map(|j| j.tx.from.as_str()).collect();
        let ids = resolve_known(
            &self.shared.resolvers.addresses,
            &senders,
            self.shared.strict_resolution,
        )
        .await?;

        let rows: Vec<InvalidTransaction> = job
            .iter()
            .filter_map(|j| {
                ids.get(&j.tx.from).map(|&from_address_id| InvalidTransaction {
                    block_id: j.block_id,
                    from_address_id,
                    tx_type: j.tx.tx_type().code(),
                    hash: j.tx.hash.clone(),
                    tx_data: j.tx.raw_data.clone(),
                    log: j.tx.log.clone(),
                    created_at: j.created_at,
                })
            })
            .collect();
        self.shared.store.insert_invalid_transactions(&rows).await
    }
}
