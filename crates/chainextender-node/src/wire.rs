//! JSON shapes of the node's v2 HTTP API.
//!
//! Numbers arrive as strings. Transactions and events are kept as raw JSON
//! until they are decoded one by one, so a single item the extender cannot
//! understand is dropped with a warning instead of failing the whole block.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use chainextender_core::error::ExtenderError;
use chainextender_core::event::NodeEvent;
use chainextender_core::tx::TxData;
use chainextender_core::types::{
    numstr, AddressBalances, BalanceEntry, BlockEvents, BlockSignature, Candidate, CandidateStake,
    CoinInfo, CoinRef, NodeBlock, NodeStatus, NodeTransaction,
};

/// `{"error": {"code": …, "message": …}}`
#[derive(Debug, Deserialize)]
pub struct ApiErrorWire {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Value,
    #[serde(default)]
    pub message: String,
}

impl ApiErrorBody {
    pub fn code_string(&self) -> String {
        match &self.code {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StatusWire {
    #[serde(deserialize_with = "numstr::u64")]
    pub latest_block_height: u64,
    pub latest_block_time: DateTime<Utc>,
}

impl From<StatusWire> for NodeStatus {
    fn from(w: StatusWire) -> Self {
        Self {
            latest_block_height: w.latest_block_height,
            latest_block_time: w.latest_block_time,
        }
    }
}

// ─── Blocks ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BlockWire {
    pub hash: String,
    #[serde(deserialize_with = "numstr::u64")]
    pub height: u64,
    pub time: DateTime<Utc>,
    #[serde(default, deserialize_with = "numstr::u64")]
    pub size: u64,
    #[serde(default)]
    pub proposer: Option<String>,
    #[serde(default)]
    pub block_reward: String,
    #[serde(default)]
    pub transactions: Vec<Value>,
    #[serde(default)]
    pub validators: Vec<SignatureWire>,
}

#[derive(Debug, Deserialize)]
pub struct SignatureWire {
    pub public_key: String,
    #[serde(default)]
    pub signed: bool,
}

#[derive(Debug, Deserialize)]
pub struct TransactionWire {
    pub hash: String,
    #[serde(default)]
    pub raw_tx: String,
    pub from: String,
    #[serde(deserialize_with = "numstr::u64")]
    pub nonce: u64,
    #[serde(default, deserialize_with = "numstr::u64")]
    pub gas_price: u64,
    #[serde(default, deserialize_with = "numstr::u64")]
    pub gas: u64,
    pub gas_coin: CoinRef,
    #[serde(rename = "type", deserialize_with = "numstr::u32")]
    pub tx_type: u32,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub service_data: String,
    #[serde(default, deserialize_with = "numstr::u32")]
    pub code: u32,
    #[serde(default)]
    pub log: String,
    #[serde(default)]
    pub tags: BTreeMap<String, Value>,
}

impl TryFrom<TransactionWire> for NodeTransaction {
    type Error = ExtenderError;

    fn try_from(w: TransactionWire) -> Result<Self, Self::Error> {
        let code = u8::try_from(w.tx_type)
            .map_err(|_| ExtenderError::decode(format!("transaction type {} out of range", w.tx_type)))?;
        let data = TxData::decode(code, &w.data)?;
        let tags = w
            .tags
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect();
        Ok(Self {
            hash: w.hash,
            raw_tx: w.raw_tx,
            from: w.from,
            nonce: w.nonce,
            gas_price: w.gas_price,
            gas: w.gas,
            gas_coin: w.gas_coin,
            payload: w.payload,
            service_data: w.service_data,
            code: w.code,
            log: w.log,
            tags,
            data,
            raw_data: w.data,
        })
    }
}

fn decode_transaction(value: Value) -> Result<NodeTransaction, ExtenderError> {
    let wire: TransactionWire = serde_json::from_value(value)?;
    wire.try_into()
}

impl From<BlockWire> for NodeBlock {
    fn from(w: BlockWire) -> Self {
        let height = w.height;
        let mut transactions = Vec::with_capacity(w.transactions.len());
        for raw in w.transactions {
            let hash = raw
                .get("hash")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            match decode_transaction(raw) {
                Ok(tx) => transactions.push(tx),
                Err(e) => warn!(height, hash = %hash, error = %e, "skipping undecodable transaction"),
            }
        }
        Self {
            height,
            hash: w.hash,
            time: w.time,
            size: w.size,
            proposer: w.proposer.filter(|p| !p.is_empty()),
            block_reward: w.block_reward,
            transactions,
            signatures: w
                .validators
                .into_iter()
                .map(|s| BlockSignature {
                    public_key: s.public_key,
                    signed: s.signed,
                })
                .collect(),
        }
    }
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct EventsWire {
    #[serde(default)]
    pub events: Vec<EventWire>,
}

#[derive(Debug, Deserialize)]
pub struct EventWire {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub value: Value,
}

impl EventsWire {
    pub fn into_events(self, height: u64) -> BlockEvents {
        let mut events = Vec::with_capacity(self.events.len());
        for e in self.events {
            match NodeEvent::decode(&e.event_type, &e.value) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(err) => warn!(height, event_type = %e.event_type, error = %err, "skipping undecodable event"),
            }
        }
        BlockEvents { height, events }
    }
}

// ─── Candidates ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CandidatesWire {
    #[serde(default)]
    pub candidates: Vec<CandidateWire>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateWire {
    pub public_key: String,
    pub reward_address: String,
    pub owner_address: String,
    #[serde(default)]
    pub control_address: String,
    #[serde(default)]
    pub total_stake: String,
    #[serde(default, deserialize_with = "numstr::u32")]
    pub commission: u32,
    #[serde(deserialize_with = "numstr::u32")]
    pub status: u32,
    #[serde(default)]
    pub stakes: Option<Vec<StakeWire>>,
}

#[derive(Debug, Deserialize)]
pub struct StakeWire {
    pub owner: String,
    pub coin: CoinRef,
    pub value: String,
    #[serde(default)]
    pub bip_value: String,
}

impl TryFrom<CandidateWire> for Candidate {
    type Error = ExtenderError;

    fn try_from(w: CandidateWire) -> Result<Self, Self::Error> {
        let status = u8::try_from(w.status)
            .map_err(|_| ExtenderError::decode(format!("candidate status {} out of range", w.status)))?;
        // Older nodes leave the control address empty; it defaults to the owner.
        let control_address = if w.control_address.is_empty() {
            w.owner_address.clone()
        } else {
            w.control_address
        };
        Ok(Self {
            public_key: w.public_key,
            reward_address: w.reward_address,
            owner_address: w.owner_address,
            control_address,
            total_stake: w.total_stake,
            commission: w.commission,
            status,
            stakes: w.stakes.map(|stakes| {
                stakes
                    .into_iter()
                    .map(|s| CandidateStake {
                        owner: s.owner,
                        coin: s.coin,
                        value: s.value,
                        bip_value: s.bip_value,
                    })
                    .collect()
            }),
        })
    }
}

impl CandidatesWire {
    pub fn into_candidates(self) -> Vec<Candidate> {
        self.candidates
            .into_iter()
            .filter_map(|w| {
                let key = w.public_key.clone();
                match Candidate::try_from(w) {
                    Ok(c) => Some(c),
                    Err(e) => {
                        warn!(public_key = %key, error = %e, "skipping undecodable candidate");
                        None
                    }
                }
            })
            .collect()
    }
}

// ─── Coins ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CoinInfoWire {
    #[serde(deserialize_with = "numstr::u64")]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub volume: String,
    #[serde(default, deserialize_with = "numstr::u32")]
    pub crr: u32,
    #[serde(default)]
    pub reserve_balance: String,
    #[serde(default)]
    pub max_supply: String,
    #[serde(default)]
    pub owner_address: Option<String>,
    #[serde(default)]
    pub mintable: bool,
    #[serde(default)]
    pub burnable: bool,
}

impl From<CoinInfoWire> for CoinInfo {
    fn from(w: CoinInfoWire) -> Self {
        Self {
            id: w.id,
            name: w.name,
            symbol: w.symbol,
            volume: w.volume,
            crr: w.crr,
            reserve_balance: w.reserve_balance,
            max_supply: w.max_supply,
            owner_address: w.owner_address.filter(|a| !a.is_empty()),
            mintable: w.mintable,
            burnable: w.burnable,
        }
    }
}

// ─── Balances ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AddressesWire {
    #[serde(default)]
    pub addresses: BTreeMap<String, AddressWire>,
}

#[derive(Debug, Deserialize)]
pub struct AddressWire {
    #[serde(default)]
    pub balance: Vec<BalanceWire>,
}

#[derive(Debug, Deserialize)]
pub struct BalanceWire {
    pub coin: CoinRef,
    pub value: String,
}

impl AddressesWire {
    /// Snapshots in request order; addresses the node omitted get an empty
    /// balance list.
    pub fn into_balances(mut self, requested: &[String]) -> Vec<AddressBalances> {
        requested
            .iter()
            .map(|address| {
                let balances = self
                    .addresses
                    .remove(address)
                    .map(|w| {
                        w.balance
                            .into_iter()
                            .map(|b| BalanceEntry {
                                coin: b.coin,
                                value: b.value,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                AddressBalances {
                    address: address.clone(),
                    balances,
                }
            })
            .collect()
    }
}
