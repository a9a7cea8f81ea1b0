//! Node-side data as yielded by the [`NodeClient`](crate::node::NodeClient).
//!
//! These types are decoded once at ingestion; everything downstream works
//! with them and never touches raw node JSON again.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::NodeEvent;
use crate::tx::{TxData, TxType};

// ─── Numeric strings ─────────────────────────────────────────────────────────

/// Serde helpers for integers the node encodes as JSON strings.
pub mod numstr {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Num(u64),
        Str(String),
    }

    fn parse<E: serde::de::Error>(v: NumOrStr) -> Result<u64, E> {
        match v {
            NumOrStr::Num(n) => Ok(n),
            NumOrStr::Str(s) if s.is_empty() => Ok(0),
            NumOrStr::Str(s) => s.parse().map_err(E::custom),
        }
    }

    pub fn u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        parse(NumOrStr::deserialize(d)?)
    }

    pub fn u32<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        let v = parse::<D::Error>(NumOrStr::deserialize(d)?)?;
        u32::try_from(v).map_err(serde::de::Error::custom)
    }

    pub fn option_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        match Option::<NumOrStr>::deserialize(d)? {
            Some(v) => parse(v).map(Some),
            None => Ok(None),
        }
    }
}

/// Parse a decimal amount string into `u128`.
pub fn parse_amount(value: &str) -> Result<u128, crate::error::ExtenderError> {
    if value.is_empty() {
        return Ok(0);
    }
    value
        .parse::<u128>()
        .map_err(|e| crate::error::ExtenderError::decode(format!("amount '{value}': {e}")))
}

// ─── CoinRef ──────────────────────────────────────────────────────────────────

/// A coin as referenced by the node: numeric id plus ticker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoinRef {
    #[serde(deserialize_with = "numstr::u64")]
    pub id: u64,
    #[serde(default)]
    pub symbol: String,
}

impl CoinRef {
    pub fn new(id: u64, symbol: impl Into<String>) -> Self {
        Self {
            id,
            symbol: symbol.into(),
        }
    }
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// The node's current status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub latest_block_height: u64,
    pub latest_block_time: DateTime<Utc>,
}

// ─── Blocks ──────────────────────────────────────────────────────────────────

/// One validator's signature slot in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSignature {
    pub public_key: String,
    pub signed: bool,
}

/// A finalized block at a given height.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeBlock {
    pub height: u64,
    pub hash: String,
    pub time: DateTime<Utc>,
    pub size: u64,
    /// Proposer public key (`Mp…`). Absent for the genesis block.
    pub proposer: Option<String>,
    pub block_reward: String,
    pub transactions: Vec<NodeTransaction>,
    pub signatures: Vec<BlockSignature>,
}

impl NodeBlock {
    /// Transactions accepted by the chain (`code == 0`), in block order.
    pub fn valid_transactions(&self) -> impl Iterator<Item = &NodeTransaction> {
        self.transactions.iter().filter(|tx| tx.is_valid())
    }

    /// Transactions included in the block but rejected by the chain.
    pub fn invalid_transactions(&self) -> impl Iterator<Item = &NodeTransaction> {
        self.transactions.iter().filter(|tx| !tx.is_valid())
    }
}

/// A transaction with its strongly-typed payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTransaction {
    pub hash: String,
    pub raw_tx: String,
    pub from: String,
    pub nonce: u64,
    pub gas_price: u64,
    pub gas: u64,
    pub gas_coin: CoinRef,
    pub payload: String,
    pub service_data: String,
    /// Node response code; `0` means the transaction was applied.
    pub code: u32,
    pub log: String,
    pub tags: BTreeMap<String, String>,
    pub data: TxData,
    /// The payload as the node returned it, kept for the `data` column.
    pub raw_data: serde_json::Value,
}

impl NodeTransaction {
    pub fn is_valid(&self) -> bool {
        self.code == 0
    }

    pub fn tx_type(&self) -> TxType {
        self.data.tx_type()
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Every address this transaction touches, sender first.
    ///
    /// Includes multisig addresses created by the transaction (reported by
    /// the node in the `tx.created_multisig` tag).
    pub fn referenced_addresses(&self) -> Vec<&str> {
        let mut out = vec![self.from.as_str()];
        out.extend(self.data.addresses());
        if let Some(created) = self.tag("tx.created_multisig") {
            out.push(created);
        }
        out
    }
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// All side-channel events emitted at one height.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockEvents {
    pub height: u64,
    pub events: Vec<NodeEvent>,
}

// ─── Candidates ──────────────────────────────────────────────────────────────

/// A single stake held in a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateStake {
    pub owner: String,
    pub coin: CoinRef,
    pub value: String,
    pub bip_value: String,
}

/// A validator candidate as listed by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub public_key: String,
    pub reward_address: String,
    pub owner_address: String,
    pub control_address: String,
    pub total_stake: String,
    pub commission: u32,
    /// 1 = offline, 2 = online.
    pub status: u8,
    /// Present only when stakes were requested.
    pub stakes: Option<Vec<CandidateStake>>,
}

impl Candidate {
    /// Addresses the candidate links to (reward, owner, control, stake owners).
    pub fn addresses(&self) -> Vec<&str> {
        let mut out = vec![
            self.reward_address.as_str(),
            self.owner_address.as_str(),
            self.control_address.as_str(),
        ];
        if let Some(stakes) = &self.stakes {
            out.extend(stakes.iter().map(|s| s.owner.as_str()));
        }
        out
    }
}

// ─── Coins ───────────────────────────────────────────────────────────────────

/// Current on-chain state of a coin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinInfo {
    pub id: u64,
    pub name: String,
    pub symbol: String,
    pub volume: String,
    pub crr: u32,
    pub reserve_balance: String,
    pub max_supply: String,
    pub owner_address: Option<String>,
    pub mintable: bool,
    pub burnable: bool,
}

// ─── Balances ────────────────────────────────────────────────────────────────

/// One coin balance of an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub coin: CoinRef,
    pub value: String,
}

/// Full balance snapshot of one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBalances {
    pub address: String,
    pub balances: Vec<BalanceEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Holder {
        #[serde(deserialize_with = "numstr::u64")]
        n: u64,
    }

    #[test]
    fn numstr_accepts_strings_and_numbers() {
        let a: Holder = serde_json::from_str(r#"{"n":"42"}"#).unwrap();
        let b: Holder = serde_json::from_str(r#"{"n":42}"#).unwrap();
        assert_eq!(a.n, 42);
        assert_eq!(b.n, 42);
        assert!(serde_json::from_str::<Holder>(r#"{"n":"4x"}"#).is_err());
    }

    #[test]
    fn coin_ref_from_node_json() {
        let c: CoinRef = serde_json::from_str(r#"{"id":"7","symbol":"ABC"}"#).unwrap();
        assert_eq!(c, CoinRef::new(7, "ABC"));
    }

    #[test]
    fn parse_amount_rejects_garbage() {
        assert_eq!(parse_amount("1000000000000000000").unwrap(), 10u128.pow(18));
        assert_eq!(parse_amount("").unwrap(), 0);
        assert!(parse_amount("-1").is_err());
    }
}
