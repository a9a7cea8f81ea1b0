//! Shared fixtures: a scripted node and block builders.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use chainextender_core::error::{EntityKind, ExtenderError};
use chainextender_core::event::NodeEvent;
use chainextender_core::node::NodeClient;
use chainextender_core::tx::TxData;
use chainextender_core::types::{
    AddressBalances, BalanceEntry, BlockEvents, BlockSignature, Candidate, CoinInfo, CoinRef, NodeBlock,
    NodeStatus, NodeTransaction,
};

// ─── Keys ─────────────────────────────────────────────────────────────────────

pub fn address(c: char) -> String {
    format!("Mx{}", c.to_string().repeat(40))
}

pub fn public_key(c: char) -> String {
    format!("Mp{}", c.to_string().repeat(64))
}

pub fn bip() -> CoinRef {
    CoinRef::new(0, "BIP")
}

pub fn block_time(height: u64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_600_000_000 + 5 * height as i64, 0).unwrap()
}

// ─── Builders ─────────────────────────────────────────────────────────────────

/// A transaction from `from`, applied by the chain unless `code` says
/// otherwise.
pub fn tx(n: u64, from: &str, data: TxData) -> NodeTransaction {
    NodeTransaction {
        hash: format!("Mt{n:064x}"),
        raw_tx: format!("f8{n:02x}"),
        from: from.to_string(),
        nonce: n,
        gas_price: 1,
        gas: 10,
        gas_coin: bip(),
        payload: String::new(),
        service_data: String::new(),
        code: 0,
        log: String::new(),
        tags: BTreeMap::new(),
        raw_data: serde_json::to_value(&data).unwrap(),
        data,
    }
}

pub fn with_tag(mut tx: NodeTransaction, key: &str, value: &str) -> NodeTransaction {
    tx.tags.insert(key.to_string(), value.to_string());
    tx
}

pub fn block(height: u64, proposer: &str, transactions: Vec<NodeTransaction>) -> NodeBlock {
    NodeBlock {
        height,
        hash: format!("Mt{height:064x}"),
        time: block_time(height),
        size: 1024,
        proposer: Some(proposer.to_string()),
        block_reward: "333000000000000000000".into(),
        transactions,
        signatures: vec![BlockSignature {
            public_key: proposer.to_string(),
            signed: true,
        }],
    }
}

// ─── Scripted node ────────────────────────────────────────────────────────────

/// Serves fixed blocks and events; every address holds 1 BIP unless a
/// snapshot says otherwise.
#[derive(Default)]
pub struct ScriptedNode {
    pub blocks: HashMap<u64, NodeBlock>,
    pub events: HashMap<u64, Vec<NodeEvent>>,
    pub candidates: Vec<Candidate>,
    /// Candidate lists for specific heights, overriding `candidates`.
    pub candidates_at: HashMap<u64, Vec<Candidate>>,
    pub balances: HashMap<String, Vec<BalanceEntry>>,
    pub coins: HashMap<u64, CoinInfo>,
}

impl ScriptedNode {
    pub fn with_block(mut self, block: NodeBlock) -> Self {
        self.blocks.insert(block.height, block);
        self
    }

    pub fn with_events(mut self, height: u64, events: Vec<NodeEvent>) -> Self {
        self.events.insert(height, events);
        self
    }

    pub fn with_candidate(mut self, candidate: Candidate) -> Self {
        self.candidates.push(candidate);
        self
    }

    pub fn with_candidates_at(mut self, height: u64, candidates: Vec<Candidate>) -> Self {
        self.candidates_at.insert(height, candidates);
        self
    }

    pub fn with_balances(mut self, address: &str, balances: Vec<BalanceEntry>) -> Self {
        self.balances.insert(address.to_string(), balances);
        self
    }

    pub fn with_coin(mut self, info: CoinInfo) -> Self {
        self.coins.insert(info.id, info);
        self
    }

    /// Balance snapshot the node reports for `address`.
    pub fn snapshot(&self, address: &str) -> Vec<BalanceEntry> {
        self.balances.get(address).cloned().unwrap_or_else(|| {
            vec![BalanceEntry {
                coin: bip(),
                value: "1000000000000000000".into(),
            }]
        })
    }
}

#[async_trait]
impl NodeClient for ScriptedNode {
    async fn status(&self) -> Result<NodeStatus, ExtenderError> {
        let latest = self.blocks.keys().copied().max().unwrap_or(0);
        Ok(NodeStatus {
            latest_block_height: latest,
            latest_block_time: block_time(latest),
        })
    }

    async fn block(&self, height: u64) -> Result<Option<NodeBlock>, ExtenderError> {
        Ok(self.blocks.get(&height).cloned())
    }

    async fn events(&self, height: u64) -> Result<BlockEvents, ExtenderError> {
        Ok(BlockEvents {
            height,
            events: self.events.get(&height).cloned().unwrap_or_default(),
        })
    }

    async fn candidates(&self, height: u64, include_stakes: bool) -> Result<Vec<Candidate>, ExtenderError> {
        let listed = self.candidates_at.get(&height).unwrap_or(&self.candidates);
        Ok(listed
            .iter()
            .cloned()
            .map(|mut c| {
                if !include_stakes {
                    c.stakes = None;
                }
                c
            })
            .collect())
    }

    async fn coin_info_by_id(&self, id: u64) -> Result<CoinInfo, ExtenderError> {
        self.coins
            .get(&id)
            .cloned()
            .ok_or_else(|| ExtenderError::not_found(EntityKind::Coin, id.to_string()))
    }

    async fn coin_info_by_symbol(&self, symbol: &str) -> Result<CoinInfo, ExtenderError> {
        self.coins
            .values()
            .find(|c| c.symbol == symbol)
            .cloned()
            .ok_or_else(|| ExtenderError::not_found(EntityKind::Coin, symbol))
    }

    async fn balances(&self, addresses: &[String]) -> Result<Vec<AddressBalances>, ExtenderError> {
        Ok(addresses
            .iter()
            .map(|a| AddressBalances {
                address: a.clone(),
                balances: self.snapshot(a),
            })
            .collect())
    }
}
