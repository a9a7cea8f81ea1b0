//! Rows persisted by the [`Store`](crate::store::Store).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::RewardRole;

/// Id of the chain's base coin.
pub const BASE_COIN_ID: u64 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub id: u64,
    pub name: String,
    pub symbol: String,
    /// Constant reserve ratio; `0` for tokens.
    pub crr: u32,
    pub volume: String,
    pub reserve: String,
    pub max_supply: String,
    pub mintable: bool,
    pub burnable: bool,
    pub owner_address_id: Option<u64>,
    pub created_at_block_id: Option<u64>,
    /// `0` for the current coin of a symbol; superseded coins carry the
    /// version they were retired with.
    pub version: u32,
}

impl Coin {
    /// The ticker the node uses for this coin (`SYMBOL` or `SYMBOL-<version>`).
    pub fn ticker(&self) -> String {
        ticker(&self.symbol, self.version)
    }
}

/// Build a ticker from a symbol and version.
pub fn ticker(symbol: &str, version: u32) -> String {
    if version == 0 {
        symbol.to_string()
    } else {
        format!("{symbol}-{version}")
    }
}

/// Split a ticker into symbol and version (`"ABC-2"` → `("ABC", 2)`).
pub fn split_ticker(ticker: &str) -> (&str, u32) {
    match ticker.rsplit_once('-') {
        Some((symbol, version)) => match version.parse::<u32>() {
            Ok(v) => (symbol, v),
            Err(_) => (ticker, 0),
        },
        None => (ticker, 0),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub id: u64,
    pub public_key: String,
    /// `None` once the validator drops out of the candidate list.
    pub status: Option<u8>,
    pub commission: Option<u32>,
    pub total_stake: Option<String>,
    pub reward_address_id: Option<u64>,
    pub owner_address_id: Option<u64>,
    pub control_address_id: Option<u64>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A snapshot update for one validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    pub id: u64,
    pub status: u8,
    pub commission: u32,
    pub total_stake: String,
    pub reward_address_id: u64,
    pub owner_address_id: u64,
    pub control_address_id: u64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stake {
    pub validator_id: u64,
    pub owner_address_id: u64,
    pub coin_id: u64,
    pub value: String,
    pub bip_value: String,
    pub is_kicked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block height.
    pub id: u64,
    pub hash: String,
    pub size: u64,
    pub num_txs: u32,
    /// Nanoseconds elapsed since the previous block.
    pub block_time: u64,
    pub block_reward: String,
    pub proposer_validator_id: Option<u64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockValidator {
    pub block_id: u64,
    pub validator_id: u64,
    pub signed: bool,
}

/// A transaction row before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub block_id: u64,
    pub from_address_id: u64,
    pub nonce: u64,
    pub gas_price: u64,
    pub gas: u64,
    pub gas_coin_id: u64,
    pub tx_type: u8,
    pub hash: String,
    pub payload: String,
    pub service_data: String,
    pub data: serde_json::Value,
    pub tags: serde_json::Value,
    pub raw_tx: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub transaction_id: u64,
    pub to_address_id: u64,
    pub coin_id: u64,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionValidator {
    pub transaction_id: u64,
    pub validator_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidTransaction {
    pub block_id: u64,
    pub from_address_id: u64,
    pub tx_type: u8,
    pub hash: String,
    pub tx_data: serde_json::Value,
    pub log: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub address_id: u64,
    pub coin_id: u64,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub block_id: u64,
    pub address_id: u64,
    pub validator_id: u64,
    pub role: RewardRole,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slash {
    pub block_id: u64,
    pub address_id: u64,
    pub validator_id: u64,
    pub coin_id: u64,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityPool {
    pub id: u64,
    pub coin0_id: u64,
    pub coin1_id: u64,
    pub volume0: String,
    pub volume1: String,
    pub liquidity: String,
    pub updated_at_block_id: u64,
}

/// Lifecycle of a limit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    Active,
    PartiallyFilled,
    Filled,
    Canceled,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Expired)
    }

    /// Whether an order may move from `self` to `next`.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (New, Active) => true,
            (New | Active | PartiallyFilled, PartiallyFilled | Filled | Canceled | Expired) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Active => "active",
            Self::PartiallyFilled => "partially_filled",
            Self::Filled => "filled",
            Self::Canceled => "canceled",
            Self::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "new" => Self::New,
            "active" => Self::Active,
            "partially_filled" => Self::PartiallyFilled,
            "filled" => Self::Filled,
            "canceled" => Self::Canceled,
            "expired" => Self::Expired,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub address_id: u64,
    pub pool_id: u64,
    pub coin_sell_id: u64,
    pub coin_sell_volume: String,
    pub coin_buy_id: u64,
    pub coin_buy_volume: String,
    pub created_at_block_id: u64,
    pub status: OrderStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_roundtrip() {
        assert_eq!(ticker("ABC", 0), "ABC");
        assert_eq!(ticker("ABC", 2), "ABC-2");
        assert_eq!(split_ticker("ABC-2"), ("ABC", 2));
        assert_eq!(split_ticker("ABC"), ("ABC", 0));
        // A dash followed by a non-number is part of the symbol.
        assert_eq!(split_ticker("LP-X"), ("LP-X", 0));
    }

    #[test]
    fn order_transitions() {
        use OrderStatus::*;
        assert!(New.can_transition_to(Active));
        assert!(Active.can_transition_to(PartiallyFilled));
        assert!(PartiallyFilled.can_transition_to(PartiallyFilled));
        assert!(PartiallyFilled.can_transition_to(Filled));
        assert!(Active.can_transition_to(Expired));
        assert!(!Filled.can_transition_to(Active));
        assert!(!Canceled.can_transition_to(Filled));
        assert!(!Active.can_transition_to(New));
        assert!(Expired.is_terminal());
        assert_eq!(OrderStatus::parse(PartiallyFilled.as_str()), Some(PartiallyFilled));
    }
}
