//! Side-channel events emitted by the node at each height.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExtenderError;
use crate::types::numstr;

/// Recipient role of a reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RewardRole {
    Validator,
    Delegator,
    Dao,
    Developer,
}

impl RewardRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validator => "Validator",
            Self::Delegator => "Delegator",
            Self::Dao => "DAO",
            Self::Developer => "Developer",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ExtenderError> {
        match s {
            "Validator" => Ok(Self::Validator),
            "Delegator" => Ok(Self::Delegator),
            "DAO" => Ok(Self::Dao),
            "Developer" => Ok(Self::Developer),
            other => Err(ExtenderError::decode(format!("unknown reward role '{other}'"))),
        }
    }
}

/// A typed node event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeEvent {
    Reward {
        role: RewardRole,
        address: String,
        amount: String,
        validator_pub_key: String,
        for_coin: Option<u64>,
    },
    Slash {
        address: String,
        amount: String,
        coin: u64,
        validator_pub_key: String,
    },
    Unbond {
        address: String,
        amount: String,
        coin: u64,
        validator_pub_key: String,
    },
    StakeKick {
        address: String,
        amount: String,
        coin: u64,
        validator_pub_key: String,
    },
    CoinLiquidation {
        coin: u64,
    },
    OrderExpired {
        id: u64,
        address: String,
        coin: u64,
        amount: String,
    },
}

#[derive(Deserialize)]
struct RewardWire {
    role: String,
    address: String,
    amount: String,
    validator_pub_key: String,
    #[serde(default, deserialize_with = "numstr::option_u64")]
    for_coin: Option<u64>,
}

#[derive(Deserialize)]
struct StakeEventWire {
    address: String,
    amount: String,
    #[serde(deserialize_with = "numstr::u64")]
    coin: u64,
    validator_pub_key: String,
}

#[derive(Deserialize)]
struct LiquidationWire {
    #[serde(deserialize_with = "numstr::u64")]
    coin: u64,
}

#[derive(Deserialize)]
struct OrderExpiredWire {
    #[serde(deserialize_with = "numstr::u64")]
    id: u64,
    address: String,
    #[serde(deserialize_with = "numstr::u64")]
    coin: u64,
    amount: String,
}

impl NodeEvent {
    /// Decode an event from the node's `{type, value}` representation.
    ///
    /// Returns `Ok(None)` for event types the extender does not track.
    pub fn decode(event_type: &str, value: &Value) -> Result<Option<Self>, ExtenderError> {
        let kind = event_type.rsplit('/').next().unwrap_or(event_type);
        let event = match kind {
            "RewardEvent" => {
                let w: RewardWire = serde_json::from_value(value.clone())?;
                Self::Reward {
                    role: RewardRole::parse(&w.role)?,
                    address: w.address,
                    amount: w.amount,
                    validator_pub_key: w.validator_pub_key,
                    for_coin: w.for_coin,
                }
            }
            "SlashEvent" => {
                let w: StakeEventWire = serde_json::from_value(value.clone())?;
                Self::Slash {
                    address: w.address,
                    amount: w.amount,
                    coin: w.coin,
                    validator_pub_key: w.validator_pub_key,
                }
            }
            "UnbondEvent" => {
                let w: StakeEventWire = serde_json::from_value(value.clone())?;
                Self::Unbond {
                    address: w.address,
                    amount: w.amount,
                    coin: w.coin,
                    validator_pub_key: w.validator_pub_key,
                }
            }
            "StakeKickEvent" => {
                let w: StakeEventWire = serde_json::from_value(value.clone())?;
                Self::StakeKick {
                    address: w.address,
                    amount: w.amount,
                    coin: w.coin,
                    validator_pub_key: w.validator_pub_key,
                }
            }
            "RemoveCandidateEvent" | "JailEvent" | "UpdateNetworkEvent" | "UpdateCommissionsEvent" => {
                return Ok(None)
            }
            "CoinLiquidationEvent" => {
                let w: LiquidationWire = serde_json::from_value(value.clone())?;
                Self::CoinLiquidation { coin: w.coin }
            }
            "OrderExpiredEvent" => {
                let w: OrderExpiredWire = serde_json::from_value(value.clone())?;
                Self::OrderExpired {
                    id: w.id,
                    address: w.address,
                    coin: w.coin,
                    amount: w.amount,
                }
            }
            other => {
                tracing::debug!(event_type = other, "ignoring untracked event type");
                return Ok(None);
            }
        };
        Ok(Some(event))
    }

    /// The address the event concerns, if any.
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Reward { address, .. }
            | Self::Slash { address, .. }
            | Self::Unbond { address, .. }
            | Self::StakeKick { address, .. }
            | Self::OrderExpired { address, .. } => Some(address),
            Self::CoinLiquidation { .. } => None,
        }
    }

    /// The validator the event concerns, if any.
    pub fn validator_pub_key(&self) -> Option<&str> {
        match self {
            Self::Reward {
                validator_pub_key, ..
            }
            | Self::Slash {
                validator_pub_key, ..
            }
            | Self::Unbond {
                validator_pub_key, ..
            }
            | Self::StakeKick {
                validator_pub_key, ..
            } => Some(validator_pub_key),
            _ => None,
        }
    }

    /// `true` for events that change an address's stakes or balances.
    pub fn touches_balance(&self) -> bool {
        !matches!(self, Self::CoinLiquidation { .. })
    }
}
