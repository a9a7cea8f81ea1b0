//! Transaction kinds and their decoded payloads.
//!
//! The node tags every transaction with a numeric type and a JSON payload.
//! [`TxData::decode`] turns that pair into a closed sum type once, at
//! ingestion; the rest of the pipeline pattern-matches on [`TxData`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExtenderError;
use crate::types::{numstr, CoinRef};

// ─── TxType ──────────────────────────────────────────────────────────────────

/// Numeric transaction type as used on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TxType {
    Send = 1,
    SellCoin = 2,
    SellAllCoin = 3,
    BuyCoin = 4,
    CreateCoin = 5,
    DeclareCandidacy = 6,
    Delegate = 7,
    Unbond = 8,
    RedeemCheck = 9,
    SetCandidateOnline = 10,
    SetCandidateOffline = 11,
    CreateMultisig = 12,
    Multisend = 13,
    EditCandidate = 14,
    SetHaltBlock = 15,
    RecreateCoin = 16,
    EditCoinOwner = 17,
    EditMultisig = 18,
    PriceVote = 19,
    EditCandidatePublicKey = 20,
    AddLiquidity = 21,
    RemoveLiquidity = 22,
    SellSwapPool = 23,
    BuySwapPool = 24,
    SellAllSwapPool = 25,
    EditCandidateCommission = 26,
    MoveStake = 27,
    MintToken = 28,
    BurnToken = 29,
    CreateToken = 30,
    RecreateToken = 31,
    VoteCommission = 32,
    VoteUpdate = 33,
    CreateSwapPool = 34,
    AddLimitOrder = 35,
    RemoveLimitOrder = 36,
}

impl TxType {
    pub fn from_code(code: u8) -> Option<Self> {
        use TxType::*;
        Some(match code {
            1 => Send,
            2 => SellCoin,
            3 => SellAllCoin,
            4 => BuyCoin,
            5 => CreateCoin,
            6 => DeclareCandidacy,
            7 => Delegate,
            8 => Unbond,
            9 => RedeemCheck,
            10 => SetCandidateOnline,
            11 => SetCandidateOffline,
            12 => CreateMultisig,
            13 => Multisend,
            14 => EditCandidate,
            15 => SetHaltBlock,
            16 => RecreateCoin,
            17 => EditCoinOwner,
            18 => EditMultisig,
            19 => PriceVote,
            20 => EditCandidatePublicKey,
            21 => AddLiquidity,
            22 => RemoveLiquidity,
            23 => SellSwapPool,
            24 => BuySwapPool,
            25 => SellAllSwapPool,
            26 => EditCandidateCommission,
            27 => MoveStake,
            28 => MintToken,
            29 => BurnToken,
            30 => CreateToken,
            31 => RecreateToken,
            32 => VoteCommission,
            33 => VoteUpdate,
            34 => CreateSwapPool,
            35 => AddLimitOrder,
            36 => RemoveLimitOrder,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

// ─── Payloads ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendData {
    pub coin: CoinRef,
    pub to: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellCoinData {
    pub coin_to_sell: CoinRef,
    pub value_to_sell: String,
    pub coin_to_buy: CoinRef,
    pub minimum_value_to_buy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellAllCoinData {
    pub coin_to_sell: CoinRef,
    pub coin_to_buy: CoinRef,
    pub minimum_value_to_buy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyCoinData {
    pub coin_to_buy: CoinRef,
    pub value_to_buy: String,
    pub coin_to_sell: CoinRef,
    pub maximum_value_to_sell: String,
}

/// Payload of create-coin and recreate-coin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCoinData {
    pub name: String,
    pub symbol: String,
    pub initial_amount: String,
    pub initial_reserve: String,
    #[serde(deserialize_with = "numstr::u32")]
    pub constant_reserve_ratio: u32,
    pub max_supply: String,
}

/// Payload of create-token and recreate-token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTokenData {
    pub name: String,
    pub symbol: String,
    pub initial_amount: String,
    pub max_supply: String,
    pub mintable: bool,
    pub burnable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclareCandidacyData {
    pub address: String,
    pub pub_key: String,
    #[serde(deserialize_with = "numstr::u32")]
    pub commission: u32,
    pub coin: CoinRef,
    pub stake: String,
}

/// Payload of delegate and unbond.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeData {
    pub pub_key: String,
    pub coin: CoinRef,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveStakeData {
    pub from_pub_key: String,
    pub to_pub_key: String,
    pub coin: CoinRef,
    pub stake: String,
}

/// Check contents as decoded by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckData {
    pub sender: String,
    pub coin: CoinRef,
    pub value: String,
    #[serde(deserialize_with = "numstr::u64")]
    pub due_block: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemCheckData {
    pub raw_check: String,
    pub proof: String,
    #[serde(default)]
    pub check: Option<CheckData>,
}

/// Payload of set-candidate-on and set-candidate-off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateKeyData {
    pub pub_key: String,
}

/// Payload of create-multisig and edit-multisig.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigData {
    #[serde(deserialize_with = "numstr::u32")]
    pub threshold: u32,
    #[serde(default)]
    pub weights: Vec<String>,
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisendData {
    pub list: Vec<SendData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditCandidateData {
    pub pub_key: String,
    pub reward_address: String,
    pub owner_address: String,
    pub control_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetHaltBlockData {
    pub pub_key: String,
    #[serde(deserialize_with = "numstr::u64")]
    pub height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditCoinOwnerData {
    pub symbol: String,
    pub new_owner: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceVoteData {
    #[serde(deserialize_with = "numstr::u64")]
    pub price: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditCandidatePublicKeyData {
    pub pub_key: String,
    pub new_pub_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLiquidityData {
    pub coin0: CoinRef,
    pub coin1: CoinRef,
    pub volume0: String,
    pub maximum_volume1: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLiquidityData {
    pub coin0: CoinRef,
    pub coin1: CoinRef,
    pub liquidity: String,
    pub minimum_volume0: String,
    pub minimum_volume1: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellSwapPoolData {
    pub coins: Vec<CoinRef>,
    pub value_to_sell: String,
    pub minimum_value_to_buy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuySwapPoolData {
    pub coins: Vec<CoinRef>,
    pub value_to_buy: String,
    pub maximum_value_to_sell: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellAllSwapPoolData {
    pub coins: Vec<CoinRef>,
    pub minimum_value_to_buy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditCandidateCommissionData {
    pub pub_key: String,
    #[serde(deserialize_with = "numstr::u32")]
    pub commission: u32,
}

/// Payload of mint-token and burn-token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSupplyData {
    pub coin: CoinRef,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCommissionData {
    pub pub_key: String,
    #[serde(deserialize_with = "numstr::u64")]
    pub height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteUpdateData {
    pub pub_key: String,
    #[serde(deserialize_with = "numstr::u64")]
    pub height: u64,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSwapPoolData {
    pub coin0: CoinRef,
    pub coin1: CoinRef,
    pub volume0: String,
    pub volume1: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLimitOrderData {
    pub coin_to_sell: CoinRef,
    pub value_to_sell: String,
    pub coin_to_buy: CoinRef,
    pub value_to_buy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLimitOrderData {
    #[serde(deserialize_with = "numstr::u64")]
    pub id: u64,
}

// ─── TxData ──────────────────────────────────────────────────────────────────

/// Decoded transaction payload, one variant per [`TxType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum TxData {
    Send(SendData),
    SellCoin(SellCoinData),
    SellAllCoin(SellAllCoinData),
    BuyCoin(BuyCoinData),
    CreateCoin(CreateCoinData),
    DeclareCandidacy(DeclareCandidacyData),
    Delegate(StakeData),
    Unbond(StakeData),
    RedeemCheck(RedeemCheckData),
    SetCandidateOnline(CandidateKeyData),
    SetCandidateOffline(CandidateKeyData),
    CreateMultisig(MultisigData),
    Multisend(MultisendData),
    EditCandidate(EditCandidateData),
    SetHaltBlock(SetHaltBlockData),
    RecreateCoin(CreateCoinData),
    EditCoinOwner(EditCoinOwnerData),
    EditMultisig(MultisigData),
    PriceVote(PriceVoteData),
    EditCandidatePublicKey(EditCandidatePublicKeyData),
    AddLiquidity(AddLiquidityData),
    RemoveLiquidity(RemoveLiquidityData),
    SellSwapPool(SellSwapPoolData),
    BuySwapPool(BuySwapPoolData),
    SellAllSwapPool(SellAllSwapPoolData),
    EditCandidateCommission(EditCandidateCommissionData),
    MoveStake(MoveStakeData),
    MintToken(TokenSupplyData),
    BurnToken(TokenSupplyData),
    CreateToken(CreateTokenData),
    RecreateToken(CreateTokenData),
    VoteCommission(VoteCommissionData),
    VoteUpdate(VoteUpdateData),
    CreateSwapPool(CreateSwapPoolData),
    AddLimitOrder(AddLimitOrderData),
    RemoveLimitOrder(RemoveLimitOrderData),
}

/// A value transfer produced by a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput<'a> {
    pub to: &'a str,
    pub coin: u64,
    pub value: &'a str,
}

fn payload<T: serde::de::DeserializeOwned>(tx_type: TxType, value: &Value) -> Result<T, ExtenderError> {
    serde_json::from_value(value.clone())
        .map_err(|e| ExtenderError::decode(format!("{tx_type:?} payload: {e}")))
}

impl TxData {
    /// Decode a node payload for the given numeric type.
    pub fn decode(type_code: u8, value: &Value) -> Result<Self, ExtenderError> {
        let tx_type = TxType::from_code(type_code)
            .ok_or_else(|| ExtenderError::decode(format!("unknown transaction type {type_code}")))?;
        use TxType as T;
        Ok(match tx_type {
            T::Send => Self::Send(payload(tx_type, value)?),
            T::SellCoin => Self::SellCoin(payload(tx_type, value)?),
            T::SellAllCoin => Self::SellAllCoin(payload(tx_type, value)?),
            T::BuyCoin => Self::BuyCoin(payload(tx_type, value)?),
            T::CreateCoin => Self::CreateCoin(payload(tx_type, value)?),
            T::DeclareCandidacy => Self::DeclareCandidacy(payload(tx_type, value)?),
            T::Delegate => Self::Delegate(payload(tx_type, value)?),
            T::Unbond => Self::Unbond(payload(tx_type, value)?),
            T::RedeemCheck => Self::RedeemCheck(payload(tx_type, value)?),
            T::SetCandidateOnline => Self::SetCandidateOnline(payload(tx_type, value)?),
            T::SetCandidateOffline => Self::SetCandidateOffline(payload(tx_type, value)?),
            T::CreateMultisig => Self::CreateMultisig(payload(tx_type, value)?),
            T::Multisend => Self::Multisend(payload(tx_type, value)?),
            T::EditCandidate => Self::EditCandidate(payload(tx_type, value)?),
            T::SetHaltBlock => Self::SetHaltBlock(payload(tx_type, value)?),
            T::RecreateCoin => Self::RecreateCoin(payload(tx_type, value)?),
            T::EditCoinOwner => Self::EditCoinOwner(payload(tx_type, value)?),
            T::EditMultisig => Self::EditMultisig(payload(tx_type, value)?),
            T::PriceVote => Self::PriceVote(payload(tx_type, value)?),
            T::EditCandidatePublicKey => Self::EditCandidatePublicKey(payload(tx_type, value)?),
            T::AddLiquidity => Self::AddLiquidity(payload(tx_type, value)?),
            T::RemoveLiquidity => Self::RemoveLiquidity(payload(tx_type, value)?),
            T::SellSwapPool => Self::SellSwapPool(payload(tx_type, value)?),
            T::BuySwapPool => Self::BuySwapPool(payload(tx_type, value)?),
            T::SellAllSwapPool => Self::SellAllSwapPool(payload(tx_type, value)?),
            T::EditCandidateCommission => Self::EditCandidateCommission(payload(tx_type, value)?),
            T::MoveStake => Self::MoveStake(payload(tx_type, value)?),
            T::MintToken => Self::MintToken(payload(tx_type, value)?),
            T::BurnToken => Self::BurnToken(payload(tx_type, value)?),
            T::CreateToken => Self::CreateToken(payload(tx_type, value)?),
            T::RecreateToken => Self::RecreateToken(payload(tx_type, value)?),
            T::VoteCommission => Self::VoteCommission(payload(tx_type, value)?),
            T::VoteUpdate => Self::VoteUpdate(payload(tx_type, value)?),
            T::CreateSwapPool => Self::CreateSwapPool(payload(tx_type, value)?),
            T::AddLimitOrder => Self::AddLimitOrder(payload(tx_type, value)?),
            T::RemoveLimitOrder => Self::RemoveLimitOrder(payload(tx_type, value)?),
        })
    }

    pub fn tx_type(&self) -> TxType {
        use TxType as T;
        match self {
            Self::Send(_) => T::Send,
            Self::SellCoin(_) => T::SellCoin,
            Self::SellAllCoin(_) => T::SellAllCoin,
            Self::BuyCoin(_) => T::BuyCoin,
            Self::CreateCoin(_) => T::CreateCoin,
            Self::DeclareCandidacy(_) => T::DeclareCandidacy,
            Self::Delegate(_) => T::Delegate,
            Self::Unbond(_) => T::Unbond,
            Self::RedeemCheck(_) => T::RedeemCheck,
            Self::SetCandidateOnline(_) => T::SetCandidateOnline,
            Self::SetCandidateOffline(_) => T::SetCandidateOffline,
            Self::CreateMultisig(_) => T::CreateMultisig,
            Self::Multisend(_) => T::Multisend,
            Self::EditCandidate(_) => T::EditCandidate,
            Self::SetHaltBlock(_) => T::SetHaltBlock,
            Self::RecreateCoin(_) => T::RecreateCoin,
            Self::EditCoinOwner(_) => T::EditCoinOwner,
            Self::EditMultisig(_) => T::EditMultisig,
            Self::PriceVote(_) => T::PriceVote,
            Self::EditCandidatePublicKey(_) => T::EditCandidatePublicKey,
            Self::AddLiquidity(_) => T::AddLiquidity,
            Self::RemoveLiquidity(_) => T::RemoveLiquidity,
            Self::SellSwapPool(_) => T::SellSwapPool,
            Self::BuySwapPool(_) => T::BuySwapPool,
            Self::SellAllSwapPool(_) => T::SellAllSwapPool,
            Self::EditCandidateCommission(_) => T::EditCandidateCommission,
            Self::MoveStake(_) => T::MoveStake,
            Self::MintToken(_) => T::MintToken,
            Self::BurnToken(_) => T::BurnToken,
            Self::CreateToken(_) => T::CreateToken,
            Self::RecreateToken(_) => T::RecreateToken,
            Self::VoteCommission(_) => T::VoteCommission,
            Self::VoteUpdate(_) => T::VoteUpdate,
            Self::CreateSwapPool(_) => T::CreateSwapPool,
            Self::AddLimitOrder(_) => T::AddLimitOrder,
            Self::RemoveLimitOrder(_) => T::RemoveLimitOrder,
        }
    }

    /// Addresses named in the payload (the sender is not included).
    pub fn addresses(&self) -> Vec<&str> {
        match self {
            Self::Send(d) => vec![d.to.as_str()],
            Self::DeclareCandidacy(d) => vec![d.address.as_str()],
            Self::RedeemCheck(d) => d.check.iter().map(|c| c.sender.as_str()).collect(),
            Self::CreateMultisig(d) | Self::EditMultisig(d) => {
                d.addresses.iter().map(String::as_str).collect()
            }
            Self::Multisend(d) => d.list.iter().map(|s| s.to.as_str()).collect(),
            Self::EditCandidate(d) => vec![
                d.reward_address.as_str(),
                d.owner_address.as_str(),
                d.control_address.as_str(),
            ],
            Self::EditCoinOwner(d) => vec![d.new_owner.as_str()],
            _ => vec![],
        }
    }

    /// Validator public keys named in the payload.
    pub fn public_keys(&self) -> Vec<&str> {
        match self {
            Self::DeclareCandidacy(d) => vec![d.pub_key.as_str()],
            Self::Delegate(d) | Self::Unbond(d) => vec![d.pub_key.as_str()],
            Self::SetCandidateOnline(d) | Self::SetCandidateOffline(d) => vec![d.pub_key.as_str()],
            Self::EditCandidate(d) => vec![d.pub_key.as_str()],
            Self::SetHaltBlock(d) => vec![d.pub_key.as_str()],
            Self::EditCandidatePublicKey(d) => vec![d.pub_key.as_str(), d.new_pub_key.as_str()],
            Self::EditCandidateCommission(d) => vec![d.pub_key.as_str()],
            Self::MoveStake(d) => vec![d.from_pub_key.as_str(), d.to_pub_key.as_str()],
            Self::VoteCommission(d) => vec![d.pub_key.as_str()],
            Self::VoteUpdate(d) => vec![d.pub_key.as_str()],
            _ => vec![],
        }
    }

    /// Coins whose supply or reserve the transaction changes.
    pub fn traded_coins(&self) -> Vec<u64> {
        match self {
            Self::SellCoin(d) => vec![d.coin_to_sell.id, d.coin_to_buy.id],
            Self::SellAllCoin(d) => vec![d.coin_to_sell.id, d.coin_to_buy.id],
            Self::BuyCoin(d) => vec![d.coin_to_buy.id, d.coin_to_sell.id],
            Self::SellSwapPool(d) => d.coins.iter().map(|c| c.id).collect(),
            Self::BuySwapPool(d) => d.coins.iter().map(|c| c.id).collect(),
            Self::SellAllSwapPool(d) => d.coins.iter().map(|c| c.id).collect(),
            Self::MintToken(d) | Self::BurnToken(d) => vec![d.coin.id],
            _ => vec![],
        }
    }

    /// Value transfers to recipients. `redeemer` is the transaction sender,
    /// who receives the funds of a redeemed check.
    pub fn outputs<'a>(&'a self, redeemer: &'a str) -> Vec<TxOutput<'a>> {
        match self {
            Self::Send(d) => vec![TxOutput {
                to: &d.to,
                coin: d.coin.id,
                value: &d.value,
            }],
            Self::Multisend(d) => d
                .list
                .iter()
                .map(|s| TxOutput {
                    to: &s.to,
                    coin: s.coin.id,
                    value: &s.value,
                })
                .collect(),
            Self::RedeemCheck(RedeemCheckData {
                check: Some(check), ..
            }) => vec![TxOutput {
                to: redeemer,
                coin: check.coin.id,
                value: &check.value,
            }],
            _ => vec![],
        }
    }

    /// `true` for transactions that should be linked to validators.
    pub fn is_candidate_related(&self) -> bool {
        !self.public_keys().is_empty()
    }
}
