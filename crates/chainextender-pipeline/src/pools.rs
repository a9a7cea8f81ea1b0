//! Liquidity pools and limit orders.
//!
//! Pool volumes depend on the order of swaps inside a block, so the loop
//! applies them synchronously, one transaction at a time, before any
//! transaction is handed to a worker. The resulting rows are written in the
//! same store transaction as the block row: volume changes are additive and
//! must land exactly once. Amounts come from the tags the node attaches to
//! each transaction:
//!
//! | tag              | used by                                      |
//! |------------------|----------------------------------------------|
//! | `tx.pool_id`     | create pool, add/remove liquidity, add order |
//! | `tx.liquidity`   | create pool, add liquidity (minted shares)   |
//! | `tx.volume0/1`   | add liquidity (`1`), remove liquidity (both) |
//! | `tx.pools`       | swaps: JSON list of pool legs                |
//! | `tx.order_id`    | add limit order                              |

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use chainextender_core::error::{EntityKind, ErrorClass, ExtenderError};
use chainextender_core::identity::Resolvers;
use chainextender_core::model::{LiquidityPool, Order, OrderStatus};
use chainextender_core::store::Store;
use chainextender_core::tx::TxData;
use chainextender_core::types::{numstr, parse_amount, NodeBlock, NodeTransaction};

/// One pool a swap went through.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolLeg {
    #[serde(deserialize_with = "numstr::u64")]
    pub pool_id: u64,
    #[serde(deserialize_with = "numstr::u64")]
    pub coin_in: u64,
    pub value_in: String,
    #[serde(deserialize_with = "numstr::u64")]
    pub coin_out: u64,
    pub value_out: String,
    /// Limit orders the leg matched.
    #[serde(default)]
    pub orders: Vec<OrderFill>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderFill {
    #[serde(deserialize_with = "numstr::u64")]
    pub id: u64,
    /// Amount of the order's sell coin that changed hands.
    pub sold: String,
    /// Amount of the order's buy coin the owner received.
    pub bought: String,
}

/// Working set of pools and orders changed by one block.
struct Book<'a> {
    store: &'a dyn Store,
    pools: BTreeMap<u64, LiquidityPool>,
    orders: BTreeMap<u64, Order>,
}

impl<'a> Book<'a> {
    async fn pool(&mut self, id: u64) -> Result<&mut LiquidityPool, ExtenderError> {
        if !self.pools.contains_key(&id) {
            let pool = self
                .store
                .find_pool(id)
                .await?
                .ok_or_else(|| ExtenderError::not_found(EntityKind::Pool, id.to_string()))?;
            self.pools.insert(id, pool);
        }
        self.pools
            .get_mut(&id)
            .ok_or_else(|| ExtenderError::not_found(EntityKind::Pool, id.to_string()))
    }

    async fn order(&mut self, id: u64) -> Result<&mut Order, ExtenderError> {
        if !self.orders.contains_key(&id) {
            let order = self
                .store
                .find_order(id)
                .await?
                .ok_or_else(|| ExtenderError::not_found(EntityKind::Order, id.to_string()))?;
            self.orders.insert(id, order);
        }
        self.orders
            .get_mut(&id)
            .ok_or_else(|| ExtenderError::not_found(EntityKind::Order, id.to_string()))
    }
}

fn tag<'t>(tx: &'t NodeTransaction, key: &str) -> Result<&'t str, ExtenderError> {
    tx.tag(key)
        .ok_or_else(|| ExtenderError::decode(format!("transaction {} has no {key} tag", tx.hash)))
}

fn tag_u64(tx: &NodeTransaction, key: &str) -> Result<u64, ExtenderError> {
    let raw = tag(tx, key)?;
    raw.parse()
        .map_err(|_| ExtenderError::decode(format!("bad {key} tag '{raw}'")))
}

fn add(a: &str, b: &str) -> Result<String, ExtenderError> {
    parse_amount(a)?
        .checked_add(parse_amount(b)?)
        .map(|v| v.to_string())
        .ok_or_else(|| ExtenderError::decode("pool volume overflow"))
}

fn sub(a: &str, b: &str) -> Result<String, ExtenderError> {
    parse_amount(a)?
        .checked_sub(parse_amount(b)?)
        .map(|v| v.to_string())
        .ok_or_else(|| ExtenderError::decode(format!("pool volume underflow: {a} - {b}")))
}

/// Move `value_in` of `coin_in` into the pool and `value_out` of the other
/// coin out of it.
fn shift(pool: &mut LiquidityPool, coin_in: u64, value_in: &str, value_out: &str) -> Result<(), ExtenderError> {
    if coin_in == pool.coin0_id {
        pool.volume0 = add(&pool.volume0, value_in)?;
        pool.volume1 = sub(&pool.volume1, value_out)?;
    } else if coin_in == pool.coin1_id {
        pool.volume1 = add(&pool.volume1, value_in)?;
        pool.volume0 = sub(&pool.volume0, value_out)?;
    } else {
        return Err(ExtenderError::decode(format!("coin {coin_in} is not in pool {}", pool.id)));
    }
    Ok(())
}

/// Pool and order rows changed by one block.
#[derive(Debug, Default)]
pub struct PoolChanges {
    pub pools: Vec<LiquidityPool>,
    pub orders: Vec<Order>,
}

/// Applies pool and order changes of a block.
pub struct PoolBook {
    store: Arc<dyn Store>,
    strict_resolution: bool,
}

impl PoolBook {
    pub fn new(store: Arc<dyn Store>, strict_resolution: bool) -> Self {
        Self {
            store,
            strict_resolution,
        }
    }

    /// Apply every pool/order transaction of `block` in order on top of the
    /// stored rows. A transaction whose tags cannot be interpreted is skipped
    /// as a whole. Nothing is written; the caller commits the rows with the
    /// block.
    pub async fn apply(&self, block: &NodeBlock, resolvers: &Resolvers) -> Result<PoolChanges, ExtenderError> {
        let mut book = Book {
            store: self.store.as_ref(),
            pools: BTreeMap::new(),
            orders: BTreeMap::new(),
        };

        for tx in block.valid_transactions() {
            let before = (book.pools.clone(), book.orders.clone());
            match apply_tx(&mut book, block.height, tx, resolvers).await {
                Ok(()) => {}
                Err(e) if e.class_with(self.strict_resolution) == ErrorClass::Skip => {
                    warn!(height = block.height, hash = %tx.hash, error = %e, "pool update skipped");
                    (book.pools, book.orders) = before;
                }
                Err(e) => return Err(e),
            }
        }

        let changes = PoolChanges {
            pools: book.pools.into_values().collect(),
            orders: book.orders.into_values().collect(),
        };
        if !changes.pools.is_empty() || !changes.orders.is_empty() {
            debug!(
                height = block.height,
                pools = changes.pools.len(),
                orders = changes.orders.len(),
                "pools updated"
            );
        }
        Ok(changes)
    }
}

async fn apply_tx(
    book: &mut Book<'_>,
    height: u64,
    tx: &NodeTransaction,
    resolvers: &Resolvers,
) -> Result<(), ExtenderError> {
    match &tx.data {
        TxData::CreateSwapPool(d) => {
            let id = tag_u64(tx, "tx.pool_id")?;
            book.pools.insert(
                id,
                LiquidityPool {
                    id,
                    coin0_id: d.coin0.id,
                    coin1_id: d.coin1.id,
                    volume0: d.volume0.clone(),
                    volume1: d.volume1.clone(),
                    liquidity: tag(tx, "tx.liquidity")?.to_string(),
                    updated_at_block_id: height,
                },
            );
        }
        TxData::AddLiquidity(d) => {
            let volume1 = tag(tx, "tx.volume1")?.to_string();
            let minted = tag(tx, "tx.liquidity")?.to_string();
            let pool = book.pool(tag_u64(tx, "tx.pool_id")?).await?;
            let (v0, v1) = if d.coin0.id == pool.coin0_id {
                (d.volume0.as_str(), volume1.as_str())
            } else {
                (volume1.as_str(), d.volume0.as_str())
            };
            pool.volume0 = add(&pool.volume0, v0)?;
            pool.volume1 = add(&pool.volume1, v1)?;
            pool.liquidity = add(&pool.liquidity, &minted)?;
            pool.updated_at_block_id = height;
        }
        TxData::RemoveLiquidity(d) => {
            let volume0 = tag(tx, "tx.volume0")?.to_string();
            let volume1 = tag(tx, "tx.volume1")?.to_string();
            let pool = book.pool(tag_u64(tx, "tx.pool_id")?).await?;
            let (v0, v1) = if d.coin0.id == pool.coin0_id {
                (volume0.as_str(), volume1.as_str())
            } else {
                (volume1.as_str(), volume0.as_str())
            };
            pool.volume0 = sub(&pool.volume0, v0)?;
            pool.volume1 = sub(&pool.volume1, v1)?;
            pool.liquidity = sub(&pool.liquidity, &d.liquidity)?;
            pool.updated_at_block_id = height;
        }
        TxData::SellSwapPool(_) | TxData::BuySwapPool(_) | TxData::SellAllSwapPool(_) => {
            let legs: Vec<PoolLeg> = serde_json::from_str(tag(tx, "tx.pools")?)?;
            for leg in legs {
                let pool = book.pool(leg.pool_id).await?;
                shift(pool, leg.coin_in, &leg.value_in, &leg.value_out)?;
                pool.updated_at_block_id = height;
                for fill in &leg.orders {
                    fill_order(book.order(fill.id).await?, fill)?;
                }
            }
        }
        TxData::AddLimitOrder(d) => {
            let id = tag_u64(tx, "tx.order_id")?;
            let pool_id = tag_u64(tx, "tx.pool_id")?;
            let address_id = resolvers.addresses.resolve(&tx.from).await?;
            book.orders.insert(
                id,
                Order {
                    id,
                    address_id,
                    pool_id,
                    coin_sell_id: d.coin_to_sell.id,
                    coin_sell_volume: d.value_to_sell.clone(),
                    coin_buy_id: d.coin_to_buy.id,
                    coin_buy_volume: d.value_to_buy.clone(),
                    created_at_block_id: height,
                    status: OrderStatus::New,
                },
            );
        }
        TxData::RemoveLimitOrder(d) => {
            let order = book.order(d.id).await?;
            if order.status.can_transition_to(OrderStatus::Canceled) {
                order.status = OrderStatus::Canceled;
            } else {
                warn!(order_id = d.id, status = order.status.as_str(), "cancel of a closed order ignored");
            }
        }
        _ => {}
    }
    Ok(())
}

fn fill_order(order: &mut Order, fill: &OrderFill) -> Result<(), ExtenderError> {
    let remaining_sell = parse_amount(&order.coin_sell_volume)?.saturating_sub(parse_amount(&fill.sold)?);
    let remaining_buy = parse_amount(&order.coin_buy_volume)?.saturating_sub(parse_amount(&fill.bought)?);
    let next = if remaining_sell == 0 {
        OrderStatus::Filled
    } else {
        OrderStatus::PartiallyFilled
    };
    if !order.status.can_transition_to(next) {
        return Err(ExtenderError::decode(format!(
            "order {} cannot move from {} to {}",
            order.id,
            order.status.as_str(),
            next.as_str()
        )));
    }
    order.coin_sell_volume = remaining_sell.to_string();
    order.coin_buy_volume = remaining_buy.to_string();
    order.status = next;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> LiquidityPool {
        LiquidityPool {
            id: 1,
            coin0_id: 0,
            coin1_id: 5,
            volume0: "1000".into(),
            volume1: "2000".into(),
            liquidity: "100".into(),
            updated_at_block_id: 1,
        }
    }

    #[test]
    fn shift_moves_volumes_by_direction() {
        let mut p = pool();
        shift(&mut p, 0, "10", "19").unwrap();
        assert_eq!((p.volume0.as_str(), p.volume1.as_str()), ("1010", "1981"));
        shift(&mut p, 5, "19", "10").unwrap();
        assert_eq!((p.volume0.as_str(), p.volume1.as_str()), ("1000", "2000"));
        assert!(shift(&mut p, 7, "1", "1").is_err());
    }

    #[test]
    fn shift_rejects_underflow() {
        let mut p = pool();
        let err = shift(&mut p, 0, "1", "5000").unwrap_err();
        assert!(matches!(err, ExtenderError::Decode(_)));
    }

    #[test]
    fn fills_move_order_to_filled() {
        let mut order = Order {
            id: 3,
            address_id: 1,
            pool_id: 1,
            coin_sell_id: 0,
            coin_sell_volume: "100".into(),
            coin_buy_id: 5,
            coin_buy_volume: "200".into(),
            created_at_block_id: 1,
            status: OrderStatus::Active,
        };
        let part = OrderFill {
            id: 3,
            sold: "40".into(),
            bought: "80".into(),
        };
        fill_order(&mut order, &part).unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.coin_sell_volume, "60");

        let rest = OrderFill {
            id: 3,
            sold: "60".into(),
            bought: "120".into(),
        };
        fill_order(&mut order, &rest).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert!(fill_order(&mut order, &rest).is_err());
    }

    #[test]
    fn pool_legs_parse_from_tag() {
        let legs: Vec<PoolLeg> = serde_json::from_str(
            r#"[{"pool_id":"1","coin_in":"0","value_in":"10","coin_out":"5","value_out":"19",
                 "orders":[{"id":"3","sold":"4","bought":"2"}]}]"#,
        )
        .unwrap();
        assert_eq!(legs[0].pool_id, 1);
        assert_eq!(legs[0].orders[0].id, 3);
    }
}
