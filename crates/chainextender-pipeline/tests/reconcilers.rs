//! Work the detached streams do after the loop moves on: validator and stake
//! refreshes, liquidations, order expiry and slashes.
//!
//! Each height runs in its own extender so the streams of one height are
//! drained before the next one starts.

mod common;

use std::sync::Arc;

use chainextender_core::event::NodeEvent;
use chainextender_core::model::OrderStatus;
use chainextender_core::tx::*;
use chainextender_core::types::{BalanceEntry, Candidate, CandidateStake, CoinRef};
use chainextender_pipeline::{Extender, ExtenderBuilder};
use chainextender_storage::InMemoryStore;

use common::*;

fn testcoin() -> CoinRef {
    CoinRef::new(1, "TESTCOIN")
}

fn create_testcoin(n: u64, from: &str) -> chainextender_core::NodeTransaction {
    with_tag(
        tx(
            n,
            from,
            TxData::CreateCoin(CreateCoinData {
                name: "Test Coin".into(),
                symbol: "TESTCOIN".into(),
                initial_amount: "1000000".into(),
                initial_reserve: "20000".into(),
                constant_reserve_ratio: 50,
                max_supply: "1000000000".into(),
            }),
        ),
        "tx.coin_id",
        "1",
    )
}

fn candidate(key: char, status: u8, stakes: Vec<CandidateStake>) -> Candidate {
    Candidate {
        public_key: public_key(key),
        reward_address: address('a'),
        owner_address: address('a'),
        control_address: address('a'),
        total_stake: "100".into(),
        commission: 10,
        status,
        stakes: Some(stakes),
    }
}

fn stake(owner: char, value: &str) -> CandidateStake {
    CandidateStake {
        owner: address(owner),
        coin: bip(),
        value: value.into(),
        bip_value: value.into(),
    }
}

/// Process exactly `height` with a fresh extender and drain its streams.
async fn run_height(node: &Arc<ScriptedNode>, store: &Arc<InMemoryStore>, height: u64) -> Extender {
    let mut extender = ExtenderBuilder::new()
        .node(node.clone())
        .store(store.clone())
        .stake_refresh_interval(1)
        .block_retry_delay_ms(10)
        .build()
        .await
        .unwrap();
    assert_eq!(extender.next_height(), height);
    extender.run_until(height).await.unwrap();
    extender.shutdown().await.unwrap();
    extender
}

#[tokio::test]
async fn stake_refresh_replaces_the_snapshot() {
    let node = Arc::new(
        ScriptedNode::default()
            .with_block(block(1, &public_key('1'), vec![]))
            .with_block(block(2, &public_key('1'), vec![]))
            .with_candidates_at(
                1,
                vec![
                    candidate('1', 2, vec![stake('a', "10"), stake('b', "3")]),
                    candidate('2', 1, vec![stake('c', "4")]),
                ],
            )
            .with_candidates_at(2, vec![candidate('1', 2, vec![stake('a', "5")])]),
    );
    let store = Arc::new(InMemoryStore::new());

    run_height(&node, &store, 1).await;
    let statuses: Vec<Option<u8>> = store.validators().iter().map(|v| v.status).collect();
    assert_eq!(statuses, vec![Some(2), Some(1)]);
    assert_eq!(store.stakes().len(), 3);

    run_height(&node, &store, 2).await;
    // The second validator left the candidate list.
    let statuses: Vec<Option<u8>> = store.validators().iter().map(|v| v.status).collect();
    assert_eq!(statuses, vec![Some(2), None]);
    let stakes = store.stakes();
    let values: Vec<&str> = stakes.iter().map(|s| s.value.as_str()).collect();
    assert_eq!(values, vec!["5"]);
    assert_eq!(stakes[0].validator_id, 1);
}

#[tokio::test]
async fn liquidation_removes_the_coin_and_its_balances() {
    let a = address('a');
    let node = Arc::new(
        ScriptedNode::default()
            .with_block(block(1, &public_key('1'), vec![create_testcoin(1, &a)]))
            .with_block(block(2, &public_key('1'), vec![]))
            .with_events(2, vec![NodeEvent::CoinLiquidation { coin: 1 }])
            .with_balances(
                &a,
                vec![
                    BalanceEntry {
                        coin: bip(),
                        value: "500".into(),
                    },
                    BalanceEntry {
                        coin: testcoin(),
                        value: "7".into(),
                    },
                ],
            ),
    );
    let store = Arc::new(InMemoryStore::new());

    run_height(&node, &store, 1).await;
    assert!(store.balances().iter().any(|b| b.coin_id == 1));

    let second = run_height(&node, &store, 2).await;
    assert!(store.coins().iter().all(|c| c.symbol != "TESTCOIN"));
    assert!(store.balances().iter().all(|b| b.coin_id != 1));
    assert!(store.balances().iter().any(|b| b.coin_id == 0));
    assert!(second.shared().resolvers.coins.resolve("TESTCOIN").await.is_err());
}

#[tokio::test]
async fn orders_activate_with_their_block_and_expire_once() {
    let a = address('a');
    let order = |n: u64, id: &str| {
        with_tag(
            with_tag(
                tx(
                    n,
                    &a,
                    TxData::AddLimitOrder(AddLimitOrderData {
                        coin_to_sell: bip(),
                        value_to_sell: "10".into(),
                        coin_to_buy: testcoin(),
                        value_to_buy: "5".into(),
                    }),
                ),
                "tx.order_id",
                id,
            ),
            "tx.pool_id",
            "1",
        )
    };
    let pool = with_tag(
        with_tag(
            tx(
                2,
                &a,
                TxData::CreateSwapPool(CreateSwapPoolData {
                    coin0: bip(),
                    coin1: testcoin(),
                    volume0: "100".into(),
                    volume1: "50".into(),
                }),
            ),
            "tx.pool_id",
            "1",
        ),
        "tx.liquidity",
        "70",
    );
    let cancel = tx(5, &a, TxData::RemoveLimitOrder(RemoveLimitOrderData { id: 8 }));
    let expiry = |id| NodeEvent::OrderExpired {
        id,
        address: a.clone(),
        coin: 0,
        amount: "10".into(),
    };
    let node = Arc::new(
        ScriptedNode::default()
            .with_block(block(
                1,
                &public_key('1'),
                vec![create_testcoin(1, &a), pool, order(3, "7"), order(4, "8"), cancel],
            ))
            .with_block(block(2, &public_key('1'), vec![]))
            .with_events(2, vec![expiry(7), expiry(8)]),
    );
    let store = Arc::new(InMemoryStore::new());

    run_height(&node, &store, 1).await;
    let pools = store.pools();
    assert_eq!(pools.len(), 1);
    assert_eq!(
        (pools[0].volume0.as_str(), pools[0].volume1.as_str(), pools[0].liquidity.as_str()),
        ("100", "50", "70")
    );
    let statuses: Vec<(u64, OrderStatus)> = store.orders().iter().map(|o| (o.id, o.status)).collect();
    assert_eq!(statuses, vec![(7, OrderStatus::Active), (8, OrderStatus::Canceled)]);

    run_height(&node, &store, 2).await;
    let statuses: Vec<(u64, OrderStatus)> = store.orders().iter().map(|o| (o.id, o.status)).collect();
    assert_eq!(statuses, vec![(7, OrderStatus::Expired), (8, OrderStatus::Canceled)]);
    // Pools are untouched by expiry.
    assert_eq!(store.pools(), pools);
}

#[tokio::test]
async fn slash_in_an_unknown_coin_is_skipped() {
    let b = address('b');
    let slash = |coin| NodeEvent::Slash {
        address: b.clone(),
        amount: "5".into(),
        coin,
        validator_pub_key: public_key('1'),
    };
    let node = Arc::new(
        ScriptedNode::default()
            .with_block(block(1, &public_key('1'), vec![]))
            .with_events(1, vec![slash(42), slash(0)]),
    );
    let store = Arc::new(InMemoryStore::new());

    run_height(&node, &store, 1).await;
    let slashes = store.slashes();
    assert_eq!(slashes.len(), 1);
    assert_eq!(slashes[0].coin_id, 0);
}
