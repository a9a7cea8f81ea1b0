//! One block through the whole pipeline, against the in-memory store.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chainextender_core::event::{NodeEvent, RewardRole};
use chainextender_core::identity::normalize_address;
use chainextender_core::tx::*;
use chainextender_core::types::{BalanceEntry, Candidate, CoinInfo, CoinRef};
use chainextender_core::ExtenderError;
use chainextender_pipeline::{supervise_until, ExtenderBuilder};
use chainextender_storage::InMemoryStore;

use common::*;

fn testcoin() -> CoinRef {
    CoinRef::new(1, "TESTCOIN")
}

/// Height 1: one transaction of each of the fourteen basic kinds plus a
/// rejected send.
fn genesis_block() -> chainextender_core::NodeBlock {
    let (a, b, c, d) = (address('a'), address('b'), address('c'), address('d'));
    let pk = public_key('1');
    let send = |to: &str, value: &str| SendData {
        coin: bip(),
        to: to.to_string(),
        value: value.to_string(),
    };

    let mut rejected = tx(15, &b, TxData::Send(send(&c, "999")));
    rejected.code = 107;
    rejected.log = "insufficient funds".into();

    let txs = vec![
        tx(1, &a, TxData::Send(send(&b, "10"))),
        tx(
            2,
            &a,
            TxData::SellCoin(SellCoinData {
                coin_to_sell: bip(),
                value_to_sell: "5".into(),
                coin_to_buy: testcoin(),
                minimum_value_to_buy: "1".into(),
            }),
        ),
        tx(
            3,
            &a,
            TxData::BuyCoin(BuyCoinData {
                coin_to_buy: testcoin(),
                value_to_buy: "2".into(),
                coin_to_sell: bip(),
                maximum_value_to_sell: "50".into(),
            }),
        ),
        tx(
            4,
            &a,
            TxData::SellAllCoin(SellAllCoinData {
                coin_to_sell: testcoin(),
                coin_to_buy: bip(),
                minimum_value_to_buy: "1".into(),
            }),
        ),
        with_tag(
            tx(
                5,
                &a,
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
        ),
        tx(
            6,
            &a,
            TxData::DeclareCandidacy(DeclareCandidacyData {
                address: a.clone(),
                pub_key: pk.clone(),
                commission: 10,
                coin: bip(),
                stake: "100".into(),
            }),
        ),
        tx(
            7,
            &a,
            TxData::Delegate(StakeData {
                pub_key: pk.clone(),
                coin: bip(),
                value: "40".into(),
            }),
        ),
        tx(
            8,
            &a,
            TxData::Unbond(StakeData {
                pub_key: pk.clone(),
                coin: bip(),
                value: "20".into(),
            }),
        ),
        tx(
            9,
            &a,
            TxData::RedeemCheck(RedeemCheckData {
                raw_check: "f8ae".into(),
                proof: "0a1b".into(),
                check: Some(CheckData {
                    sender: c.clone(),
                    coin: bip(),
                    value: "3".into(),
                    due_block: 100,
                }),
            }),
        ),
        tx(10, &a, TxData::SetCandidateOnline(CandidateKeyData { pub_key: pk.clone() })),
        tx(11, &a, TxData::SetCandidateOffline(CandidateKeyData { pub_key: pk.clone() })),
        with_tag(
            tx(
                12,
                &a,
                TxData::CreateMultisig(MultisigData {
                    threshold: 2,
                    weights: vec!["1".into(), "1".into()],
                    addresses: vec![a.clone(), b.clone()],
                }),
            ),
            "tx.created_multisig",
            &d,
        ),
        tx(
            13,
            &a,
            TxData::Multisend(MultisendData {
                list: vec![send(&b, "1"), send(&c, "2")],
            }),
        ),
        tx(
            14,
            &a,
            TxData::EditCandidate(EditCandidateData {
                pub_key: pk.clone(),
                reward_address: a.clone(),
                owner_address: a.clone(),
                control_address: b.clone(),
            }),
        ),
        rejected,
    ];
    block(1, &pk, txs)
}

fn scripted_node() -> ScriptedNode {
    let (a, b) = (address('a'), address('b'));
    let pk = public_key('1');
    ScriptedNode::default()
        .with_block(genesis_block())
        .with_events(
            1,
            vec![
                NodeEvent::Reward {
                    role: RewardRole::Validator,
                    address: a.clone(),
                    amount: "700".into(),
                    validator_pub_key: pk.clone(),
                    for_coin: None,
                },
                NodeEvent::Reward {
                    role: RewardRole::Dao,
                    address: b.clone(),
                    amount: "100".into(),
                    validator_pub_key: pk.clone(),
                    for_coin: None,
                },
                NodeEvent::Slash {
                    address: b.clone(),
                    amount: "5".into(),
                    coin: 0,
                    validator_pub_key: pk.clone(),
                },
            ],
        )
        .with_candidate(Candidate {
            public_key: pk,
            reward_address: a.clone(),
            owner_address: a.clone(),
            control_address: b,
            total_stake: "120".into(),
            commission: 10,
            status: 2,
            stakes: None,
        })
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
        )
        .with_coin(CoinInfo {
            id: 1,
            name: "Test Coin".into(),
            symbol: "TESTCOIN".into(),
            volume: "1000002".into(),
            crr: 50,
            reserve_balance: "20010".into(),
            max_supply: "1000000000".into(),
            owner_address: Some(a),
            mintable: false,
            burnable: false,
        })
}

fn id_of(store: &InMemoryStore, address: &str) -> u64 {
    store
        .address_id(&normalize_address(address).unwrap())
        .unwrap_or_else(|| panic!("{address} not stored"))
}

#[tokio::test]
async fn first_block_lands_in_every_table() {
    let node = Arc::new(scripted_node());
    let store = Arc::new(InMemoryStore::new());

    let mut extender = ExtenderBuilder::new()
        .node(node.clone())
        .store(store.clone())
        .block_retry_delay_ms(10)
        .build()
        .await
        .unwrap();
    assert_eq!(extender.next_height(), 1);
    extender.run_until(1).await.unwrap();
    extender.shutdown().await.unwrap();

    // Block.
    let blocks = store.blocks();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].id, 1);
    assert_eq!(blocks[0].num_txs, 15);
    assert_eq!(blocks[0].block_time, 1_000_000_000);
    assert!(blocks[0].proposer_validator_id.is_some());
    assert_eq!(store.block_validators().len(), 1);

    // Transactions.
    let txs = store.transactions();
    assert_eq!(txs.len(), 14);
    let kinds: BTreeSet<u8> = txs.iter().map(|(_, t)| t.tx_type).collect();
    assert_eq!(kinds, (1..=14).collect::<BTreeSet<u8>>());
    assert_eq!(store.invalid_transactions().len(), 1);
    // send + multisend (2) + redeemed check
    assert_eq!(store.transaction_outputs().len(), 4);
    // declare, delegate, unbond, on, off, edit
    assert_eq!(store.transaction_validators().len(), 6);
    assert!(!store.address_transactions().is_empty());

    // Coins.
    let coins = store.coins();
    let created = coins.iter().find(|c| c.symbol == "TESTCOIN").unwrap();
    assert_eq!(created.id, 1);
    assert_eq!(created.owner_address_id, Some(id_of(&store, &address('a'))));
    assert_eq!(created.reserve, "20010");

    // Validator set.
    let validators = store.validators();
    assert_eq!(validators.len(), 1);
    let v = &validators[0];
    assert_eq!(v.status, Some(2));
    assert_eq!(v.commission, Some(10));
    assert_eq!(v.total_stake.as_deref(), Some("120"));
    assert_eq!(v.control_address_id, Some(id_of(&store, &address('b'))));

    // Events.
    let rewards = store.rewards();
    assert_eq!(rewards.len(), 2);
    assert!(rewards.iter().all(|r| r.block_id == 1));
    let slashes = store.slashes();
    assert_eq!(slashes.len(), 1);
    assert_eq!(slashes[0].block_id, 1);

    // Balances: one row per (address, coin) of every touched address.
    let touched = ['a', 'b', 'c', 'd'];
    let expected: usize = touched.iter().map(|&c| node.snapshot(&address(c)).len()).sum();
    let balances = store.balances();
    assert_eq!(balances.len(), expected);
    let a_id = id_of(&store, &address('a'));
    assert!(balances.iter().any(|b| b.address_id == a_id && b.coin_id == 1 && b.value == "7"));
}

#[tokio::test]
async fn restart_resumes_after_the_last_stored_block() {
    let node = Arc::new(scripted_node());
    let store = Arc::new(InMemoryStore::new());

    let mut first = ExtenderBuilder::new()
        .node(node.clone())
        .store(store.clone())
        .build()
        .await
        .unwrap();
    first.run_until(1).await.unwrap();
    first.shutdown().await.unwrap();

    let mut second = ExtenderBuilder::new()
        .node(node)
        .store(store.clone())
        .build()
        .await
        .unwrap();
    assert_eq!(second.next_height(), 2);
    assert_eq!(second.last_block().map(|b| b.id), Some(1));
    // The registry continues after the coin created at height 1.
    assert_eq!(store.coins().iter().map(|c| c.id).max(), Some(1));
    second.shutdown().await.unwrap();
}

#[tokio::test]
async fn supervisor_waits_for_the_next_block_then_stops_cleanly() {
    let node = Arc::new(scripted_node());
    let store = Arc::new(InMemoryStore::new());
    let extender = ExtenderBuilder::new()
        .node(node)
        .store(store.clone())
        .block_retry_delay_ms(10)
        .build()
        .await
        .unwrap();

    supervise_until(extender, tokio::time::sleep(Duration::from_millis(500)))
        .await
        .unwrap();
    assert_eq!(store.blocks().len(), 1);
    assert_eq!(store.transactions().len(), 14);
}

#[tokio::test]
async fn mismatched_coin_id_stops_the_loop() {
    let a = address('a');
    let bad = with_tag(
        tx(
            1,
            &a,
            TxData::CreateCoin(CreateCoinData {
                name: "Other".into(),
                symbol: "OTHER".into(),
                initial_amount: "1".into(),
                initial_reserve: "1".into(),
                constant_reserve_ratio: 10,
                max_supply: "10".into(),
            }),
        ),
        "tx.coin_id",
        "9",
    );
    let node = ScriptedNode::default().with_block(block(1, &public_key('1'), vec![bad]));
    let store = Arc::new(InMemoryStore::new());
    let mut extender = ExtenderBuilder::new()
        .node(Arc::new(node))
        .store(store.clone())
        .build()
        .await
        .unwrap();

    let err = extender.run_until(1).await.unwrap_err();
    assert!(matches!(
        err,
        ExtenderError::CoinSequence {
            expected: 1,
            reported: 9
        }
    ));
    extender.shutdown().await.unwrap();
    assert!(store.blocks().is_empty());
}
