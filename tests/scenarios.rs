//! End-to-end account-actor scenarios.
//!
//! Since the order book / matching engine is an external collaborator,
//! these tests play the engine's part by hand: after a placement's store
//! event appears, the test reconstructs the `AcceptedOrder` the engine
//! would echo back and feeds it in via `notify_order_added`, exactly as
//! the directory would in production.

use matcher_account_core::account::{self, AccountHandle};
use matcher_account_core::account::messages::{CancelReply, PlacementReply};
use matcher_account_core::chain::mock::InMemoryChainClient;
use matcher_account_core::orderdb::mock::InMemoryOrderDb;
use matcher_account_core::store::mock::InMemoryStoreSink;
use matcher_account_core::store::QueueEvent;
use matcher_account_core::{
    AcceptedOrder, Address, Asset, FillState, MatcherConfig, Order, OrderId, Pair, Side,
};
use std::sync::Arc;
use std::time::Duration;

fn waves() -> Asset {
    Asset::Native
}

fn usd() -> Asset {
    Asset::issued_from_u64(1)
}

fn pair() -> Pair {
    Pair::new(waves(), usd())
}

struct Harness {
    handle: AccountHandle,
    chain: Arc<InMemoryChainClient>,
    store: Arc<InMemoryStoreSink>,
    _order_db: Arc<InMemoryOrderDb>,
}

fn spawn_harness(owner: Address, config: MatcherConfig) -> Harness {
    let chain = Arc::new(InMemoryChainClient::new());
    let store = Arc::new(InMemoryStoreSink::new());
    let order_db = Arc::new(InMemoryOrderDb::new());
    let oracle = matcher_account_core::oracle::spawn(chain.clone(), 32);
    let handle = account::spawn(owner, chain.clone(), oracle, store.clone(), order_db.clone(), config);
    Harness { handle, chain, store, _order_db: order_db }
}

async fn wait_until<F: Fn() -> bool>(f: F) {
    for _ in 0..200 {
        if f() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

fn limit_buy(id: u64, owner: Address, price: u64, amount: u64, fee: u64) -> Order {
    Order {
        id: OrderId::from_u64(id),
        sender: owner,
        pair: pair(),
        side: Side::Buy,
        price,
        amount,
        matcher_fee: fee,
        fee_asset: waves(),
        timestamp: id as i64,
        expiration: id as i64 + 60_000,
    }
}

/// The echo the matching engine would send back once it has accepted the
/// order shell; for a limit order under sufficient balance, reservable ==
/// required.
fn accept_echo(order: Order) -> AcceptedOrder {
    let required = matcher_account_core::account::validation::required_balance(&order);
    AcceptedOrder {
        order,
        fill: FillState::default(),
        is_market: false,
        reservable_balance: required.clone(),
        required_balance: required,
    }
}

#[tokio::test]
async fn placement_happy_path_then_cancel() {
    let owner = Address::from_u64(1);
    let h = spawn_harness(owner, MatcherConfig::default());
    h.chain.set_balance(owner, [(waves(), 10u64), (usd(), 300u64)].into_iter().collect());

    let order = limit_buy(1, owner, 300, 1, 1);
    let id = order.id;
    let handle = h.handle.clone();
    let placing = tokio::spawn(async move { handle.place_order(order.clone(), false).await });

    wait_until(|| h.store.len() >= 1).await;
    {
        let events = h.store.events.lock().unwrap();
        assert!(matches!(events.last(), Some(QueueEvent::Placed(o)) if o.id == id));
    }

    let order_for_echo = limit_buy(1, owner, 300, 1, 1);
    h.handle.notify_order_added(accept_echo(order_for_echo)).await;

    let reply = placing.await.unwrap();
    assert_eq!(reply, PlacementReply::Accepted(id));

    let reserved = h.handle.get_reserved_balance().await;
    assert_eq!(reserved.get(&waves()), Some(&1));
    assert_eq!(reserved.get(&usd()), Some(&300));

    let handle = h.handle.clone();
    let canceling = tokio::spawn(async move { handle.cancel_order(id).await });
    wait_until(|| matches!(h.store.events.lock().unwrap().last(), Some(QueueEvent::Canceled { id: cid, .. }) if *cid == id))
        .await;

    let echoed = accept_echo(limit_buy(1, owner, 300, 1, 1));
    h.handle.notify_order_canceled(echoed, false).await;

    let cancel_reply = canceling.await.unwrap();
    assert_eq!(cancel_reply, CancelReply::Canceled(id));

    let reserved_after = h.handle.get_reserved_balance().await;
    assert!(reserved_after.is_empty());
}

#[tokio::test]
async fn queued_placements_each_get_exactly_one_reply() {
    let owner = Address::from_u64(2);
    let h = spawn_harness(owner, MatcherConfig::default());
    h.chain.set_balance(owner, [(waves(), 10u64), (usd(), 1_000u64)].into_iter().collect());

    let order1 = limit_buy(1, owner, 100, 1, 1);
    let order2 = limit_buy(2, owner, 100, 1, 1);
    let id1 = order1.id;
    let id2 = order2.id;

    let handle1 = h.handle.clone();
    let handle2 = h.handle.clone();
    let p1 = tokio::spawn(async move { handle1.place_order(order1, false).await });
    let p2 = tokio::spawn(async move { handle2.place_order(order2, false).await });

    wait_until(|| h.store.len() >= 1).await;
    h.handle.notify_order_added(accept_echo(limit_buy(1, owner, 100, 1, 1))).await;
    wait_until(|| h.store.len() >= 2).await;
    h.handle.notify_order_added(accept_echo(limit_buy(2, owner, 100, 1, 1))).await;

    let r1 = p1.await.unwrap();
    let r2 = p2.await.unwrap();
    assert_eq!(r1, PlacementReply::Accepted(id1));
    assert_eq!(r2, PlacementReply::Accepted(id2));
}

#[tokio::test]
async fn forced_cancellation_on_balance_drop() {
    let owner = Address::from_u64(3);
    let h = spawn_harness(owner, MatcherConfig::default());
    h.chain.set_balance(owner, [(usd(), 50u64), (waves(), 10u64)].into_iter().collect());

    let order = limit_buy(1, owner, 50, 1, 0);
    let id = order.id;
    let handle = h.handle.clone();
    let placing = tokio::spawn(async move { handle.place_order(order, false).await });
    wait_until(|| h.store.len() >= 1).await;
    h.handle.notify_order_added(accept_echo(limit_buy(1, owner, 50, 1, 0))).await;
    assert_eq!(placing.await.unwrap(), PlacementReply::Accepted(id));

    let new_balance: matcher_account_core::AssetMap = [(usd(), 20u64)].into_iter().collect();
    h.handle.cancel_not_enough_coins_orders(new_balance).await;

    wait_until(|| matches!(h.store.events.lock().unwrap().last(), Some(QueueEvent::Canceled { id: cid, .. }) if *cid == id))
        .await;
}

#[tokio::test]
async fn two_orders_only_newest_cancelled() {
    let owner = Address::from_u64(4);
    let h = spawn_harness(owner, MatcherConfig::default());
    h.chain.set_balance(owner, [(usd(), 100u64), (waves(), 10u64)].into_iter().collect());

    let order_a = limit_buy(1, owner, 30, 1, 0); // older: timestamp 1
    let order_b = limit_buy(2, owner, 30, 1, 0); // newer: timestamp 2
    let id_a = order_a.id;
    let id_b = order_b.id;

    let ha = h.handle.clone();
    let pa = tokio::spawn(async move { ha.place_order(order_a, false).await });
    wait_until(|| h.store.len() >= 1).await;
    h.handle.notify_order_added(accept_echo(limit_buy(1, owner, 30, 1, 0))).await;
    assert_eq!(pa.await.unwrap(), PlacementReply::Accepted(id_a));

    let hb = h.handle.clone();
    let pb = tokio::spawn(async move { hb.place_order(order_b, false).await });
    wait_until(|| h.store.len() >= 2).await;
    h.handle.notify_order_added(accept_echo(limit_buy(2, owner, 30, 1, 0))).await;
    assert_eq!(pb.await.unwrap(), PlacementReply::Accepted(id_b));

    let new_balance: matcher_account_core::AssetMap = [(usd(), 40u64)].into_iter().collect();
    h.handle.cancel_not_enough_coins_orders(new_balance).await;

    wait_until(|| matches!(h.store.events.lock().unwrap().last(), Some(QueueEvent::Canceled { id, .. }) if *id == id_b))
        .await;
    // A must not have been cancelled.
    let events = h.store.events.lock().unwrap();
    assert!(!events.iter().any(|e| matches!(e, QueueEvent::Canceled { id, .. } if *id == id_a)));
}

#[tokio::test]
async fn expiry_emits_cancel_without_a_waiting_client() {
    let owner = Address::from_u64(5);
    let mut config = MatcherConfig::default();
    config.expiration_threshold_ms = 50;
    let h = spawn_harness(owner, config);
    h.chain.set_balance(owner, [(usd(), 300u64), (waves(), 10u64)].into_iter().collect());

    let now = chrono::Utc::now().timestamp_millis();
    let mut order = limit_buy(1, owner, 300, 1, 1);
    order.expiration = now + 200;
    let id = order.id;

    let handle = h.handle.clone();
    let placing = tokio::spawn(async move { handle.place_order(order.clone(), false).await });
    wait_until(|| h.store.len() >= 1).await;

    let mut echoed_order = limit_buy(1, owner, 300, 1, 1);
    echoed_order.expiration = now + 200;
    h.handle.notify_order_added(accept_echo(echoed_order)).await;
    assert_eq!(placing.await.unwrap(), PlacementReply::Accepted(id));

    h.handle.start_schedules().await;

    tokio::time::sleep(Duration::from_millis(250)).await;
    wait_until(|| matches!(h.store.events.lock().unwrap().last(), Some(QueueEvent::Canceled { id: cid, .. }) if *cid == id))
        .await;
}
