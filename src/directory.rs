//! `Directory`: demultiplexes commands, matcher events and balance-change
//! notifications to the right [`crate::account::AccountHandle`],
//! spawning one lazily on first contact. Grounded on the teacher's
//! `websocket::connection::ConnectionManager`: a `DashMap` keyed registry
//! for lock-free concurrent access, one entry per key.

use crate::account::{self, AccountHandle};
use crate::balance_map::AssetMap;
use crate::chain::ChainClient;
use crate::config::MatcherConfig;
use crate::core_types::Address;
use crate::models::AcceptedOrder;
use crate::orderdb::OrderDb;
use crate::oracle::BalanceOracleHandle;
use crate::store::StoreSink;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct Directory {
    accounts: DashMap<Address, AccountHandle>,
    chain: Arc<dyn ChainClient>,
    oracle: BalanceOracleHandle,
    store: Arc<dyn StoreSink>,
    order_db: Arc<dyn OrderDb>,
    config: MatcherConfig,
    /// Broadcast once history has finished loading; every actor spawned
    /// afterwards starts with scheduling already enabled.
    schedules_started: AtomicBool,
}

impl Directory {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        oracle: BalanceOracleHandle,
        store: Arc<dyn StoreSink>,
        order_db: Arc<dyn OrderDb>,
        config: MatcherConfig,
    ) -> Self {
        Self {
            accounts: DashMap::new(),
            chain,
            oracle,
            store,
            order_db,
            config,
            schedules_started: AtomicBool::new(false),
        }
    }

    /// Look up an account's handle, spawning it on first contact.
    ///
    /// Two concurrent first-contacts for the same address would otherwise
    /// both pass a `get`-miss and each spawn an actor; only one handle may
    /// ever own that address's state, so the spawn-or-fetch is folded into
    /// a single `DashMap::entry` critical section.
    pub fn account(&self, owner: Address) -> AccountHandle {
        let mut spawned = false;
        let handle = self
            .accounts
            .entry(owner)
            .or_insert_with(|| {
                spawned = true;
                account::spawn(
                    owner,
                    self.chain.clone(),
                    self.oracle.clone(),
                    self.store.clone(),
                    self.order_db.clone(),
                    self.config.clone(),
                )
            })
            .clone();
        if spawned && self.schedules_started.load(Ordering::SeqCst) {
            let handle_for_start = handle.clone();
            tokio::spawn(async move { handle_for_start.start_schedules().await });
        }
        handle
    }

    /// Forward a matching-engine `OrderAdded` event, routed by
    /// `submitted.order.sender`.
    pub async fn dispatch_order_added(&self, submitted: AcceptedOrder) {
        let owner = submitted.order.sender;
        self.account(owner).notify_order_added(submitted).await;
    }

    pub async fn dispatch_order_executed(&self, remaining: AcceptedOrder) {
        let owner = remaining.order.sender;
        self.account(owner).notify_order_executed(remaining).await;
    }

    pub async fn dispatch_order_canceled(&self, order: AcceptedOrder, is_system_cancel: bool) {
        let owner = order.order.sender;
        self.account(owner).notify_order_canceled(order, is_system_cancel).await;
    }

    /// Fan a balance change out to every *already spawned* account —
    /// addresses with no actor yet have no reservations to invalidate.
    pub async fn dispatch_balance_changed(&self, owner: Address, new_balance: AssetMap) {
        if let Some(handle) = self.accounts.get(&owner).map(|h| h.clone()) {
            handle.cancel_not_enough_coins_orders(new_balance).await;
        }
    }

    /// Broadcast `StartSchedules` to every spawned account and flip the
    /// flag so accounts spawned afterwards start with scheduling already on.
    pub async fn start_schedules(&self) {
        self.schedules_started.store(true, Ordering::SeqCst);
        let handles: Vec<AccountHandle> = self.accounts.iter().map(|e| e.value().clone()).collect();
        for handle in handles {
            handle.start_schedules().await;
        }
    }

    pub fn spawned_count(&self) -> usize {
        self.accounts.len()
    }
}
