//! `AccountActor`: the mailbox loop owning one account's entire state.
//! Grounded on the teacher's `transfer::channel` mpsc+oneshot
//! request/response shape and its `process_transfer_requests` dispatch loop,
//! generalized from a single request/response pair to the full message
//! enum a trading account needs to handle.

use crate::account::messages::{
    AccountMessage, BatchCancelCompleted, CancelReply, PendingCommand, PendingKind, PlacementReply,
};
use crate::account::state::AccountState;
use crate::account::validation::{ValidationContext, required_balance, validate_order};
use crate::account::ws::{OrderSummary, WsPush, WsSnapshot, WsSubscriber};
use crate::balance_map::{self, AssetMap};
use crate::chain::ChainClient;
use crate::config::MatcherConfig;
use crate::core_types::{Address, Asset, OrderId, Pair};
use crate::error::MatcherError;
use crate::models::{AcceptedOrder, Order, OrderStatus};
use crate::orderdb::OrderDb;
use crate::oracle::BalanceOracleHandle;
use crate::store::{QueueEvent, StoreOutcome, StoreSink};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct AccountHandle {
    tx: mpsc::Sender<AccountMessage>,
}

impl AccountHandle {
    pub async fn place_order(&self, order: Order, is_market: bool) -> PlacementReply {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(AccountMessage::PlaceOrder { order, is_market, reply })
            .await
            .is_err()
        {
            return PlacementReply::Rejected(MatcherError::UnexpectedError("account actor gone".into()));
        }
        rx.await
            .unwrap_or_else(|_| PlacementReply::Rejected(MatcherError::UnexpectedError("no reply".into())))
    }

    pub async fn cancel_order(&self, id: OrderId) -> CancelReply {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(AccountMessage::CancelOrder { id, reply }).await.is_err() {
            return CancelReply::Rejected(MatcherError::UnexpectedError("account actor gone".into()));
        }
        rx.await
            .unwrap_or_else(|_| CancelReply::Rejected(MatcherError::UnexpectedError("no reply".into())))
    }

    pub async fn cancel_all_orders(&self, pair: Option<Pair>) -> BatchCancelCompleted {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(AccountMessage::CancelAllOrders { pair, reply })
            .await
            .is_err()
        {
            return BatchCancelCompleted { results: Vec::new() };
        }
        rx.await.unwrap_or(BatchCancelCompleted { results: Vec::new() })
    }

    pub async fn cancel_not_enough_coins_orders(&self, new_balance: AssetMap) {
        let _ = self
            .tx
            .send(AccountMessage::CancelNotEnoughCoinsOrders { new_balance })
            .await;
    }

    pub async fn get_reserved_balance(&self) -> AssetMap {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(AccountMessage::GetReservedBalance { reply }).await.is_err() {
            return AssetMap::default();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn get_tradable_balance(&self, assets: Vec<Asset>) -> Result<AssetMap, MatcherError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(AccountMessage::GetTradableBalance { assets, reply })
            .await
            .map_err(|_| MatcherError::UnexpectedError("account actor gone".into()))?;
        rx.await
            .map_err(|_| MatcherError::UnexpectedError("no reply".into()))?
    }

    pub async fn get_order_status(&self, id: OrderId) -> OrderStatus {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(AccountMessage::GetOrderStatus { id, reply }).await.is_err() {
            return OrderStatus::NotFound;
        }
        rx.await.unwrap_or(OrderStatus::NotFound)
    }

    pub async fn get_orders_statuses(
        &self,
        pair: Option<Pair>,
        only_active: bool,
    ) -> Vec<(OrderId, OrderStatus)> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(AccountMessage::GetOrdersStatuses { pair, only_active, reply })
            .await
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn ws_subscribe(&self, subscriber: WsSubscriber) {
        let _ = self.tx.send(AccountMessage::WsSubscribe { subscriber }).await;
    }

    pub async fn start_schedules(&self) {
        let _ = self.tx.send(AccountMessage::StartSchedules).await;
    }

    pub async fn notify_order_added(&self, submitted: AcceptedOrder) {
        let _ = self
            .tx
            .send(AccountMessage::OrderAdded { submitted: Box::new(submitted) })
            .await;
    }

    pub async fn notify_order_executed(&self, remaining: AcceptedOrder) {
        let _ = self
            .tx
            .send(AccountMessage::OrderExecuted { remaining: Box::new(remaining) })
            .await;
    }

    pub async fn notify_order_canceled(&self, order: AcceptedOrder, is_system_cancel: bool) {
        let _ = self
            .tx
            .send(AccountMessage::OrderCanceled {
                order: Box::new(order),
                is_system_cancel,
            })
            .await;
    }
}

struct AccountActor {
    state: AccountState,
    chain: Arc<dyn ChainClient>,
    oracle: BalanceOracleHandle,
    store: Arc<dyn StoreSink>,
    order_db: Arc<dyn OrderDb>,
    config: MatcherConfig,
    self_tx: mpsc::Sender<AccountMessage>,
}

/// Spawn the actor for `owner`, seeding its `active_orders`/`open_volume`
/// from whatever the order store has on file for it (actor restart / first
/// contact from the directory).
pub fn spawn(
    owner: Address,
    chain: Arc<dyn ChainClient>,
    oracle: BalanceOracleHandle,
    store: Arc<dyn StoreSink>,
    order_db: Arc<dyn OrderDb>,
    config: MatcherConfig,
) -> AccountHandle {
    let (tx, rx) = mpsc::channel(256);
    let handle = AccountHandle { tx: tx.clone() };
    tokio::spawn(async move {
        let mut state = AccountState::new(owner);
        for ao in order_db.load_remaining_orders(owner).await {
            state.add_reserve(&ao.reservable_balance);
            state.active_orders.insert(ao.id(), ao);
        }
        let mut actor = AccountActor {
            state,
            chain,
            oracle,
            store,
            order_db,
            config,
            self_tx: tx,
        };
        actor.run(rx).await;
    });
    handle
}

impl AccountActor {
    async fn run(&mut self, mut rx: mpsc::Receiver<AccountMessage>) {
        while let Some(msg) = rx.recv().await {
            self.handle(msg).await;
        }
        for (_, handle) in self.state.expiry_timers.drain() {
            handle.abort();
        }
    }

    async fn handle(&mut self, msg: AccountMessage) {
        match msg {
            AccountMessage::PlaceOrder { order, is_market, reply } => {
                self.handle_place_order(order, is_market, reply)
            }
            AccountMessage::CancelOrder { id, reply } => self.begin_cancel(id, reply).await,
            AccountMessage::CancelAllOrders { pair, reply } => {
                self.handle_cancel_all_orders(pair, reply).await
            }
            AccountMessage::CancelNotEnoughCoinsOrders { new_balance } => {
                self.handle_cancel_not_enough_coins(new_balance)
            }
            AccountMessage::GetReservedBalance { reply } => {
                let _ = reply.send(self.state.open_volume.clone());
            }
            AccountMessage::GetTradableBalance { assets, reply } => {
                self.handle_get_tradable_balance(assets, reply).await
            }
            AccountMessage::GetOrderStatus { id, reply } => {
                let status = self.order_status(id).await;
                let _ = reply.send(status);
            }
            AccountMessage::GetOrdersStatuses { pair, only_active, reply } => {
                let statuses = self.orders_statuses(pair, only_active).await;
                let _ = reply.send(statuses);
            }
            AccountMessage::WsSubscribe { subscriber } => self.handle_ws_subscribe(subscriber),
            AccountMessage::StartSchedules => self.handle_start_schedules(),
            AccountMessage::OrderAdded { submitted } => self.on_order_added(*submitted).await,
            AccountMessage::OrderExecuted { remaining } => self.on_order_executed(*remaining).await,
            AccountMessage::OrderCanceled { order, is_system_cancel } => {
                self.on_order_canceled(*order, is_system_cancel).await
            }
            AccountMessage::ValidationPassed { id, accepted } => {
                self.on_validation_passed(id, *accepted)
            }
            AccountMessage::ValidationFailed { id, reason } => self.on_validation_failed(id, reason),
            AccountMessage::StoreFailed { id, reason } => self.on_store_failed(id, reason),
            AccountMessage::CancelExpiredOrder { id } => self.on_cancel_expired_order(id).await,
            AccountMessage::PrepareDiffForWsSubscribers => self.on_prepare_diff().await,
            AccountMessage::WsSnapshotReady { result } => self.on_ws_snapshot_ready(result).await,
        }
    }

    // ---- Placement pipeline ----

    fn handle_place_order(&mut self, order: Order, is_market: bool, reply: oneshot::Sender<PlacementReply>) {
        let id = order.id;
        if self.state.pending_commands.contains_key(&id) {
            let _ = reply.send(PlacementReply::Rejected(MatcherError::OrderDuplicate(id)));
            return;
        }
        if self.state.active_orders.len() + self.state.placement_queue.len() >= self.config.max_active_orders {
            let _ = reply.send(PlacementReply::Rejected(MatcherError::ActiveOrdersLimitReached));
            return;
        }
        let was_empty = self.state.placement_queue.is_empty();
        self.state.placement_queue.push_back(id);
        self.state.queued_orders.insert(id, (order, is_market));
        self.state.pending_commands.insert(id, PendingCommand::place(reply));
        if was_empty {
            self.start_validation(id);
        }
    }

    fn start_next_validation(&mut self) {
        if let Some(&id) = self.state.placement_queue.front() {
            if !self.state.validating_head {
                self.start_validation(id);
            }
        }
    }

    /// Concurrently asks the chain client and the balance oracle, then
    /// folds the result back in as a self-sent `ValidationPassed` /
    /// `ValidationFailed` rather than mutating state from inside the
    /// spawned future directly.
    fn start_validation(&mut self, id: OrderId) {
        let Some((order, is_market)) = self.state.queued_orders.get(&id).cloned() else {
            warn!(%id, "start_validation called with no queued order, ignoring");
            return;
        };
        self.state.validating_head = true;
        let chain = self.chain.clone();
        let oracle = self.oracle.clone();
        let self_tx = self.self_tx.clone();
        let owner = self.state.owner;
        let already_in_active = self.state.active_orders.contains_key(&id);
        let active_orders_count = self.state.active_orders.len();
        let max_active_orders = self.config.max_active_orders;
        let order_db = self.order_db.clone();

        tokio::spawn(async move {
            let assets: Vec<Asset> = required_balance(&order).keys().copied().collect();
            let (has_order, balance) = tokio::join!(chain.has_order(owner, id), oracle.get(owner, &assets));
            let msg = match balance {
                Err(e) => AccountMessage::ValidationFailed { id, reason: e },
                Ok(tradable_balance) => {
                    let seen_on_chain = has_order.unwrap_or(false);
                    let known_to_order_db = order_db.contains_info(id).await;
                    let ctx = ValidationContext {
                        tradable_balance,
                        active_orders_count,
                        max_active_orders,
                        already_known: already_in_active || seen_on_chain || known_to_order_db,
                    };
                    match validate_order(order, is_market, &ctx) {
                        Ok(ao) => AccountMessage::ValidationPassed { id, accepted: Box::new(ao) },
                        Err(reason) => AccountMessage::ValidationFailed { id, reason },
                    }
                }
            };
            let _ = self_tx.send(msg).await;
        });
    }

    fn on_validation_passed(&mut self, id: OrderId, accepted: AcceptedOrder) {
        if self.state.placement_queue.front() != Some(&id) {
            warn!(%id, "stale ValidationPassed for non-head order ignored");
            return;
        }
        self.state.validating_head = false;
        self.state.placement_queue.pop_front();
        self.state.queued_orders.remove(&id);
        self.place(accepted);
        self.start_next_validation();
    }

    fn on_validation_failed(&mut self, id: OrderId, reason: MatcherError) {
        if self.state.placement_queue.front() != Some(&id) {
            warn!(%id, "stale ValidationFailed for non-head order ignored");
            return;
        }
        self.state.validating_head = false;
        self.state.placement_queue.pop_front();
        self.state.queued_orders.remove(&id);
        if let Some(pc) = self.state.pending_commands.remove(&id) {
            if let Some(tx) = pc.placement_reply {
                let reply = if reason == MatcherError::WavesNodeConnectionBroken {
                    PlacementReply::WavesNodeUnavailable(reason)
                } else {
                    PlacementReply::Rejected(reason)
                };
                let _ = tx.send(reply);
            }
        }
        self.start_next_validation();
    }

    /// Optimistically reserve funds and publish the placement to the store
    /// sink. `pendingCommands` is left untouched: it is cleared only when
    /// the matching engine's own `OrderAdded`/`OrderCanceled` arrives.
    fn place(&mut self, ao: AcceptedOrder) {
        let id = ao.id();
        self.state.add_reserve(&ao.reservable_balance);
        let event = if ao.is_market {
            QueueEvent::PlacedMarket(ao.order.clone())
        } else {
            QueueEvent::Placed(ao.order.clone())
        };
        self.state.active_orders.insert(id, ao);
        self.emit_store_event(event, id);
    }

    fn emit_store_event(&self, event: QueueEvent, id: OrderId) {
        let store = self.store.clone();
        let self_tx = self.self_tx.clone();
        tokio::spawn(async move {
            match store.push(event).await {
                StoreOutcome::Persisted => {}
                StoreOutcome::Disabled => {
                    let _ = self_tx
                        .send(AccountMessage::StoreFailed { id, reason: MatcherError::FeatureDisabled })
                        .await;
                }
                StoreOutcome::Failed(msg) => {
                    let _ = self_tx
                        .send(AccountMessage::StoreFailed {
                            id,
                            reason: MatcherError::CanNotPersistEvent(msg),
                        })
                        .await;
                }
            }
        });
    }

    fn on_store_failed(&mut self, id: OrderId, reason: MatcherError) {
        if let Some(pc) = self.state.pending_commands.remove(&id) {
            match pc.kind {
                PendingKind::Place => {
                    if let Some(tx) = pc.placement_reply {
                        let _ = tx.send(PlacementReply::CanNotPersist(reason));
                    }
                }
                PendingKind::Cancel => {
                    if let Some(tx) = pc.cancel_reply {
                        let _ = tx.send(CancelReply::Rejected(reason));
                    }
                }
            }
        }
    }

    // ---- Cancellation ----

    /// Shared by `CancelOrder` and the `CancelAllOrders` batch path: resolve
    /// immediate rejections, else register the pending command and emit the
    /// cancel event. The eventual ack is always delivered by
    /// `on_order_canceled` once the matching engine confirms it.
    async fn begin_cancel(&mut self, id: OrderId, reply: oneshot::Sender<CancelReply>) {
        if let Some(existing) = self.state.pending_commands.get(&id) {
            let rejection = match existing.kind {
                PendingKind::Place => MatcherError::OrderNotFound(id),
                PendingKind::Cancel => MatcherError::OrderCanceled(id),
            };
            let _ = reply.send(CancelReply::Rejected(rejection));
            return;
        }
        if let Some(ao) = self.state.active_orders.get(&id) {
            if ao.is_market {
                let _ = reply.send(CancelReply::Rejected(MatcherError::MarketOrderCancel));
                return;
            }
            let pair = ao.order.pair;
            self.state.pending_commands.insert(id, PendingCommand::cancel(reply));
            self.emit_store_event(QueueEvent::Canceled { pair, id }, id);
            return;
        }
        let status = self.order_db.status(id).await;
        let result = match status {
            OrderStatus::NotFound => CancelReply::Rejected(MatcherError::OrderNotFound(id)),
            OrderStatus::Cancelled { .. } => CancelReply::Rejected(MatcherError::OrderCanceled(id)),
            OrderStatus::Filled { .. } => CancelReply::Rejected(MatcherError::OrderFull(id)),
            OrderStatus::Accepted | OrderStatus::PartiallyFilled { .. } => {
                CancelReply::Rejected(MatcherError::OrderNotFound(id))
            }
        };
        let _ = reply.send(result);
    }

    async fn handle_cancel_all_orders(&mut self, pair: Option<Pair>, reply: oneshot::Sender<BatchCancelCompleted>) {
        let ids: Vec<OrderId> = self
            .state
            .active_orders
            .values()
            .filter(|ao| pair.as_ref().map(|p| &ao.order.pair == p).unwrap_or(true))
            .map(|ao| ao.id())
            .collect();

        let mut waiters = Vec::with_capacity(ids.len());
        for id in ids {
            let (tx, rx) = oneshot::channel();
            self.begin_cancel(id, tx).await;
            waiters.push((id, rx));
        }

        let timeout = self.config.batch_cancel_timeout();
        let mut results = Vec::with_capacity(waiters.len());
        for (id, rx) in waiters {
            let outcome = match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(CancelReply::Canceled(_))) => Ok(()),
                Ok(Ok(CancelReply::Rejected(e))) => Err(e),
                Ok(Err(_)) => Err(MatcherError::UnexpectedError("cancel reply dropped".to_string())),
                Err(_) => Err(MatcherError::UnexpectedError("batch cancel timed out".to_string())),
            };
            results.push((id, outcome));
        }
        let _ = reply.send(BatchCancelCompleted { results });
    }

    /// Forced cancellation on balance loss (`CancelNotEnoughCoinsOrders`):
    /// fold over limit orders oldest-first so senior reservations are
    /// honored first and the newest orders absorb the deficit.
    fn handle_cancel_not_enough_coins(&mut self, new_balance: AssetMap) {
        let keys: Vec<Asset> = new_balance.keys().copied().collect();
        let mut orders: Vec<&AcceptedOrder> = self
            .state
            .active_orders
            .values()
            .filter(|ao| !ao.is_market)
            .collect();
        orders.sort_by_key(|ao| ao.order.timestamp);

        let mut rest = new_balance;
        let mut to_cancel: Vec<(OrderId, Pair, Asset, u64)> = Vec::new();
        for ao in orders {
            let need = balance_map::restrict(&ao.required_balance, &keys);
            let shortfall = balance_map::saturating_diff(&rest, &need);
            match shortfall.iter().next() {
                Some((&asset, &amount)) => {
                    let already_pending_cancel = self
                        .state
                        .pending_commands
                        .get(&ao.id())
                        .map(|p| p.kind == PendingKind::Cancel)
                        .unwrap_or(false);
                    if !already_pending_cancel {
                        to_cancel.push((ao.id(), ao.order.pair, asset, amount));
                    }
                }
                None => balance_map::sub_into(&mut rest, &need),
            }
        }

        for (id, pair, asset, shortfall) in to_cancel {
            debug!(%id, %asset, shortfall, "forced cancellation: reserve no longer covered by balance");
            self.emit_store_event(QueueEvent::Canceled { pair, id }, id);
        }
    }

    // ---- Reaction to matching-engine events ----

    async fn on_order_added(&mut self, submitted: AcceptedOrder) {
        let id = submitted.id();
        let prev_reservable = self.state.active_orders.get(&id).map(|ao| ao.reservable_balance.clone());
        let first_time = !self.state.ws.tracked_orders.contains(&id);

        match &prev_reservable {
            Some(prev) => self.apply_reserve_delta(prev, &submitted.reservable_balance),
            None => self.state.add_reserve(&submitted.reservable_balance),
        }

        self.state.active_orders.insert(id, submitted.clone());
        if self.state.scheduling_enabled {
            self.schedule_expiry(id, submitted.order.expiration);
        }

        if let Some(pc) = self.state.pending_commands.remove(&id) {
            if matches!(pc.kind, PendingKind::Place) {
                if let Some(tx) = pc.placement_reply {
                    let _ = tx.send(PlacementReply::Accepted(id));
                }
            } else {
                self.state.pending_commands.insert(id, pc);
            }
        }

        let _ = self.order_db.save_order(submitted.clone()).await;

        let status = if submitted.fill.filled_amount > 0 {
            OrderStatus::PartiallyFilled {
                filled_amount: submitted.fill.filled_amount,
                filled_fee: submitted.fill.filled_fee,
            }
        } else {
            OrderStatus::Accepted
        };
        self.stage_ws_update(id, &submitted, status, first_time);
    }

    async fn on_order_executed(&mut self, remaining: AcceptedOrder) {
        if remaining.is_valid() {
            self.on_order_added(remaining).await;
        } else {
            let status = OrderStatus::Filled {
                filled_amount: remaining.fill.filled_amount,
                filled_fee: remaining.fill.filled_fee,
            };
            self.handle_terminated(remaining, status).await;
        }
    }

    async fn on_order_canceled(&mut self, order: AcceptedOrder, _is_system_cancel: bool) {
        let id = order.id();
        if let Some(pc) = self.state.pending_commands.remove(&id) {
            match pc.kind {
                PendingKind::Cancel => {
                    if let Some(tx) = pc.cancel_reply {
                        let _ = tx.send(CancelReply::Canceled(id));
                    }
                }
                PendingKind::Place => {
                    if let Some(tx) = pc.placement_reply {
                        let _ = tx.send(PlacementReply::Rejected(MatcherError::OrderCanceled(id)));
                    }
                }
            }
        }
        if self.state.active_orders.contains_key(&id) {
            let status = OrderStatus::Cancelled {
                filled_amount: order.fill.filled_amount,
                filled_fee: order.fill.filled_fee,
            };
            self.handle_terminated(order, status).await;
        }
    }

    async fn handle_terminated(&mut self, ao: AcceptedOrder, status: OrderStatus) {
        let id = ao.id();
        let _ = self.order_db.save_order_info(ao.order.sender, id, status).await;
        self.state.cancel_timer(id);
        self.state.active_orders.remove(&id);
        self.state.sub_reserve(&ao.reservable_balance);
        let first_time = !self.state.ws.tracked_orders.contains(&id) && matches!(status, OrderStatus::Filled { .. });
        self.stage_ws_update(id, &ao, status, first_time);
    }

    /// Speculatively tell the `BalanceOracle` about a reserve decrease so ws
    /// subscribers see the freed balance before the on-chain settlement lands.
    fn apply_reserve_delta(&mut self, prev: &AssetMap, new: &AssetMap) {
        self.state.sub_reserve(prev);
        self.state.add_reserve(new);
        let freed = positive_diff(prev, new);
        if !freed.is_empty() {
            let oracle = self.oracle.clone();
            let owner = self.state.owner;
            tokio::spawn(async move {
                oracle.subtract(owner, freed).await;
            });
        }
    }

    // ---- Expiry ----

    fn schedule_expiry(&mut self, id: OrderId, expiration: i64) {
        self.state.cancel_timer(id);
        let now = chrono::Utc::now().timestamp_millis();
        let delay_ms = (expiration - now).max(0) as u64;
        let self_tx = self.self_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let _ = self_tx.send(AccountMessage::CancelExpiredOrder { id }).await;
        });
        self.state.expiry_timers.insert(id, handle);
    }

    async fn on_cancel_expired_order(&mut self, id: OrderId) {
        self.state.expiry_timers.remove(&id);
        let Some(ao) = self.state.active_orders.get(&id) else {
            return;
        };
        let now = chrono::Utc::now().timestamp_millis();
        let threshold = self.config.expiration_threshold().as_millis() as i64;
        if ao.order.expiration - now <= threshold {
            let pair = ao.order.pair;
            self.emit_store_event(QueueEvent::Canceled { pair, id }, id);
        } else {
            let expiration = ao.order.expiration;
            self.schedule_expiry(id, expiration);
        }
    }

    fn handle_start_schedules(&mut self) {
        if self.state.scheduling_enabled {
            return;
        }
        self.state.scheduling_enabled = true;
        let ids: Vec<(OrderId, i64)> = self
            .state
            .active_orders
            .values()
            .map(|ao| (ao.id(), ao.order.expiration))
            .collect();
        for (id, expiration) in ids {
            self.schedule_expiry(id, expiration);
        }
    }

    // ---- Queries ----

    async fn handle_get_tradable_balance(
        &mut self,
        assets: Vec<Asset>,
        reply: oneshot::Sender<Result<AssetMap, MatcherError>>,
    ) {
        let owner = self.state.owner;
        let oracle = self.oracle.clone();
        let timeout = self.config.balance_ask_timeout();
        let result = match tokio::time::timeout(timeout, oracle.get(owner, &assets)).await {
            Ok(Ok(spendable)) => {
                let reserved = balance_map::restrict(&self.state.open_volume, &assets);
                Ok(balance_map::tradable(&spendable, &reserved))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(MatcherError::UnexpectedError("balance oracle ask timed out".to_string())),
        };
        let _ = reply.send(result);
    }

    async fn order_status(&self, id: OrderId) -> OrderStatus {
        if let Some(ao) = self.state.active_orders.get(&id) {
            return if ao.fill.filled_amount > 0 {
                OrderStatus::PartiallyFilled {
                    filled_amount: ao.fill.filled_amount,
                    filled_fee: ao.fill.filled_fee,
                }
            } else {
                OrderStatus::Accepted
            };
        }
        self.order_db.status(id).await
    }

    async fn orders_statuses(&self, pair: Option<Pair>, only_active: bool) -> Vec<(OrderId, OrderStatus)> {
        let mut active: Vec<&AcceptedOrder> = self
            .state
            .active_orders
            .values()
            .filter(|ao| pair.as_ref().map(|p| &ao.order.pair == p).unwrap_or(true))
            .collect();
        // Sorted by timestamp, oldest first, same ordering rule as the
        // forced-cancellation fold.
        active.sort_by_key(|ao| ao.order.timestamp);
        let mut out: Vec<(OrderId, OrderStatus)> = active
            .into_iter()
            .map(|ao| {
                let status = if ao.fill.filled_amount > 0 {
                    OrderStatus::PartiallyFilled {
                        filled_amount: ao.fill.filled_amount,
                        filled_fee: ao.fill.filled_fee,
                    }
                } else {
                    OrderStatus::Accepted
                };
                (ao.id(), status)
            })
            .collect();

        if !only_active {
            let active_ids: std::collections::HashSet<OrderId> = out.iter().map(|(id, _)| *id).collect();
            for (id, status) in self.order_db.history(self.state.owner).await {
                if !active_ids.contains(&id) {
                    out.push((id, status));
                }
            }
        }
        out
    }

    // ---- Websocket diff stream ----

    fn handle_ws_subscribe(&mut self, subscriber: WsSubscriber) {
        self.state.ws.pending.push(subscriber);
        let owner = self.state.owner;
        let oracle = self.oracle.clone();
        let self_tx = self.self_tx.clone();
        tokio::spawn(async move {
            let result = oracle.get_snapshot(owner).await;
            let _ = self_tx.send(AccountMessage::WsSnapshotReady { result }).await;
        });
    }

    async fn on_ws_snapshot_ready(&mut self, result: Result<AssetMap, MatcherError>) {
        let spendable = match result {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "ws snapshot balance request failed, dropping pending subscribers");
                self.state.ws.pending.clear();
                return;
            }
        };
        let tradable = balance_map::tradable(&spendable, &self.state.open_volume);
        let balances: HashMap<Asset, (u64, u64)> = spendable
            .keys()
            .map(|&asset| {
                let reserved = self.state.open_volume.get(&asset).copied().unwrap_or(0);
                let trad = tradable.get(&asset).copied().unwrap_or(0);
                (asset, (trad, reserved))
            })
            .collect();
        let orders: Vec<OrderSummary> = self
            .state
            .active_orders
            .values()
            .map(|ao| OrderSummary {
                id: ao.id(),
                pair: ao.order.pair,
                side: ao.order.side,
                status: if ao.fill.filled_amount > 0 {
                    OrderStatus::PartiallyFilled {
                        filled_amount: ao.fill.filled_amount,
                        filled_fee: ao.fill.filled_fee,
                    }
                } else {
                    OrderStatus::Accepted
                },
            })
            .collect();
        let snapshot = WsSnapshot { balances, orders };

        let push = WsPush::Snapshot(snapshot);
        debug!(owner = %self.state.owner, msg = %push.log_summary(), "ws snapshot ready");
        let subscribers: Vec<WsSubscriber> = self.state.ws.pending.drain(..).collect();
        for sub in subscribers {
            if sub.push(push.clone()) {
                self.state.ws.active.push(sub);
            }
        }
        self.ensure_ws_scheduler();
    }

    fn stage_ws_update(&mut self, id: OrderId, ao: &AcceptedOrder, status: OrderStatus, first_time: bool) {
        self.state.ws.changed_assets.extend(ao.reservable_balance.keys().copied());
        self.state.ws.changed_assets.extend(ao.required_balance.keys().copied());
        if first_time {
            self.state.ws.stage_full(OrderSummary {
                id,
                pair: ao.order.pair,
                side: ao.order.side,
                status,
            });
        } else {
            self.state.ws.stage_status_only(id, status);
        }
        self.ensure_ws_scheduler();
    }

    fn ensure_ws_scheduler(&mut self) {
        if self.state.ws.scheduler_running || !self.state.ws.has_subscribers() {
            return;
        }
        self.state.ws.scheduler_running = true;
        self.schedule_diff_tick();
    }

    fn schedule_diff_tick(&self) {
        let self_tx = self.self_tx.clone();
        let interval = self.config.ws_messages_interval();
        tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let _ = self_tx.send(AccountMessage::PrepareDiffForWsSubscribers).await;
        });
    }

    async fn on_prepare_diff(&mut self) {
        self.state.ws.active.retain(|s| !s.tx.is_closed());
        if !self.state.ws.has_subscribers() {
            self.state.ws.scheduler_running = false;
            return;
        }
        if !self.state.ws.has_pending_diff() {
            self.schedule_diff_tick();
            return;
        }

        let assets: Vec<Asset> = self.state.ws.changed_assets.iter().copied().collect();
        let owner = self.state.owner;
        let oracle = self.oracle.clone();
        let open_volume = self.state.open_volume.clone();
        let orders = self.state.ws.take_diff_orders();
        self.state.ws.changed_assets.clear();
        let active: Vec<WsSubscriber> = self.state.ws.active.clone();

        self.schedule_diff_tick();

        tokio::spawn(async move {
            let Ok(spendable) = oracle.get(owner, &assets).await else {
                return;
            };
            let balances: HashMap<Asset, (u64, u64)> = assets
                .into_iter()
                .map(|asset| {
                    let reserved = open_volume.get(&asset).copied().unwrap_or(0);
                    let have = spendable.get(&asset).copied().unwrap_or(0);
                    (asset, (have.saturating_sub(reserved), reserved))
                })
                .collect();
            let diff = crate::account::ws::WsDiff { balances, orders };
            let push = WsPush::Diff(diff);
            debug!(%owner, msg = %push.log_summary(), "ws diff ready");
            for sub in &active {
                sub.push(push.clone());
            }
        });
    }
}

fn positive_diff(a: &AssetMap, b: &AssetMap) -> AssetMap {
    let mut out = AssetMap::default();
    for (&asset, &av) in a {
        let bv = b.get(&asset).copied().unwrap_or(0);
        if av > bv {
            out.insert(asset, av - bv);
        }
    }
    out
}
