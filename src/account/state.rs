//! In-memory state owned exclusively by one [`crate::account::actor::AccountActor`].
//! Never shared by reference across tasks.

use crate::account::messages::PendingCommand;
use crate::account::ws::WsMutableState;
use crate::balance_map::{self, AssetMap};
use crate::core_types::{Address, OrderId};
use crate::models::{AcceptedOrder, Order};
use std::collections::{HashMap, VecDeque};
use tokio::task::JoinHandle;

pub struct AccountState {
    pub owner: Address,
    pub active_orders: HashMap<OrderId, AcceptedOrder>,
    pub open_volume: AssetMap,
    pub placement_queue: VecDeque<OrderId>,
    /// Order payloads awaiting validation, keyed by id while they sit in
    /// `placement_queue` (removed once validation resolves).
    pub queued_orders: HashMap<OrderId, (Order, bool)>,
    pub pending_commands: HashMap<OrderId, PendingCommand>,
    pub expiry_timers: HashMap<OrderId, JoinHandle<()>>,
    pub ws: WsMutableState,
    /// A validation task is already running for `placement_queue`'s head.
    pub validating_head: bool,
    /// Disabled at actor startup until the directory's `StartSchedules`
    /// signal arrives, to avoid a thundering herd of expiry firings while
    /// history is still being restored.
    pub scheduling_enabled: bool,
}

impl AccountState {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            active_orders: HashMap::new(),
            open_volume: AssetMap::default(),
            placement_queue: VecDeque::new(),
            queued_orders: HashMap::new(),
            pending_commands: HashMap::new(),
            expiry_timers: HashMap::new(),
            ws: WsMutableState::default(),
            validating_head: false,
            scheduling_enabled: false,
        }
    }

    /// Add `reservable` to `open_volume`.
    pub fn add_reserve(&mut self, reservable: &AssetMap) {
        balance_map::add_into(&mut self.open_volume, reservable);
    }

    /// Subtract `reservable` from `open_volume`. Panics on negative result —
    /// an inconsistent `open_volume` is a logic bug, never silently clamped.
    pub fn sub_reserve(&mut self, reservable: &AssetMap) {
        balance_map::sub_into(&mut self.open_volume, reservable);
    }

    pub fn cancel_timer(&mut self, id: OrderId) {
        if let Some(handle) = self.expiry_timers.remove(&id) {
            handle.abort();
        }
    }

    #[cfg(test)]
    pub fn reserve_matches_active_orders(&self) -> bool {
        let mut expected = AssetMap::default();
        for ao in self.active_orders.values() {
            balance_map::add_into(&mut expected, &ao.reservable_balance);
        }
        expected == self.open_volume
    }
}
