//! `OrderDb` — the order-history read model collaborator.
//!
//! Distinct from [`crate::store::StoreSink`]: the store is the write-ahead
//! event log; this is the queryable history used to answer
//! `GetOrderStatus` and to recover `remainingOrders` on actor start.
//! Grounded on the teacher's `src/account/db.rs` / `src/account/repository.rs`
//! split between a save-path and a query-path trait.

use crate::core_types::{Address, OrderId};
use crate::models::{AcceptedOrder, OrderStatus};
use async_trait::async_trait;

#[async_trait]
pub trait OrderDb: Send + Sync {
    async fn save_order(&self, order: AcceptedOrder) -> Result<(), String>;

    /// Record the final order-info row: who owns `id` and the terminal
    /// status it reached. Called once per order, from `handle_terminated`,
    /// so this is what makes `status(id)` return the correct terminal
    /// state once the order has left `active_orders`.
    async fn save_order_info(&self, sender: Address, id: OrderId, status: OrderStatus) -> Result<(), String>;

    async fn status(&self, id: OrderId) -> OrderStatus;

    async fn contains_info(&self, id: OrderId) -> bool;

    /// All non-terminal orders for `sender`, used to rebuild
    /// `AccountState.active_orders` when an actor is (re)spawned.
    async fn load_remaining_orders(&self, sender: Address) -> Vec<AcceptedOrder>;

    /// Historic (including terminal) order statuses for `sender`, used by
    /// `GetOrdersStatuses` when `onlyActive` is false.
    async fn history(&self, sender: Address) -> Vec<(OrderId, OrderStatus)>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryOrderDb {
        orders: Mutex<HashMap<OrderId, AcceptedOrder>>,
        statuses: Mutex<HashMap<OrderId, OrderStatus>>,
        infos: Mutex<std::collections::HashSet<OrderId>>,
        owners: Mutex<HashMap<OrderId, Address>>,
    }

    impl InMemoryOrderDb {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_status(&self, id: OrderId, status: OrderStatus) {
            self.statuses.lock().unwrap().insert(id, status);
        }
    }

    #[async_trait]
    impl OrderDb for InMemoryOrderDb {
        async fn save_order(&self, order: AcceptedOrder) -> Result<(), String> {
            let id = order.id();
            self.owners.lock().unwrap().insert(id, order.order.sender);
            self.orders.lock().unwrap().insert(id, order);
            self.statuses.lock().unwrap().insert(id, OrderStatus::Accepted);
            Ok(())
        }

        async fn save_order_info(&self, sender: Address, id: OrderId, status: OrderStatus) -> Result<(), String> {
            self.infos.lock().unwrap().insert(id);
            self.owners.lock().unwrap().insert(id, sender);
            self.statuses.lock().unwrap().insert(id, status);
            Ok(())
        }

        async fn status(&self, id: OrderId) -> OrderStatus {
            self.statuses
                .lock()
                .unwrap()
                .get(&id)
                .copied()
                .unwrap_or(OrderStatus::NotFound)
        }

        async fn contains_info(&self, id: OrderId) -> bool {
            self.infos.lock().unwrap().contains(&id) || self.orders.lock().unwrap().contains_key(&id)
        }

        async fn load_remaining_orders(&self, sender: Address) -> Vec<AcceptedOrder> {
            self.orders
                .lock()
                .unwrap()
                .values()
                .filter(|o| o.order.sender == sender && o.is_valid())
                .cloned()
                .collect()
        }

        async fn history(&self, sender: Address) -> Vec<(OrderId, OrderStatus)> {
            let owners = self.owners.lock().unwrap();
            let statuses = self.statuses.lock().unwrap();
            owners
                .iter()
                .filter(|(_, &owner)| owner == sender)
                .filter_map(|(id, _)| statuses.get(id).map(|s| (*id, *s)))
                .collect()
        }
    }
}
