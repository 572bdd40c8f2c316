//! `ChainClient` — the on-chain node client collaborator.
//!
//! This is an external system in the real deployment; here it is a trait
//! so the `BalanceOracle` can be driven in tests without a real node.
//! Mirrors the teacher's `ServiceAdapter` trait shape
//! (`src/transfer/adapters/mod.rs`): an `async_trait`, one method per
//! remote call, a `#[cfg(test)]` mock double.

use crate::balance_map::AssetMap;
use crate::core_types::{Address, Asset, OrderId};
use crate::error::ChainError;
use async_trait::async_trait;

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Fetch spendable balances for `addr`. `assets = None` means "all
    /// assets" (the snapshot query); `Some(subset)` means a point query.
    async fn fetch_balances(
        &self,
        addr: Address,
        assets: Option<&[Asset]>,
    ) -> Result<AssetMap, ChainError>;

    /// The `hasOrderInBlockchain` predicate used during validation to
    /// detect an order that already settled on-chain.
    async fn has_order(&self, addr: Address, id: OrderId) -> Result<bool, ChainError>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records how many `fetch_balances` calls were made per address, so
    /// tests can assert the `BalanceOracle`'s call-coalescing behavior.
    #[derive(Default)]
    pub struct InMemoryChainClient {
        balances: Mutex<std::collections::HashMap<Address, AssetMap>>,
        known_orders: Mutex<HashSet<(Address, OrderId)>>,
        pub calls: AtomicUsize,
        pub fail_next: std::sync::atomic::AtomicBool,
    }

    impl InMemoryChainClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_balance(&self, addr: Address, map: AssetMap) {
            self.balances.lock().unwrap().insert(addr, map);
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChainClient for InMemoryChainClient {
        async fn fetch_balances(
            &self,
            addr: Address,
            assets: Option<&[Asset]>,
        ) -> Result<AssetMap, ChainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(ChainError::ConnectionBroken);
            }
            let balances = self.balances.lock().unwrap();
            let full = balances.get(&addr).cloned().unwrap_or_default();
            Ok(match assets {
                None => full,
                Some(keys) => crate::balance_map::restrict(&full, keys),
            })
        }

        async fn has_order(&self, addr: Address, id: OrderId) -> Result<bool, ChainError> {
            Ok(self.known_orders.lock().unwrap().contains(&(addr, id)))
        }
    }
}
