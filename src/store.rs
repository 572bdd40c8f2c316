//! `StoreSink` — the durable event log collaborator.
//!
//! An account actor pushes `QueueEvent`s here before it can treat an
//! order placement or cancellation as committed. Grounded on the
//! teacher's `ServiceAdapter`/queue-push shape in
//! `src/transfer/adapters/mod.rs`: one trait, one mock, `Send + Sync`.

use crate::core_types::{OrderId, Pair};
use crate::models::Order;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub enum QueueEvent {
    Placed(Order),
    PlacedMarket(Order),
    Canceled { pair: Pair, id: OrderId },
}

/// Outcome of a push, distinguishing "disabled" from "failed" because the
/// two map to different client errors: `FeatureDisabled` vs
/// `CanNotPersistEvent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    Persisted,
    Disabled,
    Failed(String),
}

#[async_trait]
pub trait StoreSink: Send + Sync {
    async fn push(&self, event: QueueEvent) -> StoreOutcome;
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryStoreSink {
        pub events: Mutex<Vec<QueueEvent>>,
        pub disabled: std::sync::atomic::AtomicBool,
        pub fail_next: std::sync::atomic::AtomicBool,
    }

    impl InMemoryStoreSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn disable(&self) {
            self.disabled.store(true, std::sync::atomic::Ordering::SeqCst);
        }

        pub fn len(&self) -> usize {
            self.events.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl StoreSink for InMemoryStoreSink {
        async fn push(&self, event: QueueEvent) -> StoreOutcome {
            if self.disabled.load(std::sync::atomic::Ordering::SeqCst) {
                return StoreOutcome::Disabled;
            }
            if self.fail_next.swap(false, std::sync::atomic::Ordering::SeqCst) {
                return StoreOutcome::Failed("store unavailable".to_string());
            }
            self.events.lock().unwrap().push(event);
            StoreOutcome::Persisted
        }
    }
}
