//! Order domain types: the signed `Order` a client submits, the
//! `AcceptedOrder` an account holds while it is live, and its status.

use crate::balance_map::AssetMap;
use crate::core_types::{Address, Asset, OrderId, Pair};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

/// A signed order as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub sender: Address,
    pub pair: Pair,
    pub side: Side,
    pub price: u64,
    pub amount: u64,
    pub matcher_fee: u64,
    pub fee_asset: Asset,
    pub timestamp: i64,
    pub expiration: i64,
}

/// The filling state tracked while an order is accepted into an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillState {
    pub filled_amount: u64,
    pub filled_fee: u64,
}

/// An `Order` plus its current filling state and derived reserve maps.
///
/// Invariant: every key of `reservable_balance` is also a key of
/// `required_balance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedOrder {
    pub order: Order,
    pub fill: FillState,
    pub is_market: bool,
    pub reservable_balance: AssetMap,
    pub required_balance: AssetMap,
}

impl AcceptedOrder {
    pub fn id(&self) -> OrderId {
        self.order.id
    }

    /// Remaining unfilled amount. An order is no longer valid (fully
    /// executed) once this reaches zero.
    pub fn remaining_amount(&self) -> u64 {
        self.order.amount.saturating_sub(self.fill.filled_amount)
    }

    pub fn is_valid(&self) -> bool {
        self.remaining_amount() > 0
    }
}

/// Status of an order as surfaced to clients. `Filled` and `Cancelled` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Accepted,
    PartiallyFilled { filled_amount: u64, filled_fee: u64 },
    Filled { filled_amount: u64, filled_fee: u64 },
    Cancelled { filled_amount: u64, filled_fee: u64 },
    NotFound,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled { .. } | OrderStatus::Cancelled { .. })
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Accepted => write!(f, "Accepted"),
            OrderStatus::PartiallyFilled { .. } => write!(f, "PartiallyFilled"),
            OrderStatus::Filled { .. } => write!(f, "Filled"),
            OrderStatus::Cancelled { .. } => write!(f, "Cancelled"),
            OrderStatus::NotFound => write!(f, "NotFound"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Filled { filled_amount: 1, filled_fee: 0 }.is_terminal());
        assert!(OrderStatus::Cancelled { filled_amount: 0, filled_fee: 0 }.is_terminal());
        assert!(!OrderStatus::Accepted.is_terminal());
        assert!(!OrderStatus::NotFound.is_terminal());
    }

    #[test]
    fn remaining_amount_tracks_fills() {
        let order = Order {
            id: OrderId::from_u64(1),
            sender: Address::from_u64(1),
            pair: Pair::new(Asset::Native, Asset::issued_from_u64(1)),
            side: Side::Buy,
            price: 300,
            amount: 100,
            matcher_fee: 1,
            fee_asset: Asset::Native,
            timestamp: 0,
            expiration: 0,
        };
        let mut ao = AcceptedOrder {
            order,
            fill: FillState::default(),
            is_market: false,
            reservable_balance: AssetMap::default(),
            required_balance: AssetMap::default(),
        };
        assert!(ao.is_valid());
        ao.fill.filled_amount = 100;
        assert!(!ao.is_valid());
    }
}
