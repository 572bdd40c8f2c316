//! Core identifier types used throughout the crate.
//!
//! These are opaque, fixed-width binary identifiers rather than bare
//! integers: an [`Address`] is a chain account id, an [`OrderId`] is
//! derived from an order's signature. Neither is ever arithmetic on.

use std::fmt;

/// Width of an [`Address`] in bytes (matches a typical chain account id).
pub const ADDRESS_LEN: usize = 26;

/// Width of an [`OrderId`] in bytes (matches a signature-derived hash).
pub const ORDER_ID_LEN: usize = 32;

/// Opaque binary identifier of a trading account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Build a test/demo address from a small integer, left-padded with zeros.
    pub fn from_u64(v: u64) -> Self {
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes[ADDRESS_LEN - 8..].copy_from_slice(&v.to_be_bytes());
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Opaque fixed-width identifier of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderId(pub [u8; ORDER_ID_LEN]);

impl OrderId {
    pub const fn new(bytes: [u8; ORDER_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Build a test/demo order id from a small integer, left-padded with zeros.
    pub fn from_u64(v: u64) -> Self {
        let mut bytes = [0u8; ORDER_ID_LEN];
        bytes[ORDER_ID_LEN - 8..].copy_from_slice(&v.to_be_bytes());
        Self(bytes)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Tagged asset identifier: the chain's native asset, or an issued asset
/// keyed by its opaque id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Asset {
    Native,
    Issued([u8; ORDER_ID_LEN]),
}

impl Asset {
    pub fn issued_from_u64(v: u64) -> Self {
        let mut bytes = [0u8; ORDER_ID_LEN];
        bytes[ORDER_ID_LEN - 8..].copy_from_slice(&v.to_be_bytes());
        Self::Issued(bytes)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Native => write!(f, "NATIVE"),
            Asset::Issued(id) => write!(f, "{}", hex::encode(id)),
        }
    }
}

/// An unordered pair of assets traded against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pair {
    pub amount_asset: Asset,
    pub price_asset: Asset,
}

impl Pair {
    pub const fn new(amount_asset: Asset, price_asset: Asset) -> Self {
        Self {
            amount_asset,
            price_asset,
        }
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.amount_asset, self.price_asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_round_trips_through_display() {
        let a = Address::from_u64(42);
        assert_eq!(a.to_string().len(), ADDRESS_LEN * 2);
    }

    #[test]
    fn distinct_ids_are_distinct() {
        assert_ne!(OrderId::from_u64(1), OrderId::from_u64(2));
        assert_ne!(Address::from_u64(1), Address::from_u64(2));
    }
}
