//! Error taxonomy surfaced to clients, and the internal chain-call error
//! that feeds into it.

use crate::core_types::{Asset, OrderId};
use thiserror::Error;

/// Errors returned by the `ChainClient` collaborator (the on-chain node
/// client). Distinguishing "connection broken" from everything else
/// matters: only the former becomes `WavesNodeUnavailable` at the client
/// boundary.
#[derive(Error, Debug, Clone)]
pub enum ChainError {
    #[error("node connection broken")]
    ConnectionBroken,

    #[error("node call failed: {0}")]
    Other(String),
}

/// Client-facing error taxonomy. Each variant is deterministic except
/// `UnexpectedError`, which wraps an uncaught failure during validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatcherError {
    #[error("order {0} is already in flight")]
    OrderDuplicate(OrderId),

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("order {0} already canceled")]
    OrderCanceled(OrderId),

    #[error("order {0} already filled")]
    OrderFull(OrderId),

    #[error("account has reached the active order limit")]
    ActiveOrdersLimitReached,

    #[error("market orders cannot be canceled")]
    MarketOrderCancel,

    #[error("blockchain node connection broken")]
    WavesNodeConnectionBroken,

    #[error("order persistence is disabled")]
    FeatureDisabled,

    #[error("could not persist event: {0}")]
    CanNotPersistEvent(String),

    #[error("unexpected error: {0}")]
    UnexpectedError(String),

    #[error("insufficient balance of {asset}: short by {shortfall}")]
    NotEnoughCoins { asset: Asset, shortfall: u64 },
}

impl From<ChainError> for MatcherError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::ConnectionBroken => MatcherError::WavesNodeConnectionBroken,
            ChainError::Other(msg) => MatcherError::UnexpectedError(msg),
        }
    }
}
