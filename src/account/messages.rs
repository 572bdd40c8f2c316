//! The single mailbox message enum an [`crate::account::actor::AccountActor`]
//! accepts: client commands/queries, matching-engine notifications, and the
//! self-sent internal events that fold suspended async work back into the
//! mailbox loop.

use crate::account::ws::WsSubscriber;
use crate::balance_map::AssetMap;
use crate::core_types::{Address, OrderId, Pair};
use crate::error::MatcherError;
use crate::models::{AcceptedOrder, Order, OrderStatus};
use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq)]
pub enum PlacementReply {
    Accepted(OrderId),
    Rejected(MatcherError),
    WavesNodeUnavailable(MatcherError),
    CanNotPersist(MatcherError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CancelReply {
    Canceled(OrderId),
    Rejected(MatcherError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchCancelCompleted {
    pub results: Vec<(OrderId, Result<(), MatcherError>)>,
}

pub enum AccountMessage {
    // ---- Commands ----
    PlaceOrder {
        order: Order,
        is_market: bool,
        reply: oneshot::Sender<PlacementReply>,
    },
    CancelOrder {
        id: OrderId,
        reply: oneshot::Sender<CancelReply>,
    },
    CancelAllOrders {
        pair: Option<Pair>,
        reply: oneshot::Sender<BatchCancelCompleted>,
    },
    CancelNotEnoughCoinsOrders {
        new_balance: AssetMap,
    },

    // ---- Queries ----
    GetReservedBalance {
        reply: oneshot::Sender<AssetMap>,
    },
    GetTradableBalance {
        assets: Vec<crate::core_types::Asset>,
        reply: oneshot::Sender<Result<AssetMap, MatcherError>>,
    },
    GetOrderStatus {
        id: OrderId,
        reply: oneshot::Sender<OrderStatus>,
    },
    GetOrdersStatuses {
        pair: Option<Pair>,
        only_active: bool,
        reply: oneshot::Sender<Vec<(OrderId, OrderStatus)>>,
    },

    // ---- Notifications ----
    WsSubscribe {
        subscriber: WsSubscriber,
    },

    /// Turns on expiry scheduling, disabled at startup to avoid a
    /// thundering herd while history is still loading.
    StartSchedules,

    // ---- Matching engine events (already filtered by sender == owner
    // upstream in the directory) ----
    OrderAdded {
        submitted: Box<AcceptedOrder>,
    },
    OrderExecuted {
        remaining: Box<AcceptedOrder>,
    },
    OrderCanceled {
        order: Box<AcceptedOrder>,
        is_system_cancel: bool,
    },

    // ---- Internal self-sent events ----
    ValidationPassed {
        id: OrderId,
        accepted: Box<AcceptedOrder>,
    },
    ValidationFailed {
        id: OrderId,
        reason: MatcherError,
    },
    StoreFailed {
        id: OrderId,
        reason: MatcherError,
    },
    CancelExpiredOrder {
        id: OrderId,
    },
    PrepareDiffForWsSubscribers,
    WsSnapshotReady {
        result: Result<AssetMap, MatcherError>,
    },
}

impl std::fmt::Debug for AccountMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AccountMessage::PlaceOrder { .. } => "PlaceOrder",
            AccountMessage::CancelOrder { .. } => "CancelOrder",
            AccountMessage::CancelAllOrders { .. } => "CancelAllOrders",
            AccountMessage::CancelNotEnoughCoinsOrders { .. } => "CancelNotEnoughCoinsOrders",
            AccountMessage::GetReservedBalance { .. } => "GetReservedBalance",
            AccountMessage::GetTradableBalance { .. } => "GetTradableBalance",
            AccountMessage::GetOrderStatus { .. } => "GetOrderStatus",
            AccountMessage::GetOrdersStatuses { .. } => "GetOrdersStatuses",
            AccountMessage::WsSubscribe { .. } => "WsSubscribe",
            AccountMessage::StartSchedules => "StartSchedules",
            AccountMessage::OrderAdded { .. } => "OrderAdded",
            AccountMessage::OrderExecuted { .. } => "OrderExecuted",
            AccountMessage::OrderCanceled { .. } => "OrderCanceled",
            AccountMessage::ValidationPassed { .. } => "ValidationPassed",
            AccountMessage::ValidationFailed { .. } => "ValidationFailed",
            AccountMessage::StoreFailed { .. } => "StoreFailed",
            AccountMessage::CancelExpiredOrder { .. } => "CancelExpiredOrder",
            AccountMessage::PrepareDiffForWsSubscribers => "PrepareDiffForWsSubscribers",
            AccountMessage::WsSnapshotReady { .. } => "WsSnapshotReady",
        };
        f.write_str(name)
    }
}

/// Which inner command a [`crate::account::state::PendingCommand`] guards,
/// used by `CancelOrder`'s duplicate/ordering checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    Place,
    Cancel,
}

pub struct PendingCommand {
    pub kind: PendingKind,
    pub placement_reply: Option<oneshot::Sender<PlacementReply>>,
    pub cancel_reply: Option<oneshot::Sender<CancelReply>>,
}

impl PendingCommand {
    pub fn place(reply: oneshot::Sender<PlacementReply>) -> Self {
        Self {
            kind: PendingKind::Place,
            placement_reply: Some(reply),
            cancel_reply: None,
        }
    }

    pub fn cancel(reply: oneshot::Sender<CancelReply>) -> Self {
        Self {
            kind: PendingKind::Cancel,
            placement_reply: None,
            cancel_reply: Some(reply),
        }
    }
}
