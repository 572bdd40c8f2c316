//! Websocket diff-stream subsystem.
//!
//! One initial snapshot per subscriber, then periodic diffs coalescing
//! whatever changed since the last tick. Grounded on the teacher's
//! `websocket::connection::ConnectionManager` for the subscriber-channel
//! shape (an mpsc sender keyed by an id, removed on send failure).

use crate::balance_map::AssetMap;
use crate::core_types::{Asset, OrderId, Pair};
use crate::models::{OrderStatus, Side};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;

pub type SubscriberId = u64;

#[derive(Debug, Clone)]
pub struct OrderSummary {
    pub id: OrderId,
    pub pair: Pair,
    pub side: Side,
    pub status: OrderStatus,
}

/// Whether a ws order-update carries the full order shell or just a
/// status/filling delta.
#[derive(Debug, Clone)]
pub enum WsOrderDelta {
    Full(OrderSummary),
    StatusOnly { id: OrderId, status: OrderStatus },
}

#[derive(Debug, Clone)]
pub struct WsSnapshot {
    pub balances: HashMap<Asset, (u64, u64)>,
    pub orders: Vec<OrderSummary>,
}

#[derive(Debug, Clone)]
pub struct WsDiff {
    pub balances: HashMap<Asset, (u64, u64)>,
    pub orders: Vec<WsOrderDelta>,
}

#[derive(Debug, Clone)]
pub enum WsPush {
    Snapshot(WsSnapshot),
    Diff(WsDiff),
}

#[derive(serde::Serialize)]
struct WsPushLogLine<'a> {
    kind: &'a str,
    balances: usize,
    orders: usize,
}

impl WsPush {
    /// A JSON summary suitable for a debug log line — not the wire format
    /// itself, since `Asset`'s issued-asset variant isn't a valid JSON map
    /// key, only counts are. Mirrors the teacher's `websocket::connection`
    /// habit of rendering a short JSON blurb of an outgoing message for
    /// `tracing::debug!`.
    pub fn log_summary(&self) -> String {
        let (kind, balances, orders) = match self {
            WsPush::Snapshot(s) => ("snapshot", s.balances.len(), s.orders.len()),
            WsPush::Diff(d) => ("diff", d.balances.len(), d.orders.len()),
        };
        serde_json::to_string(&WsPushLogLine { kind, balances, orders }).unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct WsSubscriber {
    pub id: SubscriberId,
    pub tx: mpsc::UnboundedSender<WsPush>,
}

impl WsSubscriber {
    /// Best-effort send; a failed send means the subscriber is gone and is
    /// dropped by the caller.
    pub fn push(&self, msg: WsPush) -> bool {
        self.tx.send(msg).is_ok()
    }
}

/// Per-account mutable ws state.
#[derive(Default)]
pub struct WsMutableState {
    pub pending: Vec<WsSubscriber>,
    pub active: Vec<WsSubscriber>,
    pub changed_assets: HashSet<Asset>,
    pub order_updates: HashMap<OrderId, WsOrderDelta>,
    pub tracked_orders: HashSet<OrderId>,
    pub scheduler_running: bool,
}

impl WsMutableState {
    pub fn has_subscribers(&self) -> bool {
        !self.pending.is_empty() || !self.active.is_empty()
    }

    pub fn stage_full(&mut self, summary: OrderSummary) {
        self.tracked_orders.insert(summary.id);
        self.order_updates.insert(summary.id, WsOrderDelta::Full(summary));
    }

    /// Stage a status-only delta, or refresh the status of whatever is
    /// already staged for `id` this tick — a `Full` entry keeps carrying the
    /// order shell, but its status must track the latest transition rather
    /// than the one seen when it was first staged.
    pub fn stage_status_only(&mut self, id: OrderId, status: OrderStatus) {
        self.tracked_orders.insert(id);
        match self.order_updates.get_mut(&id) {
            Some(WsOrderDelta::Full(summary)) => summary.status = status,
            Some(WsOrderDelta::StatusOnly { status: s, .. }) => *s = status,
            None => {
                self.order_updates.insert(id, WsOrderDelta::StatusOnly { id, status });
            }
        }
    }

    pub fn has_pending_diff(&self) -> bool {
        !self.changed_assets.is_empty() || !self.order_updates.is_empty()
    }

    pub fn take_diff_orders(&mut self) -> Vec<WsOrderDelta> {
        self.tracked_orders.clear();
        self.order_updates.drain().map(|(_, v)| v).collect()
    }
}
