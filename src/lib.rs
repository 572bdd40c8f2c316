//! matcher-account-core — the per-account order lifecycle actor of a
//! decentralized exchange matcher.
//!
//! # Modules
//!
//! - [`core_types`] — opaque binary identifiers (`Address`, `OrderId`, `Asset`)
//! - [`balance_map`] — `AssetMap` arithmetic (the reserved-volume ledger's algebra)
//! - [`models`] — `Order`, `AcceptedOrder`, `OrderStatus`
//! - [`error`] — client-facing error taxonomy
//! - [`config`] — runtime configuration
//! - [`logging`] — tracing setup
//! - [`chain`] — on-chain node client collaborator
//! - [`store`] — durable event log collaborator
//! - [`orderdb`] — order history read-model collaborator
//! - [`oracle`] — [`BalanceOracle`](oracle), the process-wide balance cache
//! - [`account`] — the [`AccountActor`](account::actor), one per trading address
//! - [`directory`] — routes commands/events to the right account actor

pub mod account;
pub mod balance_map;
pub mod chain;
pub mod config;
pub mod core_types;
pub mod directory;
pub mod error;
pub mod logging;
pub mod models;
pub mod oracle;
pub mod orderdb;
pub mod store;

pub use account::{AccountHandle};
pub use balance_map::AssetMap;
pub use config::MatcherConfig;
pub use core_types::{Address, Asset, OrderId, Pair};
pub use directory::Directory;
pub use error::{ChainError, MatcherError};
pub use models::{AcceptedOrder, FillState, Order, OrderStatus, Side};
pub use oracle::BalanceOracleHandle;
