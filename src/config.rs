//! Matcher configuration, loadable from a YAML file the way the teacher
//! crate loads its trading configuration.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_max_active_orders() -> usize {
    200
}

fn default_ws_messages_interval_ms() -> u64 {
    100
}

fn default_batch_cancel_timeout_secs() -> u64 {
    20
}

fn default_expiration_threshold_ms() -> u64 {
    50
}

fn default_balance_ask_timeout_secs() -> u64 {
    5
}

/// Runtime configuration for an [`crate::account::AccountActor`] /
/// [`crate::directory::Directory`] deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Historical default: 200.
    #[serde(default = "default_max_active_orders")]
    pub max_active_orders: usize,

    /// Diff-broadcast tick interval, default 100ms.
    #[serde(default = "default_ws_messages_interval_ms")]
    pub ws_messages_interval_ms: u64,

    /// Timeout for the `CancelAllOrders` batch sub-actor, default 20s.
    #[serde(default = "default_batch_cancel_timeout_secs")]
    pub batch_cancel_timeout_secs: u64,

    /// How close to expiration a firing timer must be before it actually
    /// cancels, default 50ms.
    #[serde(default = "default_expiration_threshold_ms")]
    pub expiration_threshold_ms: u64,

    /// Ask-timeout for `GetTradableBalance`'s round trip to the
    /// `BalanceOracle`, default 5s.
    #[serde(default = "default_balance_ask_timeout_secs")]
    pub balance_ask_timeout_secs: u64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_active_orders: default_max_active_orders(),
            ws_messages_interval_ms: default_ws_messages_interval_ms(),
            batch_cancel_timeout_secs: default_batch_cancel_timeout_secs(),
            expiration_threshold_ms: default_expiration_threshold_ms(),
            balance_ask_timeout_secs: default_balance_ask_timeout_secs(),
        }
    }
}

impl MatcherConfig {
    pub fn from_yaml(s: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(s)
    }

    /// Load configuration from a YAML file on disk, as a deployment would
    /// at startup (the in-memory [`Self::from_yaml`] above is what the test
    /// suite uses instead).
    pub fn load_from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading matcher config from {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("parsing matcher config at {}", path.display()))
    }

    pub fn ws_messages_interval(&self) -> Duration {
        Duration::from_millis(self.ws_messages_interval_ms)
    }

    pub fn batch_cancel_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_cancel_timeout_secs)
    }

    pub fn expiration_threshold(&self) -> Duration {
        Duration::from_millis(self.expiration_threshold_ms)
    }

    pub fn balance_ask_timeout(&self) -> Duration {
        Duration::from_secs(self.balance_ask_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = MatcherConfig::default();
        assert_eq!(cfg.max_active_orders, 200);
        assert_eq!(cfg.ws_messages_interval(), Duration::from_millis(100));
        assert_eq!(cfg.batch_cancel_timeout(), Duration::from_secs(20));
        assert_eq!(cfg.expiration_threshold(), Duration::from_millis(50));
        assert_eq!(cfg.balance_ask_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn loads_partial_yaml_with_defaults() {
        let cfg = MatcherConfig::from_yaml("max_active_orders: 50\n").unwrap();
        assert_eq!(cfg.max_active_orders, 50);
        assert_eq!(cfg.ws_messages_interval_ms, 100);
    }
}
