//! Tracing setup. Mirrors the teacher crate's log-to-file-plus-stdout
//! split, parameterized by a self-contained [`LoggingConfig`] rather than
//! the teacher's `AppConfig` (which this snapshot never actually defines).

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: String,
    pub log_file: String,
    pub log_level: String,
    pub rotation: Rotation,
    pub use_json: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    Hourly,
    Daily,
    Never,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            log_file: "matcher-account-core.log".to_string(),
            log_level: "info".to_string(),
            rotation: Rotation::Never,
            use_json: false,
        }
    }
}

/// Initialize the global tracing subscriber. Returns the
/// [`WorkerGuard`] that must be kept alive for the lifetime of the
/// process so buffered log lines are flushed on shutdown.
pub fn init_tracing(config: &LoggingConfig) -> WorkerGuard {
    let file_appender = match config.rotation {
        Rotation::Hourly => tracing_appender::rolling::hourly(&config.log_dir, &config.log_file),
        Rotation::Daily => tracing_appender::rolling::daily(&config.log_dir, &config.log_file),
        Rotation::Never => tracing_appender::rolling::never(&config.log_dir, &config.log_file),
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).init();
    }

    guard
}
