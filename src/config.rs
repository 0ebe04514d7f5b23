//! Controller configuration
//!
//! Every setting is a CLI flag with an environment override, so the same
//! binary runs from a terminal or from a Deployment manifest.

use std::time::Duration;

use clap::Args;

use crate::telemetry::LogFormat;

/// Longest delay the error policy will back off to
pub const MAX_ERROR_BACKOFF: Duration = Duration::from_secs(300);

/// Settings for the Directus controller
#[derive(Args, Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Only watch Directus resources in this namespace (default: all namespaces)
    #[arg(long, env = "DIRECTUS_WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Seconds between periodic resyncs of a healthy Directus
    #[arg(long, env = "DIRECTUS_REQUEUE_SECS", default_value_t = 300)]
    pub requeue_secs: u64,

    /// Base delay in seconds before retrying a failed pass
    #[arg(long, env = "DIRECTUS_ERROR_REQUEUE_SECS", default_value_t = 5)]
    pub error_requeue_secs: u64,

    /// Time budget in seconds for a single reconciliation pass
    #[arg(long, env = "DIRECTUS_RECONCILE_TIMEOUT_SECS", default_value_t = 60)]
    pub reconcile_timeout_secs: u64,

    /// Log output format
    #[arg(long, env = "DIRECTUS_LOG_FORMAT", value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            requeue_secs: 300,
            error_requeue_secs: 5,
            reconcile_timeout_secs: 60,
            log_format: LogFormat::Plain,
        }
    }
}

impl ControllerConfig {
    /// Periodic resync interval
    pub fn requeue_interval(&self) -> Duration {
        Duration::from_secs(self.requeue_secs)
    }

    /// Time budget for one pass
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    /// Retry delay after `failures` consecutive failed passes
    ///
    /// Doubles from the base delay and is capped at [`MAX_ERROR_BACKOFF`].
    pub fn error_backoff(&self, failures: u32) -> Duration {
        let base = Duration::from_secs(self.error_requeue_secs.max(1));
        let factor = 2u32.saturating_pow(failures.saturating_sub(1));
        base.saturating_mul(factor).min(MAX_ERROR_BACKOFF)
    }
}
