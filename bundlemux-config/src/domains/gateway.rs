//! Gateway session behavior

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::utils::{serde_duration, serde_duration_ms};

/// Session lifecycle and upstream connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Idle threshold after which a session shuts itself down
    #[serde(with = "serde_duration", default = "default_idle_timeout")]
    pub idle_timeout: Duration,

    /// How often the idle monitor compares now against last activity
    #[serde(with = "serde_duration_ms", default = "default_idle_check_interval")]
    pub idle_check_interval: Duration,

    /// Watchdog budget for a single upstream connect
    #[serde(with = "serde_duration", default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Per-request budget for upstream operations
    #[serde(with = "serde_duration", default = "default_request_timeout")]
    pub request_timeout: Duration,

    /// Hash mode for capability renaming: "never", "threshold" or "always"
    #[serde(default = "default_hash_mode")]
    pub hash_mode: String,

    /// Length threshold above which renamed capabilities are hashed
    #[serde(default = "default_name_threshold")]
    pub name_threshold: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            idle_timeout: default_idle_timeout(),
            idle_check_interval: default_idle_check_interval(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            hash_mode: default_hash_mode(),
            name_threshold: default_name_threshold(),
        }
    }
}

impl Validatable for GatewayConfig {
    fn validate(&self) -> ConfigResult<()> {
        let domain = self.domain_name();
        crate::validation::one_of(
            domain,
            "hash_mode",
            &self.hash_mode,
            &["never", "threshold", "always"],
        )?;
        crate::validation::require_positive(domain, "idle_timeout", self.idle_timeout.as_secs())?;
        crate::validation::require_positive(
            domain,
            "idle_check_interval",
            self.idle_check_interval.as_millis() as u64,
        )?;
        crate::validation::require_positive(domain, "name_threshold", self.name_threshold as u64)?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "gateway"
    }
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(20 * 60)
}

fn default_idle_check_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_hash_mode() -> String {
    "threshold".to_string()
}

fn default_name_threshold() -> usize {
    64
}
