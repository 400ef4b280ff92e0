//! Database configuration

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::utils::serde_duration;

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL (SQLite by default)
    #[serde(default = "default_url")]
    pub url: String,

    /// Maximum pool connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connection acquisition timeout
    #[serde(with = "serde_duration", default = "default_connection_timeout")]
    pub connection_timeout: Duration,

    /// Run migrations automatically on startup
    #[serde(default = "super::utils::default_true")]
    pub migrate_on_startup: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_connections: default_max_connections(),
            connection_timeout: default_connection_timeout(),
            migrate_on_startup: true,
        }
    }
}

impl Validatable for DatabaseConfig {
    fn validate(&self) -> ConfigResult<()> {
        let domain = self.domain_name();
        crate::validation::require_non_empty(domain, "url", &self.url)?;
        crate::validation::require_positive(
            domain,
            "max_connections",
            self.max_connections as u64,
        )?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "database"
    }
}

fn default_url() -> String {
    "sqlite://bundlemux.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_connection_timeout() -> Duration {
    Duration::from_secs(30)
}
