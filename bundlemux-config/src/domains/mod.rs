//! Domain-specific configuration modules

pub mod database;
pub mod gateway;
pub mod logging;
pub mod resolver;
pub mod security;
pub mod server;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main bundlemux configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BundlemuxConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: server::ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: database::DatabaseConfig,

    /// Gateway session behavior
    #[serde(default)]
    pub gateway: gateway::GatewayConfig,

    /// Encryption and credential handling
    #[serde(default)]
    pub security: security::SecurityConfig,

    /// Token resolver behavior (wildcard bypass)
    #[serde(default)]
    pub resolver: resolver::ResolverConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl BundlemuxConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.server.validate()?;
        self.database.validate()?;
        self.gateway.validate()?;
        self.security.validate()?;
        self.resolver.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
