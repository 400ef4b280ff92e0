//! Domain-driven configuration management for bundlemux
//!
//! Configuration is split by functional domain (server, database, gateway,
//! security, resolver, logging), each with serde defaults, a `Validatable`
//! implementation, and environment variable overrides applied by the
//! loader.

pub mod error;
pub mod loader;
pub mod validation;

pub mod domains;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

pub use domains::{
    database::DatabaseConfig,
    gateway::GatewayConfig,
    logging::{LogLevel, LoggingConfig},
    resolver::ResolverConfig,
    security::{DecryptFailurePolicy, SecurityConfig},
    server::ServerConfig,
    BundlemuxConfig,
};
