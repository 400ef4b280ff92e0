//! Configuration loading and environment variable handling
//!
//! The resolver wildcard variables (`RESOLVER_WILDCARD_ALLOW`,
//! `RESOLVER_WILDCARD_TOKEN`) are read unprefixed because they are part of
//! the gateway's public contract; everything else uses the `BUNDLEMUX_`
//! prefix. The vault reads `ENCRYPTION_KEY` itself.

use crate::domains::BundlemuxConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;
use std::str::FromStr;

/// Environment variable enabling the wildcard token.
pub const RESOLVER_WILDCARD_ALLOW_VAR: &str = "RESOLVER_WILDCARD_ALLOW";

/// Environment variable holding the wildcard token value.
pub const RESOLVER_WILDCARD_TOKEN_VAR: &str = "RESOLVER_WILDCARD_TOKEN";

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "BUNDLEMUX".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<BundlemuxConfig> {
        let content = std::fs::read_to_string(path)?;
        let mut config: BundlemuxConfig = serde_yaml::from_str(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<BundlemuxConfig> {
        let mut config = BundlemuxConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<BundlemuxConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut BundlemuxConfig) -> ConfigResult<()> {
        if let Ok(bind) = self.get_env_var("SERVER_BIND_ADDRESS") {
            config.server.bind_address = bind;
        }

        if let Ok(port) = self.get_env_var("SERVER_PORT") {
            config.server.port = port
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid SERVER_PORT: {}", e)))?;
        }

        if let Ok(url) = self.get_env_var("DATABASE_URL") {
            config.database.url = url;
        }

        if let Ok(level) = self.get_env_var("LOG_LEVEL") {
            config.logging.level = crate::domains::logging::LogLevel::from_str(&level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", level)))?;
        }

        if let Ok(idle) = self.get_env_var("IDLE_TIMEOUT_SECONDS") {
            let seconds: u64 = idle.parse().map_err(|e| {
                ConfigError::EnvError(format!("Invalid IDLE_TIMEOUT_SECONDS: {}", e))
            })?;
            config.gateway.idle_timeout = std::time::Duration::from_secs(seconds);
        }

        if let Ok(production) = self.get_env_var("PRODUCTION") {
            config.security.production = production
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid PRODUCTION: {}", e)))?;
        }

        // Wildcard variables are part of the public contract, unprefixed
        if let Ok(allow) = std::env::var(RESOLVER_WILDCARD_ALLOW_VAR) {
            config.resolver.wildcard_allow = allow.parse().map_err(|e| {
                ConfigError::EnvError(format!("Invalid {}: {}", RESOLVER_WILDCARD_ALLOW_VAR, e))
            })?;
        }

        if let Ok(token) = std::env::var(RESOLVER_WILDCARD_TOKEN_VAR) {
            config.resolver.wildcard_token = Some(token);
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "server:\n  port: 4000\ngateway:\n  idle_timeout: 60\n"
        )
        .unwrap();

        let config = ConfigLoader::new().from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.gateway.idle_timeout.as_secs(), 60);
        // Untouched domains keep defaults
        assert_eq!(config.server.bind_address, "127.0.0.1");
    }

    #[test]
    fn test_invalid_yaml_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server: [not-a-map").unwrap();
        assert!(ConfigLoader::new().from_file(file.path()).is_err());
    }
}
