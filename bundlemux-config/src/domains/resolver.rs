//! Token resolver configuration

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Wildcard-token bypass for development setups.
///
/// When enabled, presenting the configured token grants a synthetic bundle
/// containing every MCP whose auth strategy does not require per-token
/// credentials. This skips all per-bundle scoping, which is why resolution
/// through it always logs at warn level.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ResolverConfig {
    /// Whether the wildcard token is honored at all
    #[serde(default = "super::utils::default_false")]
    pub wildcard_allow: bool,

    /// The wildcard token value; required when `wildcard_allow` is set
    #[serde(default)]
    pub wildcard_token: Option<String>,
}

impl Validatable for ResolverConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.wildcard_allow {
            match &self.wildcard_token {
                Some(token) if !token.is_empty() => {}
                _ => {
                    return Err(self.invalid(
                        "wildcard_token is required when wildcard_allow is enabled",
                    ))
                }
            }
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "resolver"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_wildcard_needs_no_token() {
        assert!(ResolverConfig::default().validate().is_ok());
    }

    #[test]
    fn test_enabled_wildcard_requires_token() {
        let config = ResolverConfig {
            wildcard_allow: true,
            wildcard_token: None,
        };
        assert!(config.validate().is_err());

        let config = ResolverConfig {
            wildcard_allow: true,
            wildcard_token: Some("dev-wildcard".to_string()),
        };
        assert!(config.validate().is_ok());
    }
}
