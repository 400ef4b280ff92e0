//! Encryption and credential handling configuration

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// What repositories do when a stored credential fails to decrypt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecryptFailurePolicy {
    /// Log and substitute an unauthenticated config. Matches historical
    /// behavior but hides key-rotation mistakes.
    FallbackNone,

    /// Propagate the decryption error to the caller.
    FailClosed,
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Whether this process runs with production guarantees: the
    /// encryption secret becomes mandatory and decrypt failures default to
    /// fail-closed
    #[serde(default = "super::utils::default_false")]
    pub production: bool,

    /// Decrypt failure handling; defaults follow `production`
    #[serde(default)]
    pub decrypt_failure: Option<DecryptFailurePolicy>,
}

impl SecurityConfig {
    /// Effective decrypt-failure policy after applying the
    /// production-dependent default.
    pub fn decrypt_failure_policy(&self) -> DecryptFailurePolicy {
        self.decrypt_failure.unwrap_or(if self.production {
            DecryptFailurePolicy::FailClosed
        } else {
            DecryptFailurePolicy::FallbackNone
        })
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            production: false,
            decrypt_failure: None,
        }
    }
}

impl Validatable for SecurityConfig {
    fn validate(&self) -> ConfigResult<()> {
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "security"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_follows_production_flag() {
        let dev = SecurityConfig::default();
        assert_eq!(dev.decrypt_failure_policy(), DecryptFailurePolicy::FallbackNone);

        let prod = SecurityConfig {
            production: true,
            decrypt_failure: None,
        };
        assert_eq!(prod.decrypt_failure_policy(), DecryptFailurePolicy::FailClosed);
    }

    #[test]
    fn test_explicit_policy_wins() {
        let config = SecurityConfig {
            production: true,
            decrypt_failure: Some(DecryptFailurePolicy::FallbackNone),
        };
        assert_eq!(
            config.decrypt_failure_policy(),
            DecryptFailurePolicy::FallbackNone
        );
    }
}
