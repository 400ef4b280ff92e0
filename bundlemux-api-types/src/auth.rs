//! Upstream authentication material
//!
//! `AuthConfig` is the cleartext shape of what the vault encrypts at rest.
//! It only ever crosses the repository boundary in cleartext; persisted rows
//! hold the `nonce:tag:ciphertext` form.

use serde::{Deserialize, Serialize};

/// Default header used by [`AuthConfig::ApiKey`] when none is configured.
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// How to authenticate against an upstream MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AuthConfig {
    /// No authentication
    #[default]
    None,

    /// `Authorization: Bearer <token>`
    Bearer { token: String },

    /// HTTP basic authentication
    Basic { username: String, password: String },

    /// Key sent in a configurable header
    ApiKey {
        key: String,
        #[serde(default = "default_api_key_header")]
        header: String,
    },
}

fn default_api_key_header() -> String {
    DEFAULT_API_KEY_HEADER.to_string()
}

impl AuthConfig {
    /// Whether this config carries secret material.
    pub fn has_secrets(&self) -> bool {
        !matches!(self, AuthConfig::None)
    }

    /// Short tag for logging. Never exposes secret fields.
    pub fn method_name(&self) -> &'static str {
        match self {
            AuthConfig::None => "none",
            AuthConfig::Bearer { .. } => "bearer",
            AuthConfig::Basic { .. } => "basic",
            AuthConfig::ApiKey { .. } => "api_key",
        }
    }
}
