//! Domain aggregates persisted by the storage layer
//!
//! Integer ids are the storage primary keys; every externally visible
//! aggregate also carries a UUID for API addressing. Ownership follows the
//! data model: a bundle exclusively owns its entries and tokens, MCP servers
//! are shared and outlive every referring row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthConfig;
use crate::enums::AuthStrategy;
use crate::permissions::McpPermissions;

/// A named, permission-scoped collection of upstream MCPs presented to
/// clients as one virtual server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    pub id: i32,
    pub uuid: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// User who created the bundle; gates mutation via the hierarchy check
    pub created_by: i32,
    pub created_at: DateTime<Utc>,
    /// Entries in attachment order
    pub entries: Vec<BundleEntry>,
}

/// Join row between a bundle and an MCP server, carrying the allow-lists.
///
/// `(bundle_id, mcp_id)` is unique within a bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleEntry {
    pub id: i32,
    pub bundle_id: i32,
    pub mcp_id: i32,
    pub permissions: McpPermissions,
    /// Position within the bundle; defines catalog aggregation order
    pub position: i32,
}

/// A globally-named upstream MCP definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServer {
    pub id: i32,
    pub uuid: Uuid,
    /// Globally unique short identifier scoping this server's capabilities
    pub namespace: String,
    pub url: String,
    pub version: String,
    /// Whether one connector may be shared across sessions
    pub stateless: bool,
    pub auth_strategy: AuthStrategy,
    /// Cleartext only in memory; the storage layer persists the encrypted
    /// form and decrypts on read. Present iff strategy is `Master`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    pub created_by: i32,
    pub created_at: DateTime<Utc>,
}

/// A bundle access token record. The opaque token string itself is never
/// stored; only its SHA-256 hash survives issuance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: i32,
    pub bundle_id: i32,
    pub token_hash: String,
    pub name: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl Token {
    /// A token is valid iff not revoked and not past its expiry.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at.map(|at| at > now).unwrap_or(true)
    }
}

/// The one-time response to token issuance: the only moment the cleartext
/// token exists outside the caller's hands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub record: Token,
    /// Cleartext `mcpb_...` token; shown once, never persisted
    pub token: String,
}

/// Per-(token, mcp) credential for `UserSet` upstreams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleCredential {
    pub id: i32,
    pub token_id: i32,
    pub mcp_id: i32,
    /// Cleartext only in memory, encrypted at rest
    pub auth: AuthConfig,
    pub created_at: DateTime<Utc>,
}

/// A management-API principal. Creator chains (`created_by`) define the
/// authorization hierarchy: a user may mutate records created by themselves
/// or by any transitive creation descendant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i32,
    pub uuid: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// SHA-256 of the user's current management API key, if one is issued
    #[serde(skip_serializing)]
    pub api_key_hash: Option<String>,
    pub created_by: Option<i32>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

// === Management API request shapes ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBundleRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// `(mcp namespace, permissions)` pairs in attachment order
    pub entries: Vec<BundleEntryRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleEntryRequest {
    pub namespace: String,
    #[serde(default)]
    pub permissions: McpPermissions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateBundleRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub entries: Option<Vec<BundleEntryRequest>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMcpServerRequest {
    pub namespace: String,
    pub url: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub stateless: bool,
    #[serde(default)]
    pub auth_strategy: AuthStrategy,
    /// Required when strategy is `master`
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateMcpServerRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub stateless: Option<bool>,
    #[serde(default)]
    pub auth_strategy: Option<AuthStrategy>,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
}

fn default_version() -> String {
    "1.0.0".to_string()
}
