//! Database repository interfaces
//!
//! One generic CRUD contract plus per-aggregate query traits. Implementations
//! are the sole gatekeeper of at-rest encryption: they accept cleartext
//! [`AuthConfig`] values on write and return cleartext on read, so nothing
//! above this seam ever sees a ciphertext blob.

use async_trait::async_trait;
use bundlemux_api_types::{
    AuthConfig, Bundle, BundleCredential, McpServer, Token, User,
};
use uuid::Uuid;

/// Common database error type
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Constraint violation: {message}")]
    Constraint { message: String },

    #[error("Credential decryption failed for {entity} {id}")]
    Decrypt { entity: String, id: String },

    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Internal database error: {message}")]
    Internal { message: String },
}

impl DatabaseError {
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Base repository trait with health check capability
#[async_trait]
pub trait Repository: Send + Sync {
    /// Check if the repository is healthy and can serve requests
    async fn health_check(&self) -> Result<(), DatabaseError>;
}

/// Generic CRUD repository trait
#[async_trait]
pub trait CrudRepository<T>: Repository {
    /// Create a new entity
    async fn create(&self, entity: T) -> Result<T, DatabaseError>;

    /// Find entity by integer ID
    async fn find_by_id(&self, id: i32) -> Result<Option<T>, DatabaseError>;

    /// Update an existing entity
    async fn update(&self, entity: T) -> Result<T, DatabaseError>;

    /// Delete entity by ID
    async fn delete(&self, id: i32) -> Result<(), DatabaseError>;

    /// Check whether an entity with this ID exists
    async fn exists(&self, id: i32) -> Result<bool, DatabaseError>;

    /// Get total count of entities
    async fn count(&self) -> Result<u64, DatabaseError>;
}

// =============================================================================
// Bundle Repository
// =============================================================================

/// Bundle repository interface. Bundles load and persist as aggregates:
/// their entries travel with them, and deletion cascades to entries and
/// tokens.
#[async_trait]
pub trait BundleRepository: CrudRepository<Bundle> {
    /// Find a bundle by its public UUID
    async fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<Bundle>, DatabaseError>;

    /// List bundles created by any of the given users
    async fn list_by_creators(&self, creator_ids: &[i32]) -> Result<Vec<Bundle>, DatabaseError>;
}

// =============================================================================
// MCP Server Repository
// =============================================================================

/// Upstream MCP definition repository interface
#[async_trait]
pub trait McpServerRepository: CrudRepository<McpServer> {
    /// Find a server by its globally-unique namespace
    async fn find_by_namespace(&self, namespace: &str) -> Result<Option<McpServer>, DatabaseError>;

    /// List every registered server
    async fn list_all(&self) -> Result<Vec<McpServer>, DatabaseError>;

    /// List servers created by any of the given users
    async fn find_by_creators(&self, creator_ids: &[i32]) -> Result<Vec<McpServer>, DatabaseError>;

    /// Delete every server created by any of the given users; returns the
    /// number of rows removed
    async fn delete_by_creators(&self, creator_ids: &[i32]) -> Result<u64, DatabaseError>;
}

// =============================================================================
// Token Repository
// =============================================================================

/// Bundle token repository interface. Only hashes are stored; lookups take
/// the SHA-256 hex digest of the presented token.
#[async_trait]
pub trait TokenRepository: CrudRepository<Token> {
    /// Find a token record by hash
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<Token>, DatabaseError>;

    /// List all tokens issued for a bundle
    async fn list_for_bundle(&self, bundle_id: i32) -> Result<Vec<Token>, DatabaseError>;

    /// Whether the token is currently valid (not revoked, not expired)
    async fn is_valid(&self, token_id: i32) -> Result<bool, DatabaseError>;

    /// Mark a token revoked
    async fn revoke(&self, token_id: i32) -> Result<(), DatabaseError>;
}

// =============================================================================
// Credential Repository
// =============================================================================

/// Per-(token, mcp) credential repository interface for `UserSet`
/// upstreams. One credential per pair.
#[async_trait]
pub trait CredentialRepository: Repository {
    /// Load the credential bound to `(token, mcp)`, decrypted
    async fn find_by_token_and_mcp(
        &self,
        token_id: i32,
        mcp_id: i32,
    ) -> Result<Option<BundleCredential>, DatabaseError>;

    /// Bind a fresh credential to `(token, mcp)`; fails with
    /// [`DatabaseError::Constraint`] when one already exists
    async fn bind(
        &self,
        token_id: i32,
        mcp_id: i32,
        auth: AuthConfig,
    ) -> Result<BundleCredential, DatabaseError>;

    /// Replace the credential bound to `(token, mcp)`
    async fn update_by_token_and_mcp(
        &self,
        token_id: i32,
        mcp_id: i32,
        auth: AuthConfig,
    ) -> Result<BundleCredential, DatabaseError>;

    /// Remove the credential bound to `(token, mcp)`
    async fn remove(&self, token_id: i32, mcp_id: i32) -> Result<(), DatabaseError>;

    /// List every credential bound to a token
    async fn list_by_token(&self, token_id: i32) -> Result<Vec<BundleCredential>, DatabaseError>;
}

// =============================================================================
// User Repository
// =============================================================================

/// Management principal repository interface. Creator chains double as the
/// authorization hierarchy.
#[async_trait]
pub trait UserRepository: CrudRepository<User> {
    /// Find a user by username
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, DatabaseError>;

    /// Find a user by the hash of their management API key
    async fn find_by_api_key_hash(&self, api_key_hash: &str)
        -> Result<Option<User>, DatabaseError>;

    /// Replace (or clear) a user's management API key hash
    async fn update_api_key_hash(
        &self,
        user_id: i32,
        api_key_hash: Option<String>,
    ) -> Result<(), DatabaseError>;

    /// Check credentials and stamp `last_login_at` on success
    async fn validate_and_update(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Option<User>, DatabaseError>;

    /// Transitive closure of users created by `user_id` (excluding the
    /// user themselves)
    async fn collect_descendant_ids(&self, user_id: i32) -> Result<Vec<i32>, DatabaseError>;

    /// Authorization predicate: `user_id` may act on a record iff they
    /// created it or transitively created its creator
    async fn is_authorized(&self, user_id: i32, created_by: i32) -> Result<bool, DatabaseError>;
}

// =============================================================================
// Repository Factory
// =============================================================================

/// Factory trait for obtaining repository instances
#[async_trait]
pub trait RepositoryFactory: Send + Sync {
    fn bundles(&self) -> &dyn BundleRepository;

    fn mcp_servers(&self) -> &dyn McpServerRepository;

    fn tokens(&self) -> &dyn TokenRepository;

    fn credentials(&self) -> &dyn CredentialRepository;

    fn users(&self) -> &dyn UserRepository;

    /// Check health of all repositories
    async fn health_check(&self) -> Result<(), DatabaseError>;
}
