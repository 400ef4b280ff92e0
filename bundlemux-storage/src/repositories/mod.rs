//! SeaORM repository implementations
//!
//! Each repository maps entity models to the domain types in
//! `bundlemux-api-types` and implements the corresponding port from
//! `bundlemux-interfaces`. The MCP and credential repositories carry the
//! vault and the configured decrypt-failure policy; nothing outside this
//! module touches ciphertext.

pub mod bundle_repository;
pub mod credential_repository;
pub mod mcp_server_repository;
pub mod token_repository;
pub mod user_repository;

pub use bundle_repository::SeaOrmBundleRepository;
pub use credential_repository::SeaOrmCredentialRepository;
pub use mcp_server_repository::SeaOrmMcpServerRepository;
pub use token_repository::SeaOrmTokenRepository;
pub use user_repository::SeaOrmUserRepository;

use async_trait::async_trait;
use bundlemux_config::DecryptFailurePolicy;
use bundlemux_core::CredentialVault;
use bundlemux_interfaces::{
    BundleRepository, CredentialRepository, DatabaseError, McpServerRepository, Repository,
    RepositoryFactory, TokenRepository, UserRepository,
};

use crate::connection::DatabaseConnection;

/// Translate a SeaORM error, classifying uniqueness violations.
pub(crate) fn map_db_err(context: &str, err: sea_orm::DbErr) -> DatabaseError {
    let message = err.to_string();
    if message.contains("UNIQUE constraint failed") || message.contains("unique constraint") {
        DatabaseError::Constraint { message }
    } else {
        DatabaseError::Internal {
            message: format!("{}: {}", context, message),
        }
    }
}

/// Bundles every repository behind the [`RepositoryFactory`] port.
#[derive(Clone)]
pub struct SeaOrmRepositoryFactory {
    bundles: SeaOrmBundleRepository,
    mcp_servers: SeaOrmMcpServerRepository,
    tokens: SeaOrmTokenRepository,
    credentials: SeaOrmCredentialRepository,
    users: SeaOrmUserRepository,
}

impl SeaOrmRepositoryFactory {
    pub fn new(
        db: DatabaseConnection,
        vault: CredentialVault,
        decrypt_failure: DecryptFailurePolicy,
    ) -> Self {
        Self {
            bundles: SeaOrmBundleRepository::new(db.clone()),
            mcp_servers: SeaOrmMcpServerRepository::new(
                db.clone(),
                vault.clone(),
                decrypt_failure,
            ),
            tokens: SeaOrmTokenRepository::new(db.clone()),
            credentials: SeaOrmCredentialRepository::new(db.clone(), vault, decrypt_failure),
            users: SeaOrmUserRepository::new(db),
        }
    }
}

#[async_trait]
impl RepositoryFactory for SeaOrmRepositoryFactory {
    fn bundles(&self) -> &dyn BundleRepository {
        &self.bundles
    }

    fn mcp_servers(&self) -> &dyn McpServerRepository {
        &self.mcp_servers
    }

    fn tokens(&self) -> &dyn TokenRepository {
        &self.tokens
    }

    fn credentials(&self) -> &dyn CredentialRepository {
        &self.credentials
    }

    fn users(&self) -> &dyn UserRepository {
        &self.users
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        Repository::health_check(&self.users).await
    }
}
