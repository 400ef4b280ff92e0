//! MCP server repository implementation using SeaORM
//!
//! Auth material crosses this boundary in cleartext only: writes encrypt
//! through the vault, reads decrypt and apply the configured failure
//! policy. Legacy cleartext rows (pre-encryption) are recognized by shape
//! and parsed directly.

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};

use bundlemux_api_types::{AuthConfig, McpServer};
use bundlemux_config::DecryptFailurePolicy;
use bundlemux_core::{looks_encrypted, CredentialVault};
use bundlemux_interfaces::{CrudRepository, DatabaseError, McpServerRepository, Repository};

use crate::connection::DatabaseConnection;
use crate::entities::{mcp_servers, McpServers};

use super::map_db_err;

/// SeaORM implementation of the McpServerRepository port
#[derive(Clone)]
pub struct SeaOrmMcpServerRepository {
    db: DatabaseConnection,
    vault: CredentialVault,
    decrypt_failure: DecryptFailurePolicy,
}

impl SeaOrmMcpServerRepository {
    pub fn new(
        db: DatabaseConnection,
        vault: CredentialVault,
        decrypt_failure: DecryptFailurePolicy,
    ) -> Self {
        Self {
            db,
            vault,
            decrypt_failure,
        }
    }

    fn encrypt_auth(&self, auth: &Option<AuthConfig>) -> Result<Option<String>, DatabaseError> {
        match auth {
            Some(config) => self
                .vault
                .encrypt_json(config)
                .map(Some)
                .map_err(|e| DatabaseError::internal(format!("auth encryption failed: {}", e))),
            None => Ok(None),
        }
    }

    fn decrypt_auth(&self, model: &mcp_servers::Model) -> Result<Option<AuthConfig>, DatabaseError> {
        let Some(blob) = &model.auth_blob else {
            return Ok(None);
        };

        if !looks_encrypted(blob) {
            // Row predates at-rest encryption
            return serde_json::from_str(blob).map(Some).map_err(|err| {
                tracing::warn!(mcp_id = model.id, error = %err, "cleartext auth blob failed to parse");
                DatabaseError::Decrypt {
                    entity: "mcp_server".to_string(),
                    id: model.id.to_string(),
                }
            });
        }

        match self.vault.decrypt_json::<AuthConfig>(blob) {
            Ok(config) => Ok(Some(config)),
            Err(err) => match self.decrypt_failure {
                DecryptFailurePolicy::FallbackNone => {
                    tracing::error!(
                        mcp_id = model.id,
                        error = %err,
                        "auth blob failed to decrypt; substituting unauthenticated config"
                    );
                    Ok(Some(AuthConfig::None))
                }
                DecryptFailurePolicy::FailClosed => Err(DatabaseError::Decrypt {
                    entity: "mcp_server".to_string(),
                    id: model.id.to_string(),
                }),
            },
        }
    }

    fn to_domain(&self, model: mcp_servers::Model) -> Result<McpServer, DatabaseError> {
        let auth = self.decrypt_auth(&model)?;
        Ok(McpServer {
            id: model.id,
            uuid: model.uuid,
            namespace: model.namespace,
            url: model.url,
            version: model.version,
            stateless: model.stateless,
            auth_strategy: model.auth_strategy.into(),
            auth,
            created_by: model.created_by,
            created_at: model.created_at,
        })
    }
}

#[async_trait]
impl Repository for SeaOrmMcpServerRepository {
    async fn health_check(&self) -> Result<(), DatabaseError> {
        McpServers::find()
            .paginate(self.db.get_connection(), 1)
            .num_items()
            .await
            .map_err(|e| map_db_err("MCP server repository health check failed", e))?;
        Ok(())
    }
}

#[async_trait]
impl CrudRepository<McpServer> for SeaOrmMcpServerRepository {
    async fn create(&self, server: McpServer) -> Result<McpServer, DatabaseError> {
        let auth_blob = self.encrypt_auth(&server.auth)?;

        let active = mcp_servers::ActiveModel {
            id: Default::default(),
            uuid: Set(server.uuid),
            namespace: Set(server.namespace.clone()),
            url: Set(server.url.clone()),
            version: Set(server.version.clone()),
            stateless: Set(server.stateless),
            auth_strategy: Set(server.auth_strategy.into()),
            auth_blob: Set(auth_blob),
            created_by: Set(server.created_by),
            created_at: Set(server.created_at),
        };

        let inserted = active
            .insert(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to create MCP server", e))?;

        self.to_domain(inserted)
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<McpServer>, DatabaseError> {
        let model = McpServers::find_by_id(id)
            .one(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to find MCP server by id", e))?;

        model.map(|m| self.to_domain(m)).transpose()
    }

    async fn update(&self, server: McpServer) -> Result<McpServer, DatabaseError> {
        let existing = McpServers::find_by_id(server.id)
            .one(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to find MCP server for update", e))?
            .ok_or_else(|| DatabaseError::not_found("mcp_server", server.id))?;

        let mut active: mcp_servers::ActiveModel = existing.into();
        active.url = Set(server.url.clone());
        active.version = Set(server.version.clone());
        active.stateless = Set(server.stateless);
        active.auth_strategy = Set(server.auth_strategy.into());
        active.auth_blob = Set(self.encrypt_auth(&server.auth)?);

        let updated = active
            .update(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to update MCP server", e))?;

        self.to_domain(updated)
    }

    async fn delete(&self, id: i32) -> Result<(), DatabaseError> {
        McpServers::delete_by_id(id)
            .exec(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to delete MCP server", e))?;
        Ok(())
    }

    async fn exists(&self, id: i32) -> Result<bool, DatabaseError> {
        let count = McpServers::find()
            .filter(mcp_servers::Column::Id.eq(id))
            .count(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to check MCP server existence", e))?;
        Ok(count > 0)
    }

    async fn count(&self) -> Result<u64, DatabaseError> {
        McpServers::find()
            .count(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to count MCP servers", e))
    }
}

#[async_trait]
impl McpServerRepository for SeaOrmMcpServerRepository {
    async fn find_by_namespace(&self, namespace: &str) -> Result<Option<McpServer>, DatabaseError> {
        let model = McpServers::find()
            .filter(mcp_servers::Column::Namespace.eq(namespace))
            .one(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to find MCP server by namespace", e))?;

        model.map(|m| self.to_domain(m)).transpose()
    }

    async fn list_all(&self) -> Result<Vec<McpServer>, DatabaseError> {
        let models = McpServers::find()
            .order_by_asc(mcp_servers::Column::Namespace)
            .all(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to list MCP servers", e))?;

        models.into_iter().map(|m| self.to_domain(m)).collect()
    }

    async fn find_by_creators(&self, creator_ids: &[i32]) -> Result<Vec<McpServer>, DatabaseError> {
        if creator_ids.is_empty() {
            return Ok(Vec::new());
        }

        let models = McpServers::find()
            .filter(mcp_servers::Column::CreatedBy.is_in(creator_ids.iter().copied()))
            .order_by_asc(mcp_servers::Column::Namespace)
            .all(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to list MCP servers by creators", e))?;

        models.into_iter().map(|m| self.to_domain(m)).collect()
    }

    async fn delete_by_creators(&self, creator_ids: &[i32]) -> Result<u64, DatabaseError> {
        if creator_ids.is_empty() {
            return Ok(0);
        }

        let result = McpServers::delete_many()
            .filter(mcp_servers::Column::CreatedBy.is_in(creator_ids.iter().copied()))
            .exec(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to delete MCP servers by creators", e))?;
        Ok(result.rows_affected)
    }
}
