//! Per-token credential repository implementation using SeaORM
//!
//! A credential that fails to decrypt under the fallback policy is treated
//! as absent, which makes the resolver skip the entry rather than attach an
//! upstream with wrong auth.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};

use bundlemux_api_types::{AuthConfig, BundleCredential};
use bundlemux_config::DecryptFailurePolicy;
use bundlemux_core::CredentialVault;
use bundlemux_interfaces::{CredentialRepository, DatabaseError, Repository};

use crate::connection::DatabaseConnection;
use crate::entities::{bundle_credentials, BundleCredentials};

use super::map_db_err;

/// SeaORM implementation of the CredentialRepository port
#[derive(Clone)]
pub struct SeaOrmCredentialRepository {
    db: DatabaseConnection,
    vault: CredentialVault,
    decrypt_failure: DecryptFailurePolicy,
}

impl SeaOrmCredentialRepository {
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

    fn encrypt(&self, auth: &AuthConfig) -> Result<String, DatabaseError> {
        self.vault
            .encrypt_json(auth)
            .map_err(|e| DatabaseError::internal(format!("credential encryption failed: {}", e)))
    }

    /// Decrypt one row. `Ok(None)` means the credential is unusable under
    /// the fallback policy and the caller should treat it as unbound.
    fn decrypt(
        &self,
        model: bundle_credentials::Model,
    ) -> Result<Option<BundleCredential>, DatabaseError> {
        match self.vault.decrypt_json::<AuthConfig>(&model.auth_blob) {
            Ok(auth) => Ok(Some(BundleCredential {
                id: model.id,
                token_id: model.token_id,
                mcp_id: model.mcp_id,
                auth,
                created_at: model.created_at,
            })),
            Err(err) => match self.decrypt_failure {
                DecryptFailurePolicy::FallbackNone => {
                    tracing::error!(
                        credential_id = model.id,
                        error = %err,
                        "credential failed to decrypt; treating as unbound"
                    );
                    Ok(None)
                }
                DecryptFailurePolicy::FailClosed => Err(DatabaseError::Decrypt {
                    entity: "bundle_credential".to_string(),
                    id: model.id.to_string(),
                }),
            },
        }
    }

    async fn find_model(
        &self,
        token_id: i32,
        mcp_id: i32,
    ) -> Result<Option<bundle_credentials::Model>, DatabaseError> {
        BundleCredentials::find()
            .filter(bundle_credentials::Column::TokenId.eq(token_id))
            .filter(bundle_credentials::Column::McpId.eq(mcp_id))
            .one(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to find credential", e))
    }
}

#[async_trait]
impl Repository for SeaOrmCredentialRepository {
    async fn health_check(&self) -> Result<(), DatabaseError> {
        BundleCredentials::find()
            .paginate(self.db.get_connection(), 1)
            .num_items()
            .await
            .map_err(|e| map_db_err("Credential repository health check failed", e))?;
        Ok(())
    }
}

#[async_trait]
impl CredentialRepository for SeaOrmCredentialRepository {
    async fn find_by_token_and_mcp(
        &self,
        token_id: i32,
        mcp_id: i32,
    ) -> Result<Option<BundleCredential>, DatabaseError> {
        match self.find_model(token_id, mcp_id).await? {
            Some(model) => self.decrypt(model),
            None => Ok(None),
        }
    }

    async fn bind(
        &self,
        token_id: i32,
        mcp_id: i32,
        auth: AuthConfig,
    ) -> Result<BundleCredential, DatabaseError> {
        if self.find_model(token_id, mcp_id).await?.is_some() {
            return Err(DatabaseError::Constraint {
                message: format!(
                    "credential already bound for token {} and mcp {}",
                    token_id, mcp_id
                ),
            });
        }

        let active = bundle_credentials::ActiveModel {
            id: Default::default(),
            token_id: Set(token_id),
            mcp_id: Set(mcp_id),
            auth_blob: Set(self.encrypt(&auth)?),
            created_at: Set(Utc::now()),
        };

        let inserted = active
            .insert(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to bind credential", e))?;

        Ok(BundleCredential {
            id: inserted.id,
            token_id: inserted.token_id,
            mcp_id: inserted.mcp_id,
            auth,
            created_at: inserted.created_at,
        })
    }

    async fn update_by_token_and_mcp(
        &self,
        token_id: i32,
        mcp_id: i32,
        auth: AuthConfig,
    ) -> Result<BundleCredential, DatabaseError> {
        let model = self
            .find_model(token_id, mcp_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "bundle_credential".to_string(),
                id: format!("token {} / mcp {}", token_id, mcp_id),
            })?;

        let created_at = model.created_at;
        let id = model.id;
        let mut active: bundle_credentials::ActiveModel = model.into();
        active.auth_blob = Set(self.encrypt(&auth)?);

        active
            .update(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to update credential", e))?;

        Ok(BundleCredential {
            id,
            token_id,
            mcp_id,
            auth,
            created_at,
        })
    }

    async fn remove(&self, token_id: i32, mcp_id: i32) -> Result<(), DatabaseError> {
        BundleCredentials::delete_many()
            .filter(bundle_credentials::Column::TokenId.eq(token_id))
            .filter(bundle_credentials::Column::McpId.eq(mcp_id))
            .exec(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to remove credential", e))?;
        Ok(())
    }

    async fn list_by_token(&self, token_id: i32) -> Result<Vec<BundleCredential>, DatabaseError> {
        let models = BundleCredentials::find()
            .filter(bundle_credentials::Column::TokenId.eq(token_id))
            .all(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to list credentials", e))?;

        let mut credentials = Vec::with_capacity(models.len());
        for model in models {
            if let Some(credential) = self.decrypt(model)? {
                credentials.push(credential);
            }
        }
        Ok(credentials)
    }
}
