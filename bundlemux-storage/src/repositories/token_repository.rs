//! Token repository implementation using SeaORM

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};

use bundlemux_api_types::Token;
use bundlemux_interfaces::{CrudRepository, DatabaseError, Repository, TokenRepository};

use crate::connection::DatabaseConnection;
use crate::entities::{tokens, Tokens};

use super::map_db_err;

/// SeaORM implementation of the TokenRepository port
#[derive(Clone)]
pub struct SeaOrmTokenRepository {
    db: DatabaseConnection,
}

impl SeaOrmTokenRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn to_domain(model: tokens::Model) -> Token {
        Token {
            id: model.id,
            bundle_id: model.bundle_id,
            token_hash: model.token_hash,
            name: model.name,
            expires_at: model.expires_at,
            revoked: model.revoked,
            created_at: model.created_at,
        }
    }
}

#[async_trait]
impl Repository for SeaOrmTokenRepository {
    async fn health_check(&self) -> Result<(), DatabaseError> {
        Tokens::find()
            .paginate(self.db.get_connection(), 1)
            .num_items()
            .await
            .map_err(|e| map_db_err("Token repository health check failed", e))?;
        Ok(())
    }
}

#[async_trait]
impl CrudRepository<Token> for SeaOrmTokenRepository {
    async fn create(&self, token: Token) -> Result<Token, DatabaseError> {
        let active = tokens::ActiveModel {
            id: Default::default(),
            bundle_id: Set(token.bundle_id),
            token_hash: Set(token.token_hash.clone()),
            name: Set(token.name.clone()),
            expires_at: Set(token.expires_at),
            revoked: Set(token.revoked),
            created_at: Set(token.created_at),
        };

        let inserted = active
            .insert(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to create token", e))?;

        Ok(Self::to_domain(inserted))
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Token>, DatabaseError> {
        let model = Tokens::find_by_id(id)
            .one(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to find token by id", e))?;
        Ok(model.map(Self::to_domain))
    }

    async fn update(&self, token: Token) -> Result<Token, DatabaseError> {
        let existing = Tokens::find_by_id(token.id)
            .one(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to find token for update", e))?
            .ok_or_else(|| DatabaseError::not_found("token", token.id))?;

        let mut active: tokens::ActiveModel = existing.into();
        active.name = Set(token.name.clone());
        active.expires_at = Set(token.expires_at);
        active.revoked = Set(token.revoked);

        let updated = active
            .update(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to update token", e))?;

        Ok(Self::to_domain(updated))
    }

    async fn delete(&self, id: i32) -> Result<(), DatabaseError> {
        Tokens::delete_by_id(id)
            .exec(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to delete token", e))?;
        Ok(())
    }

    async fn exists(&self, id: i32) -> Result<bool, DatabaseError> {
        let count = Tokens::find()
            .filter(tokens::Column::Id.eq(id))
            .count(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to check token existence", e))?;
        Ok(count > 0)
    }

    async fn count(&self) -> Result<u64, DatabaseError> {
        Tokens::find()
            .count(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to count tokens", e))
    }
}

#[async_trait]
impl TokenRepository for SeaOrmTokenRepository {
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<Token>, DatabaseError> {
        let model = Tokens::find()
            .filter(tokens::Column::TokenHash.eq(token_hash))
            .one(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to find token by hash", e))?;
        Ok(model.map(Self::to_domain))
    }

    async fn list_for_bundle(&self, bundle_id: i32) -> Result<Vec<Token>, DatabaseError> {
        let models = Tokens::find()
            .filter(tokens::Column::BundleId.eq(bundle_id))
            .order_by_desc(tokens::Column::CreatedAt)
            .all(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to list tokens for bundle", e))?;
        Ok(models.into_iter().map(Self::to_domain).collect())
    }

    async fn is_valid(&self, token_id: i32) -> Result<bool, DatabaseError> {
        Ok(self
            .find_by_id(token_id)
            .await?
            .map(|token| token.is_valid_at(Utc::now()))
            .unwrap_or(false))
    }

    async fn revoke(&self, token_id: i32) -> Result<(), DatabaseError> {
        let existing = Tokens::find_by_id(token_id)
            .one(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to find token for revocation", e))?
            .ok_or_else(|| DatabaseError::not_found("token", token_id))?;

        let mut active: tokens::ActiveModel = existing.into();
        active.revoked = Set(true);
        active
            .update(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to revoke token", e))?;
        Ok(())
    }
}
