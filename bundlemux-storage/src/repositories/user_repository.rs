//! User repository implementation using SeaORM
//!
//! The creator chain doubles as the authorization hierarchy: a user may
//! act on a record iff they created it or transitively created its
//! creator. The closure is computed in memory; management principals
//! number in the dozens, not millions.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect, Set,
};
use std::collections::{HashMap, HashSet, VecDeque};

use bundlemux_api_types::User;
use bundlemux_interfaces::{CrudRepository, DatabaseError, Repository, UserRepository};

use crate::connection::DatabaseConnection;
use crate::entities::{users, Users};

use super::map_db_err;

/// SeaORM implementation of the UserRepository port
#[derive(Clone)]
pub struct SeaOrmUserRepository {
    db: DatabaseConnection,
}

impl SeaOrmUserRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn to_domain(model: users::Model) -> User {
        User {
            id: model.id,
            uuid: model.uuid,
            username: model.username,
            password_hash: model.password_hash,
            api_key_hash: model.api_key_hash,
            created_by: model.created_by,
            is_admin: model.is_admin,
            created_at: model.created_at,
            last_login_at: model.last_login_at,
        }
    }
}

#[async_trait]
impl Repository for SeaOrmUserRepository {
    async fn health_check(&self) -> Result<(), DatabaseError> {
        Users::find()
            .limit(1)
            .all(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("User repository health check failed", e))?;
        Ok(())
    }
}

#[async_trait]
impl CrudRepository<User> for SeaOrmUserRepository {
    async fn create(&self, user: User) -> Result<User, DatabaseError> {
        let active = users::ActiveModel {
            id: Default::default(),
            uuid: Set(user.uuid),
            username: Set(user.username.clone()),
            password_hash: Set(user.password_hash.clone()),
            api_key_hash: Set(user.api_key_hash.clone()),
            created_by: Set(user.created_by),
            is_admin: Set(user.is_admin),
            created_at: Set(user.created_at),
            last_login_at: Set(user.last_login_at),
        };

        let inserted = active
            .insert(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to create user", e))?;

        Ok(Self::to_domain(inserted))
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<User>, DatabaseError> {
        let model = Users::find_by_id(id)
            .one(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to find user by id", e))?;
        Ok(model.map(Self::to_domain))
    }

    async fn update(&self, user: User) -> Result<User, DatabaseError> {
        let existing = Users::find_by_id(user.id)
            .one(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to find user for update", e))?
            .ok_or_else(|| DatabaseError::not_found("user", user.id))?;

        let mut active: users::ActiveModel = existing.into();
        active.username = Set(user.username.clone());
        active.is_admin = Set(user.is_admin);
        // Password hash updates only flow through here deliberately
        active.password_hash = Set(user.password_hash.clone());

        let updated = active
            .update(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to update user", e))?;

        Ok(Self::to_domain(updated))
    }

    async fn delete(&self, id: i32) -> Result<(), DatabaseError> {
        Users::delete_by_id(id)
            .exec(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to delete user", e))?;
        Ok(())
    }

    async fn exists(&self, id: i32) -> Result<bool, DatabaseError> {
        let count = Users::find()
            .filter(users::Column::Id.eq(id))
            .count(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to check user existence", e))?;
        Ok(count > 0)
    }

    async fn count(&self) -> Result<u64, DatabaseError> {
        Users::find()
            .count(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to count users", e))
    }
}

#[async_trait]
impl UserRepository for SeaOrmUserRepository {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, DatabaseError> {
        let model = Users::find()
            .filter(users::Column::Username.eq(username))
            .one(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to find user by username", e))?;
        Ok(model.map(Self::to_domain))
    }

    async fn find_by_api_key_hash(
        &self,
        api_key_hash: &str,
    ) -> Result<Option<User>, DatabaseError> {
        let model = Users::find()
            .filter(users::Column::ApiKeyHash.eq(api_key_hash))
            .one(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to find user by api key", e))?;
        Ok(model.map(Self::to_domain))
    }

    async fn update_api_key_hash(
        &self,
        user_id: i32,
        api_key_hash: Option<String>,
    ) -> Result<(), DatabaseError> {
        let existing = Users::find_by_id(user_id)
            .one(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to find user for key rotation", e))?
            .ok_or_else(|| DatabaseError::not_found("user", user_id))?;

        let mut active: users::ActiveModel = existing.into();
        active.api_key_hash = Set(api_key_hash);
        active
            .update(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to rotate api key", e))?;
        Ok(())
    }

    async fn validate_and_update(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Option<User>, DatabaseError> {
        let model = Users::find()
            .filter(users::Column::Username.eq(username))
            .one(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to find user for login", e))?;

        let Some(model) = model else {
            return Ok(None);
        };
        if model.password_hash != password_hash {
            return Ok(None);
        }

        let mut active: users::ActiveModel = model.into();
        active.last_login_at = Set(Some(Utc::now()));
        let updated = active
            .update(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to stamp last login", e))?;

        Ok(Some(Self::to_domain(updated)))
    }

    async fn collect_descendant_ids(&self, user_id: i32) -> Result<Vec<i32>, DatabaseError> {
        let rows: Vec<(i32, Option<i32>)> = Users::find()
            .select_only()
            .column(users::Column::Id)
            .column(users::Column::CreatedBy)
            .into_tuple()
            .all(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to load user hierarchy", e))?;

        let mut children: HashMap<i32, Vec<i32>> = HashMap::new();
        for (id, created_by) in rows {
            if let Some(parent) = created_by {
                children.entry(parent).or_default().push(id);
            }
        }

        let mut descendants = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([user_id]);
        while let Some(current) = queue.pop_front() {
            for &child in children.get(&current).map(Vec::as_slice).unwrap_or(&[]) {
                if seen.insert(child) {
                    descendants.push(child);
                    queue.push_back(child);
                }
            }
        }

        Ok(descendants)
    }

    async fn is_authorized(&self, user_id: i32, created_by: i32) -> Result<bool, DatabaseError> {
        if user_id == created_by {
            return Ok(true);
        }
        let descendants = self.collect_descendant_ids(user_id).await?;
        Ok(descendants.contains(&created_by))
    }
}
