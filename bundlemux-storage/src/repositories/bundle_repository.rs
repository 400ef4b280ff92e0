//! Bundle repository implementation using SeaORM
//!
//! Bundles are aggregates: reads hydrate the entries in position order and
//! writes replace them wholesale. Row-level cascade handles entry and
//! token cleanup on delete.

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use bundlemux_api_types::{Bundle, BundleEntry, McpPermissions};
use bundlemux_interfaces::{BundleRepository, CrudRepository, DatabaseError, Repository};

use crate::connection::DatabaseConnection;
use crate::entities::{bundle_entries, bundles, BundleEntries, Bundles};

use super::map_db_err;

/// SeaORM implementation of the BundleRepository port
#[derive(Clone)]
pub struct SeaOrmBundleRepository {
    db: DatabaseConnection,
}

impl SeaOrmBundleRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn parse_patterns(raw: &str, entry_id: i32, field: &str) -> Vec<String> {
        serde_json::from_str(raw).unwrap_or_else(|err| {
            tracing::warn!(entry_id, field, error = %err, "stored allow-list is not a JSON array; treating as empty");
            Vec::new()
        })
    }

    fn to_domain_entry(model: bundle_entries::Model) -> BundleEntry {
        let permissions = McpPermissions {
            allowed_tools: Self::parse_patterns(&model.allowed_tools, model.id, "allowed_tools"),
            allowed_resources: Self::parse_patterns(
                &model.allowed_resources,
                model.id,
                "allowed_resources",
            ),
            allowed_prompts: Self::parse_patterns(
                &model.allowed_prompts,
                model.id,
                "allowed_prompts",
            ),
        };
        BundleEntry {
            id: model.id,
            bundle_id: model.bundle_id,
            mcp_id: model.mcp_id,
            permissions,
            position: model.position,
        }
    }

    fn to_domain(model: bundles::Model, entries: Vec<BundleEntry>) -> Bundle {
        Bundle {
            id: model.id,
            uuid: model.uuid,
            name: model.name,
            description: model.description,
            created_by: model.created_by,
            created_at: model.created_at,
            entries,
        }
    }

    async fn load_entries(&self, bundle_id: i32) -> Result<Vec<BundleEntry>, DatabaseError> {
        let models = BundleEntries::find()
            .filter(bundle_entries::Column::BundleId.eq(bundle_id))
            .order_by_asc(bundle_entries::Column::Position)
            .all(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to load bundle entries", e))?;

        Ok(models.into_iter().map(Self::to_domain_entry).collect())
    }

    async fn insert_entries(
        &self,
        bundle_id: i32,
        entries: &[BundleEntry],
    ) -> Result<(), DatabaseError> {
        for (position, entry) in entries.iter().enumerate() {
            let active = bundle_entries::ActiveModel {
                id: Default::default(),
                bundle_id: Set(bundle_id),
                mcp_id: Set(entry.mcp_id),
                allowed_tools: Set(serde_json::to_string(&entry.permissions.allowed_tools)
                    .map_err(|e| DatabaseError::internal(e.to_string()))?),
                allowed_resources: Set(serde_json::to_string(
                    &entry.permissions.allowed_resources,
                )
                .map_err(|e| DatabaseError::internal(e.to_string()))?),
                allowed_prompts: Set(serde_json::to_string(&entry.permissions.allowed_prompts)
                    .map_err(|e| DatabaseError::internal(e.to_string()))?),
                position: Set(position as i32),
            };
            active
                .insert(self.db.get_connection())
                .await
                .map_err(|e| map_db_err("Failed to insert bundle entry", e))?;
        }
        Ok(())
    }

    async fn hydrate(&self, model: bundles::Model) -> Result<Bundle, DatabaseError> {
        let entries = self.load_entries(model.id).await?;
        Ok(Self::to_domain(model, entries))
    }
}

#[async_trait]
impl Repository for SeaOrmBundleRepository {
    async fn health_check(&self) -> Result<(), DatabaseError> {
        Bundles::find()
            .paginate(self.db.get_connection(), 1)
            .num_items()
            .await
            .map_err(|e| map_db_err("Bundle repository health check failed", e))?;
        Ok(())
    }
}

#[async_trait]
impl CrudRepository<Bundle> for SeaOrmBundleRepository {
    async fn create(&self, bundle: Bundle) -> Result<Bundle, DatabaseError> {
        let active = bundles::ActiveModel {
            id: Default::default(),
            uuid: Set(bundle.uuid),
            name: Set(bundle.name.clone()),
            description: Set(bundle.description.clone()),
            created_by: Set(bundle.created_by),
            created_at: Set(bundle.created_at),
        };

        let inserted = active
            .insert(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to create bundle", e))?;

        self.insert_entries(inserted.id, &bundle.entries).await?;
        self.hydrate(inserted).await
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Bundle>, DatabaseError> {
        let model = Bundles::find_by_id(id)
            .one(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to find bundle by id", e))?;

        match model {
            Some(model) => Ok(Some(self.hydrate(model).await?)),
            None => Ok(None),
        }
    }

    async fn update(&self, bundle: Bundle) -> Result<Bundle, DatabaseError> {
        let existing = Bundles::find_by_id(bundle.id)
            .one(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to find bundle for update", e))?
            .ok_or_else(|| DatabaseError::not_found("bundle", bundle.id))?;

        let mut active: bundles::ActiveModel = existing.into();
        active.name = Set(bundle.name.clone());
        active.description = Set(bundle.description.clone());

        let updated = active
            .update(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to update bundle", e))?;

        // Entries are replaced wholesale with the aggregate
        BundleEntries::delete_many()
            .filter(bundle_entries::Column::BundleId.eq(bundle.id))
            .exec(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to clear bundle entries", e))?;
        self.insert_entries(bundle.id, &bundle.entries).await?;

        self.hydrate(updated).await
    }

    async fn delete(&self, id: i32) -> Result<(), DatabaseError> {
        // Entries, tokens and their credentials go with the bundle (FK cascade)
        Bundles::delete_by_id(id)
            .exec(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to delete bundle", e))?;
        Ok(())
    }

    async fn exists(&self, id: i32) -> Result<bool, DatabaseError> {
        Ok(self.find_by_id(id).await?.is_some())
    }

    async fn count(&self) -> Result<u64, DatabaseError> {
        Bundles::find()
            .count(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to count bundles", e))
    }
}

#[async_trait]
impl BundleRepository for SeaOrmBundleRepository {
    async fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<Bundle>, DatabaseError> {
        let model = Bundles::find()
            .filter(bundles::Column::Uuid.eq(uuid))
            .one(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to find bundle by uuid", e))?;

        match model {
            Some(model) => Ok(Some(self.hydrate(model).await?)),
            None => Ok(None),
        }
    }

    async fn list_by_creators(&self, creator_ids: &[i32]) -> Result<Vec<Bundle>, DatabaseError> {
        if creator_ids.is_empty() {
            return Ok(Vec::new());
        }

        let models = Bundles::find()
            .filter(bundles::Column::CreatedBy.is_in(creator_ids.iter().copied()))
            .order_by_asc(bundles::Column::Id)
            .all(self.db.get_connection())
            .await
            .map_err(|e| map_db_err("Failed to list bundles by creators", e))?;

        let mut bundles = Vec::with_capacity(models.len());
        for model in models {
            bundles.push(self.hydrate(model).await?);
        }
        Ok(bundles)
    }
}
