//! Bundle-to-MCP join entity carrying the allow-lists
//!
//! The three pattern lists are stored as JSON text; parsing back into
//! `McpPermissions` happens in the repository layer.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "bundle_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub bundle_id: i32,
    pub mcp_id: i32,
    /// JSON array of tool patterns
    #[sea_orm(column_type = "Text")]
    pub allowed_tools: String,
    /// JSON array of resource patterns
    #[sea_orm(column_type = "Text")]
    pub allowed_resources: String,
    /// JSON array of prompt patterns
    #[sea_orm(column_type = "Text")]
    pub allowed_prompts: String,
    /// Attachment order within the bundle
    pub position: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::bundles::Entity",
        from = "Column::BundleId",
        to = "super::bundles::Column::Id"
    )]
    Bundle,

    #[sea_orm(
        belongs_to = "super::mcp_servers::Entity",
        from = "Column::McpId",
        to = "super::mcp_servers::Column::Id"
    )]
    McpServer,
}

impl Related<super::bundles::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bundle.def()
    }
}

impl Related<super::mcp_servers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::McpServer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
