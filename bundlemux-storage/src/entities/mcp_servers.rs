//! Upstream MCP definition entity

use sea_orm::entity::prelude::*;
use sea_query::StringLen;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "mcp_servers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub uuid: Uuid,
    /// Globally unique capability namespace
    #[sea_orm(unique)]
    pub namespace: String,
    pub url: String,
    pub version: String,
    /// Whether one connector may be shared across sessions
    pub stateless: bool,
    pub auth_strategy: AuthStrategy,
    /// Encrypted auth blob (`nonce:tag:ciphertext`); present iff strategy
    /// is `master`
    #[sea_orm(column_type = "Text", nullable)]
    pub auth_blob: Option<String>,
    pub created_by: i32,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::CreatedBy",
        to = "super::users::Column::Id"
    )]
    Creator,

    #[sea_orm(has_many = "super::bundle_entries::Entity")]
    Entries,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Creator.def()
    }
}

impl Related<super::bundle_entries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Entries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Where an upstream's credentials come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[derive(Default)]
pub enum AuthStrategy {
    #[sea_orm(string_value = "none")]
    #[default]
    None,
    #[sea_orm(string_value = "master")]
    Master,
    #[sea_orm(string_value = "user_set")]
    UserSet,
}

impl From<AuthStrategy> for bundlemux_api_types::AuthStrategy {
    fn from(strategy: AuthStrategy) -> Self {
        match strategy {
            AuthStrategy::None => bundlemux_api_types::AuthStrategy::None,
            AuthStrategy::Master => bundlemux_api_types::AuthStrategy::Master,
            AuthStrategy::UserSet => bundlemux_api_types::AuthStrategy::UserSet,
        }
    }
}

impl From<bundlemux_api_types::AuthStrategy> for AuthStrategy {
    fn from(strategy: bundlemux_api_types::AuthStrategy) -> Self {
        match strategy {
            bundlemux_api_types::AuthStrategy::None => AuthStrategy::None,
            bundlemux_api_types::AuthStrategy::Master => AuthStrategy::Master,
            bundlemux_api_types::AuthStrategy::UserSet => AuthStrategy::UserSet,
        }
    }
}
