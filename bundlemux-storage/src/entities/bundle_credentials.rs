//! Per-(token, mcp) credential entity for user-set upstreams

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "bundle_credentials")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub token_id: i32,
    pub mcp_id: i32,
    /// Encrypted auth blob (`nonce:tag:ciphertext`)
    #[sea_orm(column_type = "Text")]
    pub auth_blob: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tokens::Entity",
        from = "Column::TokenId",
        to = "super::tokens::Column::Id"
    )]
    Token,

    #[sea_orm(
        belongs_to = "super::mcp_servers::Entity",
        from = "Column::McpId",
        to = "super::mcp_servers::Column::Id"
    )]
    McpServer,
}

impl Related<super::tokens::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Token.def()
    }
}

impl Related<super::mcp_servers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::McpServer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
