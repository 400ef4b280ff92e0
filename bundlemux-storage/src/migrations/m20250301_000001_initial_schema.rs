use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Users::Uuid).uuid().not_null().unique_key())
                    .col(
                        ColumnDef::new(Users::Username)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                    .col(
                        ColumnDef::new(Users::ApiKeyHash)
                            .string()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Users::CreatedBy).integer())
                    .col(
                        ColumnDef::new(Users::IsAdmin)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Users::LastLoginAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_users_created_by")
                            .from(Users::Table, Users::CreatedBy)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Bundles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Bundles::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Bundles::Uuid)
                            .uuid()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Bundles::Name).string().not_null())
                    .col(ColumnDef::new(Bundles::Description).text())
                    .col(ColumnDef::new(Bundles::CreatedBy).integer().not_null())
                    .col(
                        ColumnDef::new(Bundles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bundles_created_by")
                            .from(Bundles::Table, Bundles::CreatedBy)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(McpServers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(McpServers::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(McpServers::Uuid)
                            .uuid()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(McpServers::Namespace)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(McpServers::Url).string().not_null())
                    .col(ColumnDef::new(McpServers::Version).string().not_null())
                    .col(
                        ColumnDef::new(McpServers::Stateless)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(McpServers::AuthStrategy)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(ColumnDef::new(McpServers::AuthBlob).text())
                    .col(ColumnDef::new(McpServers::CreatedBy).integer().not_null())
                    .col(
                        ColumnDef::new(McpServers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_mcp_servers_created_by")
                            .from(McpServers::Table, McpServers::CreatedBy)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BundleEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BundleEntries::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BundleEntries::BundleId).integer().not_null())
                    .col(ColumnDef::new(BundleEntries::McpId).integer().not_null())
                    .col(
                        ColumnDef::new(BundleEntries::AllowedTools)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BundleEntries::AllowedResources)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BundleEntries::AllowedPrompts)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(BundleEntries::Position).integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bundle_entries_bundle")
                            .from(BundleEntries::Table, BundleEntries::BundleId)
                            .to(Bundles::Table, Bundles::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bundle_entries_mcp")
                            .from(BundleEntries::Table, BundleEntries::McpId)
                            .to(McpServers::Table, McpServers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One entry per (bundle, mcp) pair
        manager
            .create_index(
                Index::create()
                    .name("idx_bundle_entries_bundle_mcp")
                    .table(BundleEntries::Table)
                    .col(BundleEntries::BundleId)
                    .col(BundleEntries::McpId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Tokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Tokens::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Tokens::BundleId).integer().not_null())
                    .col(
                        ColumnDef::new(Tokens::TokenHash)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Tokens::Name).string().not_null())
                    .col(ColumnDef::new(Tokens::ExpiresAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Tokens::Revoked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Tokens::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tokens_bundle")
                            .from(Tokens::Table, Tokens::BundleId)
                            .to(Bundles::Table, Bundles::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BundleCredentials::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BundleCredentials::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(BundleCredentials::TokenId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(BundleCredentials::McpId).integer().not_null())
                    .col(
                        ColumnDef::new(BundleCredentials::AuthBlob)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BundleCredentials::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bundle_credentials_token")
                            .from(BundleCredentials::Table, BundleCredentials::TokenId)
                            .to(Tokens::Table, Tokens::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bundle_credentials_mcp")
                            .from(BundleCredentials::Table, BundleCredentials::McpId)
                            .to(McpServers::Table, McpServers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One credential per (token, mcp) pair
        manager
            .create_index(
                Index::create()
                    .name("idx_bundle_credentials_token_mcp")
                    .table(BundleCredentials::Table)
                    .col(BundleCredentials::TokenId)
                    .col(BundleCredentials::McpId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tokens_bundle_id")
                    .table(Tokens::Table)
                    .col(Tokens::BundleId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BundleCredentials::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tokens::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BundleEntries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(McpServers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Bundles::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Uuid,
    Username,
    PasswordHash,
    ApiKeyHash,
    CreatedBy,
    IsAdmin,
    CreatedAt,
    LastLoginAt,
}

#[derive(DeriveIden)]
enum Bundles {
    Table,
    Id,
    Uuid,
    Name,
    Description,
    CreatedBy,
    CreatedAt,
}

#[derive(DeriveIden)]
enum McpServers {
    Table,
    Id,
    Uuid,
    Namespace,
    Url,
    Version,
    Stateless,
    AuthStrategy,
    AuthBlob,
    CreatedBy,
    CreatedAt,
}

#[derive(DeriveIden)]
enum BundleEntries {
    Table,
    Id,
    BundleId,
    McpId,
    AllowedTools,
    AllowedResources,
    AllowedPrompts,
    Position,
}

#[derive(DeriveIden)]
enum Tokens {
    Table,
    Id,
    BundleId,
    TokenHash,
    Name,
    ExpiresAt,
    Revoked,
    CreatedAt,
}

#[derive(DeriveIden)]
enum BundleCredentials {
    Table,
    Id,
    TokenId,
    McpId,
    AuthBlob,
    CreatedAt,
}
