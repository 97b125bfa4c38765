//! Create `coach` table.
//!
//! Root entity; clients and sessions reference it.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Coach::Table)
                    .if_not_exists()
                    .col(uuid(Coach::Id).primary_key())
                    .col(string_len(Coach::Name, 128).not_null())
                    .col(string_len(Coach::Email, 256).unique_key().not_null())
                    .col(string_len(Coach::Timezone, 64).not_null().default("UTC"))
                    .col(string_len(Coach::Status, 16).not_null().default("active"))
                    .col(timestamp_with_time_zone(Coach::CreatedAt).not_null())
                    .col(timestamp_with_time_zone(Coach::UpdatedAt).not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Coach::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Coach { Table, Id, Name, Email, Timezone, Status, CreatedAt, UpdatedAt }
