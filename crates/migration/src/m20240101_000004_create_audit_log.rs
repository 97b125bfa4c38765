//! Create `audit_log` table.
//! Append-only; each row carries the hash of its predecessor.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AuditLog::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuditLog::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string_len(AuditLog::Actor, 128).not_null())
                    .col(string_len(AuditLog::Action, 64).not_null())
                    .col(string_len(AuditLog::Entity, 64).not_null())
                    .col(string_len(AuditLog::EntityId, 64).not_null())
                    .col(string_len(AuditLog::PrevHash, 64).not_null())
                    .col(string_len(AuditLog::Hash, 64).unique_key().not_null())
                    .col(timestamp_with_time_zone(AuditLog::CreatedAt).not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(AuditLog::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum AuditLog { Table, Id, Actor, Action, Entity, EntityId, PrevHash, Hash, CreatedAt }
