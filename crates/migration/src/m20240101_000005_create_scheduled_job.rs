//! Create `scheduled_job` table.
//!
//! Delayed work is persisted here and picked up by an out-of-band worker.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ScheduledJob::Table)
                    .if_not_exists()
                    .col(uuid(ScheduledJob::Id).primary_key())
                    .col(string_len(ScheduledJob::Kind, 64).not_null())
                    .col(json_binary(ScheduledJob::Payload).not_null())
                    .col(timestamp_with_time_zone(ScheduledJob::RunAt).not_null())
                    .col(string_len(ScheduledJob::Status, 16).not_null().default("pending"))
                    .col(integer(ScheduledJob::Attempts).not_null().default(0))
                    .col(text_null(ScheduledJob::LastError))
                    .col(timestamp_with_time_zone(ScheduledJob::CreatedAt).not_null())
                    .col(timestamp_with_time_zone(ScheduledJob::UpdatedAt).not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(ScheduledJob::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum ScheduledJob {
    Table,
    Id,
    Kind,
    Payload,
    RunAt,
    Status,
    Attempts,
    LastError,
    CreatedAt,
    UpdatedAt,
}
