//! Create `coaching_session` table.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CoachingSession::Table)
                    .if_not_exists()
                    .col(uuid(CoachingSession::Id).primary_key())
                    .col(uuid(CoachingSession::CoachId).not_null())
                    .col(uuid(CoachingSession::ClientId).not_null())
                    .col(timestamp_with_time_zone(CoachingSession::ScheduledAt).not_null())
                    .col(integer(CoachingSession::DurationMinutes).not_null().default(60))
                    .col(string_len(CoachingSession::Status, 16).not_null().default("scheduled"))
                    .col(text_null(CoachingSession::NotesEncrypted))
                    .col(string_len_null(CoachingSession::CancelReason, 256))
                    .col(timestamp_with_time_zone(CoachingSession::CreatedAt).not_null())
                    .col(timestamp_with_time_zone(CoachingSession::UpdatedAt).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_session_coach")
                            .from(CoachingSession::Table, CoachingSession::CoachId)
                            .to(Coach::Table, Coach::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_session_client")
                            .from(CoachingSession::Table, CoachingSession::ClientId)
                            .to(Client::Table, Client::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(CoachingSession::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum CoachingSession {
    Table,
    Id,
    CoachId,
    ClientId,
    ScheduledAt,
    DurationMinutes,
    Status,
    NotesEncrypted,
    CancelReason,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Coach { Table, Id }

#[derive(DeriveIden)]
enum Client { Table, Id }
