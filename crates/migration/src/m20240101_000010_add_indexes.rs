use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Client: index on coach_id
        manager
            .create_index(
                Index::create()
                    .name("idx_client_coach")
                    .table(Client::Table)
                    .col(Client::CoachId)
                    .to_owned(),
            )
            .await?;

        // Session: range scans are always per coach and ordered by time
        manager
            .create_index(
                Index::create()
                    .name("idx_session_coach_scheduled")
                    .table(CoachingSession::Table)
                    .col(CoachingSession::CoachId)
                    .col(CoachingSession::ScheduledAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_audit_entity")
                    .table(AuditLog::Table)
                    .col(AuditLog::Entity)
                    .col(AuditLog::EntityId)
                    .to_owned(),
            )
            .await?;

        // Job polling: pending rows ordered by run_at
        manager
            .create_index(
                Index::create()
                    .name("idx_job_status_run_at")
                    .table(ScheduledJob::Table)
                    .col(ScheduledJob::Status)
                    .col(ScheduledJob::RunAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_client_coach").table(Client::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_session_coach_scheduled").table(CoachingSession::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_audit_entity").table(AuditLog::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_job_status_run_at").table(ScheduledJob::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Client { Table, CoachId }

#[derive(DeriveIden)]
enum CoachingSession { Table, CoachId, ScheduledAt }

#[derive(DeriveIden)]
enum AuditLog { Table, Entity, EntityId }

#[derive(DeriveIden)]
enum ScheduledJob { Table, Status, RunAt }
