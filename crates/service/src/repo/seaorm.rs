use async_trait::async_trait;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction, TransactionTrait};
use tracing::debug;
use uuid::Uuid;

use models::audit_log;
use models::errors::ModelError;
use models::client::{self, ClientFilter, NewClient};
use models::coach::{self, CoachFilter, NewCoach};
use models::coaching_session::{self, NewSession, SessionRangeFilter, SessionStatus, SessionWithClient, StatusCount};
use models::pagination::{Page, PageWindow};
use models::scheduled_job;

use crate::errors::ServiceError;
use crate::repository::{
    AuditRepository, ClientRepository, CoachRepository, JobRepository, SessionRepository, Store, Transaction, UnitOfWork,
};

/// Postgres-backed implementation of every repository trait, over either
/// the pool or an open transaction.
#[derive(Clone)]
pub struct SeaOrmRepository<C = DatabaseConnection> {
    pub db: C,
}

impl<C> SeaOrmRepository<C> {
    pub fn new(db: C) -> Self { Self { db } }
}

pub struct SeaOrmTransaction {
    repo: SeaOrmRepository<DatabaseTransaction>,
}

#[async_trait]
impl Transaction for SeaOrmTransaction {
    fn store(&self) -> &dyn Store { &self.repo }

    async fn commit(self: Box<Self>) -> Result<(), ServiceError> {
        let this = *self;
        this.repo.db.commit().await.map_err(ModelError::from)?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), ServiceError> {
        let this = *self;
        this.repo.db.rollback().await.map_err(ModelError::from)?;
        debug!("transaction_rolled_back");
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for SeaOrmRepository<DatabaseConnection> {
    async fn begin(&self) -> Result<Box<dyn Transaction>, ServiceError> {
        let txn = self.db.begin().await.map_err(ModelError::from)?;
        Ok(Box::new(SeaOrmTransaction { repo: SeaOrmRepository::new(txn) }))
    }
}

#[async_trait]
impl<C: ConnectionTrait + Send + Sync> CoachRepository for SeaOrmRepository<C> {
    async fn create_coach(&self, input: NewCoach) -> Result<coach::Model, ServiceError> {
        Ok(coach::create(&self.db, input).await?)
    }

    async fn find_coach(&self, id: Uuid) -> Result<Option<coach::Model>, ServiceError> {
        Ok(coach::find(&self.db, id).await?)
    }

    async fn list_coaches(&self, filter: &CoachFilter, window: PageWindow) -> Result<Page<coach::Model>, ServiceError> {
        Ok(coach::list(&self.db, filter, window).await?)
    }
}

#[async_trait]
impl<C: ConnectionTrait + Send + Sync> ClientRepository for SeaOrmRepository<C> {
    async fn create_client(&self, input: NewClient) -> Result<client::Model, ServiceError> {
        Ok(client::create(&self.db, input).await?)
    }

    async fn find_client_for_coach(&self, coach_id: Uuid, id: Uuid) -> Result<Option<client::Model>, ServiceError> {
        Ok(client::find_for_coach(&self.db, coach_id, id).await?)
    }

    async fn list_clients(&self, coach_id: Uuid, filter: &ClientFilter, window: PageWindow) -> Result<Page<client::Model>, ServiceError> {
        Ok(client::list(&self.db, coach_id, filter, window).await?)
    }
}

#[async_trait]
impl<C: ConnectionTrait + Send + Sync> SessionRepository for SeaOrmRepository<C> {
    async fn create_session(&self, input: NewSession) -> Result<coaching_session::Model, ServiceError> {
        Ok(coaching_session::create(&self.db, input).await?)
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<coaching_session::Model>, ServiceError> {
        Ok(coaching_session::find(&self.db, id).await?)
    }

    async fn sessions_in_range(&self, filter: &SessionRangeFilter, window: PageWindow) -> Result<Vec<SessionWithClient>, ServiceError> {
        Ok(coaching_session::list_in_range_with_client(&self.db, filter, window).await?)
    }

    async fn count_in_range(&self, filter: &SessionRangeFilter) -> Result<u64, ServiceError> {
        Ok(coaching_session::count_in_range(&self.db, filter).await?)
    }

    async fn status_breakdown(&self, filter: &SessionRangeFilter) -> Result<Vec<StatusCount>, ServiceError> {
        Ok(coaching_session::status_breakdown(&self.db, filter).await?)
    }

    async fn overlapping(
        &self,
        coach_id: Uuid,
        start: DateTimeWithTimeZone,
        end: DateTimeWithTimeZone,
    ) -> Result<Vec<coaching_session::Model>, ServiceError> {
        Ok(coaching_session::overlapping(&self.db, coach_id, start, end).await?)
    }

    async fn set_session_status(
        &self,
        id: Uuid,
        next: SessionStatus,
        reason: Option<String>,
        notes_encrypted: Option<String>,
    ) -> Result<coaching_session::Model, ServiceError> {
        Ok(coaching_session::set_status(&self.db, id, next, reason, notes_encrypted).await?)
    }
}

#[async_trait]
impl<C: ConnectionTrait + Send + Sync> AuditRepository for SeaOrmRepository<C> {
    async fn lock_audit_chain(&self) -> Result<(), ServiceError> {
        Ok(audit_log::lock_chain(&self.db).await?)
    }

    async fn append_audit(&self, entry: audit_log::NewEntry) -> Result<audit_log::Model, ServiceError> {
        Ok(audit_log::append(&self.db, entry).await?)
    }

    async fn last_audit(&self) -> Result<Option<audit_log::Model>, ServiceError> {
        Ok(audit_log::last(&self.db).await?)
    }

    async fn audit_for_entity(&self, entity: &str, entity_id: &str, window: PageWindow) -> Result<Vec<audit_log::Model>, ServiceError> {
        Ok(audit_log::list_for_entity(&self.db, entity, entity_id, window).await?)
    }

    async fn audit_segment(&self, after_id: i64, limit: u64) -> Result<Vec<audit_log::Model>, ServiceError> {
        Ok(audit_log::chain_segment(&self.db, after_id, limit).await?)
    }
}

#[async_trait]
impl<C: ConnectionTrait + Send + Sync> JobRepository for SeaOrmRepository<C> {
    async fn enqueue_job(&self, kind: &str, payload: serde_json::Value, run_at: DateTimeWithTimeZone) -> Result<scheduled_job::Model, ServiceError> {
        Ok(scheduled_job::enqueue(&self.db, kind, payload, run_at).await?)
    }

    async fn due_jobs(&self, now: DateTimeWithTimeZone, stale_before: DateTimeWithTimeZone, limit: u64) -> Result<Vec<scheduled_job::Model>, ServiceError> {
        Ok(scheduled_job::due(&self.db, now, stale_before, limit).await?)
    }

    async fn claim_job(&self, id: Uuid, now: DateTimeWithTimeZone, stale_before: DateTimeWithTimeZone) -> Result<Option<scheduled_job::Model>, ServiceError> {
        Ok(scheduled_job::claim(&self.db, id, now, stale_before).await?)
    }

    async fn mark_job(&self, id: Uuid, status: &str, last_error: Option<String>) -> Result<scheduled_job::Model, ServiceError> {
        Ok(scheduled_job::mark(&self.db, id, status, last_error).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use models::pagination::Pagination;
    use sea_orm::EntityTrait;

    use crate::services::session_service::{ListSessionsOptions, ScheduleSessionOptions, SessionService};
    use crate::services::{Limits, ServiceContext};
    use crate::test_support::get_db;

    #[tokio::test]
    async fn schedule_and_list_against_postgres() -> anyhow::Result<()> {
        let Some(db) = get_db().await else { return Ok(()) };
        let repo = Arc::new(SeaOrmRepository::new(db.clone()));
        let cipher = Arc::new(common::crypto::FieldCipher::new(&[3u8; common::crypto::KEY_LEN])?);
        let ctx = ServiceContext::new(repo.clone(), cipher, Limits::default());

        let coach = repo
            .create_coach(NewCoach { name: "Repo Coach".into(), email: format!("repo_{}@example.com", Uuid::new_v4()), ..Default::default() })
            .await?;
        let client = repo
            .create_client(NewClient {
                coach_id: coach.id,
                display_name: "Repo Client".into(),
                email_encrypted: ctx.protector.seal("email", "client@example.com")?,
                ..Default::default()
            })
            .await?;

        let svc = SessionService::new(ctx);
        let when = Utc::now() + Duration::days(40);
        let view = svc
            .schedule(ScheduleSessionOptions {
                coach_id: Some(coach.id.to_string()),
                client_id: Some(client.id.to_string()),
                scheduled_at: Some(when.to_rfc3339()),
                ..Default::default()
            })
            .await?;

        let page = svc
            .list_for_coach(ListSessionsOptions {
                coach_id: Some(coach.id.to_string()),
                start_date: Some((when - Duration::days(1)).format("%Y-%m-%d").to_string()),
                end_date: Some((when + Duration::days(1)).format("%Y-%m-%d").to_string()),
                status: None,
                pagination: Pagination::new(1, 1000),
            })
            .await?;
        assert_eq!(page.limit, 100);
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, view.id);
        assert_eq!(page.items[0].client.as_ref().map(|c| c.id), Some(client.id));

        let history = repo.audit_for_entity("coaching_session", &view.id.to_string(), Default::default()).await?;
        assert_eq!(history.len(), 1);

        coach::Entity::delete_by_id(coach.id).exec(&db).await?;
        Ok(())
    }
}
