use async_trait::async_trait;
use sea_orm::prelude::DateTimeWithTimeZone;
use tracing::warn;
use uuid::Uuid;

use models::audit_log;
use models::client::{self, ClientFilter, NewClient};
use models::coach::{self, CoachFilter, NewCoach};
use models::coaching_session::{self, NewSession, SessionRangeFilter, SessionStatus, SessionWithClient, StatusCount};
use models::pagination::{Page, PageWindow};
use models::scheduled_job;

use crate::errors::ServiceError;

/// Persistence for coaches.
#[async_trait]
pub trait CoachRepository: Send + Sync {
    async fn create_coach(&self, input: NewCoach) -> Result<coach::Model, ServiceError>;
    async fn find_coach(&self, id: Uuid) -> Result<Option<coach::Model>, ServiceError>;
    async fn list_coaches(&self, filter: &CoachFilter, window: PageWindow) -> Result<Page<coach::Model>, ServiceError>;
}

/// Persistence for clients. Contact fields arrive and leave sealed.
#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn create_client(&self, input: NewClient) -> Result<client::Model, ServiceError>;
    async fn find_client_for_coach(&self, coach_id: Uuid, id: Uuid) -> Result<Option<client::Model>, ServiceError>;
    async fn list_clients(&self, coach_id: Uuid, filter: &ClientFilter, window: PageWindow) -> Result<Page<client::Model>, ServiceError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create_session(&self, input: NewSession) -> Result<coaching_session::Model, ServiceError>;
    async fn find_session(&self, id: Uuid) -> Result<Option<coaching_session::Model>, ServiceError>;
    async fn sessions_in_range(&self, filter: &SessionRangeFilter, window: PageWindow) -> Result<Vec<SessionWithClient>, ServiceError>;
    async fn count_in_range(&self, filter: &SessionRangeFilter) -> Result<u64, ServiceError>;
    async fn status_breakdown(&self, filter: &SessionRangeFilter) -> Result<Vec<StatusCount>, ServiceError>;
    async fn overlapping(
        &self,
        coach_id: Uuid,
        start: DateTimeWithTimeZone,
        end: DateTimeWithTimeZone,
    ) -> Result<Vec<coaching_session::Model>, ServiceError>;
    async fn set_session_status(
        &self,
        id: Uuid,
        next: SessionStatus,
        reason: Option<String>,
        notes_encrypted: Option<String>,
    ) -> Result<coaching_session::Model, ServiceError>;
}

/// Append-only audit storage; hashing is done by the caller.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Serialize chain appends until the surrounding transaction ends.
    async fn lock_audit_chain(&self) -> Result<(), ServiceError>;
    async fn append_audit(&self, entry: audit_log::NewEntry) -> Result<audit_log::Model, ServiceError>;
    async fn last_audit(&self) -> Result<Option<audit_log::Model>, ServiceError>;
    async fn audit_for_entity(&self, entity: &str, entity_id: &str, window: PageWindow) -> Result<Vec<audit_log::Model>, ServiceError>;
    async fn audit_segment(&self, after_id: i64, limit: u64) -> Result<Vec<audit_log::Model>, ServiceError>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn enqueue_job(&self, kind: &str, payload: serde_json::Value, run_at: DateTimeWithTimeZone) -> Result<scheduled_job::Model, ServiceError>;
    /// Pending jobs past `run_at`, plus running ones untouched since `stale_before`.
    async fn due_jobs(&self, now: DateTimeWithTimeZone, stale_before: DateTimeWithTimeZone, limit: u64) -> Result<Vec<scheduled_job::Model>, ServiceError>;
    /// Move one job to `running` if it is still claimable. `None` means
    /// another worker got there first.
    async fn claim_job(&self, id: Uuid, now: DateTimeWithTimeZone, stale_before: DateTimeWithTimeZone) -> Result<Option<scheduled_job::Model>, ServiceError>;
    async fn mark_job(&self, id: Uuid, status: &str, last_error: Option<String>) -> Result<scheduled_job::Model, ServiceError>;
}

/// Every repository behind one handle.
pub trait Store: CoachRepository + ClientRepository + SessionRepository + AuditRepository + JobRepository {}

impl<T> Store for T where T: CoachRepository + ClientRepository + SessionRepository + AuditRepository + JobRepository {}

/// An open transaction. Dropping it without `commit` rolls it back.
#[async_trait]
pub trait Transaction: Send + Sync {
    fn store(&self) -> &dyn Store;
    async fn commit(self: Box<Self>) -> Result<(), ServiceError>;
    async fn rollback(self: Box<Self>) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>, ServiceError>;
}

/// Commit when `result` is ok, otherwise roll back and return its error.
pub async fn settle<T>(tx: Box<dyn Transaction>, result: Result<T, ServiceError>) -> Result<T, ServiceError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rb) = tx.rollback().await {
                warn!(error = %rb, "rollback_failed");
            }
            Err(e)
        }
    }
}

/// In-memory repositories for tests and doc examples.
///
/// One `MockRepository` backs all five traits and records every call by
/// name, so tests can assert that validation rejected a request before any
/// data access happened. Transactions run one at a time and restore a
/// snapshot of every table unless committed.
pub mod mock {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use std::ops::Deref;
    use std::sync::{Arc, Mutex};

    use chrono::Utc;
    use models::errors::ModelError;
    use tokio::sync::OwnedMutexGuard;

    #[derive(Default)]
    pub struct MockState {
        coaches: Mutex<HashMap<Uuid, coach::Model>>,
        clients: Mutex<HashMap<Uuid, client::Model>>,
        sessions: Mutex<HashMap<Uuid, coaching_session::Model>>,
        audit: Mutex<Vec<audit_log::Model>>,
        jobs: Mutex<HashMap<Uuid, scheduled_job::Model>>,
        calls: Mutex<Vec<&'static str>>,
        fail_on: Mutex<Option<&'static str>>,
        tx_lock: Arc<tokio::sync::Mutex<()>>,
    }

    /// Cheap handle; clones share the same tables.
    #[derive(Clone, Default)]
    pub struct MockRepository {
        state: Arc<MockState>,
    }

    impl Deref for MockRepository {
        type Target = MockState;

        fn deref(&self) -> &MockState { &self.state }
    }

    struct Snapshot {
        coaches: HashMap<Uuid, coach::Model>,
        clients: HashMap<Uuid, client::Model>,
        sessions: HashMap<Uuid, coaching_session::Model>,
        audit: Vec<audit_log::Model>,
        jobs: HashMap<Uuid, scheduled_job::Model>,
    }

    pub struct MockTransaction {
        repo: MockRepository,
        snapshot: Option<Snapshot>,
        _serial: OwnedMutexGuard<()>,
    }

    impl Drop for MockTransaction {
        fn drop(&mut self) {
            if let Some(snapshot) = self.snapshot.take() {
                self.repo.restore(snapshot);
            }
        }
    }

    #[async_trait]
    impl Transaction for MockTransaction {
        fn store(&self) -> &dyn Store { &self.repo }

        async fn commit(self: Box<Self>) -> Result<(), ServiceError> {
            let mut this = self;
            this.snapshot = None;
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<(), ServiceError> {
            drop(self);
            Ok(())
        }
    }

    #[async_trait]
    impl UnitOfWork for MockRepository {
        async fn begin(&self) -> Result<Box<dyn Transaction>, ServiceError> {
            let serial = self.tx_lock.clone().lock_owned().await;
            Ok(Box::new(MockTransaction { repo: self.clone(), snapshot: Some(self.snapshot()), _serial: serial }))
        }
    }

    impl MockRepository {
        pub fn new() -> Self { Self::default() }

        fn snapshot(&self) -> Snapshot {
            Snapshot {
                coaches: self.coaches.lock().unwrap().clone(),
                clients: self.clients.lock().unwrap().clone(),
                sessions: self.sessions.lock().unwrap().clone(),
                audit: self.audit.lock().unwrap().clone(),
                jobs: self.jobs.lock().unwrap().clone(),
            }
        }

        fn restore(&self, snapshot: Snapshot) {
            *self.coaches.lock().unwrap() = snapshot.coaches;
            *self.clients.lock().unwrap() = snapshot.clients;
            *self.sessions.lock().unwrap() = snapshot.sessions;
            *self.audit.lock().unwrap() = snapshot.audit;
            *self.jobs.lock().unwrap() = snapshot.jobs;
        }

        /// Names of the repository methods called so far, in order.
        pub fn calls(&self) -> Vec<&'static str> { self.calls.lock().unwrap().clone() }

        pub fn call_count(&self) -> usize { self.calls.lock().unwrap().len() }

        /// Make the named method fail with an upstream error.
        pub fn fail_on(&self, method: &'static str) { *self.fail_on.lock().unwrap() = Some(method); }

        pub fn clear_failures(&self) { *self.fail_on.lock().unwrap() = None; }

        pub fn sessions(&self) -> Vec<coaching_session::Model> { self.sessions.lock().unwrap().values().cloned().collect() }

        pub fn coaches(&self) -> Vec<coach::Model> { self.coaches.lock().unwrap().values().cloned().collect() }

        pub fn audit_entries(&self) -> Vec<audit_log::Model> { self.audit.lock().unwrap().clone() }

        pub fn jobs(&self) -> Vec<scheduled_job::Model> { self.jobs.lock().unwrap().values().cloned().collect() }

        /// Overwrite a stored audit entry, for tamper tests.
        pub fn tamper_audit(&self, id: i64, action: &str) {
            if let Some(e) = self.audit.lock().unwrap().iter_mut().find(|e| e.id == id) {
                e.action = action.to_string();
            }
        }

        fn record(&self, method: &'static str) -> Result<(), ServiceError> {
            self.calls.lock().unwrap().push(method);
            if *self.fail_on.lock().unwrap() == Some(method) {
                return Err(ServiceError::Db(format!("{method}: injected failure")));
            }
            Ok(())
        }

        fn model_err(e: ModelError) -> ServiceError { ServiceError::Model(e) }

        fn in_range(&self, filter: &SessionRangeFilter) -> Vec<coaching_session::Model> {
            let mut rows: Vec<_> = self
                .sessions
                .lock()
                .unwrap()
                .values()
                .filter(|s| s.coach_id == filter.coach_id)
                .filter(|s| s.scheduled_at >= filter.start && s.scheduled_at < filter.end)
                .filter(|s| filter.status.map_or(true, |st| s.status == st.as_str()))
                .cloned()
                .collect();
            rows.sort_by_key(|s| s.scheduled_at);
            rows
        }
    }

    fn claimable(job: &scheduled_job::Model, stale_before: DateTimeWithTimeZone) -> bool {
        job.status == "pending" || (job.status == "running" && job.updated_at < stale_before)
    }

    impl MockRepository {
        /// Backdate a job's last update, as if its worker died mid-run.
        pub fn age_job(&self, id: Uuid, updated_at: DateTimeWithTimeZone) {
            if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
                job.updated_at = updated_at;
            }
        }
    }

    fn window_of<T>(rows: Vec<T>, window: PageWindow) -> Vec<T> {
        rows.into_iter().skip(window.offset as usize).take(window.limit as usize).collect()
    }

    #[async_trait]
    impl CoachRepository for MockRepository {
        async fn create_coach(&self, input: NewCoach) -> Result<coach::Model, ServiceError> {
            self.record("create_coach")?;
            let am = input.into_active_model().map_err(Self::model_err)?;
            let mut coaches = self.coaches.lock().unwrap();
            if coaches.values().any(|c| &c.email == am.email.as_ref()) {
                return Err(Self::model_err(ModelError::Conflict("coach_email_key".into())));
            }
            let now = Utc::now().into();
            let model = coach::Model {
                id: Uuid::new_v4(),
                name: am.name.unwrap(),
                email: am.email.unwrap(),
                timezone: am.timezone.unwrap(),
                status: am.status.unwrap(),
                created_at: now,
                updated_at: now,
            };
            coaches.insert(model.id, model.clone());
            Ok(model)
        }

        async fn find_coach(&self, id: Uuid) -> Result<Option<coach::Model>, ServiceError> {
            self.record("find_coach")?;
            Ok(self.coaches.lock().unwrap().get(&id).cloned())
        }

        async fn list_coaches(&self, filter: &CoachFilter, window: PageWindow) -> Result<Page<coach::Model>, ServiceError> {
            self.record("list_coaches")?;
            let mut rows: Vec<_> = self
                .coaches
                .lock()
                .unwrap()
                .values()
                .filter(|c| filter.status.as_ref().map_or(true, |s| &c.status == s))
                .cloned()
                .collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));
            let total = rows.len() as u64;
            Ok(Page::new(window_of(rows, window), window, total))
        }
    }

    #[async_trait]
    impl ClientRepository for MockRepository {
        async fn create_client(&self, input: NewClient) -> Result<client::Model, ServiceError> {
            self.record("create_client")?;
            let am = input.into_active_model().map_err(Self::model_err)?;
            let now = Utc::now().into();
            let model = client::Model {
                id: Uuid::new_v4(),
                coach_id: am.coach_id.unwrap(),
                display_name: am.display_name.unwrap(),
                email_encrypted: am.email_encrypted.unwrap(),
                phone_encrypted: am.phone_encrypted.unwrap(),
                status: am.status.unwrap(),
                created_at: now,
                updated_at: now,
            };
            self.clients.lock().unwrap().insert(model.id, model.clone());
            Ok(model)
        }

        async fn find_client_for_coach(&self, coach_id: Uuid, id: Uuid) -> Result<Option<client::Model>, ServiceError> {
            self.record("find_client_for_coach")?;
            Ok(self.clients.lock().unwrap().get(&id).filter(|c| c.coach_id == coach_id).cloned())
        }

        async fn list_clients(&self, coach_id: Uuid, filter: &ClientFilter, window: PageWindow) -> Result<Page<client::Model>, ServiceError> {
            self.record("list_clients")?;
            let needle = filter.search.as_deref().map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty());
            let mut rows: Vec<_> = self
                .clients
                .lock()
                .unwrap()
                .values()
                .filter(|c| c.coach_id == coach_id)
                .filter(|c| filter.status.as_ref().map_or(true, |s| &c.status == s))
                .filter(|c| needle.as_ref().map_or(true, |n| c.display_name.to_lowercase().contains(n.as_str())))
                .cloned()
                .collect();
            rows.sort_by(|a, b| a.display_name.cmp(&b.display_name));
            let total = rows.len() as u64;
            Ok(Page::new(window_of(rows, window), window, total))
        }
    }

    #[async_trait]
    impl SessionRepository for MockRepository {
        async fn create_session(&self, input: NewSession) -> Result<coaching_session::Model, ServiceError> {
            self.record("create_session")?;
            let am = input.into_active_model().map_err(Self::model_err)?;
            let now = Utc::now().into();
            let model = coaching_session::Model {
                id: Uuid::new_v4(),
                coach_id: am.coach_id.unwrap(),
                client_id: am.client_id.unwrap(),
                scheduled_at: am.scheduled_at.unwrap(),
                duration_minutes: am.duration_minutes.unwrap(),
                status: am.status.unwrap(),
                notes_encrypted: am.notes_encrypted.unwrap(),
                cancel_reason: None,
                created_at: now,
                updated_at: now,
            };
            self.sessions.lock().unwrap().insert(model.id, model.clone());
            Ok(model)
        }

        async fn find_session(&self, id: Uuid) -> Result<Option<coaching_session::Model>, ServiceError> {
            self.record("find_session")?;
            Ok(self.sessions.lock().unwrap().get(&id).cloned())
        }

        async fn sessions_in_range(&self, filter: &SessionRangeFilter, window: PageWindow) -> Result<Vec<SessionWithClient>, ServiceError> {
            self.record("sessions_in_range")?;
            let rows = window_of(self.in_range(filter), window);
            let clients = self.clients.lock().unwrap();
            Ok(rows
                .into_iter()
                .map(|s| {
                    let c = clients.get(&s.client_id).cloned();
                    (s, c)
                })
                .collect())
        }

        async fn count_in_range(&self, filter: &SessionRangeFilter) -> Result<u64, ServiceError> {
            self.record("count_in_range")?;
            Ok(self.in_range(filter).len() as u64)
        }

        async fn status_breakdown(&self, filter: &SessionRangeFilter) -> Result<Vec<StatusCount>, ServiceError> {
            self.record("status_breakdown")?;
            let mut counts: BTreeMap<String, i64> = BTreeMap::new();
            for s in self.in_range(filter) {
                *counts.entry(s.status).or_default() += 1;
            }
            Ok(counts.into_iter().map(|(status, count)| StatusCount { status, count }).collect())
        }

        async fn overlapping(
            &self,
            coach_id: Uuid,
            start: DateTimeWithTimeZone,
            end: DateTimeWithTimeZone,
        ) -> Result<Vec<coaching_session::Model>, ServiceError> {
            self.record("overlapping")?;
            Ok(self
                .sessions
                .lock()
                .unwrap()
                .values()
                .filter(|s| s.coach_id == coach_id && s.status == SessionStatus::Scheduled.as_str())
                .filter(|s| coaching_session::overlaps(s, start, end))
                .cloned()
                .collect())
        }

        async fn set_session_status(
            &self,
            id: Uuid,
            next: SessionStatus,
            reason: Option<String>,
            notes_encrypted: Option<String>,
        ) -> Result<coaching_session::Model, ServiceError> {
            self.record("set_session_status")?;
            let mut sessions = self.sessions.lock().unwrap();
            let found = sessions
                .get_mut(&id)
                .ok_or_else(|| Self::model_err(ModelError::NotFound("coaching_session".into())))?;
            let current = found.status().map_err(Self::model_err)?;
            if !current.can_transition_to(next) {
                return Err(Self::model_err(ModelError::Validation(format!("cannot move session from {current} to {next}"))));
            }
            found.status = next.as_str().to_string();
            if reason.is_some() {
                found.cancel_reason = reason;
            }
            if notes_encrypted.is_some() {
                found.notes_encrypted = notes_encrypted;
            }
            found.updated_at = Utc::now().into();
            Ok(found.clone())
        }
    }

    #[async_trait]
    impl AuditRepository for MockRepository {
        async fn lock_audit_chain(&self) -> Result<(), ServiceError> {
            self.record("lock_audit_chain")
        }

        async fn append_audit(&self, entry: audit_log::NewEntry) -> Result<audit_log::Model, ServiceError> {
            self.record("append_audit")?;
            let mut audit = self.audit.lock().unwrap();
            let model = audit_log::Model {
                id: audit.last().map_or(1, |e| e.id + 1),
                actor: entry.actor,
                action: entry.action,
                entity: entry.entity,
                entity_id: entry.entity_id,
                prev_hash: entry.prev_hash,
                hash: entry.hash,
                created_at: entry.created_at,
            };
            audit.push(model.clone());
            Ok(model)
        }

        async fn last_audit(&self) -> Result<Option<audit_log::Model>, ServiceError> {
            self.record("last_audit")?;
            Ok(self.audit.lock().unwrap().last().cloned())
        }

        async fn audit_for_entity(&self, entity: &str, entity_id: &str, window: PageWindow) -> Result<Vec<audit_log::Model>, ServiceError> {
            self.record("audit_for_entity")?;
            let rows: Vec<_> = self
                .audit
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.entity == entity && e.entity_id == entity_id)
                .cloned()
                .collect();
            Ok(window_of(rows, window))
        }

        async fn audit_segment(&self, after_id: i64, limit: u64) -> Result<Vec<audit_log::Model>, ServiceError> {
            self.record("audit_segment")?;
            Ok(self
                .audit
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.id > after_id)
                .take(limit as usize)
                .cloned()
                .collect())
        }
    }

    #[async_trait]
    impl JobRepository for MockRepository {
        async fn enqueue_job(&self, kind: &str, payload: serde_json::Value, run_at: DateTimeWithTimeZone) -> Result<scheduled_job::Model, ServiceError> {
            self.record("enqueue_job")?;
            let now = Utc::now().into();
            let model = scheduled_job::Model {
                id: Uuid::new_v4(),
                kind: kind.to_string(),
                payload,
                run_at,
                status: "pending".into(),
                attempts: 0,
                last_error: None,
                created_at: now,
                updated_at: now,
            };
            self.jobs.lock().unwrap().insert(model.id, model.clone());
            Ok(model)
        }

        async fn due_jobs(&self, now: DateTimeWithTimeZone, stale_before: DateTimeWithTimeZone, limit: u64) -> Result<Vec<scheduled_job::Model>, ServiceError> {
            self.record("due_jobs")?;
            let mut rows: Vec<_> = self
                .jobs
                .lock()
                .unwrap()
                .values()
                .filter(|j| j.run_at <= now && claimable(j, stale_before))
                .cloned()
                .collect();
            rows.sort_by_key(|j| j.run_at);
            rows.truncate(limit as usize);
            Ok(rows)
        }

        async fn claim_job(&self, id: Uuid, now: DateTimeWithTimeZone, stale_before: DateTimeWithTimeZone) -> Result<Option<scheduled_job::Model>, ServiceError> {
            self.record("claim_job")?;
            let mut jobs = self.jobs.lock().unwrap();
            let Some(job) = jobs.get_mut(&id).filter(|j| claimable(j, stale_before)) else {
                return Ok(None);
            };
            job.status = "running".into();
            job.attempts += 1;
            job.updated_at = now;
            Ok(Some(job.clone()))
        }

        async fn mark_job(&self, id: Uuid, status: &str, last_error: Option<String>) -> Result<scheduled_job::Model, ServiceError> {
            self.record("mark_job")?;
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs
                .get_mut(&id)
                .ok_or_else(|| Self::model_err(ModelError::NotFound("scheduled_job".into())))?;
            job.status = status.to_string();
            job.last_error = last_error;
            job.updated_at = Utc::now().into();
            Ok(job.clone())
        }
    }
}
