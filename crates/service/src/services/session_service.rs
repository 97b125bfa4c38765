use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use futures::FutureExt;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use models::coaching_session::{self, NewSession, SessionRangeFilter, SessionStatus};
use models::pagination::{Page, Pagination};

use super::client_service::ClientSummary;
use super::{actor, traced, ServiceContext};
use crate::audit::append_chained;
use crate::compose::{bounded_all, run_sequence, Step};
use crate::errors::ServiceError;
use crate::jobs::{self, SESSION_REMINDER};
use crate::repository::settle;
use crate::validate;

/// Reminders go out this long before a session starts.
pub const REMINDER_LEAD_HOURS: i64 = 24;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListSessionsOptions {
    pub coach_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: Option<String>,
    #[serde(flatten)]
    pub pagination: Pagination,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ScheduleSessionOptions {
    pub coach_id: Option<String>,
    pub client_id: Option<String>,
    /// RFC 3339 start time.
    pub scheduled_at: Option<String>,
    pub duration_minutes: Option<i32>,
    pub notes: Option<String>,
    pub actor: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CancelSessionOptions {
    pub coach_id: Option<String>,
    pub session_id: Option<String>,
    pub reason: Option<String>,
    pub actor: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CompleteSessionOptions {
    pub coach_id: Option<String>,
    pub session_id: Option<String>,
    pub notes: Option<String>,
    pub actor: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct GetSessionOptions {
    pub coach_id: Option<String>,
    pub session_id: Option<String>,
    pub actor: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SessionSummaryOptions {
    pub coach_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DashboardOptions {
    pub coach_ids: Option<Vec<String>>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Session as returned to callers. Notes are only flagged, never included.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub id: Uuid,
    pub coach_id: Uuid,
    pub client_id: Uuid,
    pub scheduled_at: DateTimeWithTimeZone,
    pub ends_at: DateTimeWithTimeZone,
    pub duration_minutes: i32,
    pub status: String,
    pub cancel_reason: Option<String>,
    pub has_notes: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientSummary>,
}

impl SessionView {
    fn new(m: &coaching_session::Model, client: Option<ClientSummary>) -> Self {
        Self {
            id: m.id,
            coach_id: m.coach_id,
            client_id: m.client_id,
            scheduled_at: m.scheduled_at,
            ends_at: m.ends_at(),
            duration_minutes: m.duration_minutes,
            status: m.status.clone(),
            cancel_reason: m.cancel_reason.clone(),
            has_notes: m.notes_encrypted.is_some(),
            client,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: SessionView,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub coach_id: Uuid,
    pub by_status: BTreeMap<String, i64>,
    pub total: i64,
}

pub struct SessionService {
    ctx: ServiceContext,
}

impl SessionService {
    pub fn new(ctx: ServiceContext) -> Self { Self { ctx } }

    async fn session_for_coach(&self, coach_id: Uuid, session_id: Uuid) -> Result<coaching_session::Model, ServiceError> {
        match self.ctx.sessions.find_session(session_id).await? {
            Some(s) if s.coach_id == coach_id => Ok(s),
            _ => Err(ServiceError::not_found("session")),
        }
    }

    fn guard_transition(current: &coaching_session::Model, next: SessionStatus) -> Result<(), ServiceError> {
        let status = current.status()?;
        if !status.can_transition_to(next) {
            return Err(ServiceError::Conflict(format!("session is already {status}")));
        }
        Ok(())
    }

    /// Status change and its audit entry, committed together.
    async fn transition(
        &self,
        session_id: Uuid,
        next: SessionStatus,
        reason: Option<String>,
        notes_encrypted: Option<String>,
        who: &str,
        action: &str,
    ) -> Result<coaching_session::Model, ServiceError> {
        let tx = self.ctx.uow.begin().await?;
        let result = async {
            let store = tx.store();
            let updated = store.set_session_status(session_id, next, reason, notes_encrypted).await?;
            append_chained(store, who, action, "coaching_session", &session_id.to_string()).await?;
            Ok::<_, ServiceError>(updated)
        }
        .await;
        settle(tx, result).await
    }

    async fn summarize(&self, coach_id: Uuid, start: DateTimeWithTimeZone, end: DateTimeWithTimeZone) -> Result<SessionSummary, ServiceError> {
        let filter = SessionRangeFilter { coach_id, start, end, status: None };
        let rows = self.ctx.sessions.status_breakdown(&filter).await?;
        let by_status: BTreeMap<String, i64> = rows.into_iter().map(|r| (r.status, r.count)).collect();
        let total = by_status.values().sum();
        Ok(SessionSummary { coach_id, by_status, total })
    }

    /// One coach's sessions in a date range, client populated, paginated.
    /// The page and the total are fetched concurrently.
    #[instrument(skip_all, fields(coach_id = ?opts.coach_id))]
    pub async fn list_for_coach(&self, opts: ListSessionsOptions) -> Result<Page<SessionView>, ServiceError> {
        traced("SessionService::list_for_coach", async {
            validate::require(&[
                ("coach_id", opts.coach_id.as_deref()),
                ("start_date", opts.start_date.as_deref()),
                ("end_date", opts.end_date.as_deref()),
            ])?;
            let coach_id = validate::parse_uuid("coach_id", opts.coach_id.as_deref())?;
            let (start, end) = validate::date_range("start_date", opts.start_date.as_deref(), "end_date", opts.end_date.as_deref())?;
            let status = match opts.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                Some(s) => Some(s.parse::<SessionStatus>()?),
                None => None,
            };
            let filter = SessionRangeFilter { coach_id, start, end, status };
            let window = opts.pagination.normalize(self.ctx.limits.page_size_cap);

            let (rows, total) = futures::try_join!(
                self.ctx.sessions.sessions_in_range(&filter, window),
                self.ctx.sessions.count_in_range(&filter),
            )?;
            let items = rows
                .iter()
                .map(|(s, c)| SessionView::new(s, c.as_ref().map(ClientSummary::from)))
                .collect();
            Ok::<_, ServiceError>(Page::new(items, window, total))
        })
        .await
    }

    /// Book a session. Each check depends on the previous one, so they run
    /// in order. The overlap check, the insert, the audit entry and the
    /// reminder job share one transaction.
    #[instrument(skip_all, fields(coach_id = ?opts.coach_id, client_id = ?opts.client_id))]
    pub async fn schedule(&self, opts: ScheduleSessionOptions) -> Result<SessionView, ServiceError> {
        traced("SessionService::schedule", async {
            validate::require(&[
                ("coach_id", opts.coach_id.as_deref()),
                ("client_id", opts.client_id.as_deref()),
                ("scheduled_at", opts.scheduled_at.as_deref()),
            ])?;
            let coach_id = validate::parse_uuid("coach_id", opts.coach_id.as_deref())?;
            let client_id = validate::parse_uuid("client_id", opts.client_id.as_deref())?;
            let starts = validate::parse_datetime("scheduled_at", opts.scheduled_at.as_deref())?;
            let now = Utc::now();
            if starts <= now {
                return Err(ServiceError::Validation("scheduled_at must be in the future".into()));
            }
            let duration = match opts.duration_minutes {
                Some(d) => d,
                None => models::schema::default_int(coaching_session::FIELDS, "duration_minutes")?,
            };
            coaching_session::validate_duration(duration)?;

            let coach = self.ctx.coaches.find_coach(coach_id).await?.ok_or_else(|| ServiceError::not_found("coach"))?;
            if coach.status != "active" {
                return Err(ServiceError::Conflict("coach is not active".into()));
            }
            self.ctx
                .clients
                .find_client_for_coach(coach_id, client_id)
                .await?
                .ok_or_else(|| ServiceError::not_found("client"))?;

            let start: DateTimeWithTimeZone = starts.into();
            let end = start + Duration::minutes(i64::from(duration));
            let notes_encrypted = self.ctx.protector.seal_opt("notes", opts.notes.as_deref())?;
            let remind_at = (starts - Duration::hours(REMINDER_LEAD_HOURS)).max(now);
            let who = actor(opts.actor.as_deref());

            let tx = self.ctx.uow.begin().await?;
            let result = async {
                let store = tx.store();
                let clashes = store.overlapping(coach_id, start, end).await?;
                if !clashes.is_empty() {
                    return Err(ServiceError::Conflict("coach already has a session in that slot".into()));
                }
                let created = store
                    .create_session(NewSession {
                        coach_id,
                        client_id,
                        scheduled_at: start,
                        duration_minutes: Some(duration),
                        notes_encrypted,
                    })
                    .await?;

                let session_id = created.id.to_string();
                let sid = session_id.as_str();
                let payload = json!({ "session_id": session_id, "coach_id": coach_id });
                let mut steps: Vec<Step<'_, (), ServiceError>> = Vec::with_capacity(2);
                steps.push(Box::new(move || {
                    async move { append_chained(store, who, "session.schedule", "coaching_session", sid).await.map(|_| ()) }.boxed()
                }));
                steps.push(Box::new(move || {
                    async move { jobs::enqueue(store, SESSION_REMINDER, payload, remind_at).await.map(|_| ()) }.boxed()
                }));
                run_sequence(steps).await?;
                Ok::<_, ServiceError>(created)
            }
            .await;
            let created = settle(tx, result).await?;

            info!(session_id = %created.id, coach_id = %coach_id, "session_scheduled");
            Ok::<_, ServiceError>(SessionView::new(&created, None))
        })
        .await
    }

    #[instrument(skip_all, fields(coach_id = ?opts.coach_id, session_id = ?opts.session_id))]
    pub async fn cancel(&self, opts: CancelSessionOptions) -> Result<SessionView, ServiceError> {
        traced("SessionService::cancel", async {
            validate::require(&[("coach_id", opts.coach_id.as_deref()), ("session_id", opts.session_id.as_deref())])?;
            let coach_id = validate::parse_uuid("coach_id", opts.coach_id.as_deref())?;
            let session_id = validate::parse_uuid("session_id", opts.session_id.as_deref())?;
            let found = self.session_for_coach(coach_id, session_id).await?;
            Self::guard_transition(&found, SessionStatus::Cancelled)?;
            let reason = opts.reason.clone().map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
            let updated = self
                .transition(session_id, SessionStatus::Cancelled, reason, None, actor(opts.actor.as_deref()), "session.cancel")
                .await?;
            info!(session_id = %session_id, "session_cancelled");
            Ok::<_, ServiceError>(SessionView::new(&updated, None))
        })
        .await
    }

    #[instrument(skip_all, fields(coach_id = ?opts.coach_id, session_id = ?opts.session_id))]
    pub async fn complete(&self, opts: CompleteSessionOptions) -> Result<SessionView, ServiceError> {
        traced("SessionService::complete", async {
            validate::require(&[("coach_id", opts.coach_id.as_deref()), ("session_id", opts.session_id.as_deref())])?;
            let coach_id = validate::parse_uuid("coach_id", opts.coach_id.as_deref())?;
            let session_id = validate::parse_uuid("session_id", opts.session_id.as_deref())?;
            let found = self.session_for_coach(coach_id, session_id).await?;
            Self::guard_transition(&found, SessionStatus::Completed)?;
            let notes = self.ctx.protector.seal_opt("notes", opts.notes.as_deref())?;
            let updated = self
                .transition(session_id, SessionStatus::Completed, None, notes, actor(opts.actor.as_deref()), "session.complete")
                .await?;
            info!(session_id = %session_id, "session_completed");
            Ok::<_, ServiceError>(SessionView::new(&updated, None))
        })
        .await
    }

    /// Session with its notes opened. Opening notes is audited.
    #[instrument(skip_all, fields(coach_id = ?opts.coach_id, session_id = ?opts.session_id))]
    pub async fn get(&self, opts: GetSessionOptions) -> Result<SessionDetail, ServiceError> {
        traced("SessionService::get", async {
            validate::require(&[("coach_id", opts.coach_id.as_deref()), ("session_id", opts.session_id.as_deref())])?;
            let coach_id = validate::parse_uuid("coach_id", opts.coach_id.as_deref())?;
            let session_id = validate::parse_uuid("session_id", opts.session_id.as_deref())?;
            let found = self.session_for_coach(coach_id, session_id).await?;
            let entity_id = found.id.to_string();
            let notes = self.ctx.decryptor.decrypt_opt("notes", &entity_id, found.notes_encrypted.as_deref())?;
            if notes.is_some() {
                self.ctx
                    .audit
                    .record(actor(opts.actor.as_deref()), "session.view_notes", "coaching_session", &entity_id)
                    .await?;
            }
            Ok::<_, ServiceError>(SessionDetail { session: SessionView::new(&found, None), notes })
        })
        .await
    }

    #[instrument(skip_all, fields(coach_id = ?opts.coach_id))]
    pub async fn summary(&self, opts: SessionSummaryOptions) -> Result<SessionSummary, ServiceError> {
        traced("SessionService::summary", async {
            validate::require(&[
                ("coach_id", opts.coach_id.as_deref()),
                ("start_date", opts.start_date.as_deref()),
                ("end_date", opts.end_date.as_deref()),
            ])?;
            let coach_id = validate::parse_uuid("coach_id", opts.coach_id.as_deref())?;
            let (start, end) = validate::date_range("start_date", opts.start_date.as_deref(), "end_date", opts.end_date.as_deref())?;
            self.summarize(coach_id, start, end).await
        })
        .await
    }

    /// Summaries for several coaches, at most `max_concurrency` in flight.
    #[instrument(skip_all)]
    pub async fn dashboards(&self, opts: DashboardOptions) -> Result<Vec<SessionSummary>, ServiceError> {
        traced("SessionService::dashboards", async {
            let ids = opts.coach_ids.clone().unwrap_or_default();
            let ids: Vec<&str> = ids.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect();
            let first_id = ids.first().copied();
            validate::require(&[
                ("coach_ids", first_id),
                ("start_date", opts.start_date.as_deref()),
                ("end_date", opts.end_date.as_deref()),
            ])?;
            if ids.len() > self.ctx.limits.max_dashboard_coaches {
                return Err(ServiceError::Validation(format!(
                    "at most {} coaches per dashboard request",
                    self.ctx.limits.max_dashboard_coaches
                )));
            }
            let coach_ids = ids
                .iter()
                .map(|id| validate::parse_uuid("coach_ids", Some(*id)))
                .collect::<Result<Vec<_>, _>>()?;
            let (start, end) = validate::date_range("start_date", opts.start_date.as_deref(), "end_date", opts.end_date.as_deref())?;

            bounded_all(coach_ids, self.ctx.limits.max_concurrency, |coach_id| self.summarize(coach_id, start, end)).await
        })
        .await
    }
}
