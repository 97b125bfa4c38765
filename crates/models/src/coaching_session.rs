use std::fmt;
use std::str::FromStr;

use sea_orm::{entity::prelude::*, ConnectionTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, SelectTwo, Set};
use sea_orm::sea_query::Expr;
use uuid::Uuid;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ModelError;
use crate::pagination::PageWindow;
use crate::schema::{self, FieldKind, FieldSpec};
use crate::{client, coach};

pub const STATUSES: &[&str] = &["scheduled", "completed", "cancelled", "no_show"];
pub const MAX_DURATION_MINUTES: i32 = 480;

pub const FIELDS: &[FieldSpec] = &[
    FieldSpec::required("coach_id", FieldKind::Uuid),
    FieldSpec::required("client_id", FieldKind::Uuid),
    FieldSpec::required("scheduled_at", FieldKind::Timestamp),
    FieldSpec::required("duration_minutes", FieldKind::Integer).default_value("60"),
    FieldSpec::required("status", FieldKind::Text).one_of(STATUSES).default_value("scheduled"),
    FieldSpec::optional("notes_encrypted", FieldKind::Text),
    FieldSpec::optional("cancel_reason", FieldKind::Text),
];

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coaching_session")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub coach_id: Uuid,
    pub client_id: Uuid,
    pub scheduled_at: DateTimeWithTimeZone,
    pub duration_minutes: i32,
    pub status: String,
    #[serde(skip_serializing)]
    pub notes_encrypted: Option<String>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Coach,
    Client,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Relation::Coach => Entity::belongs_to(coach::Entity).from(Column::CoachId).to(coach::Column::Id).into(),
            Relation::Client => Entity::belongs_to(client::Entity).from(Column::ClientId).to(client::Column::Id).into(),
        }
    }
}

impl Related<coach::Entity> for Entity {
    fn to() -> RelationDef { Relation::Coach.def() }
}

impl Related<client::Entity> for Entity {
    fn to() -> RelationDef { Relation::Client.def() }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn ends_at(&self) -> DateTimeWithTimeZone {
        self.scheduled_at + Duration::minutes(i64::from(self.duration_minutes))
    }

    pub fn status(&self) -> Result<SessionStatus, ModelError> {
        self.status.parse()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    Completed,
    Cancelled,
    NoShow,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::NoShow => "no_show",
        }
    }

    /// Only scheduled sessions move; every other state is terminal.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        matches!(self, SessionStatus::Scheduled) && next != SessionStatus::Scheduled
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(SessionStatus::Scheduled),
            "completed" => Ok(SessionStatus::Completed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            "no_show" => Ok(SessionStatus::NoShow),
            other => Err(ModelError::Validation(format!("status must be one of {}, got {other}", STATUSES.join(", ")))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NewSession {
    pub coach_id: Uuid,
    pub client_id: Uuid,
    pub scheduled_at: DateTimeWithTimeZone,
    pub duration_minutes: Option<i32>,
    pub notes_encrypted: Option<String>,
}

impl NewSession {
    pub fn into_active_model(self) -> Result<ActiveModel, ModelError> {
        if self.coach_id.is_nil() || self.client_id.is_nil() {
            return Err(ModelError::Validation("coach_id and client_id required".into()));
        }
        let duration = match self.duration_minutes {
            Some(d) => d,
            None => schema::default_int(FIELDS, "duration_minutes")?,
        };
        validate_duration(duration)?;
        let status = schema::resolve_required(FIELDS, "status", None)?;
        let notes = schema::resolve(FIELDS, "notes_encrypted", self.notes_encrypted.as_deref())?;
        let now = Utc::now().into();
        Ok(ActiveModel {
            id: Set(Uuid::new_v4()),
            coach_id: Set(self.coach_id),
            client_id: Set(self.client_id),
            scheduled_at: Set(self.scheduled_at),
            duration_minutes: Set(duration),
            status: Set(status),
            notes_encrypted: Set(notes),
            cancel_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        })
    }
}

pub fn validate_duration(minutes: i32) -> Result<(), ModelError> {
    if !(1..=MAX_DURATION_MINUTES).contains(&minutes) {
        return Err(ModelError::Validation(format!("duration_minutes must be within 1..={MAX_DURATION_MINUTES}")));
    }
    Ok(())
}

/// Half-open time window `[start, end)` for one coach.
#[derive(Clone, Debug)]
pub struct SessionRangeFilter {
    pub coach_id: Uuid,
    pub start: DateTimeWithTimeZone,
    pub end: DateTimeWithTimeZone,
    pub status: Option<SessionStatus>,
}

/// A session with its client relation populated.
pub type SessionWithClient = (Model, Option<client::Model>);

/// Status aggregation row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

pub async fn create<C: ConnectionTrait>(db: &C, input: NewSession) -> Result<Model, ModelError> {
    let am = input.into_active_model()?;
    Ok(am.insert(db).await?)
}

pub async fn find<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Model>, ModelError> {
    Ok(Entity::find_by_id(id).one(db).await?)
}

fn in_range(filter: &SessionRangeFilter) -> Select<Entity> {
    let mut q = Entity::find()
        .filter(Column::CoachId.eq(filter.coach_id))
        .filter(Column::ScheduledAt.gte(filter.start))
        .filter(Column::ScheduledAt.lt(filter.end));
    if let Some(status) = filter.status {
        q = q.filter(Column::Status.eq(status.as_str()));
    }
    q
}

/// Range listing sorted by start time, bounded by `window`. Builds only.
pub fn range_query(filter: &SessionRangeFilter, window: PageWindow) -> Select<Entity> {
    in_range(filter)
        .order_by_asc(Column::ScheduledAt)
        .limit(window.limit)
        .offset(window.offset)
}

/// Range listing with the client relation joined in.
pub fn range_with_client_query(filter: &SessionRangeFilter, window: PageWindow) -> SelectTwo<Entity, client::Entity> {
    range_query(filter, window).find_also_related(client::Entity)
}

/// `GROUP BY status` aggregation over the range.
pub fn status_breakdown_query(filter: &SessionRangeFilter) -> Select<Entity> {
    in_range(filter)
        .select_only()
        .column(Column::Status)
        .column_as(Expr::col((Entity, Column::Id)).count(), "count")
        .group_by(Column::Status)
        .order_by_asc(Column::Status)
}

pub async fn list_in_range_with_client<C: ConnectionTrait>(
    db: &C,
    filter: &SessionRangeFilter,
    window: PageWindow,
) -> Result<Vec<SessionWithClient>, ModelError> {
    Ok(range_with_client_query(filter, window).all(db).await?)
}

pub async fn count_in_range<C: ConnectionTrait>(db: &C, filter: &SessionRangeFilter) -> Result<u64, ModelError> {
    Ok(in_range(filter).count(db).await?)
}

pub async fn status_breakdown<C: ConnectionTrait>(db: &C, filter: &SessionRangeFilter) -> Result<Vec<StatusCount>, ModelError> {
    let rows = status_breakdown_query(filter)
        .into_tuple::<(String, i64)>()
        .all(db)
        .await?;
    Ok(rows.into_iter().map(|(status, count)| StatusCount { status, count }).collect())
}

/// Candidates whose start lies within one max-duration before `end`;
/// callers confirm the real overlap with [`overlaps`].
pub fn overlap_candidates_query(coach_id: Uuid, start: DateTimeWithTimeZone, end: DateTimeWithTimeZone) -> Select<Entity> {
    Entity::find()
        .filter(Column::CoachId.eq(coach_id))
        .filter(Column::Status.eq(SessionStatus::Scheduled.as_str()))
        .filter(Column::ScheduledAt.lt(end))
        .filter(Column::ScheduledAt.gt(start - Duration::minutes(i64::from(MAX_DURATION_MINUTES))))
}

pub fn overlaps(existing: &Model, start: DateTimeWithTimeZone, end: DateTimeWithTimeZone) -> bool {
    existing.scheduled_at < end && existing.ends_at() > start
}

pub async fn overlapping<C: ConnectionTrait>(
    db: &C,
    coach_id: Uuid,
    start: DateTimeWithTimeZone,
    end: DateTimeWithTimeZone,
) -> Result<Vec<Model>, ModelError> {
    let candidates = overlap_candidates_query(coach_id, start, end).all(db).await?;
    Ok(candidates.into_iter().filter(|m| overlaps(m, start, end)).collect())
}

/// Guarded status transition. `notes` and `reason` overwrite when given.
pub async fn set_status<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    next: SessionStatus,
    reason: Option<String>,
    notes_encrypted: Option<String>,
) -> Result<Model, ModelError> {
    let found = Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| ModelError::NotFound("coaching_session".into()))?;
    let current = found.status()?;
    if !current.can_transition_to(next) {
        return Err(ModelError::Validation(format!("cannot move session from {current} to {next}")));
    }
    let mut am: ActiveModel = found.into();
    am.status = Set(next.as_str().to_string());
    if reason.is_some() {
        am.cancel_reason = Set(reason);
    }
    if notes_encrypted.is_some() {
        am.notes_encrypted = Set(notes_encrypted);
    }
    am.updated_at = Set(Utc::now().into());
    Ok(am.update(db).await?)
}
