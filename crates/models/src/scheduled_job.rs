use sea_orm::{entity::prelude::*, Condition, ConnectionTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set, UpdateMany};
use sea_orm::sea_query::Expr;
use uuid::Uuid;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::ModelError;
use crate::schema::{self, FieldKind, FieldSpec};

pub const STATUSES: &[&str] = &["pending", "running", "done", "failed"];

pub const FIELDS: &[FieldSpec] = &[
    FieldSpec::required("kind", FieldKind::Text),
    FieldSpec::required("payload", FieldKind::Json),
    FieldSpec::required("run_at", FieldKind::Timestamp),
    FieldSpec::required("status", FieldKind::Text).one_of(STATUSES).default_value("pending"),
    FieldSpec::required("attempts", FieldKind::Integer).default_value("0"),
    FieldSpec::optional("last_error", FieldKind::Text),
];

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "scheduled_job")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub kind: String,
    pub payload: Json,
    pub run_at: DateTimeWithTimeZone,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef { panic!("no relations defined here") }
}

impl ActiveModelBehavior for ActiveModel {}

pub async fn enqueue<C: ConnectionTrait>(
    db: &C,
    kind: &str,
    payload: serde_json::Value,
    run_at: DateTimeWithTimeZone,
) -> Result<Model, ModelError> {
    let kind = schema::resolve_required(FIELDS, "kind", Some(kind))?;
    let status = schema::resolve_required(FIELDS, "status", None)?;
    let now = Utc::now().into();
    let am = ActiveModel {
        id: Set(Uuid::new_v4()),
        kind: Set(kind),
        payload: Set(payload),
        run_at: Set(run_at),
        status: Set(status),
        attempts: Set(schema::default_int(FIELDS, "attempts")?),
        last_error: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };
    Ok(am.insert(db).await?)
}

fn claimable(stale_before: DateTimeWithTimeZone) -> Condition {
    Condition::any().add(Column::Status.eq("pending")).add(
        Condition::all()
            .add(Column::Status.eq("running"))
            .add(Column::UpdatedAt.lt(stale_before)),
    )
}

/// Jobs whose `run_at` has passed and that are pending, or running but
/// untouched since `stale_before`. Oldest first.
pub fn due_query(now: DateTimeWithTimeZone, stale_before: DateTimeWithTimeZone, limit: u64) -> Select<Entity> {
    Entity::find()
        .filter(Column::RunAt.lte(now))
        .filter(claimable(stale_before))
        .order_by_asc(Column::RunAt)
        .limit(limit)
}

pub async fn due<C: ConnectionTrait>(
    db: &C,
    now: DateTimeWithTimeZone,
    stale_before: DateTimeWithTimeZone,
    limit: u64,
) -> Result<Vec<Model>, ModelError> {
    Ok(due_query(now, stale_before, limit).all(db).await?)
}

/// Conditional move to `running`. The row filter repeats the claimable
/// check so that of two concurrent claimers only one updates the row.
pub fn claim_query(id: Uuid, now: DateTimeWithTimeZone, stale_before: DateTimeWithTimeZone) -> UpdateMany<Entity> {
    Entity::update_many()
        .col_expr(Column::Status, Expr::value("running"))
        .col_expr(Column::Attempts, Expr::col(Column::Attempts).add(1))
        .col_expr(Column::UpdatedAt, Expr::value(now))
        .filter(Column::Id.eq(id))
        .filter(claimable(stale_before))
}

/// `None` when another worker holds the job or it is no longer claimable.
pub async fn claim<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    now: DateTimeWithTimeZone,
    stale_before: DateTimeWithTimeZone,
) -> Result<Option<Model>, ModelError> {
    let res = claim_query(id, now, stale_before).exec(db).await?;
    if res.rows_affected == 0 {
        return Ok(None);
    }
    Ok(Entity::find_by_id(id).one(db).await?)
}

/// Record the outcome of a claimed job.
pub async fn mark<C: ConnectionTrait>(db: &C, id: Uuid, status: &str, last_error: Option<String>) -> Result<Model, ModelError> {
    let status = schema::resolve_required(FIELDS, "status", Some(status))?;
    let found = Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| ModelError::NotFound("scheduled_job".into()))?;
    let mut am: ActiveModel = found.into();
    am.status = Set(status);
    am.last_error = Set(last_error);
    am.updated_at = Set(Utc::now().into());
    Ok(am.update(db).await?)
}
