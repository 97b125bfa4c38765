use sea_orm::{entity::prelude::*, ConnectionTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set};
use sea_orm::sea_query::{Expr, Func, LikeExpr};
use uuid::Uuid;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::ModelError;
use crate::pagination::{Page, PageWindow};
use crate::schema::{self, FieldKind, FieldSpec};
use crate::{coach, coaching_session};

pub const STATUSES: &[&str] = &["active", "archived"];

pub const FIELDS: &[FieldSpec] = &[
    FieldSpec::required("coach_id", FieldKind::Uuid),
    FieldSpec::required("display_name", FieldKind::Text),
    FieldSpec::required("email_encrypted", FieldKind::Text),
    FieldSpec::optional("phone_encrypted", FieldKind::Text),
    FieldSpec::required("status", FieldKind::Text).one_of(STATUSES).default_value("active"),
];

/// Contact fields are sealed ciphertext; they are skipped on serialization
/// so a raw row can never leak them into a response.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "client")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub coach_id: Uuid,
    pub display_name: String,
    #[serde(skip_serializing)]
    pub email_encrypted: String,
    #[serde(skip_serializing)]
    pub phone_encrypted: Option<String>,
    pub status: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Coach,
    Session,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Relation::Coach => Entity::belongs_to(coach::Entity).from(Column::CoachId).to(coach::Column::Id).into(),
            Relation::Session => Entity::has_many(coaching_session::Entity).into(),
        }
    }
}

impl Related<coach::Entity> for Entity {
    fn to() -> RelationDef { Relation::Coach.def() }
}

impl Related<coaching_session::Entity> for Entity {
    fn to() -> RelationDef { Relation::Session.def() }
}

impl ActiveModelBehavior for ActiveModel {}

/// Input for a new client. PII must already be sealed by the caller.
#[derive(Clone, Debug, Default)]
pub struct NewClient {
    pub coach_id: Uuid,
    pub display_name: String,
    pub email_encrypted: String,
    pub phone_encrypted: Option<String>,
    pub status: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ClientFilter {
    pub status: Option<String>,
    /// Case-insensitive substring of the display name.
    pub search: Option<String>,
}

impl NewClient {
    pub fn into_active_model(self) -> Result<ActiveModel, ModelError> {
        let display_name = schema::resolve_required(FIELDS, "display_name", Some(&self.display_name))?;
        let email_encrypted = schema::resolve_required(FIELDS, "email_encrypted", Some(&self.email_encrypted))?;
        let phone_encrypted = schema::resolve(FIELDS, "phone_encrypted", self.phone_encrypted.as_deref())?;
        let status = schema::resolve_required(FIELDS, "status", self.status.as_deref())?;
        if self.coach_id.is_nil() {
            return Err(ModelError::Validation("coach_id required".into()));
        }
        let now = Utc::now().into();
        Ok(ActiveModel {
            id: Set(Uuid::new_v4()),
            coach_id: Set(self.coach_id),
            display_name: Set(display_name),
            email_encrypted: Set(email_encrypted),
            phone_encrypted: Set(phone_encrypted),
            status: Set(status),
            created_at: Set(now),
            updated_at: Set(now),
        })
    }
}

pub async fn create<C: ConnectionTrait>(db: &C, input: NewClient) -> Result<Model, ModelError> {
    let am = input.into_active_model()?;
    Ok(am.insert(db).await?)
}

/// Lookup scoped to the owning coach; another coach's client is `None`.
pub async fn find_for_coach<C: ConnectionTrait>(db: &C, coach_id: Uuid, id: Uuid) -> Result<Option<Model>, ModelError> {
    Ok(Entity::find_by_id(id)
        .filter(Column::CoachId.eq(coach_id))
        .one(db)
        .await?)
}

/// Escape LIKE wildcards so a search term matches literally.
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn filtered(coach_id: Uuid, filter: &ClientFilter) -> Select<Entity> {
    let mut q = Entity::find().filter(Column::CoachId.eq(coach_id));
    if let Some(status) = &filter.status {
        q = q.filter(Column::Status.eq(status.as_str()));
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
        q = q.filter(Expr::expr(Func::lower(Expr::col(Column::DisplayName))).like(LikeExpr::new(pattern).escape('\\')));
    }
    q
}

pub fn list_query(coach_id: Uuid, filter: &ClientFilter, window: PageWindow) -> Select<Entity> {
    filtered(coach_id, filter)
        .order_by_asc(Column::DisplayName)
        .limit(window.limit)
        .offset(window.offset)
}

pub async fn count<C: ConnectionTrait>(db: &C, coach_id: Uuid, filter: &ClientFilter) -> Result<u64, ModelError> {
    Ok(filtered(coach_id, filter).count(db).await?)
}

pub async fn list<C: ConnectionTrait>(db: &C, coach_id: Uuid, filter: &ClientFilter, window: PageWindow) -> Result<Page<Model>, ModelError> {
    let items = list_query(coach_id, filter, window).all(db).await?;
    let total = count(db, coach_id, filter).await?;
    Ok(Page::new(items, window, total))
}
