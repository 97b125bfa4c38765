use sea_orm::{entity::prelude::*, ConnectionTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set};
use uuid::Uuid;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::ModelError;
use crate::pagination::{Page, PageWindow};
use crate::schema::{self, FieldKind, FieldSpec};
use crate::{client, coaching_session};

pub const STATUSES: &[&str] = &["active", "inactive"];

pub const FIELDS: &[FieldSpec] = &[
    FieldSpec::required("name", FieldKind::Text),
    FieldSpec::required("email", FieldKind::Text),
    FieldSpec::required("timezone", FieldKind::Text).default_value("UTC"),
    FieldSpec::required("status", FieldKind::Text).one_of(STATUSES).default_value("active"),
];

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coach")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub timezone: String,
    pub status: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Client,
    Session,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Relation::Client => Entity::has_many(client::Entity).into(),
            Relation::Session => Entity::has_many(coaching_session::Entity).into(),
        }
    }
}

impl Related<client::Entity> for Entity {
    fn to() -> RelationDef { Relation::Client.def() }
}

impl Related<coaching_session::Entity> for Entity {
    fn to() -> RelationDef { Relation::Session.def() }
}

impl ActiveModelBehavior for ActiveModel {}

/// Unvalidated input for a new coach.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewCoach {
    pub name: String,
    pub email: String,
    pub timezone: Option<String>,
    pub status: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct CoachFilter {
    pub status: Option<String>,
}

impl NewCoach {
    /// Apply the field declarations and build an insertable row.
    pub fn into_active_model(self) -> Result<ActiveModel, ModelError> {
        let name = schema::resolve_required(FIELDS, "name", Some(&self.name))?;
        let email = schema::resolve_required(FIELDS, "email", Some(&self.email))?;
        schema::validate_email("email", &email)?;
        let timezone = schema::resolve_required(FIELDS, "timezone", self.timezone.as_deref())?;
        let status = schema::resolve_required(FIELDS, "status", self.status.as_deref())?;
        let now = Utc::now().into();
        Ok(ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            email: Set(email.to_ascii_lowercase()),
            timezone: Set(timezone),
            status: Set(status),
            created_at: Set(now),
            updated_at: Set(now),
        })
    }
}

pub async fn create<C: ConnectionTrait>(db: &C, input: NewCoach) -> Result<Model, ModelError> {
    let am = input.into_active_model()?;
    Ok(am.insert(db).await?)
}

pub async fn find<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Model>, ModelError> {
    Ok(Entity::find_by_id(id).one(db).await?)
}

fn filtered(filter: &CoachFilter) -> Select<Entity> {
    let mut q = Entity::find();
    if let Some(status) = &filter.status {
        q = q.filter(Column::Status.eq(status.as_str()));
    }
    q
}

/// Filtered, name-sorted, paginated listing. Builds the query only.
pub fn list_query(filter: &CoachFilter, window: PageWindow) -> Select<Entity> {
    filtered(filter)
        .order_by_asc(Column::Name)
        .limit(window.limit)
        .offset(window.offset)
}

pub async fn count<C: ConnectionTrait>(db: &C, filter: &CoachFilter) -> Result<u64, ModelError> {
    Ok(filtered(filter).count(db).await?)
}

pub async fn list<C: ConnectionTrait>(db: &C, filter: &CoachFilter, window: PageWindow) -> Result<Page<Model>, ModelError> {
    let items = list_query(filter, window).all(db).await?;
    let total = count(db, filter).await?;
    Ok(Page::new(items, window, total))
}
