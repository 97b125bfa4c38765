use sea_orm::{entity::prelude::*, ConnectionTrait, QueryFilter, QueryOrder, QuerySelect, Set};
use serde::{Deserialize, Serialize};

use crate::errors::ModelError;
use crate::pagination::PageWindow;

/// `prev_hash` of the first entry in the chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Advisory lock key guarding the chain head.
pub const CHAIN_LOCK_KEY: i64 = 0x6175_6469_74;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub actor: String,
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub prev_hash: String,
    pub hash: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef { panic!("no relations defined here") }
}

impl ActiveModelBehavior for ActiveModel {}

/// A fully computed entry; hashing happens in the service layer.
#[derive(Clone, Debug)]
pub struct NewEntry {
    pub actor: String,
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub prev_hash: String,
    pub hash: String,
    pub created_at: DateTimeWithTimeZone,
}

pub async fn append<C: ConnectionTrait>(db: &C, entry: NewEntry) -> Result<Model, ModelError> {
    if entry.actor.trim().is_empty() || entry.action.trim().is_empty() {
        return Err(ModelError::Validation("actor and action required".into()));
    }
    let am = ActiveModel {
        actor: Set(entry.actor),
        action: Set(entry.action),
        entity: Set(entry.entity),
        entity_id: Set(entry.entity_id),
        prev_hash: Set(entry.prev_hash),
        hash: Set(entry.hash),
        created_at: Set(entry.created_at),
        ..Default::default()
    };
    Ok(am.insert(db).await?)
}

/// Take the chain lock for the rest of the current transaction. Outside a
/// transaction the lock is released at once.
pub async fn lock_chain<C: ConnectionTrait>(db: &C) -> Result<(), ModelError> {
    db.execute_unprepared(&format!("SELECT pg_advisory_xact_lock({CHAIN_LOCK_KEY})")).await?;
    Ok(())
}

/// Most recent entry, i.e. the current head of the chain.
pub async fn last<C: ConnectionTrait>(db: &C) -> Result<Option<Model>, ModelError> {
    Ok(Entity::find().order_by_desc(Column::Id).one(db).await?)
}

pub async fn list_for_entity<C: ConnectionTrait>(
    db: &C,
    entity: &str,
    entity_id: &str,
    window: PageWindow,
) -> Result<Vec<Model>, ModelError> {
    Ok(Entity::find()
        .filter(Column::Entity.eq(entity))
        .filter(Column::EntityId.eq(entity_id))
        .order_by_asc(Column::Id)
        .limit(window.limit)
        .offset(window.offset)
        .all(db)
        .await?)
}

/// Ordered slice of the chain starting after `after_id`, for verification.
pub async fn chain_segment<C: ConnectionTrait>(db: &C, after_id: i64, limit: u64) -> Result<Vec<Model>, ModelError> {
    Ok(Entity::find()
        .filter(Column::Id.gt(after_id))
        .order_by_asc(Column::Id)
        .limit(limit)
        .all(db)
        .await?)
}
