use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::Json;

use models::audit_log;
use service::audit::ChainReport;

use crate::controller::{from_query, options, require_fields, with_path};
use crate::errors::ApiError;
use crate::state::ServerState;

pub async fn history(
    State(state): State<ServerState>,
    Path((entity, entity_id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Vec<audit_log::Model>>, ApiError> {
    const OP: &str = "audit.history";
    let input = with_path(from_query(query), &[("entity", entity), ("entity_id", entity_id)]);
    require_fields(OP, &input, &["entity", "entity_id"])?;
    let opts = options(OP, &input, &["entity", "entity_id", "page", "limit"])?;
    state.audit.history(opts).await.map(Json).map_err(|e| ApiError::service(OP, e))
}

pub async fn verify(State(state): State<ServerState>) -> Result<Json<ChainReport>, ApiError> {
    const OP: &str = "audit.verify";
    state.audit.verify().await.map(Json).map_err(|e| ApiError::service(OP, e))
}
