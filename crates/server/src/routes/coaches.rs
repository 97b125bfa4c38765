use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use models::coach;
use models::pagination::Page;

use crate::controller::{from_query, options, require_fields, with_path, Input};
use crate::errors::ApiError;
use crate::state::ServerState;

pub async fn create(
    State(state): State<ServerState>,
    body: Option<Json<Input>>,
) -> Result<(StatusCode, Json<coach::Model>), ApiError> {
    const OP: &str = "coaches.create";
    let input = body.map(|Json(b)| b).unwrap_or_default();
    require_fields(OP, &input, &["name", "email"])?;
    let opts = options(OP, &input, &["name", "email", "timezone", "status", "actor"])?;
    let created = state.coaches.create(opts).await.map_err(|e| ApiError::service(OP, e))?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get(State(state): State<ServerState>, Path(coach_id): Path<String>) -> Result<Json<coach::Model>, ApiError> {
    const OP: &str = "coaches.get";
    let input = with_path(Input::new(), &[("coach_id", coach_id)]);
    require_fields(OP, &input, &["coach_id"])?;
    let opts = options(OP, &input, &["coach_id"])?;
    state.coaches.get(opts).await.map(Json).map_err(|e| ApiError::service(OP, e))
}

pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Page<coach::Model>>, ApiError> {
    const OP: &str = "coaches.list";
    let input = from_query(query);
    let opts = options(OP, &input, &["status", "page", "limit"])?;
    state.coaches.list(opts).await.map(Json).map_err(|e| ApiError::service(OP, e))
}
