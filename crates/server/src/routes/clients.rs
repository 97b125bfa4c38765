use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use models::pagination::Page;
use service::services::{ClientDetail, ClientSummary};

use crate::controller::{from_query, options, require_fields, with_path, Input};
use crate::errors::ApiError;
use crate::state::ServerState;

pub async fn create(
    State(state): State<ServerState>,
    Path(coach_id): Path<String>,
    body: Option<Json<Input>>,
) -> Result<(StatusCode, Json<ClientSummary>), ApiError> {
    const OP: &str = "clients.create";
    let input = with_path(body.map(|Json(b)| b).unwrap_or_default(), &[("coach_id", coach_id)]);
    require_fields(OP, &input, &["coach_id", "display_name", "email"])?;
    let opts = options(OP, &input, &["coach_id", "display_name", "email", "phone", "status", "actor"])?;
    let created = state.clients.create(opts).await.map_err(|e| ApiError::service(OP, e))?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Opens contact fields, so the caller may name itself for the audit trail.
pub async fn get(
    State(state): State<ServerState>,
    Path((coach_id, client_id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<ClientDetail>, ApiError> {
    const OP: &str = "clients.get";
    let input = with_path(from_query(query), &[("coach_id", coach_id), ("client_id", client_id)]);
    require_fields(OP, &input, &["coach_id", "client_id"])?;
    let opts = options(OP, &input, &["coach_id", "client_id", "actor"])?;
    state.clients.get(opts).await.map(Json).map_err(|e| ApiError::service(OP, e))
}

pub async fn list(
    State(state): State<ServerState>,
    Path(coach_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Page<ClientSummary>>, ApiError> {
    const OP: &str = "clients.list";
    let input = with_path(from_query(query), &[("coach_id", coach_id)]);
    require_fields(OP, &input, &["coach_id"])?;
    let opts = options(OP, &input, &["coach_id", "status", "search", "page", "limit"])?;
    state.clients.list(opts).await.map(Json).map_err(|e| ApiError::service(OP, e))
}
