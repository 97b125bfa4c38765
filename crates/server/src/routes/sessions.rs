use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use models::pagination::Page;
use service::services::{SessionDetail, SessionSummary, SessionView};

use crate::controller::{from_query, options, require_fields, with_path, Input};
use crate::errors::ApiError;
use crate::state::ServerState;

fn body_or_empty(body: Option<Json<Input>>) -> Input {
    body.map(|Json(b)| b).unwrap_or_default()
}

pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Page<SessionView>>, ApiError> {
    const OP: &str = "sessions.list";
    let input = from_query(query);
    require_fields(OP, &input, &["coach_id", "start_date", "end_date"])?;
    let opts = options(OP, &input, &["coach_id", "start_date", "end_date", "status", "page", "limit"])?;
    state.sessions.list_for_coach(opts).await.map(Json).map_err(|e| ApiError::service(OP, e))
}

pub async fn schedule(
    State(state): State<ServerState>,
    body: Option<Json<Input>>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    const OP: &str = "sessions.schedule";
    let input = body_or_empty(body);
    require_fields(OP, &input, &["coach_id", "client_id", "scheduled_at"])?;
    let opts = options(OP, &input, &["coach_id", "client_id", "scheduled_at", "duration_minutes", "notes", "actor"])?;
    let created = state.sessions.schedule(opts).await.map_err(|e| ApiError::service(OP, e))?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get(
    State(state): State<ServerState>,
    Path(session_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<SessionDetail>, ApiError> {
    const OP: &str = "sessions.get";
    let input = with_path(from_query(query), &[("session_id", session_id)]);
    require_fields(OP, &input, &["coach_id", "session_id"])?;
    let opts = options(OP, &input, &["coach_id", "session_id", "actor"])?;
    state.sessions.get(opts).await.map(Json).map_err(|e| ApiError::service(OP, e))
}

pub async fn cancel(
    State(state): State<ServerState>,
    Path(session_id): Path<String>,
    body: Option<Json<Input>>,
) -> Result<Json<SessionView>, ApiError> {
    const OP: &str = "sessions.cancel";
    let input = with_path(body_or_empty(body), &[("session_id", session_id)]);
    require_fields(OP, &input, &["coach_id", "session_id"])?;
    let opts = options(OP, &input, &["coach_id", "session_id", "reason", "actor"])?;
    state.sessions.cancel(opts).await.map(Json).map_err(|e| ApiError::service(OP, e))
}

pub async fn complete(
    State(state): State<ServerState>,
    Path(session_id): Path<String>,
    body: Option<Json<Input>>,
) -> Result<Json<SessionView>, ApiError> {
    const OP: &str = "sessions.complete";
    let input = with_path(body_or_empty(body), &[("session_id", session_id)]);
    require_fields(OP, &input, &["coach_id", "session_id"])?;
    let opts = options(OP, &input, &["coach_id", "session_id", "notes", "actor"])?;
    state.sessions.complete(opts).await.map(Json).map_err(|e| ApiError::service(OP, e))
}

pub async fn summary(
    State(state): State<ServerState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<SessionSummary>, ApiError> {
    const OP: &str = "sessions.summary";
    let input = from_query(query);
    require_fields(OP, &input, &["coach_id", "start_date", "end_date"])?;
    let opts = options(OP, &input, &["coach_id", "start_date", "end_date"])?;
    state.sessions.summary(opts).await.map(Json).map_err(|e| ApiError::service(OP, e))
}

pub async fn dashboards(
    State(state): State<ServerState>,
    body: Option<Json<Input>>,
) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    const OP: &str = "sessions.dashboards";
    let input = body_or_empty(body);
    require_fields(OP, &input, &["coach_ids", "start_date", "end_date"])?;
    let opts = options(OP, &input, &["coach_ids", "start_date", "end_date"])?;
    state.sessions.dashboards(opts).await.map(Json).map_err(|e| ApiError::service(OP, e))
}
