use axum::extract::State;
use axum::Json;
use serde::Serialize;

use service::planning::PlanDocument;

use crate::controller::{options, require_fields, Input};
use crate::errors::ApiError;
use crate::state::ServerState;

#[derive(Serialize)]
pub struct PlanResponse {
    pub plan: PlanDocument,
    pub markdown: String,
}

pub async fn create(State(state): State<ServerState>, body: Option<Json<Input>>) -> Result<Json<PlanResponse>, ApiError> {
    const OP: &str = "plans.create";
    let input = body.map(|Json(b)| b).unwrap_or_default();
    require_fields(OP, &input, &["title", "kind", "summary"])?;
    let opts = options(OP, &input, &["title", "kind", "summary", "requirements", "handles_phi", "keywords"])?;
    let plan = state.plans.plan(opts).await.map_err(|e| ApiError::service(OP, e))?;
    let markdown = plan.to_markdown();
    Ok(Json(PlanResponse { plan, markdown }))
}
