use axum::{
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use common::types::Health;

use crate::state::ServerState;

pub mod audit;
pub mod clients;
pub mod coaches;
pub mod plans;
pub mod sessions;

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

/// Build the application router.
pub fn build_router(state: ServerState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/coaches", post(coaches::create).get(coaches::list))
        .route("/coaches/:coach_id", get(coaches::get))
        .route("/coaches/:coach_id/clients", post(clients::create).get(clients::list))
        .route("/coaches/:coach_id/clients/:client_id", get(clients::get))
        .route("/sessions", get(sessions::list).post(sessions::schedule))
        .route("/sessions/summary", get(sessions::summary))
        .route("/sessions/dashboards", post(sessions::dashboards))
        .route("/sessions/:session_id", get(sessions::get))
        .route("/sessions/:session_id/cancel", post(sessions::cancel))
        .route("/sessions/:session_id/complete", post(sessions::complete))
        .route("/plans", post(plans::create))
        .route("/audit/verify", get(audit::verify))
        .route("/audit/:entity/:entity_id", get(audit::history))
        .with_state(state)
        .layer(cors)
        .layer(
            // Spans carry method and path only; headers may hold identifiers.
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO).include_headers(false))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO).include_headers(false))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}
