use std::{net::SocketAddr, sync::Arc};

use axum::Router;
use common::crypto::FieldCipher;
use migration::{Migrator, MigratorTrait};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use configs::AppConfig;
use service::planning::PlanningService;
use service::repo::SeaOrmRepository;
use service::{Limits, ServiceContext};

use crate::errors::StartupError;
use crate::routes;
use crate::state::ServerState;

fn build_cors() -> CorsLayer {
    CorsLayer::very_permissive()
}

fn bind_addr(cfg: &AppConfig) -> Result<SocketAddr, StartupError> {
    format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .map_err(|e| StartupError::InvalidConfig(format!("server address: {e}")))
}

/// Wire the services to Postgres and assemble the router.
pub async fn build_app(cfg: &AppConfig) -> Result<Router, StartupError> {
    common::env::ensure_env(&cfg.planning.source_root).await;

    let db = models::db::connect_with_config(&cfg.database).await?;
    Migrator::up(&db, None).await.map_err(|e| StartupError::Any(e.into()))?;

    let cipher = Arc::new(FieldCipher::from_base64_key(&cfg.security.encryption_key)?);
    let repo = Arc::new(SeaOrmRepository::new(db));
    let ctx = ServiceContext::new(repo, cipher, Limits::from(&cfg.limits));
    let state = ServerState::from_context(ctx, PlanningService::from_config(&cfg.planning));

    Ok(routes::build_router(state, build_cors()))
}

/// Resolves on ctrl-c, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl_c_handler_unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "sigterm_handler_unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(signal = "ctrl_c", "shutdown_requested"),
        _ = terminate => info!(signal = "sigterm", "shutdown_requested"),
    }
}

/// Build the app from an already loaded config and serve until `shutdown`
/// resolves. In-flight requests are drained before returning.
pub async fn serve_until<F>(cfg: &AppConfig, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = build_app(cfg).await?;
    let addr = bind_addr(cfg)?;
    info!(%addr, page_size_cap = cfg.limits.page_size_cap, max_concurrency = cfg.limits.max_concurrency, "starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;
    info!(%addr, "server drained");
    Ok(())
}

/// Public entry: serve with the given config until ctrl-c or SIGTERM.
pub async fn run(cfg: AppConfig) -> anyhow::Result<()> {
    serve_until(&cfg, shutdown_signal()).await
}
