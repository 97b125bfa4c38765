use std::sync::Arc;

use service::operations::{AuditOperations, ClientOperations, CoachOperations, PlanningOperations, SessionOperations};
use service::planning::PlanningService;
use service::services::{AuditService, ClientService, CoachService, SessionService};
use service::ServiceContext;

/// Shared handler state. Every field is a trait object so the router can be
/// driven against doubles.
#[derive(Clone)]
pub struct ServerState {
    pub coaches: Arc<dyn CoachOperations>,
    pub clients: Arc<dyn ClientOperations>,
    pub sessions: Arc<dyn SessionOperations>,
    pub plans: Arc<dyn PlanningOperations>,
    pub audit: Arc<dyn AuditOperations>,
}

impl ServerState {
    pub fn from_context(ctx: ServiceContext, planning: PlanningService) -> Self {
        Self {
            coaches: Arc::new(CoachService::new(ctx.clone())),
            clients: Arc::new(ClientService::new(ctx.clone())),
            sessions: Arc::new(SessionService::new(ctx.clone())),
            plans: Arc::new(planning),
            audit: Arc::new(AuditService::new(ctx)),
        }
    }
}
