//! Object-safe seams between the HTTP layer and the services. Handlers hold
//! `Arc<dyn ...Operations>` so tests can substitute recording doubles.

use async_trait::async_trait;

use models::{audit_log, coach};
use models::pagination::Page;

use crate::audit::ChainReport;
use crate::errors::ServiceError;
use crate::planning::{PlanDocument, PlanOptions, PlanningService};
use crate::services::audit_service::AuditHistoryOptions;
use crate::services::client_service::{CreateClientOptions, GetClientOptions, ListClientsOptions};
use crate::services::coach_service::{CreateCoachOptions, GetCoachOptions, ListCoachesOptions};
use crate::services::session_service::{
    CancelSessionOptions, CompleteSessionOptions, DashboardOptions, GetSessionOptions, ListSessionsOptions, ScheduleSessionOptions,
    SessionSummaryOptions,
};
use crate::services::{AuditService, ClientDetail, ClientService, ClientSummary, CoachService, SessionDetail, SessionService, SessionSummary, SessionView};

#[async_trait]
pub trait CoachOperations: Send + Sync {
    async fn create(&self, opts: CreateCoachOptions) -> Result<coach::Model, ServiceError>;
    async fn get(&self, opts: GetCoachOptions) -> Result<coach::Model, ServiceError>;
    async fn list(&self, opts: ListCoachesOptions) -> Result<Page<coach::Model>, ServiceError>;
}

#[async_trait]
pub trait ClientOperations: Send + Sync {
    async fn create(&self, opts: CreateClientOptions) -> Result<ClientSummary, ServiceError>;
    async fn get(&self, opts: GetClientOptions) -> Result<ClientDetail, ServiceError>;
    async fn list(&self, opts: ListClientsOptions) -> Result<Page<ClientSummary>, ServiceError>;
}

#[async_trait]
pub trait SessionOperations: Send + Sync {
    async fn list_for_coach(&self, opts: ListSessionsOptions) -> Result<Page<SessionView>, ServiceError>;
    async fn schedule(&self, opts: ScheduleSessionOptions) -> Result<SessionView, ServiceError>;
    async fn cancel(&self, opts: CancelSessionOptions) -> Result<SessionView, ServiceError>;
    async fn complete(&self, opts: CompleteSessionOptions) -> Result<SessionView, ServiceError>;
    async fn get(&self, opts: GetSessionOptions) -> Result<SessionDetail, ServiceError>;
    async fn summary(&self, opts: SessionSummaryOptions) -> Result<SessionSummary, ServiceError>;
    async fn dashboards(&self, opts: DashboardOptions) -> Result<Vec<SessionSummary>, ServiceError>;
}

#[async_trait]
pub trait AuditOperations: Send + Sync {
    async fn history(&self, opts: AuditHistoryOptions) -> Result<Vec<audit_log::Model>, ServiceError>;
    async fn verify(&self) -> Result<ChainReport, ServiceError>;
}

#[async_trait]
pub trait PlanningOperations: Send + Sync {
    async fn plan(&self, opts: PlanOptions) -> Result<PlanDocument, ServiceError>;
}

#[async_trait]
impl CoachOperations for CoachService {
    async fn create(&self, opts: CreateCoachOptions) -> Result<coach::Model, ServiceError> { CoachService::create(self, opts).await }
    async fn get(&self, opts: GetCoachOptions) -> Result<coach::Model, ServiceError> { CoachService::get(self, opts).await }
    async fn list(&self, opts: ListCoachesOptions) -> Result<Page<coach::Model>, ServiceError> { CoachService::list(self, opts).await }
}

#[async_trait]
impl ClientOperations for ClientService {
    async fn create(&self, opts: CreateClientOptions) -> Result<ClientSummary, ServiceError> { ClientService::create(self, opts).await }
    async fn get(&self, opts: GetClientOptions) -> Result<ClientDetail, ServiceError> { ClientService::get(self, opts).await }
    async fn list(&self, opts: ListClientsOptions) -> Result<Page<ClientSummary>, ServiceError> { ClientService::list(self, opts).await }
}

#[async_trait]
impl SessionOperations for SessionService {
    async fn list_for_coach(&self, opts: ListSessionsOptions) -> Result<Page<SessionView>, ServiceError> {
        SessionService::list_for_coach(self, opts).await
    }
    async fn schedule(&self, opts: ScheduleSessionOptions) -> Result<SessionView, ServiceError> { SessionService::schedule(self, opts).await }
    async fn cancel(&self, opts: CancelSessionOptions) -> Result<SessionView, ServiceError> { SessionService::cancel(self, opts).await }
    async fn complete(&self, opts: CompleteSessionOptions) -> Result<SessionView, ServiceError> { SessionService::complete(self, opts).await }
    async fn get(&self, opts: GetSessionOptions) -> Result<SessionDetail, ServiceError> { SessionService::get(self, opts).await }
    async fn summary(&self, opts: SessionSummaryOptions) -> Result<SessionSummary, ServiceError> { SessionService::summary(self, opts).await }
    async fn dashboards(&self, opts: DashboardOptions) -> Result<Vec<SessionSummary>, ServiceError> {
        SessionService::dashboards(self, opts).await
    }
}

#[async_trait]
impl AuditOperations for AuditService {
    async fn history(&self, opts: AuditHistoryOptions) -> Result<Vec<audit_log::Model>, ServiceError> { AuditService::history(self, opts).await }
    async fn verify(&self) -> Result<ChainReport, ServiceError> { AuditService::verify(self).await }
}

#[async_trait]
impl PlanningOperations for PlanningService {
    async fn plan(&self, opts: PlanOptions) -> Result<PlanDocument, ServiceError> { PlanningService::plan(self, opts).await }
}
