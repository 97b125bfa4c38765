//! Application services. Each operation validates its options bag first,
//! then composes repository calls; every error path is logged with the
//! operation name before it is returned.

pub mod coach_service;
pub mod client_service;
pub mod session_service;
pub mod audit_service;

use std::sync::Arc;

use common::crypto::FieldCipher;
use tracing::{error, warn};

use crate::audit::AuditTrail;
use crate::errors::{ErrorKind, ServiceError};
use crate::pii::{DecryptionService, FieldProtector};
use crate::repository::{ClientRepository, CoachRepository, SessionRepository, Store, UnitOfWork};

pub use client_service::{ClientService, ClientDetail, ClientSummary};
pub use audit_service::AuditService;
pub use coach_service::CoachService;
pub use session_service::{SessionService, SessionDetail, SessionSummary, SessionView};

/// Actor recorded in the audit trail when a caller names none.
pub const DEFAULT_ACTOR: &str = "api";

/// Runtime bounds applied by the services.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    pub page_size_cap: u64,
    pub max_concurrency: usize,
    pub max_dashboard_coaches: usize,
}

impl Default for Limits {
    fn default() -> Self { Self::from(&configs::LimitsConfig::default()) }
}

impl From<&configs::LimitsConfig> for Limits {
    fn from(cfg: &configs::LimitsConfig) -> Self {
        Self {
            page_size_cap: cfg.page_size_cap,
            max_concurrency: cfg.max_concurrency.max(1),
            max_dashboard_coaches: cfg.max_dashboard_coaches,
        }
    }
}

/// Everything the services share, built once at startup.
#[derive(Clone)]
pub struct ServiceContext {
    pub coaches: Arc<dyn CoachRepository>,
    pub clients: Arc<dyn ClientRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    /// Writes that must land together go through here.
    pub uow: Arc<dyn UnitOfWork>,
    pub audit: Arc<AuditTrail>,
    pub protector: FieldProtector,
    pub decryptor: DecryptionService,
    pub limits: Limits,
}

impl ServiceContext {
    /// Wire every service dependency to one store implementing all traits.
    pub fn new<R>(repo: Arc<R>, cipher: Arc<FieldCipher>, limits: Limits) -> Self
    where
        R: Store + UnitOfWork + 'static,
    {
        Self {
            coaches: repo.clone(),
            clients: repo.clone(),
            sessions: repo.clone(),
            uow: repo.clone(),
            audit: Arc::new(AuditTrail::new(repo.clone(), repo)),
            protector: FieldProtector::new(cipher.clone()),
            decryptor: DecryptionService::new(cipher),
            limits,
        }
    }
}

/// Log a failed operation. Caller mistakes are warnings; upstream and
/// internal failures are errors.
pub(crate) fn report(op: &'static str, err: &ServiceError) {
    let kind = err.kind();
    match kind {
        ErrorKind::Upstream | ErrorKind::Internal => error!(op, kind = kind.as_str(), error = %err, "operation_failed"),
        _ => warn!(op, kind = kind.as_str(), error = %err, "operation_rejected"),
    }
}

/// Run an operation body and log its error, if any, under `op`.
pub(crate) async fn traced<T, F>(op: &'static str, fut: F) -> Result<T, ServiceError>
where
    F: std::future::Future<Output = Result<T, ServiceError>>,
{
    let res = fut.await;
    if let Err(e) = &res {
        report(op, e);
    }
    res
}

pub(crate) fn actor(value: Option<&str>) -> &str {
    value.map(str::trim).filter(|v| !v.is_empty()).unwrap_or(DEFAULT_ACTOR)
}
