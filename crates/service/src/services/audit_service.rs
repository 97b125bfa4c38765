use serde::Deserialize;
use tracing::instrument;

use models::audit_log;
use models::pagination::Pagination;

use super::{traced, ServiceContext};
use crate::audit::ChainReport;
use crate::errors::ServiceError;
use crate::validate;

/// Entity names the services write to the trail.
pub const AUDITED_ENTITIES: &[&str] = &["coach", "client", "coaching_session"];

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AuditHistoryOptions {
    pub entity: Option<String>,
    pub entity_id: Option<String>,
    #[serde(flatten)]
    pub pagination: Pagination,
}

/// Read side of the audit trail.
pub struct AuditService {
    ctx: ServiceContext,
}

impl AuditService {
    pub fn new(ctx: ServiceContext) -> Self { Self { ctx } }

    /// Entries for one record, oldest first.
    #[instrument(skip_all, fields(entity = ?opts.entity, entity_id = ?opts.entity_id))]
    pub async fn history(&self, opts: AuditHistoryOptions) -> Result<Vec<audit_log::Model>, ServiceError> {
        traced("AuditService::history", async {
            validate::require(&[("entity", opts.entity.as_deref()), ("entity_id", opts.entity_id.as_deref())])?;
            let entity = opts.entity.as_deref().unwrap_or_default().trim();
            if !AUDITED_ENTITIES.contains(&entity) {
                return Err(ServiceError::Validation(format!("entity must be one of {}", AUDITED_ENTITIES.join(", "))));
            }
            let entity_id = opts.entity_id.as_deref().unwrap_or_default().trim();
            self.ctx.audit.history(entity, entity_id, opts.pagination).await
        })
        .await
    }

    /// Re-hash the whole chain and report the first broken link, if any.
    #[instrument(skip_all)]
    pub async fn verify(&self) -> Result<ChainReport, ServiceError> {
        traced("AuditService::verify", self.ctx.audit.verify()).await
    }
}
