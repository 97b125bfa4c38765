use serde::Deserialize;
use tracing::{info, instrument};

use models::coach::{self, CoachFilter, NewCoach};
use models::pagination::{Page, Pagination};

use super::{actor, traced, ServiceContext};
use crate::audit::append_chained;
use crate::errors::ServiceError;
use crate::repository::settle;
use crate::validate;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CreateCoachOptions {
    pub name: Option<String>,
    pub email: Option<String>,
    pub timezone: Option<String>,
    pub status: Option<String>,
    pub actor: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct GetCoachOptions {
    pub coach_id: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListCoachesOptions {
    pub status: Option<String>,
    #[serde(flatten)]
    pub pagination: Pagination,
}

pub struct CoachService {
    ctx: ServiceContext,
}

impl CoachService {
    pub fn new(ctx: ServiceContext) -> Self { Self { ctx } }

    #[instrument(skip_all)]
    pub async fn create(&self, opts: CreateCoachOptions) -> Result<coach::Model, ServiceError> {
        traced("CoachService::create", async {
            validate::require(&[("name", opts.name.as_deref()), ("email", opts.email.as_deref())])?;
            let input = NewCoach {
                name: opts.name.clone().unwrap_or_default(),
                email: opts.email.clone().unwrap_or_default(),
                timezone: opts.timezone.clone(),
                status: opts.status.clone(),
            };
            let tx = self.ctx.uow.begin().await?;
            let result = async {
                let store = tx.store();
                let created = store.create_coach(input).await?;
                append_chained(store, actor(opts.actor.as_deref()), "coach.create", "coach", &created.id.to_string()).await?;
                Ok::<_, ServiceError>(created)
            }
            .await;
            let created = settle(tx, result).await?;
            info!(coach_id = %created.id, "coach_created");
            Ok::<_, ServiceError>(created)
        })
        .await
    }

    #[instrument(skip_all, fields(coach_id = ?opts.coach_id))]
    pub async fn get(&self, opts: GetCoachOptions) -> Result<coach::Model, ServiceError> {
        traced("CoachService::get", async {
            validate::require(&[("coach_id", opts.coach_id.as_deref())])?;
            let id = validate::parse_uuid("coach_id", opts.coach_id.as_deref())?;
            self.ctx.coaches.find_coach(id).await?.ok_or_else(|| ServiceError::not_found("coach"))
        })
        .await
    }

    #[instrument(skip_all)]
    pub async fn list(&self, opts: ListCoachesOptions) -> Result<Page<coach::Model>, ServiceError> {
        traced("CoachService::list", async {
            let filter = CoachFilter { status: opts.status.clone().filter(|s| !s.trim().is_empty()) };
            let window = opts.pagination.normalize(self.ctx.limits.page_size_cap);
            self.ctx.coaches.list_coaches(&filter, window).await
        })
        .await
    }
}
