use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use models::client::{self, ClientFilter, NewClient};
use models::pagination::{Page, Pagination};
use models::schema;

use super::{actor, traced, ServiceContext};
use crate::audit::append_chained;
use crate::errors::ServiceError;
use crate::repository::settle;
use crate::validate;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CreateClientOptions {
    pub coach_id: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
    pub actor: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct GetClientOptions {
    pub coach_id: Option<String>,
    pub client_id: Option<String>,
    pub actor: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListClientsOptions {
    pub coach_id: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
    #[serde(flatten)]
    pub pagination: Pagination,
}

/// Client without any contact data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientSummary {
    pub id: Uuid,
    pub coach_id: Uuid,
    pub display_name: String,
    pub status: String,
    pub created_at: DateTimeWithTimeZone,
}

impl From<&client::Model> for ClientSummary {
    fn from(m: &client::Model) -> Self {
        Self {
            id: m.id,
            coach_id: m.coach_id,
            display_name: m.display_name.clone(),
            status: m.status.clone(),
            created_at: m.created_at,
        }
    }
}

/// Client with contact data opened for the requesting coach.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientDetail {
    #[serde(flatten)]
    pub summary: ClientSummary,
    pub email: String,
    pub phone: Option<String>,
}

pub struct ClientService {
    ctx: ServiceContext,
}

impl ClientService {
    pub fn new(ctx: ServiceContext) -> Self { Self { ctx } }

    async fn owned_client(&self, coach_id: Uuid, client_id: Uuid) -> Result<client::Model, ServiceError> {
        self.ctx
            .clients
            .find_client_for_coach(coach_id, client_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("client"))
    }

    /// Seal contact fields, then store. The coach must exist.
    #[instrument(skip_all, fields(coach_id = ?opts.coach_id))]
    pub async fn create(&self, opts: CreateClientOptions) -> Result<ClientSummary, ServiceError> {
        traced("ClientService::create", async {
            validate::require(&[
                ("coach_id", opts.coach_id.as_deref()),
                ("display_name", opts.display_name.as_deref()),
                ("email", opts.email.as_deref()),
            ])?;
            let coach_id = validate::parse_uuid("coach_id", opts.coach_id.as_deref())?;
            let email = opts.email.as_deref().unwrap_or_default().trim();
            schema::validate_email("email", email)?;

            self.ctx.coaches.find_coach(coach_id).await?.ok_or_else(|| ServiceError::not_found("coach"))?;

            let input = NewClient {
                coach_id,
                display_name: opts.display_name.clone().unwrap_or_default(),
                email_encrypted: self.ctx.protector.seal("email", &email.to_ascii_lowercase())?,
                phone_encrypted: self.ctx.protector.seal_opt("phone", opts.phone.as_deref())?,
                status: opts.status.clone(),
            };
            let tx = self.ctx.uow.begin().await?;
            let result = async {
                let store = tx.store();
                let created = store.create_client(input).await?;
                append_chained(store, actor(opts.actor.as_deref()), "client.create", "client", &created.id.to_string()).await?;
                Ok::<_, ServiceError>(created)
            }
            .await;
            let created = settle(tx, result).await?;
            info!(client_id = %created.id, coach_id = %coach_id, "client_created");
            Ok::<_, ServiceError>(ClientSummary::from(&created))
        })
        .await
    }

    /// Open the contact fields. Each read is written to the audit trail.
    #[instrument(skip_all, fields(coach_id = ?opts.coach_id, client_id = ?opts.client_id))]
    pub async fn get(&self, opts: GetClientOptions) -> Result<ClientDetail, ServiceError> {
        traced("ClientService::get", async {
            validate::require(&[("coach_id", opts.coach_id.as_deref()), ("client_id", opts.client_id.as_deref())])?;
            let coach_id = validate::parse_uuid("coach_id", opts.coach_id.as_deref())?;
            let client_id = validate::parse_uuid("client_id", opts.client_id.as_deref())?;
            let found = self.owned_client(coach_id, client_id).await?;

            let entity_id = found.id.to_string();
            let email = self.ctx.decryptor.decrypt("email", &entity_id, &found.email_encrypted)?;
            let phone = self.ctx.decryptor.decrypt_opt("phone", &entity_id, found.phone_encrypted.as_deref())?;
            self.ctx.audit.record(actor(opts.actor.as_deref()), "client.view_contact", "client", &entity_id).await?;
            Ok::<_, ServiceError>(ClientDetail { summary: ClientSummary::from(&found), email, phone })
        })
        .await
    }

    #[instrument(skip_all, fields(coach_id = ?opts.coach_id))]
    pub async fn list(&self, opts: ListClientsOptions) -> Result<Page<ClientSummary>, ServiceError> {
        traced("ClientService::list", async {
            validate::require(&[("coach_id", opts.coach_id.as_deref())])?;
            let coach_id = validate::parse_uuid("coach_id", opts.coach_id.as_deref())?;
            let filter = ClientFilter {
                status: opts.status.clone().filter(|s| !s.trim().is_empty()),
                search: opts.search.clone(),
            };
            let window = opts.pagination.normalize(self.ctx.limits.page_size_cap);
            let page = self.ctx.clients.list_clients(coach_id, &filter, window).await?;
            Ok::<_, ServiceError>(page.map(|c| ClientSummary::from(&c)))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::services::coach_service::{CoachService, CreateCoachOptions};
    use crate::services::fixtures;
    use common::crypto::FieldCipher;

    async fn coach_id(ctx: &ServiceContext) -> String {
        CoachService::new(ctx.clone())
            .create(CreateCoachOptions { name: Some("Coach".into()), email: Some("coach@example.com".into()), ..Default::default() })
            .await
            .unwrap()
            .id
            .to_string()
    }

    fn client_opts(coach_id: &str) -> CreateClientOptions {
        CreateClientOptions {
            coach_id: Some(coach_id.into()),
            display_name: Some("Jane D.".into()),
            email: Some("Jane@Example.com".into()),
            phone: Some("555-0100".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn contact_fields_are_stored_sealed_and_opened_on_get() {
        let (_, ctx) = fixtures::context();
        let coach = coach_id(&ctx).await;
        let svc = ClientService::new(ctx.clone());
        let created = svc.create(client_opts(&coach)).await.unwrap();

        let stored = ctx
            .clients
            .find_client_for_coach(created.coach_id, created.id)
            .await
            .unwrap()
            .unwrap();
        assert!(FieldCipher::is_sealed(&stored.email_encrypted));
        assert!(!stored.email_encrypted.contains("jane"));

        let detail = svc
            .get(GetClientOptions { coach_id: Some(coach), client_id: Some(created.id.to_string()), actor: Some("coach-app".into()) })
            .await
            .unwrap();
        assert_eq!(detail.email, "jane@example.com");
        assert_eq!(detail.phone.as_deref(), Some("555-0100"));
    }

    #[tokio::test]
    async fn contact_reads_are_audited() {
        let (repo, ctx) = fixtures::context();
        let coach = coach_id(&ctx).await;
        let svc = ClientService::new(ctx);
        let created = svc.create(client_opts(&coach)).await.unwrap();
        svc.get(GetClientOptions { coach_id: Some(coach), client_id: Some(created.id.to_string()), actor: Some("coach-app".into()) })
            .await
            .unwrap();
        let last = repo.audit_entries().pop().unwrap();
        assert_eq!(last.action, "client.view_contact");
        assert_eq!(last.actor, "coach-app");
    }

    #[tokio::test]
    async fn summaries_never_carry_contact_data() {
        let (_, ctx) = fixtures::context();
        let coach = coach_id(&ctx).await;
        let svc = ClientService::new(ctx);
        svc.create(client_opts(&coach)).await.unwrap();
        let page = svc
            .list(ListClientsOptions { coach_id: Some(coach), search: Some("jane".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        let json = serde_json::to_string(&page).unwrap();
        assert!(!json.contains("example.com"));
        assert!(!json.contains("555-0100"));
    }

    #[tokio::test]
    async fn failed_audit_leaves_no_client() {
        let (repo, ctx) = fixtures::context();
        let coach = coach_id(&ctx).await;
        let svc = ClientService::new(ctx);
        repo.fail_on("append_audit");
        assert_eq!(svc.create(client_opts(&coach)).await.unwrap_err().status(), 502);
        repo.clear_failures();
        let page = svc.list(ListClientsOptions { coach_id: Some(coach), ..Default::default() }).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn another_coach_cannot_read_client() {
        let (_, ctx) = fixtures::context();
        let coach = coach_id(&ctx).await;
        let svc = ClientService::new(ctx);
        let created = svc.create(client_opts(&coach)).await.unwrap();
        let err = svc
            .get(GetClientOptions { coach_id: Some(Uuid::new_v4().to_string()), client_id: Some(created.id.to_string()), actor: None })
            .await
            .unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[tokio::test]
    async fn unknown_coach_and_bad_email_are_rejected() {
        let (repo, ctx) = fixtures::context();
        let svc = ClientService::new(ctx);
        let err = svc.create(client_opts(&Uuid::new_v4().to_string())).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let before = repo.call_count();
        let mut opts = client_opts(&Uuid::new_v4().to_string());
        opts.email = Some("not-an-email".into());
        let err = svc.create(opts).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(repo.call_count(), before);
    }
}
