//! Full HTTP round trips against the real services over the in-memory store.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use common::crypto::{FieldCipher, KEY_LEN};
use server::routes::build_router;
use server::state::ServerState;
use service::planning::PlanningService;
use service::repository::mock::MockRepository;
use service::{Limits, ServiceContext};

struct Harness {
    base: String,
    repo: Arc<MockRepository>,
    http: reqwest::Client,
}

async fn spawn() -> anyhow::Result<Harness> {
    let repo = Arc::new(MockRepository::new());
    let cipher = Arc::new(FieldCipher::new(&[7u8; KEY_LEN])?);
    let ctx = ServiceContext::new(repo.clone(), cipher, Limits::default());
    let planning = PlanningService::new(concat!(env!("CARGO_MANIFEST_DIR"), "/src"), 200);
    let app = build_router(ServerState::from_context(ctx, planning), CorsLayer::very_permissive());

    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(Harness { base: format!("http://{addr}"), repo, http: reqwest::Client::new() })
}

impl Harness {
    async fn post(&self, path: &str, body: Value) -> anyhow::Result<(u16, Value)> {
        let res = self.http.post(format!("{}{}", self.base, path)).json(&body).send().await?;
        Ok((res.status().as_u16(), res.json().await?))
    }

    async fn get(&self, path: &str) -> anyhow::Result<(u16, Value)> {
        let res = self.http.get(format!("{}{}", self.base, path)).send().await?;
        Ok((res.status().as_u16(), res.json().await?))
    }
}

#[tokio::test]
async fn schedule_list_and_cancel_flow() -> anyhow::Result<()> {
    let h = spawn().await?;

    let (status, coach) = h.post("/coaches", json!({"name": "Ada", "email": "ada@example.com"})).await?;
    assert_eq!(status, 201);
    let coach_id = coach["id"].as_str().unwrap_or_default().to_string();

    let (status, client) = h
        .post(
            &format!("/coaches/{coach_id}/clients"),
            json!({"display_name": "Jane D.", "email": "jane@example.com", "phone": "555-0100"}),
        )
        .await?;
    assert_eq!(status, 201);
    assert!(client.get("email").is_none());
    let client_id = client["id"].as_str().unwrap_or_default().to_string();

    let start = Utc::now() + Duration::days(3);
    let (status, session) = h
        .post(
            "/sessions",
            json!({
                "coach_id": coach_id,
                "client_id": client_id,
                "scheduled_at": start.to_rfc3339(),
                "duration_minutes": 45,
                "notes": "goal: sleep hygiene",
            }),
        )
        .await?;
    assert_eq!(status, 201);
    assert_eq!(session["has_notes"], true);
    assert!(session.get("notes").is_none());
    let session_id = session["id"].as_str().unwrap_or_default().to_string();
    assert_eq!(h.repo.jobs().len(), 1);

    let range = format!(
        "start_date={}&end_date={}",
        Utc::now().date_naive(),
        (Utc::now() + Duration::days(7)).date_naive()
    );
    let (status, page) = h.get(&format!("/sessions?coach_id={coach_id}&{range}&limit=500")).await?;
    assert_eq!(status, 200);
    assert_eq!(page["limit"], 100);
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["client"]["display_name"], "Jane D.");

    let (status, detail) = h.get(&format!("/sessions/{session_id}?coach_id={coach_id}")).await?;
    assert_eq!(status, 200);
    assert_eq!(detail["notes"], "goal: sleep hygiene");

    let (status, cancelled) = h
        .post(&format!("/sessions/{session_id}/cancel"), json!({"coach_id": coach_id, "reason": "travel"}))
        .await?;
    assert_eq!(status, 200);
    assert_eq!(cancelled["status"], "cancelled");

    let (status, body) = h.post(&format!("/sessions/{session_id}/complete"), json!({"coach_id": coach_id})).await?;
    assert_eq!(status, 409);
    assert_eq!(body["status"], 409);

    let (status, summary) = h.get(&format!("/sessions/summary?coach_id={coach_id}&{range}")).await?;
    assert_eq!(status, 200);
    assert_eq!(summary["by_status"]["cancelled"], 1);
    assert_eq!(summary["total"], 1);
    Ok(())
}

#[tokio::test]
async fn missing_coach_id_touches_no_store() -> anyhow::Result<()> {
    let h = spawn().await?;
    let (status, body) = h.get("/sessions?coach_id=&start_date=2024-01-01&end_date=2024-02-01").await?;
    assert_eq!(status, 400);
    assert_eq!(body, json!({"status": 400, "message": "Missing required parameters"}));
    assert_eq!(h.repo.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn contact_read_is_audited() -> anyhow::Result<()> {
    let h = spawn().await?;
    let (_, coach) = h.post("/coaches", json!({"name": "Ada", "email": "ada@example.com"})).await?;
    let coach_id = coach["id"].as_str().unwrap_or_default().to_string();
    let (_, client) = h
        .post(&format!("/coaches/{coach_id}/clients"), json!({"display_name": "Jane", "email": "Jane@Example.com"}))
        .await?;
    let client_id = client["id"].as_str().unwrap_or_default().to_string();

    let (status, detail) = h.get(&format!("/coaches/{coach_id}/clients/{client_id}?actor=front-desk")).await?;
    assert_eq!(status, 200);
    assert_eq!(detail["email"], "jane@example.com");

    let last = h.repo.audit_entries().pop().expect("audit entry");
    assert_eq!(last.action, "client.view_contact");
    assert_eq!(last.actor, "front-desk");

    let (status, history) = h.get(&format!("/audit/client/{client_id}")).await?;
    assert_eq!(status, 200);
    let actions: Vec<&str> = history.as_array().into_iter().flatten().filter_map(|e| e["action"].as_str()).collect();
    assert_eq!(actions, vec!["client.create", "client.view_contact"]);

    let (status, report) = h.get("/audit/verify").await?;
    assert_eq!(status, 200);
    assert_eq!(report["intact"], true);
    assert_eq!(report["checked"], 3);
    Ok(())
}

#[tokio::test]
async fn duplicate_coach_email_is_a_conflict() -> anyhow::Result<()> {
    let h = spawn().await?;
    let (status, _) = h.post("/coaches", json!({"name": "Ada", "email": "ada@example.com"})).await?;
    assert_eq!(status, 201);
    let (status, body) = h.post("/coaches", json!({"name": "Ada L.", "email": "Ada@Example.com"})).await?;
    assert_eq!(status, 409);
    assert_eq!(body, json!({"status": 409, "message": "Record already exists"}));
    Ok(())
}

#[tokio::test]
async fn plan_returns_document_and_markdown() -> anyhow::Result<()> {
    let h = spawn().await?;
    let (status, body) = h
        .post(
            "/plans",
            json!({
                "title": "Session reminders",
                "kind": "feature",
                "summary": "Remind clients a day ahead",
                "requirements": ["email reminder"],
                "handles_phi": true,
                "keywords": ["session"],
            }),
        )
        .await?;
    assert_eq!(status, 200);
    let md = body["markdown"].as_str().unwrap_or_default();
    assert!(md.starts_with("# Feature: Session reminders"));
    assert!(md.contains("### Compliance"));
    assert!(!body["plan"]["steps"].as_array().map(Vec::is_empty).unwrap_or(true));

    let (status, _) = h.post("/plans", json!({"title": "x", "kind": "rewrite", "summary": "y"})).await?;
    assert_eq!(status, 400);
    Ok(())
}

#[tokio::test]
async fn shutdown_drains_and_returns() -> anyhow::Result<()> {
    let repo = Arc::new(MockRepository::new());
    let cipher = Arc::new(FieldCipher::new(&[7u8; KEY_LEN])?);
    let ctx = ServiceContext::new(repo, cipher, Limits::default());
    let planning = PlanningService::new(concat!(env!("CARGO_MANIFEST_DIR"), "/src"), 200);
    let app = build_router(ServerState::from_context(ctx, planning), CorsLayer::very_permissive());

    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let base = format!("http://{}", listener.local_addr()?);
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stopped.await;
            })
            .await
    });

    let res = reqwest::get(format!("{base}/health")).await?;
    assert_eq!(res.status().as_u16(), 200);

    let _ = stop.send(());
    tokio::time::timeout(std::time::Duration::from_secs(5), server).await???;
    assert!(reqwest::get(format!("{base}/health")).await.is_err());
    Ok(())
}
