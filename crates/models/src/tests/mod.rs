/// Integration tests combining the model operations against a live database.
/// Skipped when `SKIP_DB_TESTS` is set or Postgres is unreachable.
pub mod integration_tests {
    use crate::db::connect;
    use crate::pagination::Pagination;
    use crate::{audit_log, client, coach, coaching_session, scheduled_job};
    use chrono::{Duration, Utc};
    use migration::MigratorTrait;
    use sea_orm::{DatabaseConnection, EntityTrait};
    use uuid::Uuid;

    async fn setup() -> Option<DatabaseConnection> {
        if std::env::var("SKIP_DB_TESTS").is_ok() {
            return None;
        }
        let db = match connect().await {
            Ok(db) => db,
            Err(e) => {
                eprintln!("skip: cannot connect to db: {}", e);
                return None;
            }
        };
        if let Err(e) = migration::Migrator::up(&db, None).await {
            eprintln!("skip: migrate up failed: {}", e);
            return None;
        }
        Some(db)
    }

    /// coach -> client -> sessions -> range, population, aggregation
    #[tokio::test]
    async fn test_session_workflow() -> anyhow::Result<()> {
        let Some(db) = setup().await else { return Ok(()) };

        let c = coach::create(&db, coach::NewCoach {
            name: "Workflow Coach".into(),
            email: format!("coach_{}@example.com", Uuid::new_v4()),
            ..Default::default()
        })
        .await?;
        let cl = client::create(&db, client::NewClient {
            coach_id: c.id,
            display_name: "Client A".into(),
            email_encrypted: "enc:v1:placeholder".into(),
            ..Default::default()
        })
        .await?;

        let base = Utc::now() + Duration::days(30);
        for i in 0..3 {
            coaching_session::create(&db, coaching_session::NewSession {
                coach_id: c.id,
                client_id: cl.id,
                scheduled_at: (base + Duration::hours(i * 2)).into(),
                duration_minutes: None,
                notes_encrypted: None,
            })
            .await?;
        }

        let filter = coaching_session::SessionRangeFilter {
            coach_id: c.id,
            start: (base - Duration::hours(1)).into(),
            end: (base + Duration::days(1)).into(),
            status: None,
        };
        let items = coaching_session::list_in_range_with_client(&db, &filter, Pagination::new(1, 2).normalize(100)).await?;
        assert_eq!(coaching_session::count_in_range(&db, &filter).await?, 3);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].1.as_ref().map(|c| c.id), Some(cl.id));

        let breakdown = coaching_session::status_breakdown(&db, &filter).await?;
        assert_eq!(breakdown, vec![coaching_session::StatusCount { status: "scheduled".into(), count: 3 }]);

        let overlapping = coaching_session::overlapping(
            &db,
            c.id,
            (base + Duration::minutes(30)).into(),
            (base + Duration::minutes(90)).into(),
        )
        .await?;
        assert_eq!(overlapping.len(), 1);

        coach::Entity::delete_by_id(c.id).exec(&db).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_coach_email_is_conflict() -> anyhow::Result<()> {
        let Some(db) = setup().await else { return Ok(()) };
        let email = format!("dup_{}@example.com", Uuid::new_v4());
        let first = coach::create(&db, coach::NewCoach { name: "First".into(), email: email.clone(), ..Default::default() }).await?;
        let err = coach::create(&db, coach::NewCoach { name: "Second".into(), email, ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, crate::errors::ModelError::Conflict(_)), "{err:?}");
        coach::Entity::delete_by_id(first.id).exec(&db).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_audit_append_and_head() -> anyhow::Result<()> {
        let Some(db) = setup().await else { return Ok(()) };
        let entity_id = Uuid::new_v4().to_string();
        let hash = format!("{:0>64}", Uuid::new_v4().simple());
        let appended = audit_log::append(&db, audit_log::NewEntry {
            actor: "tester".into(),
            action: "session.create".into(),
            entity: "coaching_session".into(),
            entity_id: entity_id.clone(),
            prev_hash: audit_log::GENESIS_HASH.into(),
            hash: hash.clone(),
            created_at: Utc::now().into(),
        })
        .await?;
        let head = audit_log::last(&db).await?.expect("head");
        assert!(head.id >= appended.id);
        let rows = audit_log::list_for_entity(&db, "coaching_session", &entity_id, Default::default()).await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].hash, hash);
        Ok(())
    }

    #[tokio::test]
    async fn test_job_enqueue_due_and_mark() -> anyhow::Result<()> {
        let Some(db) = setup().await else { return Ok(()) };
        let job = scheduled_job::enqueue(&db, "test.noop", serde_json::json!({"n": 1}), (Utc::now() - Duration::minutes(1)).into()).await?;
        let now = Utc::now();
        let stale_before = (now - Duration::minutes(15)).into();
        let due = scheduled_job::due(&db, now.into(), stale_before, 100).await?;
        assert!(due.iter().any(|j| j.id == job.id));
        let running = scheduled_job::claim(&db, job.id, now.into(), stale_before).await?.expect("claimed");
        assert_eq!(running.attempts, 1);
        assert!(scheduled_job::claim(&db, job.id, now.into(), stale_before).await?.is_none());
        let done = scheduled_job::mark(&db, job.id, "done", None).await?;
        assert_eq!(done.status, "done");
        scheduled_job::Entity::delete_by_id(job.id).exec(&db).await?;
        Ok(())
    }
}
