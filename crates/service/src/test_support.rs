#![cfg(test)]
use tokio::sync::OnceCell;
use sea_orm::DatabaseConnection;
use migration::MigratorTrait;
use models::db::{connect_with_config, DatabaseConfig, DATABASE_URL};

// Migrations run at most once per test process; `false` means the database
// was unreachable and DB-backed tests skip.
static MIGRATED: OnceCell<bool> = OnceCell::const_new();

fn config() -> DatabaseConfig {
    DatabaseConfig { url: DATABASE_URL.clone(), max_connections: 10, min_connections: 1, ..DatabaseConfig::default() }
}

/// A migrated connection, or `None` when `SKIP_DB_TESTS` is set or Postgres
/// is unreachable.
pub async fn get_db() -> Option<DatabaseConnection> {
    if std::env::var("SKIP_DB_TESTS").is_ok() {
        return None;
    }
    let ready = *MIGRATED
        .get_or_init(|| async {
            let db = match connect_with_config(&config()).await {
                Ok(db) => db,
                Err(e) => {
                    eprintln!("skip: cannot connect to db: {e}");
                    return false;
                }
            };
            if let Err(e) = migration::Migrator::up(&db, None).await {
                eprintln!("skip: migrate up failed: {e}");
                return false;
            }
            true
        })
        .await;
    if !ready {
        return None;
    }
    // fresh connection for the current test's runtime
    connect_with_config(&config()).await.ok()
}
