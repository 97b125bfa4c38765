//! Migrator registering entity-specific migrations in dependency order.
//! Indexes are applied last.
pub use sea_orm_migration::prelude::*;

mod m20240101_000001_create_coach;
mod m20240101_000002_create_client;
mod m20240101_000003_create_coaching_session;
mod m20240101_000004_create_audit_log;
mod m20240101_000005_create_scheduled_job;
mod m20240101_000010_add_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_coach::Migration),
            Box::new(m20240101_000002_create_client::Migration),
            Box::new(m20240101_000003_create_coaching_session::Migration),
            Box::new(m20240101_000004_create_audit_log::Migration),
            Box::new(m20240101_000005_create_scheduled_job::Migration),
            // Indexes should always be applied last
            Box::new(m20240101_000010_add_indexes::Migration),
        ]
    }
}
