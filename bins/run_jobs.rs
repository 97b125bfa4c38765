//! Claim and dispatch one batch of due scheduled jobs, then exit.
//! Meant to be driven by an external scheduler such as cron.

use std::sync::Arc;

use chrono::Utc;
use dotenvy::dotenv;
use tracing::{error, info};

use service::jobs::{run_due, JobScheduler, RunReport};
use service::repo::SeaOrmRepository;

const BATCH: u64 = 100;

async fn run() -> anyhow::Result<RunReport> {
    let cfg = configs::AppConfig::load_or_env()?;
    let db = models::db::connect_with_config(&cfg.database).await?;
    let scheduler = JobScheduler::new(Arc::new(SeaOrmRepository::new(db)));
    Ok(run_due(&scheduler, Utc::now(), BATCH).await?)
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    dotenv().ok();
    common::utils::logging::init_logging_default();
    match run().await {
        Ok(report) => {
            info!(
                service = "run_jobs",
                claimed = report.claimed,
                completed = report.completed,
                failed = report.failed,
                unrecorded = report.unrecorded,
                "job batch finished"
            );
            if report.unrecorded > 0 {
                std::process::ExitCode::FAILURE
            } else {
                std::process::ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!(service = "run_jobs", error = %e, "job batch failed");
            std::process::ExitCode::FAILURE
        }
    }
}
