//! Out-of-band delayed work backed by the `scheduled_job` table.
//!
//! Services enqueue a job with a `run_at`; a worker claims due jobs and
//! reports each one done or failed. Nothing here sleeps on behalf of a
//! request.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use models::scheduled_job;

use crate::errors::ServiceError;
use crate::repository::JobRepository;

/// Reminder sent ahead of a scheduled coaching session.
pub const SESSION_REMINDER: &str = "session.reminder";

/// A job left `running` this long is treated as abandoned and can be
/// claimed again.
pub const RUNNING_TIMEOUT_MINUTES: i64 = 15;

/// Store a job on `repo`, which may be a transaction's store.
pub async fn enqueue<R>(repo: &R, kind: &str, payload: serde_json::Value, run_at: DateTime<Utc>) -> Result<scheduled_job::Model, ServiceError>
where
    R: JobRepository + ?Sized,
{
    let job = repo.enqueue_job(kind, payload, run_at.into()).await?;
    info!(job_id = %job.id, kind, run_at = %job.run_at, "job_enqueued");
    Ok(job)
}

pub struct JobScheduler {
    repo: Arc<dyn JobRepository>,
}

impl JobScheduler {
    pub fn new(repo: Arc<dyn JobRepository>) -> Self { Self { repo } }

    pub async fn enqueue(&self, kind: &str, payload: serde_json::Value, run_at: DateTime<Utc>) -> Result<scheduled_job::Model, ServiceError> {
        enqueue(self.repo.as_ref(), kind, payload, run_at).await
    }

    /// Fetch due jobs and claim each one. A job another worker already
    /// took is skipped rather than failing the batch.
    pub async fn claim_due(&self, now: DateTime<Utc>, limit: u64) -> Result<Vec<scheduled_job::Model>, ServiceError> {
        let stale_before = (now - Duration::minutes(RUNNING_TIMEOUT_MINUTES)).into();
        let due = self.repo.due_jobs(now.into(), stale_before, limit).await?;
        let mut claimed = Vec::with_capacity(due.len());
        for job in due {
            match self.repo.claim_job(job.id, now.into(), stale_before).await {
                Ok(Some(running)) => claimed.push(running),
                Ok(None) => info!(job_id = %job.id, "job_taken_elsewhere"),
                Err(e) => warn!(op = "JobScheduler::claim_due", job_id = %job.id, error = %e, "job_claim_skipped"),
            }
        }
        Ok(claimed)
    }

    pub async fn complete(&self, id: Uuid) -> Result<scheduled_job::Model, ServiceError> {
        let job = self.repo.mark_job(id, "done", None).await?;
        info!(job_id = %id, kind = %job.kind, "job_done");
        Ok(job)
    }

    pub async fn fail(&self, id: Uuid, reason: &str) -> Result<scheduled_job::Model, ServiceError> {
        let job = self.repo.mark_job(id, "failed", Some(reason.to_string())).await?;
        warn!(job_id = %id, kind = %job.kind, attempts = job.attempts, "job_failed");
        Ok(job)
    }
}

/// Outcome of one `run_due` batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
    /// Jobs whose outcome could not be stored. They stay `running` and are
    /// reclaimed once the running timeout passes.
    pub unrecorded: usize,
}

/// Claim and dispatch one batch of due jobs.
///
/// Reminders are only logged by id; delivery channels live outside this
/// service. A job whose outcome cannot be written does not stop the rest
/// of the batch.
pub async fn run_due(scheduler: &JobScheduler, now: DateTime<Utc>, limit: u64) -> Result<RunReport, ServiceError> {
    let jobs = scheduler.claim_due(now, limit).await?;
    let mut report = RunReport { claimed: jobs.len(), ..Default::default() };
    for job in jobs {
        let completed = match job.kind.as_str() {
            SESSION_REMINDER => {
                let session_id = job.payload.get("session_id").and_then(|v| v.as_str()).unwrap_or_default();
                info!(job_id = %job.id, session_id, "session_reminder_dispatched");
                scheduler.complete(job.id).await.map(|_| true)
            }
            other => scheduler.fail(job.id, &format!("unknown job kind {other}")).await.map(|_| false),
        };
        match completed {
            Ok(true) => report.completed += 1,
            Ok(false) => report.failed += 1,
            Err(e) => {
                error!(op = "run_due", job_id = %job.id, kind = %job.kind, error = %e, "job_outcome_unrecorded");
                report.unrecorded += 1;
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::mock::MockRepository;
    use serde_json::json;

    #[tokio::test]
    async fn only_due_jobs_are_claimed() {
        let repo = Arc::new(MockRepository::new());
        let scheduler = JobScheduler::new(repo.clone());
        let now = Utc::now();
        scheduler.enqueue(SESSION_REMINDER, json!({"session_id": "a"}), now - Duration::minutes(5)).await.unwrap();
        scheduler.enqueue(SESSION_REMINDER, json!({"session_id": "b"}), now + Duration::hours(5)).await.unwrap();

        let claimed = scheduler.claim_due(now, 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].status, "running");
        assert_eq!(claimed[0].attempts, 1);
        assert!(scheduler.claim_due(now, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn a_running_job_cannot_be_claimed_twice() {
        let repo = Arc::new(MockRepository::new());
        let scheduler = JobScheduler::new(repo.clone());
        let now = Utc::now();
        let job = scheduler.enqueue(SESSION_REMINDER, json!({}), now - Duration::minutes(1)).await.unwrap();
        let stale_before = (now - Duration::minutes(RUNNING_TIMEOUT_MINUTES)).into();

        // two workers read the same due row before either claims it
        let first = repo.claim_job(job.id, now.into(), stale_before).await.unwrap();
        let second = repo.claim_job(job.id, now.into(), stale_before).await.unwrap();
        assert_eq!(first.map(|j| j.attempts), Some(1));
        assert!(second.is_none());
        assert_eq!(repo.jobs()[0].attempts, 1);
    }

    #[tokio::test]
    async fn abandoned_running_jobs_are_reclaimed() {
        let repo = Arc::new(MockRepository::new());
        let scheduler = JobScheduler::new(repo.clone());
        let now = Utc::now();
        let job = scheduler.enqueue(SESSION_REMINDER, json!({}), now - Duration::hours(1)).await.unwrap();
        scheduler.claim_due(now, 10).await.unwrap();
        assert!(scheduler.claim_due(now, 10).await.unwrap().is_empty());

        repo.age_job(job.id, (now - Duration::minutes(RUNNING_TIMEOUT_MINUTES + 1)).into());
        let again = scheduler.claim_due(now, 10).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].attempts, 2);
    }

    #[tokio::test]
    async fn run_due_completes_reminders_and_fails_unknown_kinds() {
        let repo = Arc::new(MockRepository::new());
        let scheduler = JobScheduler::new(repo.clone());
        let past = Utc::now() - Duration::minutes(1);
        scheduler.enqueue(SESSION_REMINDER, json!({"session_id": "a"}), past).await.unwrap();
        scheduler.enqueue("mystery", json!({}), past).await.unwrap();

        let report = run_due(&scheduler, Utc::now(), 10).await.unwrap();
        assert_eq!(report, RunReport { claimed: 2, completed: 1, failed: 1, unrecorded: 0 });
        let mut statuses: Vec<_> = repo.jobs().into_iter().map(|j| (j.kind, j.status)).collect();
        statuses.sort();
        assert_eq!(
            statuses,
            vec![("mystery".to_string(), "failed".to_string()), (SESSION_REMINDER.to_string(), "done".to_string())]
        );
    }

    #[tokio::test]
    async fn an_unrecorded_outcome_does_not_stop_the_batch() {
        let repo = Arc::new(MockRepository::new());
        let scheduler = JobScheduler::new(repo.clone());
        let past = Utc::now() - Duration::minutes(1);
        for id in ["a", "b", "c"] {
            scheduler.enqueue(SESSION_REMINDER, json!({"session_id": id}), past).await.unwrap();
        }
        repo.fail_on("mark_job");

        let report = run_due(&scheduler, Utc::now(), 10).await.unwrap();
        assert_eq!(report.claimed, 3);
        assert_eq!(report.unrecorded, 3);
        assert_eq!(repo.calls().iter().filter(|c| **c == "mark_job").count(), 3);
        assert!(repo.jobs().iter().all(|j| j.status == "running"));
    }
}
