//! Tamper-evident audit trail.
//!
//! Every entry stores the hash of its predecessor, and its own hash covers
//! `prev_hash|actor|action|entity|entity_id|created_at`. Editing or removing
//! any stored row breaks the link that follows it.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use models::audit_log::{self, GENESIS_HASH};
use models::pagination::{Pagination, PAGE_SIZE_CAP};

use crate::errors::ServiceError;
use crate::repository::{settle, AuditRepository, UnitOfWork};

/// Rows fetched per round trip while verifying.
const VERIFY_BATCH: u64 = 500;

pub fn entry_hash(prev_hash: &str, actor: &str, action: &str, entity: &str, entity_id: &str, created_at: &DateTime<Utc>) -> String {
    let stamp = created_at.to_rfc3339_opts(SecondsFormat::Micros, true);
    let mut hasher = Sha256::new();
    for (i, part) in [prev_hash, actor, action, entity, entity_id, stamp.as_str()].iter().enumerate() {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn stored_hash(entry: &audit_log::Model) -> String {
    entry_hash(
        &entry.prev_hash,
        &entry.actor,
        &entry.action,
        &entry.entity,
        &entry.entity_id,
        &entry.created_at.with_timezone(&Utc),
    )
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokenLink {
    pub id: i64,
    pub reason: &'static str,
}

/// Walk `entries` in order starting from `prev`. Returns the last hash, or
/// the first entry whose link or content does not check out.
pub fn verify_chain(prev: &str, entries: &[audit_log::Model]) -> Result<String, BrokenLink> {
    let mut expected_prev = prev.to_string();
    for entry in entries {
        if entry.prev_hash != expected_prev {
            return Err(BrokenLink { id: entry.id, reason: "prev_hash mismatch" });
        }
        if stored_hash(entry) != entry.hash {
            return Err(BrokenLink { id: entry.id, reason: "content hash mismatch" });
        }
        expected_prev = entry.hash.clone();
    }
    Ok(expected_prev)
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ChainReport {
    pub checked: u64,
    pub intact: bool,
    pub broken_at: Option<i64>,
}

/// Append one entry after the current head. Run it on a transaction's
/// store: the chain lock is held until that transaction ends, so the head
/// read and the insert cannot interleave with another append.
pub async fn append_chained<R>(repo: &R, actor: &str, action: &str, entity: &str, entity_id: &str) -> Result<audit_log::Model, ServiceError>
where
    R: AuditRepository + ?Sized,
{
    repo.lock_audit_chain().await?;
    let prev_hash = repo.last_audit().await?.map(|h| h.hash).unwrap_or_else(|| GENESIS_HASH.to_string());
    let created_at = Utc::now().trunc_subsecs(6);
    let hash = entry_hash(&prev_hash, actor, action, entity, entity_id, &created_at);
    let entry = audit_log::NewEntry {
        actor: actor.to_string(),
        action: action.to_string(),
        entity: entity.to_string(),
        entity_id: entity_id.to_string(),
        prev_hash,
        hash,
        created_at: created_at.into(),
    };
    let stored = repo.append_audit(entry).await?;
    info!(audit_id = stored.id, action, entity, entity_id, "audit_recorded");
    Ok(stored)
}

pub struct AuditTrail {
    repo: Arc<dyn AuditRepository>,
    uow: Arc<dyn UnitOfWork>,
}

impl AuditTrail {
    pub fn new(repo: Arc<dyn AuditRepository>, uow: Arc<dyn UnitOfWork>) -> Self {
        Self { repo, uow }
    }

    /// Append a standalone entry in its own transaction.
    pub async fn record(&self, actor: &str, action: &str, entity: &str, entity_id: &str) -> Result<audit_log::Model, ServiceError> {
        let tx = self.uow.begin().await?;
        let result = append_chained(tx.store(), actor, action, entity, entity_id).await;
        settle(tx, result).await
    }

    /// Entries for one record, oldest first.
    pub async fn history(&self, entity: &str, entity_id: &str, pagination: Pagination) -> Result<Vec<audit_log::Model>, ServiceError> {
        self.repo.audit_for_entity(entity, entity_id, pagination.normalize(PAGE_SIZE_CAP)).await
    }

    /// Re-hash the whole chain from genesis in batches.
    pub async fn verify(&self) -> Result<ChainReport, ServiceError> {
        let mut prev = GENESIS_HASH.to_string();
        let mut after_id = 0i64;
        let mut checked = 0u64;
        loop {
            let batch = self.repo.audit_segment(after_id, VERIFY_BATCH).await?;
            let Some(last) = batch.last() else { break };
            after_id = last.id;
            match verify_chain(&prev, &batch) {
                Ok(head) => {
                    checked += batch.len() as u64;
                    prev = head;
                }
                Err(broken) => {
                    let position = batch.iter().position(|e| e.id == broken.id).unwrap_or_default() as u64;
                    warn!(op = "AuditTrail::verify", broken_at = broken.id, reason = broken.reason, "audit_chain_broken");
                    return Ok(ChainReport { checked: checked + position, intact: false, broken_at: Some(broken.id) });
                }
            }
            if (batch.len() as u64) < VERIFY_BATCH {
                break;
            }
        }
        info!(checked, "audit_chain_intact");
        Ok(ChainReport { checked, intact: true, broken_at: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::mock::MockRepository;

    #[test]
    fn hash_depends_on_every_field() {
        let at = Utc::now().trunc_subsecs(6);
        let base = entry_hash(GENESIS_HASH, "api", "session.create", "coaching_session", "s-1", &at);
        assert_eq!(base.len(), 64);
        assert_ne!(base, entry_hash(GENESIS_HASH, "api", "session.cancel", "coaching_session", "s-1", &at));
        assert_ne!(base, entry_hash(GENESIS_HASH, "api", "session.create", "coaching_session", "s-2", &at));
        assert_eq!(base, entry_hash(GENESIS_HASH, "api", "session.create", "coaching_session", "s-1", &at));
    }

    #[tokio::test]
    async fn recorded_entries_chain_and_verify() {
        let repo = Arc::new(MockRepository::new());
        let trail = AuditTrail::new(repo.clone(), repo.clone());
        let first = trail.record("api", "session.create", "coaching_session", "s-1").await.unwrap();
        let second = trail.record("api", "session.cancel", "coaching_session", "s-1").await.unwrap();
        assert_eq!(first.prev_hash, GENESIS_HASH);
        assert_eq!(second.prev_hash, first.hash);

        let report = trail.verify().await.unwrap();
        assert_eq!(report, ChainReport { checked: 2, intact: true, broken_at: None });
    }

    #[tokio::test]
    async fn failed_append_leaves_the_chain_untouched() {
        let repo = Arc::new(MockRepository::new());
        let trail = AuditTrail::new(repo.clone(), repo.clone());
        trail.record("api", "a.one", "coach", "c-1").await.unwrap();
        repo.fail_on("append_audit");
        assert_eq!(trail.record("api", "a.two", "coach", "c-1").await.unwrap_err().status(), 502);
        repo.clear_failures();
        let next = trail.record("api", "a.three", "coach", "c-1").await.unwrap();
        assert_eq!(next.id, 2);
        assert!(trail.verify().await.unwrap().intact);
    }

    #[tokio::test]
    async fn tampering_is_detected_at_the_edited_row() {
        let repo = Arc::new(MockRepository::new());
        let trail = AuditTrail::new(repo.clone(), repo.clone());
        for action in ["a.one", "a.two", "a.three"] {
            trail.record("api", action, "coach", "c-1").await.unwrap();
        }
        repo.tamper_audit(2, "a.forged");
        let report = trail.verify().await.unwrap();
        assert!(!report.intact);
        assert_eq!(report.broken_at, Some(2));
        assert_eq!(report.checked, 1);
    }

    #[tokio::test]
    async fn history_is_scoped_to_entity() {
        let repo = Arc::new(MockRepository::new());
        let trail = AuditTrail::new(repo.clone(), repo.clone());
        trail.record("api", "client.create", "client", "x").await.unwrap();
        trail.record("api", "client.create", "client", "y").await.unwrap();
        let rows = trail.history("client", "x", Pagination::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entity_id, "x");
    }
}
