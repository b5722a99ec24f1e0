//! Batch job sessions: resumable, observable bulk-processing runs.
//!
//! A session snapshots a list of item identifiers at creation time and
//! tracks progress as chunks are processed and reported back. Sessions live
//! in an ephemeral TTL store; if the TTL elapses before completion the
//! session is gone and the caller must restart the batch with fresh item
//! identifiers. That is a documented property of the design, not a bug.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ModgateError, Result};

/// Identifier for an item handed to the orchestrator (e.g. a comment id).
pub type ItemId = String;

/// Most recent per-item outcomes kept in a session's progress log.
const PROGRESS_LOG_CAP: usize = 100;

/// Unique identifier for a batch job session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Create a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Convert to a short, readable string format.
    pub fn to_short_string(&self) -> String {
        let hex = format!("{:x}", self.0.as_u128());
        format!("job_{}", &hex[..8])
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_short_string())
    }
}

/// Session status. One-way: running to completed. There is no failed
/// terminal state; item failures are counted, not fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
}

/// Outcome of one item, as reported back into the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ItemResult {
    Processed { decision: String },
    Failed { error: String },
}

/// One entry in a session's bounded progress log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub item_id: ItemId,
    #[serde(flatten)]
    pub result: ItemResult,
    pub recorded_at: DateTime<Utc>,
}

/// The persisted state of one bulk-processing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJobSession {
    pub job_id: JobId,
    /// Snapshot of the item list taken at creation; later changes to the
    /// source collection do not affect an in-flight session
    pub item_ids: Vec<ItemId>,
    /// Opaque reference to the prompt template used for this run
    pub prompt_ref: String,
    pub total_count: usize,
    pub processed_count: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub status: JobStatus,
    /// Ring of the most recent per-item outcomes, capped at 100 entries
    pub progress_log: Vec<ProgressEntry>,
    pub started_at: DateTime<Utc>,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BatchJobSession {
    fn new(item_ids: Vec<ItemId>, prompt_ref: &str) -> Self {
        let total_count = item_ids.len();
        Self {
            job_id: JobId::new(),
            item_ids,
            prompt_ref: prompt_ref.to_string(),
            total_count,
            processed_count: 0,
            success_count: 0,
            error_count: 0,
            status: JobStatus::Running,
            progress_log: Vec::new(),
            started_at: Utc::now(),
            last_processed_at: None,
            completed_at: None,
        }
    }

    /// Whether every item has been reported.
    pub fn is_completed(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

/// Key-value store with TTL semantics backing batch job sessions.
///
/// No relational schema is required; anything that can put a value with an
/// expiry and get it back (or not, once expired) is sufficient.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Store a session, replacing any previous value, expiring after `ttl`.
    async fn put(&self, session: &BatchJobSession, ttl: Duration) -> Result<()>;

    /// Fetch a session. Returns `None` if it expired or never existed; the
    /// two cases are indistinguishable by design.
    async fn get(&self, job_id: JobId) -> Result<Option<BatchJobSession>>;
}

/// In-memory job store with lazy expiry on read.
#[derive(Clone, Default)]
pub struct InMemoryJobStore {
    entries: Arc<RwLock<HashMap<JobId, (BatchJobSession, DateTime<Utc>)>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn put(&self, session: &BatchJobSession, ttl: Duration) -> Result<()> {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
        self.entries
            .write()
            .insert(session.job_id, (session.clone(), expires_at));
        Ok(())
    }

    async fn get(&self, job_id: JobId) -> Result<Option<BatchJobSession>> {
        let mut entries = self.entries.write();
        match entries.get(&job_id) {
            Some((_, expires_at)) if *expires_at <= Utc::now() => {
                entries.remove(&job_id);
                Ok(None)
            }
            Some((session, _)) => Ok(Some(session.clone())),
            None => Ok(None),
        }
    }
}

/// Owns the lifecycle of bulk-processing runs.
///
/// The manager hands out chunks of item ids and records results as the
/// caller reports them. One active chunk per job at a time is the expected
/// usage; concurrent reports for the same job must be serialized by the
/// caller.
pub struct BatchJobManager<S: JobStore> {
    store: S,
    ttl: Duration,
}

impl<S: JobStore> BatchJobManager<S> {
    pub fn new(store: S, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Create a session over a snapshot of `item_ids`.
    #[tracing::instrument(skip(self, item_ids), fields(items = item_ids.len()))]
    pub async fn create(&self, item_ids: Vec<ItemId>, prompt_ref: &str) -> Result<JobId> {
        let session = BatchJobSession::new(item_ids, prompt_ref);
        let job_id = session.job_id;

        self.store.put(&session, self.ttl).await?;

        tracing::info!(job_id = %job_id, total = session.total_count, "Batch job created");
        Ok(job_id)
    }

    /// Slice of the stored id list: up to `chunk_size` ids starting at
    /// `offset`. Past the end of the list this is empty, never an error.
    pub async fn next_chunk(
        &self,
        job_id: JobId,
        offset: usize,
        chunk_size: usize,
    ) -> Result<Vec<ItemId>> {
        let session = self.load(job_id).await?;

        let end = offset.saturating_add(chunk_size).min(session.item_ids.len());
        let chunk = session
            .item_ids
            .get(offset..end)
            .unwrap_or(&[])
            .to_vec();

        tracing::debug!(
            job_id = %job_id,
            offset = offset,
            chunk_len = chunk.len(),
            "Handing out chunk"
        );
        Ok(chunk)
    }

    /// Record one item's outcome and return the updated session.
    ///
    /// Increments the processed count and either the success or error
    /// count, appends to the bounded progress log, and flips the session
    /// to completed exactly when every item has been reported.
    #[tracing::instrument(skip(self, result), fields(job_id = %job_id, item_id = %item_id))]
    pub async fn report_result(
        &self,
        job_id: JobId,
        item_id: &str,
        result: ItemResult,
    ) -> Result<BatchJobSession> {
        let mut session = self.load(job_id).await?;

        if session.processed_count >= session.total_count {
            return Err(ModgateError::JobAlreadyCompleted(job_id));
        }

        let now = Utc::now();

        match &result {
            ItemResult::Processed { decision } => {
                session.success_count += 1;
                tracing::debug!(decision = %decision, "Item processed");
            }
            ItemResult::Failed { error } => {
                session.error_count += 1;
                tracing::warn!(error = %error, "Item failed");
            }
        }

        session.processed_count += 1;
        session.last_processed_at = Some(now);

        if session.progress_log.len() == PROGRESS_LOG_CAP {
            session.progress_log.remove(0);
        }
        session.progress_log.push(ProgressEntry {
            item_id: item_id.to_string(),
            result,
            recorded_at: now,
        });

        if session.processed_count == session.total_count {
            session.status = JobStatus::Completed;
            session.completed_at = Some(now);
            tracing::info!(
                job_id = %job_id,
                success = session.success_count,
                errors = session.error_count,
                "Batch job completed"
            );
        }

        self.store.put(&session, self.ttl).await?;
        Ok(session)
    }

    /// Current session state.
    pub async fn status(&self, job_id: JobId) -> Result<BatchJobSession> {
        self.load(job_id).await
    }

    async fn load(&self, job_id: JobId) -> Result<BatchJobSession> {
        self.store
            .get(job_id)
            .await?
            .ok_or(ModgateError::JobNotFound(job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> BatchJobManager<InMemoryJobStore> {
        BatchJobManager::new(InMemoryJobStore::new(), Duration::from_secs(3600))
    }

    fn ids(n: usize) -> Vec<ItemId> {
        (1..=n).map(|i| i.to_string()).collect()
    }

    #[tokio::test]
    async fn test_create_snapshots_items() {
        let manager = manager();
        let job_id = manager.create(ids(5), "template-1").await.unwrap();

        let session = manager.status(job_id).await.unwrap();
        assert_eq!(session.total_count, 5);
        assert_eq!(session.processed_count, 0);
        assert_eq!(session.status, JobStatus::Running);
        assert_eq!(session.prompt_ref, "template-1");
    }

    #[tokio::test]
    async fn test_next_chunk_slices_and_returns_empty_past_end() {
        let manager = manager();
        let job_id = manager.create(ids(5), "t").await.unwrap();

        assert_eq!(manager.next_chunk(job_id, 0, 2).await.unwrap(), ids(2));
        assert_eq!(
            manager.next_chunk(job_id, 4, 2).await.unwrap(),
            vec!["5".to_string()]
        );
        assert!(manager.next_chunk(job_id, 5, 2).await.unwrap().is_empty());
        assert!(manager.next_chunk(job_id, 99, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_completion_after_exactly_k_reports() {
        let manager = manager();
        let items = ids(4);
        let job_id = manager.create(items.clone(), "t").await.unwrap();

        for (i, item) in items.iter().enumerate() {
            let session = manager
                .report_result(
                    job_id,
                    item,
                    ItemResult::Processed {
                        decision: "APPROVE".to_string(),
                    },
                )
                .await
                .unwrap();
            assert_eq!(session.processed_count, i + 1);

            if i + 1 < items.len() {
                assert_eq!(session.status, JobStatus::Running);
                assert!(session.completed_at.is_none());
            } else {
                assert_eq!(session.status, JobStatus::Completed);
                assert!(session.completed_at.is_some());
            }
        }
    }

    #[tokio::test]
    async fn test_item_failures_count_but_do_not_abort() {
        let manager = manager();
        let job_id = manager.create(ids(2), "t").await.unwrap();

        manager
            .report_result(
                job_id,
                "1",
                ItemResult::Failed {
                    error: "all model calls failed".to_string(),
                },
            )
            .await
            .unwrap();
        let session = manager
            .report_result(
                job_id,
                "2",
                ItemResult::Processed {
                    decision: "SPAM".to_string(),
                },
            )
            .await
            .unwrap();

        // Partial success is a normal terminal state
        assert_eq!(session.status, JobStatus::Completed);
        assert_eq!(session.success_count, 1);
        assert_eq!(session.error_count, 1);
    }

    #[tokio::test]
    async fn test_report_past_total_is_rejected() {
        let manager = manager();
        let job_id = manager.create(ids(1), "t").await.unwrap();

        manager
            .report_result(
                job_id,
                "1",
                ItemResult::Processed {
                    decision: "APPROVE".to_string(),
                },
            )
            .await
            .unwrap();

        let result = manager
            .report_result(
                job_id,
                "1",
                ItemResult::Processed {
                    decision: "APPROVE".to_string(),
                },
            )
            .await;
        assert!(matches!(result, Err(ModgateError::JobAlreadyCompleted(_))));
    }

    #[tokio::test]
    async fn test_progress_log_ring_drops_oldest() {
        let manager = manager();
        let job_id = manager.create(ids(150), "t").await.unwrap();

        for i in 1..=150 {
            manager
                .report_result(
                    job_id,
                    &i.to_string(),
                    ItemResult::Processed {
                        decision: "APPROVE".to_string(),
                    },
                )
                .await
                .unwrap();
        }

        let session = manager.status(job_id).await.unwrap();
        assert_eq!(session.progress_log.len(), PROGRESS_LOG_CAP);
        // Oldest entries dropped, not the whole log reset
        assert_eq!(session.progress_log[0].item_id, "51");
        assert_eq!(session.progress_log.last().unwrap().item_id, "150");
        assert_eq!(session.processed_count, 150);
    }

    #[tokio::test]
    async fn test_expired_session_is_not_found() {
        let manager = BatchJobManager::new(InMemoryJobStore::new(), Duration::ZERO);
        let job_id = manager.create(ids(3), "t").await.unwrap();

        let result = manager.status(job_id).await;
        assert!(matches!(result, Err(ModgateError::JobNotFound(_))));

        // Reporting against an expired session fails the same way
        let result = manager
            .report_result(
                job_id,
                "1",
                ItemResult::Processed {
                    decision: "APPROVE".to_string(),
                },
            )
            .await;
        assert!(matches!(result, Err(ModgateError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let manager = manager();
        let result = manager.status(JobId::new()).await;
        assert!(matches!(result, Err(ModgateError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn test_job_id_short_display() {
        let id = JobId::new();
        let s = id.to_string();
        assert!(s.starts_with("job_"));
        assert_eq!(s.len(), "job_".len() + 8);
    }
}
