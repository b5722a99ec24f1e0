//! Per-actor trust scores driven by moderation outcomes.
//!
//! Every final outcome feeds back into a bounded score per actor. High-trust
//! actors can skip inference entirely, which is a cost/latency optimization
//! and never a security control: the update rule is asymmetric, so flags
//! cost far more score than approvals gain, and only positive-leaning
//! review is ever skipped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default score for an actor never seen before.
const DEFAULT_SCORE: u32 = 50;

/// Trust record for one actor, keyed by identity (e.g. email).
///
/// Created lazily on first lookup; never deleted automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationRecord {
    pub actor_id: String,
    /// Always clamped to [0, 100]
    pub score: u32,
    pub approved_count: u64,
    pub flagged_count: u64,
    pub last_seen_at: DateTime<Utc>,
}

impl ReputationRecord {
    fn new(actor_id: &str) -> Self {
        Self {
            actor_id: actor_id.to_string(),
            score: DEFAULT_SCORE,
            approved_count: 0,
            flagged_count: 0,
            last_seen_at: Utc::now(),
        }
    }
}

/// Final disposition reported back into the reputation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Approved,
    Spam,
    Trash,
    Toxic,
    Hold,
}

/// Keyed record store with upsert semantics backing the reputation loop.
#[async_trait]
pub trait ReputationBackend: Send + Sync {
    /// Fetch the record for an actor, if one exists.
    async fn fetch(&self, actor_id: &str) -> Result<Option<ReputationRecord>>;

    /// Insert or replace the record for its actor.
    async fn upsert(&self, record: &ReputationRecord) -> Result<()>;

    /// Remove an actor's record. The only removal path; nothing expires.
    async fn delete(&self, actor_id: &str) -> Result<()>;
}

/// In-memory implementation of the reputation backend.
///
/// Suitable for testing and single-process deployments. Records are lost on
/// restart.
#[derive(Clone, Default)]
pub struct InMemoryReputationBackend {
    records: Arc<RwLock<HashMap<String, ReputationRecord>>>,
}

impl InMemoryReputationBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReputationBackend for InMemoryReputationBackend {
    async fn fetch(&self, actor_id: &str) -> Result<Option<ReputationRecord>> {
        Ok(self.records.read().get(actor_id).cloned())
    }

    async fn upsert(&self, record: &ReputationRecord) -> Result<()> {
        self.records
            .write()
            .insert(record.actor_id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, actor_id: &str) -> Result<()> {
        self.records.write().remove(actor_id);
        Ok(())
    }
}

/// Reputation store: score updates and the skip-inference gate.
///
/// Concurrent operations on different actors never interfere; concurrent
/// updates for the same actor must be serialized by the caller.
pub struct ReputationStore<B: ReputationBackend> {
    backend: B,
    /// Score at or above which inference is skipped. 0 or >100 disables.
    skip_threshold: u32,
}

impl<B: ReputationBackend> ReputationStore<B> {
    pub fn new(backend: B, skip_threshold: u32) -> Self {
        Self {
            backend,
            skip_threshold,
        }
    }

    /// Fetch an actor's record, creating a default one for unseen actors.
    pub async fn get_or_create(&self, actor_id: &str) -> Result<ReputationRecord> {
        if let Some(record) = self.backend.fetch(actor_id).await? {
            return Ok(record);
        }

        let record = ReputationRecord::new(actor_id);
        self.backend.upsert(&record).await?;
        tracing::debug!(actor = %actor_id, "Created default reputation record");
        Ok(record)
    }

    /// Apply one outcome to an actor's score and return the new score.
    ///
    /// Approvals gain 2 points; spam/trash/toxic flags cost 10; a hold
    /// costs 1. The score is clamped to [0, 100] on every update.
    #[tracing::instrument(skip(self))]
    pub async fn report_outcome(&self, actor_id: &str, outcome: Outcome) -> Result<u32> {
        let mut record = self.get_or_create(actor_id).await?;

        match outcome {
            Outcome::Approved => {
                record.score = (record.score + 2).min(100);
                record.approved_count += 1;
            }
            Outcome::Spam | Outcome::Trash | Outcome::Toxic => {
                record.score = record.score.saturating_sub(10);
                record.flagged_count += 1;
            }
            Outcome::Hold => {
                record.score = record.score.saturating_sub(1);
            }
        }
        record.last_seen_at = Utc::now();

        self.backend.upsert(&record).await?;

        tracing::info!(
            actor = %actor_id,
            score = record.score,
            "Reputation updated"
        );

        Ok(record.score)
    }

    /// True iff the skip feature is enabled and the actor's score has
    /// reached the threshold.
    pub async fn should_skip_inference(&self, actor_id: &str) -> Result<bool> {
        if !(1..=100).contains(&self.skip_threshold) {
            return Ok(false);
        }

        let record = self.get_or_create(actor_id).await?;
        Ok(record.score >= self.skip_threshold)
    }

    /// Remove an actor's record entirely. They start fresh at the default
    /// score on next sight.
    pub async fn reset(&self, actor_id: &str) -> Result<()> {
        self.backend.delete(actor_id).await?;
        tracing::info!(actor = %actor_id, "Reputation record reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(skip_threshold: u32) -> ReputationStore<InMemoryReputationBackend> {
        ReputationStore::new(InMemoryReputationBackend::new(), skip_threshold)
    }

    #[tokio::test]
    async fn test_unseen_actor_gets_default_record() {
        let store = store(0);

        let record = store.get_or_create("alice@example.com").await.unwrap();
        assert_eq!(record.score, 50);
        assert_eq!(record.approved_count, 0);
        assert_eq!(record.flagged_count, 0);
    }

    #[tokio::test]
    async fn test_score_updates_per_outcome() {
        let store = store(0);

        let score = store
            .report_outcome("a@example.com", Outcome::Approved)
            .await
            .unwrap();
        assert_eq!(score, 52);

        let score = store
            .report_outcome("b@example.com", Outcome::Spam)
            .await
            .unwrap();
        assert_eq!(score, 40);

        let score = store
            .report_outcome("c@example.com", Outcome::Hold)
            .await
            .unwrap();
        assert_eq!(score, 49);
    }

    #[tokio::test]
    async fn test_score_clamped_at_bounds() {
        let store = store(0);

        // 30 approvals from 50 would be 110 unclamped
        for _ in 0..30 {
            store
                .report_outcome("up@example.com", Outcome::Approved)
                .await
                .unwrap();
        }
        let record = store.get_or_create("up@example.com").await.unwrap();
        assert_eq!(record.score, 100);

        // 10 flags from 50 would be -50 unclamped
        for _ in 0..10 {
            store
                .report_outcome("down@example.com", Outcome::Toxic)
                .await
                .unwrap();
        }
        let record = store.get_or_create("down@example.com").await.unwrap();
        assert_eq!(record.score, 0);
    }

    #[tokio::test]
    async fn test_counts_increment_alongside_score() {
        let store = store(0);

        store
            .report_outcome("x@example.com", Outcome::Approved)
            .await
            .unwrap();
        store
            .report_outcome("x@example.com", Outcome::Spam)
            .await
            .unwrap();
        store
            .report_outcome("x@example.com", Outcome::Trash)
            .await
            .unwrap();

        let record = store.get_or_create("x@example.com").await.unwrap();
        assert_eq!(record.approved_count, 1);
        assert_eq!(record.flagged_count, 2);
    }

    #[tokio::test]
    async fn test_skip_threshold_gating() {
        let store = store(80);

        // Bring the actor to 86: 18 approvals from 50
        for _ in 0..18 {
            store
                .report_outcome("trusted@example.com", Outcome::Approved)
                .await
                .unwrap();
        }
        assert!(store
            .should_skip_inference("trusted@example.com")
            .await
            .unwrap());

        // One spam report drops below threshold
        let score = store
            .report_outcome("trusted@example.com", Outcome::Spam)
            .await
            .unwrap();
        assert_eq!(score, 76);
        assert!(!store
            .should_skip_inference("trusted@example.com")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_skip_disabled_when_threshold_zero() {
        let store = store(0);

        for _ in 0..30 {
            store
                .report_outcome("perfect@example.com", Outcome::Approved)
                .await
                .unwrap();
        }
        assert!(!store
            .should_skip_inference("perfect@example.com")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_skip_disabled_when_threshold_out_of_range() {
        let store = store(150);
        assert!(!store.should_skip_inference("anyone").await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_removes_record() {
        let store = store(0);

        store
            .report_outcome("gone@example.com", Outcome::Spam)
            .await
            .unwrap();
        store.reset("gone@example.com").await.unwrap();

        let record = store.get_or_create("gone@example.com").await.unwrap();
        assert_eq!(record.score, 50);
        assert_eq!(record.flagged_count, 0);
    }
}
