//! Per-item moderation use case and the chunk driver for batch runs.
//!
//! For one item: reputation check, consensus decision, outcome application,
//! reputation update. The orchestrator never reads or mutates item content
//! itself; the external item store collaborator applies actions, resolves
//! actors, and renders prompts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::consensus::{ConsensusEngine, Label};
use crate::error::Result;
use crate::inference::InferenceClient;
use crate::reputation::{Outcome, ReputationBackend, ReputationStore};
use crate::session::{BatchJobManager, ItemId, ItemResult, JobId, JobStore};

/// Concrete action applied to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationAction {
    Approve,
    MarkSpam,
    Trash,
    Hold,
}

/// Caller-supplied mapping from decision labels to concrete actions.
#[derive(Debug, Clone)]
pub struct ActionMap {
    actions: HashMap<Label, ModerationAction>,
}

impl Default for ActionMap {
    fn default() -> Self {
        let mut actions = HashMap::new();
        actions.insert(Label::Approve, ModerationAction::Approve);
        actions.insert(Label::Spam, ModerationAction::MarkSpam);
        actions.insert(Label::Toxic, ModerationAction::Trash);
        actions.insert(Label::Unclear, ModerationAction::Hold);
        Self { actions }
    }
}

impl ActionMap {
    /// Override the action for one label.
    pub fn with_action(mut self, label: Label, action: ModerationAction) -> Self {
        self.actions.insert(label, action);
        self
    }

    /// The action configured for a label. Unmapped labels hold for a human.
    pub fn action_for(&self, label: Label) -> ModerationAction {
        self.actions
            .get(&label)
            .copied()
            .unwrap_or(ModerationAction::Hold)
    }
}

/// External collaborator owning item content and actions.
///
/// The orchestrator only ever talks to items through this seam.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Apply a moderation action to an item.
    async fn apply_action(&self, item_id: &str, action: ModerationAction) -> Result<()>;

    /// Resolve the actor identity (e.g. submitter email) behind an item.
    async fn lookup_actor(&self, item_id: &str) -> Result<String>;

    /// Render the processed prompt for an item from a prompt template
    /// reference. Template substitution lives with the collaborator that
    /// owns the content.
    async fn render_prompt(&self, item_id: &str, prompt_ref: &str) -> Result<String>;
}

/// Result of moderating one item. Transient; the caller decides what, if
/// anything, to persist.
#[derive(Debug, Clone, Serialize)]
pub struct ModerationOutcome {
    pub item_id: ItemId,
    pub decision: Label,
    pub action: ModerationAction,
    pub confidence: f64,
    pub processing_time: Duration,
    /// True when the actor's reputation skipped inference entirely. Such an
    /// approval carries confidence 0 and is distinguishable from an
    /// AI-derived one.
    pub skipped_by_policy: bool,
}

/// Ties the engine together for one item at a time.
pub struct ModerationOrchestrator<C, B, I>
where
    C: InferenceClient,
    B: ReputationBackend,
    I: ItemStore,
{
    consensus: ConsensusEngine<C>,
    reputation: ReputationStore<B>,
    items: Arc<I>,
    actions: ActionMap,
    chunk_size: usize,
    inter_item_delay: Duration,
}

impl<C, B, I> ModerationOrchestrator<C, B, I>
where
    C: InferenceClient,
    B: ReputationBackend,
    I: ItemStore,
{
    pub fn new(
        consensus: ConsensusEngine<C>,
        reputation: ReputationStore<B>,
        items: Arc<I>,
        actions: ActionMap,
        config: &EngineConfig,
    ) -> Self {
        Self {
            consensus,
            reputation,
            items,
            actions,
            chunk_size: config.chunk_size,
            inter_item_delay: Duration::from_millis(config.inter_item_delay_ms),
        }
    }

    /// Moderate a single item with an already-processed prompt.
    ///
    /// On consensus failure the item is left untouched and the error is
    /// surfaced to the caller.
    #[tracing::instrument(skip(self, prompt), fields(item_id = %item_id))]
    pub async fn moderate_item(&self, item_id: &str, prompt: &str) -> Result<ModerationOutcome> {
        let started = Instant::now();

        let actor = self.items.lookup_actor(item_id).await?;

        if self.reputation.should_skip_inference(&actor).await? {
            self.items
                .apply_action(item_id, ModerationAction::Approve)
                .await?;

            tracing::info!(
                item_id = %item_id,
                actor = %actor,
                "Inference skipped for high-trust actor, item approved"
            );

            // No judgment was made, so nothing feeds back into reputation.
            return Ok(ModerationOutcome {
                item_id: item_id.to_string(),
                decision: Label::Approve,
                action: ModerationAction::Approve,
                confidence: 0.0,
                processing_time: started.elapsed(),
                skipped_by_policy: true,
            });
        }

        let result = self.consensus.decide(prompt).await?;

        let decision = result.winning_label;
        let (action, outcome) = if result.requires_manual_review {
            (ModerationAction::Hold, Outcome::Hold)
        } else {
            (self.actions.action_for(decision), outcome_for_label(decision))
        };

        self.items.apply_action(item_id, action).await?;
        self.reputation.report_outcome(&actor, outcome).await?;

        let processing_time = started.elapsed();

        tracing::info!(
            item_id = %item_id,
            decision = %decision,
            action = ?action,
            confidence = result.confidence,
            manual_review = result.requires_manual_review,
            elapsed_ms = processing_time.as_millis() as u64,
            "Item moderated"
        );

        Ok(ModerationOutcome {
            item_id: item_id.to_string(),
            decision,
            action,
            confidence: result.confidence,
            processing_time,
            skipped_by_policy: false,
        })
    }

    /// Process one chunk of a batch job.
    ///
    /// Pulls up to `chunk_size` ids at `offset`, moderates them
    /// sequentially with the configured inter-item delay, and reports each
    /// result back into the session. Item failures are recorded and never
    /// abort the chunk.
    #[tracing::instrument(skip(self, jobs), fields(job_id = %job_id, offset = offset))]
    pub async fn process_chunk<S: JobStore>(
        &self,
        jobs: &BatchJobManager<S>,
        job_id: JobId,
        offset: usize,
    ) -> Result<Vec<(ItemId, Result<ModerationOutcome>)>> {
        let session = jobs.status(job_id).await?;
        let chunk = jobs.next_chunk(job_id, offset, self.chunk_size).await?;

        tracing::info!(chunk_len = chunk.len(), "Processing chunk");

        let mut results = Vec::with_capacity(chunk.len());

        for (index, item_id) in chunk.iter().enumerate() {
            let outcome = self.moderate_batch_item(item_id, &session.prompt_ref).await;

            let item_result = match &outcome {
                Ok(o) => ItemResult::Processed {
                    decision: o.decision.to_string(),
                },
                Err(e) => ItemResult::Failed {
                    error: e.to_string(),
                },
            };
            jobs.report_result(job_id, item_id, item_result).await?;

            results.push((item_id.clone(), outcome));

            if index + 1 < chunk.len() && !self.inter_item_delay.is_zero() {
                tokio::time::sleep(self.inter_item_delay).await;
            }
        }

        Ok(results)
    }

    async fn moderate_batch_item(
        &self,
        item_id: &str,
        prompt_ref: &str,
    ) -> Result<ModerationOutcome> {
        let prompt = self.items.render_prompt(item_id, prompt_ref).await?;
        self.moderate_item(item_id, &prompt).await
    }
}

fn outcome_for_label(label: Label) -> Outcome {
    match label {
        Label::Approve => Outcome::Approved,
        Label::Spam => Outcome::Spam,
        Label::Toxic => Outcome::Toxic,
        Label::Unclear => Outcome::Hold,
    }
}
