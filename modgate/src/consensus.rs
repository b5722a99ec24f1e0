//! Multi-model consensus over free-text moderation replies.
//!
//! One processed prompt is sent to every configured model; the free-text
//! replies are reduced to labels by substring matching with a fixed
//! precedence, then tallied into a single decision with a confidence share.
//! Downstream manual-review routing depends on the threshold and tie
//! semantics here, so both are deterministic and covered by tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{ModgateError, Result};
use crate::inference::InferenceClient;
use crate::rate_limit::RateLimiter;

/// Label extracted from one model reply.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Label {
    Approve,
    Spam,
    Toxic,
    Unclear,
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Label::Approve => "APPROVE",
            Label::Spam => "SPAM",
            Label::Toxic => "TOXIC",
            Label::Unclear => "UNCLEAR",
        };
        write!(f, "{s}")
    }
}

/// Reduce a model's free-text reply to a label.
///
/// Matching is case-insensitive substring search with fixed precedence:
/// SPAM, then TOXIC/INAPPROPRIATE, then APPROVE. A reply containing both
/// "approve" and "spam" language gets the stricter label by precedence,
/// not by first occurrence.
pub fn extract_label(reply: &str) -> Label {
    let upper = reply.to_uppercase();
    if upper.contains("SPAM") {
        Label::Spam
    } else if upper.contains("TOXIC") || upper.contains("INAPPROPRIATE") {
        Label::Toxic
    } else if upper.contains("APPROVE") {
        Label::Approve
    } else {
        Label::Unclear
    }
}

/// One model's vote for a single consensus computation. Not persisted.
#[derive(Debug, Clone)]
pub struct ModelVote {
    pub model: String,
    pub raw_reply: String,
    pub label: Label,
}

/// The reconciled decision for one item.
///
/// Derived deterministically from the votes; returned to the caller and
/// never stored by this crate.
#[derive(Debug, Clone, Serialize)]
pub struct ConsensusResult {
    /// Label with the most votes. On a tie, which of the equal-tallied
    /// labels is reported here is arbitrary; `has_tie` is the signal that
    /// matters.
    pub winning_label: Label,
    /// Winning votes as a share of total votes, in [0, 1]
    pub confidence: f64,
    /// Votes per label
    pub vote_counts: BTreeMap<Label, usize>,
    /// Whether confidence reached the agreement threshold
    pub has_consensus: bool,
    /// Whether the top two tallies are equal
    pub has_tie: bool,
    /// Tie or insufficient confidence: a human has to look at this one
    pub requires_manual_review: bool,
}

/// Sends one prompt to N models and reduces the replies to one decision.
pub struct ConsensusEngine<C: InferenceClient> {
    client: Arc<C>,
    limiter: Arc<RateLimiter>,
    models: Vec<String>,
    threshold: f64,
}

impl<C: InferenceClient> ConsensusEngine<C> {
    /// Create an engine from configuration.
    pub fn new(client: Arc<C>, limiter: Arc<RateLimiter>, config: &EngineConfig) -> Self {
        Self {
            client,
            limiter,
            models: config.models.clone(),
            threshold: config.consensus_threshold,
        }
    }

    /// Decide on one processed prompt.
    ///
    /// Model calls are issued concurrently, each gated by the rate limiter.
    /// Failed calls drop their vote; if every call fails the computation
    /// fails with `AllModelsFailed` rather than silently approving.
    #[tracing::instrument(skip(self, prompt), fields(models = self.models.len(), prompt_len = prompt.len()))]
    pub async fn decide(&self, prompt: &str) -> Result<ConsensusResult> {
        if self.models.is_empty() {
            return Err(ModgateError::AllModelsFailed { attempted: 0 });
        }

        let futures = self.models.iter().map(|model| {
            let model = model.clone();
            async move {
                self.acquire_slot().await;
                match self.client.complete(&model, prompt).await {
                    Ok(completion) => {
                        let label = extract_label(&completion.text);
                        tracing::debug!(
                            model = %model,
                            label = %label,
                            latency_ms = completion.latency.as_millis() as u64,
                            "Model vote collected"
                        );
                        Some(ModelVote {
                            model,
                            raw_reply: completion.text,
                            label,
                        })
                    }
                    Err(e) => {
                        tracing::warn!(model = %model, error = %e, "Model call failed, dropping vote");
                        None
                    }
                }
            }
        });

        let votes: Vec<ModelVote> = join_all(futures).await.into_iter().flatten().collect();

        if votes.is_empty() {
            tracing::error!(attempted = self.models.len(), "All model calls failed");
            return Err(ModgateError::AllModelsFailed {
                attempted: self.models.len(),
            });
        }

        let result = tally_votes(&votes, self.threshold);

        tracing::info!(
            winning_label = %result.winning_label,
            confidence = result.confidence,
            has_consensus = result.has_consensus,
            has_tie = result.has_tie,
            votes = votes.len(),
            "Consensus computed"
        );

        Ok(result)
    }

    /// Wait for room in the rate window, then claim it.
    async fn acquire_slot(&self) {
        loop {
            if self.limiter.try_acquire() {
                return;
            }
            let wait = self.limiter.wait_time().max(Duration::from_millis(50));
            tracing::debug!(
                wait_ms = wait.as_millis() as u64,
                "Rate ceiling reached, backing off"
            );
            tokio::time::sleep(wait).await;
        }
    }
}

/// Tally votes into a consensus result.
///
/// `confidence` is rounded to two decimals before the threshold comparison
/// so a 2-of-3 vote (0.6667) passes the 0.67 default inclusively.
fn tally_votes(votes: &[ModelVote], threshold: f64) -> ConsensusResult {
    let mut vote_counts: BTreeMap<Label, usize> = BTreeMap::new();
    for vote in votes {
        *vote_counts.entry(vote.label).or_insert(0) += 1;
    }

    let mut tallies: Vec<(Label, usize)> = vote_counts.iter().map(|(l, c)| (*l, *c)).collect();
    tallies.sort_by(|a, b| b.1.cmp(&a.1));

    let (winning_label, winning_count) = tallies[0];
    let has_tie = tallies.len() >= 2 && tallies[1].1 == winning_count;

    let confidence = winning_count as f64 / votes.len() as f64;
    let rounded = (confidence * 100.0).round() / 100.0;
    let has_consensus = rounded >= threshold;

    ConsensusResult {
        winning_label,
        confidence,
        vote_counts,
        has_consensus,
        has_tie,
        requires_manual_review: has_tie || !has_consensus,
    }
}
