//! Moderation decision engine for user-submitted content.
//!
//! This crate delegates moderation judgment to one or more external AI
//! text-generation endpoints and acts on the verdict:
//! - Throttles calls to the inference endpoint with a sliding-window rate limiter
//! - Runs each input past N models and reconciles disagreement into one
//!   decision with a calibrated confidence
//! - Processes large backlogs in resumable, observable chunks
//! - Feeds final outcomes back into a per-actor reputation score that can
//!   skip inference for trusted submitters
//!
//! # Example
//! ```ignore
//! use modgate::{
//!     ActionMap, BatchJobManager, ConsensusEngine, EngineConfig, HttpInferenceClient,
//!     InMemoryJobStore, InMemoryReputationBackend, ModerationOrchestrator, RateLimiter,
//!     ReputationStore,
//! };
//!
//! let config = EngineConfig {
//!     models: vec!["gpt-4o-mini".into(), "gpt-4o".into()],
//!     ..Default::default()
//! };
//!
//! let client = Arc::new(HttpInferenceClient::new(endpoint, api_key, config.request_timeout_ms));
//! let limiter = Arc::new(RateLimiter::new(config.requests_per_minute));
//! let consensus = ConsensusEngine::new(client, limiter, &config);
//! let reputation = ReputationStore::new(backend, config.reputation_skip_threshold);
//!
//! let orchestrator =
//!     ModerationOrchestrator::new(consensus, reputation, items, ActionMap::default(), &config);
//!
//! let outcome = orchestrator.moderate_item("42", &prompt).await?;
//! ```

pub mod config;
pub mod consensus;
pub mod error;
pub mod inference;
pub mod orchestrator;
pub mod rate_limit;
pub mod reputation;
pub mod session;

// Re-export commonly used types
pub use config::EngineConfig;
pub use consensus::{extract_label, ConsensusEngine, ConsensusResult, Label, ModelVote};
pub use error::{ModgateError, Result};
pub use inference::{Completion, HttpInferenceClient, InferenceClient, MockInferenceClient};
pub use orchestrator::{
    ActionMap, ItemStore, ModerationAction, ModerationOrchestrator, ModerationOutcome,
};
pub use rate_limit::RateLimiter;
pub use reputation::{
    InMemoryReputationBackend, Outcome, ReputationBackend, ReputationRecord, ReputationStore,
};
pub use session::{
    BatchJobManager, BatchJobSession, InMemoryJobStore, ItemId, ItemResult, JobId, JobStatus,
    JobStore, ProgressEntry,
};
