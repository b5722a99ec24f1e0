use thiserror::Error;

use crate::session::JobId;

/// Result type for modgate operations.
pub type Result<T> = std::result::Result<T, ModgateError>;

/// Errors that can occur in the moderation engine.
#[derive(Debug, Error)]
pub enum ModgateError {
    /// A single model call failed. Recovered at the consensus boundary by
    /// dropping that vote.
    #[error("inference call to model '{model}' failed: {reason}")]
    InferenceCallFailed { model: String, reason: String },

    /// Every configured model failed for one consensus computation.
    /// The item is left unprocessed; never defaulted to approve or reject.
    #[error("all {attempted} model call(s) failed, item not processed")]
    AllModelsFailed { attempted: usize },

    /// Batch session expired or never existed. The caller must restart the
    /// batch with fresh item identifiers.
    #[error("job not found: {0} (expired or never created)")]
    JobNotFound(JobId),

    /// A result was reported against a session that already reached its
    /// total count.
    #[error("job {0} is already completed")]
    JobAlreadyCompleted(JobId),

    /// The external item store collaborator failed.
    #[error("item store error for item '{item_id}': {message}")]
    ItemStore { item_id: String, message: String },

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
