//! Configuration for the moderation engine.

use serde::{Deserialize, Serialize};

/// Operator-tunable knobs for the engine.
///
/// All fields have sensible defaults; construct with `EngineConfig::default()`
/// and override what you need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Ceiling on inference calls per rate window (one minute)
    pub requests_per_minute: usize,

    /// Model identifiers queried for each consensus decision
    pub models: Vec<String>,

    /// Agreement share required for consensus (two-thirds supermajority).
    /// Compared inclusively after rounding to two decimals, so a 2-of-3
    /// vote (0.6667) qualifies at the default of 0.67.
    pub consensus_threshold: f64,

    /// Reputation score at or above which inference is skipped entirely.
    /// 0 (or anything above 100) disables the skip feature.
    pub reputation_skip_threshold: u32,

    /// Items handed out per `next_chunk` call
    pub chunk_size: usize,

    /// Pause between items within one chunk, smoothing bursts against the
    /// inference endpoint independently of the rate limiter
    pub inter_item_delay_ms: u64,

    /// Timeout for each individual inference call in milliseconds
    pub request_timeout_ms: u64,

    /// Time-to-live for batch job sessions in seconds. An expired session
    /// is unrecoverable; the batch must be restarted.
    pub job_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 5,
            models: Vec::new(),
            consensus_threshold: 0.67,
            reputation_skip_threshold: 0,
            chunk_size: 3,
            inter_item_delay_ms: 200,
            request_timeout_ms: 30000,
            job_ttl_secs: 3600,
        }
    }
}
