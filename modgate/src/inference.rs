//! Inference client abstraction for prompt-completion calls.
//!
//! This module defines the `InferenceClient` trait to abstract the external
//! AI endpoint, enabling testability with mock implementations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use crate::error::{ModgateError, Result};

/// A successful reply from one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// The model's raw free-text reply
    pub text: String,
    /// Wall-clock duration of the call
    pub latency: Duration,
}

/// Trait for issuing one prompt-completion request to a named model.
///
/// Implementations must apply their own bounded timeout; the consensus
/// engine treats any failure uniformly (the vote is dropped).
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Send `prompt` to `model` and return its reply.
    ///
    /// # Errors
    /// Returns an error if the call fails for any reason (network, timeout,
    /// non-success status, malformed response body).
    async fn complete(&self, model: &str, prompt: &str) -> Result<Completion>;
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

/// Production inference client speaking an OpenAI-style chat completions API.
#[derive(Clone)]
pub struct HttpInferenceClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout_ms: u64,
}

impl HttpInferenceClient {
    /// Create a new client for `endpoint` (e.g. "https://api.openai.com").
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            timeout_ms,
        }
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    #[tracing::instrument(skip(self, prompt), fields(model = %model, prompt_len = prompt.len()))]
    async fn complete(&self, model: &str, prompt: &str) -> Result<Completion> {
        let url = format!("{}/v1/chat/completions", self.endpoint);
        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
        });

        tracing::debug!(url = %url, timeout_ms = self.timeout_ms, "Executing inference request");

        let started = Instant::now();

        let mut req = self
            .client
            .post(&url)
            .timeout(Duration::from_millis(self.timeout_ms))
            .json(&body);

        if !self.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = req.send().await.map_err(|e| {
            tracing::warn!(model = %model, error = %e, "Inference request failed");
            ModgateError::InferenceCallFailed {
                model: model.to_string(),
                reason: e.to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(model = %model, status = status.as_u16(), "Inference endpoint returned error status");
            return Err(ModgateError::InferenceCallFailed {
                model: model.to_string(),
                reason: format!("status {}: {}", status.as_u16(), body),
            });
        }

        let payload: serde_json::Value = response.json().await?;
        let text = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ModgateError::InferenceCallFailed {
                model: model.to_string(),
                reason: "response body missing choices[0].message.content".to_string(),
            })?
            .to_string();

        let latency = started.elapsed();

        tracing::info!(
            model = %model,
            latency_ms = latency.as_millis() as u64,
            reply_len = text.len(),
            "Inference request completed"
        );

        Ok(Completion { text, latency })
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

/// Mock inference client for testing.
///
/// Allows configuring predetermined replies per model without making actual
/// network calls. Replies queued for the same model are returned in FIFO
/// order; a default reply can be set as a fallback for any model.
#[derive(Clone, Default)]
pub struct MockInferenceClient {
    responses: Arc<Mutex<HashMap<String, Vec<Result<Completion>>>>>,
    default_reply: Arc<Mutex<Option<String>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

/// Record of a call made to the mock inference client.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub model: String,
    pub prompt: String,
}

impl MockInferenceClient {
    /// Create a new mock inference client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for a specific model.
    pub fn add_response(&self, model: &str, response: Result<Completion>) {
        self.responses
            .lock()
            .entry(model.to_string())
            .or_default()
            .push(response);
    }

    /// Queue a successful text reply for a specific model.
    pub fn add_reply(&self, model: &str, text: &str) {
        self.add_response(
            model,
            Ok(Completion {
                text: text.to_string(),
                latency: Duration::from_millis(1),
            }),
        );
    }

    /// Set a fallback reply used for any model with no queued response.
    pub fn set_default_reply(&self, text: &str) {
        *self.default_reply.lock() = Some(text.to_string());
    }

    /// Get all calls that have been made to this mock client.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl InferenceClient for MockInferenceClient {
    async fn complete(&self, model: &str, prompt: &str) -> Result<Completion> {
        self.calls.lock().push(MockCall {
            model: model.to_string(),
            prompt: prompt.to_string(),
        });

        let mut responses = self.responses.lock();
        if let Some(queue) = responses.get_mut(model) {
            if !queue.is_empty() {
                return queue.remove(0);
            }
        }
        drop(responses);

        if let Some(text) = self.default_reply.lock().clone() {
            return Ok(Completion {
                text,
                latency: Duration::from_millis(1),
            });
        }

        Err(ModgateError::InferenceCallFailed {
            model: model.to_string(),
            reason: "no mock response configured".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_client_fifo_per_model() {
        let mock = MockInferenceClient::new();
        mock.add_reply("model-a", "first");
        mock.add_reply("model-a", "second");

        let r1 = mock.complete("model-a", "p").await.unwrap();
        assert_eq!(r1.text, "first");

        let r2 = mock.complete("model-a", "p").await.unwrap();
        assert_eq!(r2.text, "second");

        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_client_records_calls() {
        let mock = MockInferenceClient::new();
        mock.add_reply("model-a", "APPROVE");

        mock.complete("model-a", "moderate this").await.unwrap();

        let calls = mock.get_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, "model-a");
        assert_eq!(calls[0].prompt, "moderate this");
    }

    #[tokio::test]
    async fn test_mock_client_default_reply_fallback() {
        let mock = MockInferenceClient::new();
        mock.set_default_reply("APPROVE");

        let r = mock.complete("anything", "p").await.unwrap();
        assert_eq!(r.text, "APPROVE");
    }

    #[tokio::test]
    async fn test_mock_client_no_response_is_error() {
        let mock = MockInferenceClient::new();

        let result = mock.complete("unknown", "p").await;
        assert!(matches!(
            result,
            Err(ModgateError::InferenceCallFailed { .. })
        ));
    }
}
