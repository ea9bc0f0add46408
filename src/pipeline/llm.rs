//! Model call: send the resolver prompt, get the raw answer text back.
//!
//! The rest of the pipeline only sees [`ModelResolver`], a narrow
//! `prompt → raw text` seam. Swapping the language model for a rule-based or
//! cached resolver means implementing that trait; validation and routing do
//! not change.
//!
//! One call per request. Transport failures are not retried.

use crate::config::ResolverConfig;
use crate::error::ResolveError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// `response_format` value that puts providers into JSON-only mode.
pub const JSON_RESPONSE_FORMAT: &str = "json_object";

/// Turns a prompt into the model's raw answer.
#[async_trait]
pub trait ModelResolver: Send + Sync {
    /// Returns the raw answer text. Empty answers are reported as
    /// [`ResolveError::NoResponse`].
    async fn resolve(&self, prompt: &str) -> Result<String, ResolveError>;
}

/// [`ModelResolver`] backed by an edgequake-llm provider.
pub struct LlmResolver {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmResolver {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ResolverConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }
}

#[async_trait]
impl ModelResolver for LlmResolver {
    async fn resolve(&self, prompt: &str) -> Result<String, ResolveError> {
        let start = Instant::now();
        let messages = vec![ChatMessage::user(prompt)];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| {
                warn!("Model call failed: {}", e);
                ResolveError::LlmApiError {
                    message: e.to_string(),
                }
            })?;

        debug!(
            "Model answered: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        non_empty(response.content)
    }
}

/// Map an empty or whitespace-only answer to [`ResolveError::NoResponse`].
pub fn non_empty(content: String) -> Result<String, ResolveError> {
    if content.trim().is_empty() {
        Err(ResolveError::NoResponse)
    } else {
        Ok(content)
    }
}

/// Call `model`, bounded by the configured timeout when there is one.
pub async fn call_model(
    model: &dyn ModelResolver,
    prompt: &str,
    timeout_secs: Option<u64>,
) -> Result<String, ResolveError> {
    let raw = match timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), model.resolve(prompt))
            .await
            .map_err(|_| ResolveError::ModelTimeout { secs })??,
        None => model.resolve(prompt).await?,
    };
    non_empty(raw)
}

/// Build `CompletionOptions` from the resolver config.
fn build_options(config: &ResolverConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        response_format: Some(JSON_RESPONSE_FORMAT.to_string()),
        ..Default::default()
    }
}
