//! Configuration for the protocol resolver.
//!
//! All resolver behaviour is controlled through [`ResolverConfig`], built via
//! its [`ResolverConfigBuilder`]. The config is created once at process start
//! and shared read-only by every request.

use crate::error::ResolveError;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Helmet variant used when the submission does not name one.
pub const BASELINE_HELMET: &str = "light";

/// Helmet variant that additionally receives a cycle/step payload.
pub const NEURORADIANT_HELMET: &str = "neuroradiant1070";

/// Model used when only a provider name is configured.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Configuration for protocol resolution.
///
/// # Example
/// ```rust
/// use pbm_protocol::ResolverConfig;
///
/// let config = ResolverConfig::builder()
///     .model("gpt-4.1-mini")
///     .max_upload_bytes(10 * 1024 * 1024)
///     .build()
///     .unwrap();
/// assert_eq!(config.temperature, 0.0);
/// ```
#[derive(Clone)]
pub struct ResolverConfig {
    /// LLM model identifier, e.g. "gpt-4.1-mini". If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Protocol selection must be reproducible: the same brain map has to
    /// yield the same condition and index on every submission.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 256.
    ///
    /// The answer is a two-field JSON object; 256 leaves room for verbose
    /// whitespace without inviting prose.
    pub max_tokens: usize,

    /// Optional ceiling on the model call, in seconds. Default: None (no timeout).
    pub model_timeout_secs: Option<u64>,

    /// Directory holding `router.json`, `protocols.json` and `neuroradiant.json`.
    /// If None, the tables packaged with the crate are used.
    pub tables_dir: Option<PathBuf>,

    /// Directory uploads are staged in while text is extracted.
    /// If None, the system temp directory is used.
    pub upload_dir: Option<PathBuf>,

    /// Maximum accepted request body in bytes. Default: 25 MiB.
    pub max_upload_bytes: usize,

    /// Bearer token required on `/api/*` routes. None disables the gate.
    pub access_token: Option<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 256,
            model_timeout_secs: None,
            tables_dir: None,
            upload_dir: None,
            max_upload_bytes: 25 * 1024 * 1024,
            access_token: None,
        }
    }
}

impl fmt::Debug for ResolverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("model_timeout_secs", &self.model_timeout_secs)
            .field("tables_dir", &self.tables_dir)
            .field("upload_dir", &self.upload_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ResolverConfig {
    /// Create a new builder for `ResolverConfig`.
    pub fn builder() -> ResolverConfigBuilder {
        ResolverConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ResolverConfig`].
#[derive(Debug)]
pub struct ResolverConfigBuilder {
    config: ResolverConfig,
}

impl ResolverConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn model_timeout_secs(mut self, secs: u64) -> Self {
        self.config.model_timeout_secs = Some(secs);
        self
    }

    pub fn tables_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.tables_dir = Some(dir.into());
        self
    }

    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = Some(dir.into());
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.config.access_token = if token.is_empty() { None } else { Some(token) };
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ResolverConfig, ResolveError> {
        let c = &self.config;
        if c.max_tokens < 16 {
            return Err(ResolveError::InvalidConfig(format!(
                "max_tokens must be ≥ 16 to fit a JSON answer, got {}",
                c.max_tokens
            )));
        }
        if c.max_upload_bytes == 0 {
            return Err(ResolveError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        if c.model_timeout_secs == Some(0) {
            return Err(ResolveError::InvalidConfig(
                "model timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

/// `true` when the helmet string selects the alternate hardware payload.
pub fn is_neuroradiant(helmet_type: &str) -> bool {
    helmet_type == NEURORADIANT_HELMET
}
