//! The extract-protocol pipeline, end to end.
//!
//! [`ProtocolService`] owns the read-only tables and the two external seams
//! (text extraction and the model) and runs one submission through every
//! stage in order:
//!
//! ```text
//! intake ─▶ stage ─▶ extract ─▶ prompt ─▶ model ─▶ validate ─▶ route ─▶ define
//! ```
//!
//! Every stage either hands its output to the next or returns a
//! [`ResolveError`]; nothing is retried and the first error ends the request.

use crate::config::{ResolverConfig, DEFAULT_MODEL};
use crate::error::ResolveError;
use crate::pipeline::extract::{self, PdfiumExtractor, TextExtractor};
use crate::pipeline::intake::{self, RawSubmission, UploadRequest};
use crate::pipeline::llm::{self, LlmResolver, ModelResolver};
use crate::pipeline::{route, validate};
use crate::prompts::build_resolver_prompt;
use crate::response::Resolution;
use crate::tables::ProtocolTables;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Runs submissions through the pipeline. Cheap to share behind an `Arc`.
pub struct ProtocolService {
    config: ResolverConfig,
    tables: Arc<ProtocolTables>,
    extractor: Arc<dyn TextExtractor>,
    model: Arc<dyn ModelResolver>,
}

impl ProtocolService {
    /// Assemble a service from explicit parts.
    pub fn new(
        config: ResolverConfig,
        tables: Arc<ProtocolTables>,
        extractor: Arc<dyn TextExtractor>,
        model: Arc<dyn ModelResolver>,
    ) -> Self {
        Self {
            config,
            tables,
            extractor,
            model,
        }
    }

    /// Production wiring: tables from config, pdfium extraction, and the
    /// configured LLM provider.
    pub fn from_config(config: ResolverConfig) -> Result<Self, ResolveError> {
        let tables = Arc::new(ProtocolTables::load(config.tables_dir.as_deref())?);
        let provider = resolve_provider(&config)?;
        info!(
            "Using LLM provider '{}' with model '{}'",
            provider.name(),
            provider.model()
        );
        let model: Arc<dyn ModelResolver> = Arc::new(LlmResolver::new(provider, &config));
        Ok(Self::new(
            config,
            tables,
            Arc::new(PdfiumExtractor::new()),
            model,
        ))
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn tables(&self) -> &ProtocolTables {
        &self.tables
    }

    /// Intake then resolve.
    pub async fn handle(&self, raw: RawSubmission) -> Result<Resolution, ResolveError> {
        let request = intake::accept(raw)?;
        self.resolve(request).await
    }

    /// Resolve an accepted upload to a protocol.
    pub async fn resolve(&self, request: UploadRequest) -> Result<Resolution, ResolveError> {
        let start = Instant::now();
        info!(
            "Resolving '{}' ({} bytes, helmet={})",
            request.filename,
            request.pdf.len(),
            request.helmet_type
        );

        // ── Step 1: Stage upload and extract text ────────────────────────
        let staged = self.stage_upload(&request)?;
        let extracted = extract::extract_text(Arc::clone(&self.extractor), staged.path()).await;
        let staged_path = staged.path().to_path_buf();
        if let Err(e) = staged.close() {
            warn!("Failed to remove staged upload {}: {}", staged_path.display(), e);
        }
        let extracted = extracted?;
        debug!(
            "Extracted {} chars from {} pages",
            extracted.text.len(),
            extracted.page_count
        );

        // ── Step 2: Ask the model ────────────────────────────────────────
        let prompt = build_resolver_prompt(&extracted.text);
        let raw_answer =
            llm::call_model(self.model.as_ref(), &prompt, self.config.model_timeout_secs).await?;
        debug!("Model answer: {}", raw_answer);

        // ── Step 3: Validate and route ───────────────────────────────────
        let answer =
            validate::validate_answer(&raw_answer, request.condition.as_deref(), &self.tables)?;
        let protocol_id = route::route_protocol(&self.tables, &answer)?;

        // ── Step 4: Load the dosing definition ───────────────────────────
        let definition = route::load_definition(&self.tables, &protocol_id, &request.helmet_type);

        info!(
            "Resolved {} #{} → {} in {}ms",
            answer.condition,
            answer.index,
            protocol_id,
            start.elapsed().as_millis()
        );

        Ok(Resolution {
            condition: answer.condition,
            index: answer.index,
            protocol_id,
            phases: definition.phases,
            helmet_type: request.helmet_type,
            neuroradiant: definition.neuroradiant,
        })
    }

    /// Write the upload to a named temp file. The file is removed when the
    /// returned guard is closed or dropped.
    fn stage_upload(&self, request: &UploadRequest) -> Result<NamedTempFile, ResolveError> {
        let dir = self
            .config
            .upload_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let staging_err = |source| ResolveError::UploadStaging {
            path: dir.clone(),
            source,
        };

        let mut tmp = tempfile::Builder::new()
            .prefix("brain-map-")
            .suffix(".pdf")
            .tempfile_in(&dir)
            .map_err(staging_err)?;
        tmp.write_all(&request.pdf).map_err(staging_err)?;
        tmp.flush().map_err(staging_err)?;
        Ok(tmp)
    }
}

/// API-key variables probed when no provider is named, in order, with the
/// provider each one selects and the model used when none is configured.
const KEYED_PROVIDERS: [(&str, &str, &str); 3] = [
    ("OPENAI_API_KEY", "openai", DEFAULT_MODEL),
    ("ANTHROPIC_API_KEY", "anthropic", "claude-3-5-haiku-latest"),
    ("GEMINI_API_KEY", "gemini", "gemini-2.0-flash"),
];

/// Provider/model pair to instantiate, decided before any client is built.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ProviderChoice {
    Named { provider: String, model: String },
    AutoDetect,
}

fn default_model_for(provider: &str) -> &'static str {
    KEYED_PROVIDERS
        .iter()
        .find(|(_, name, _)| *name == provider)
        .map(|(_, _, model)| *model)
        .unwrap_or(DEFAULT_MODEL)
}

/// Pick the provider from config, then `EDGEQUAKE_LLM_PROVIDER`, then the
/// first API key present. `env` returns non-empty variable values only.
fn choose_provider(config: &ResolverConfig, env: impl Fn(&str) -> Option<String>) -> ProviderChoice {
    let named = |provider: String, env_model: Option<String>| {
        let model = config
            .model
            .clone()
            .or(env_model)
            .unwrap_or_else(|| default_model_for(&provider).to_string());
        ProviderChoice::Named { provider, model }
    };

    if let Some(ref provider) = config.provider_name {
        return named(provider.clone(), None);
    }
    if let Some(provider) = env("EDGEQUAKE_LLM_PROVIDER") {
        return named(provider, env("EDGEQUAKE_MODEL"));
    }
    KEYED_PROVIDERS
        .iter()
        .find(|(key, _, _)| env(*key).is_some())
        .map(|(_, provider, _)| named(provider.to_string(), None))
        .unwrap_or(ProviderChoice::AutoDetect)
}

/// The LLM provider for `config`: the pre-built one when set, otherwise the
/// one [`choose_provider`] settles on from config and environment.
pub fn resolve_provider(config: &ResolverConfig) -> Result<Arc<dyn LLMProvider>, ResolveError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
    match choose_provider(config, env) {
        ProviderChoice::Named { provider, model } => {
            debug!("Creating provider '{}' with model '{}'", provider, model);
            ProviderFactory::create_llm_provider(&provider, &model).map_err(|e| {
                ResolveError::ProviderNotConfigured {
                    provider,
                    hint: e.to_string(),
                }
            })
        }
        ProviderChoice::AutoDetect => ProviderFactory::from_env()
            .map(|(llm, _embedding)| llm)
            .map_err(|e| ResolveError::ProviderNotConfigured {
                provider: "auto".to_string(),
                hint: format!(
                    "No brain-map resolver model is configured ({e}).\n\
                     Pass --provider, or set one of OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY."
                ),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extract::ExtractedText;
    use crate::pipeline::intake::UploadedFile;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    /// Records the staged path and checks the upload is on disk while read.
    #[derive(Default)]
    struct SpyExtractor {
        seen: Mutex<Option<PathBuf>>,
        fail: bool,
    }

    impl TextExtractor for SpyExtractor {
        fn extract(&self, path: &Path) -> Result<ExtractedText, ResolveError> {
            assert!(path.exists(), "staged upload missing during extraction");
            assert_eq!(std::fs::read(path).unwrap(), b"%PDF-1.7 brain map");
            *self.seen.lock().unwrap() = Some(path.to_path_buf());
            if self.fail {
                return Err(ResolveError::ExtractionFailed {
                    detail: "bad xref".into(),
                });
            }
            Ok(ExtractedText {
                text: "PBM PROTOCOL RECOMMENDATIONS\nProtocol # 4".into(),
                page_count: 3,
            })
        }
    }

    struct Canned(String);

    #[async_trait]
    impl ModelResolver for Canned {
        async fn resolve(&self, prompt: &str) -> Result<String, ResolveError> {
            assert!(prompt.contains("Protocol # 4"));
            Ok(self.0.clone())
        }
    }

    fn service(
        dir: &Path,
        extractor: Arc<SpyExtractor>,
        answer: &str,
    ) -> ProtocolService {
        let config = ResolverConfig::builder().upload_dir(dir).build().unwrap();
        ProtocolService::new(
            config,
            Arc::new(ProtocolTables::packaged().unwrap()),
            extractor,
            Arc::new(Canned(answer.to_string())),
        )
    }

    fn submission(condition: Option<&str>, helmet: Option<&str>) -> RawSubmission {
        RawSubmission {
            consent: Some("true".into()),
            condition: condition.map(str::to_string),
            helmet_type: helmet.map(str::to_string),
            file: Some(UploadedFile {
                filename: "map.pdf".into(),
                bytes: b"%PDF-1.7 brain map".to_vec(),
            }),
        }
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn resolves_and_removes_staged_upload() {
        let dir = tempfile::tempdir().unwrap();
        let spy = Arc::new(SpyExtractor::default());
        let svc = service(dir.path(), Arc::clone(&spy), r#"{"condition":"DEPRESSION","index":4}"#);

        let r = svc.handle(submission(None, None)).await.unwrap();
        assert_eq!(r.condition, "DEPRESSION");
        assert_eq!(r.index, 4);
        assert_eq!(r.protocol_id, "DEP-1");
        assert_eq!(r.helmet_type, "light");
        assert_eq!(r.phases.len(), 3);
        assert!(r.neuroradiant.is_none());

        let staged = spy.seen.lock().unwrap().clone().unwrap();
        assert!(staged.starts_with(dir.path()));
        assert!(!staged.exists());
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn extraction_failure_still_removes_staged_upload() {
        let dir = tempfile::tempdir().unwrap();
        let spy = Arc::new(SpyExtractor {
            fail: true,
            ..Default::default()
        });
        let svc = service(dir.path(), Arc::clone(&spy), "{}");

        let err = svc.handle(submission(None, None)).await.unwrap_err();
        assert!(matches!(err, ResolveError::ExtractionFailed { .. }));
        assert!(spy.seen.lock().unwrap().is_some());
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn validation_failure_still_removes_staged_upload() {
        let dir = tempfile::tempdir().unwrap();
        let spy = Arc::new(SpyExtractor::default());
        let svc = service(dir.path(), spy, r#"{"condition":"STRESS","index":4}"#);

        let err = svc.handle(submission(None, None)).await.unwrap_err();
        assert!(matches!(err, ResolveError::InvalidCondition { .. }));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn consent_failure_never_stages_or_extracts() {
        let dir = tempfile::tempdir().unwrap();
        let spy = Arc::new(SpyExtractor::default());
        let svc = service(dir.path(), Arc::clone(&spy), "{}");

        let mut raw = submission(None, None);
        raw.consent = Some("no".into());
        let err = svc.handle(raw).await.unwrap_err();
        assert!(matches!(err, ResolveError::ConsentRequired));
        assert!(spy.seen.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn clinician_condition_overrides_model() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(
            dir.path(),
            Arc::new(SpyExtractor::default()),
            r#"{"condition":"ANXIETY","index":4}"#,
        );
        let r = svc
            .handle(submission(Some("depression"), None))
            .await
            .unwrap();
        assert_eq!(r.condition, "DEPRESSION");
        assert_eq!(r.protocol_id, "DEP-1");
    }

    #[tokio::test]
    async fn neuroradiant_helmet_adds_payload() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(
            dir.path(),
            Arc::new(SpyExtractor::default()),
            r#"{"condition":"DEPRESSION","index":4}"#,
        );
        let r = svc
            .handle(submission(None, Some("neuroradiant1070")))
            .await
            .unwrap();
        let payload = r.neuroradiant.unwrap().unwrap();
        assert_eq!(payload.protocol_id, "DEP-1");
        assert_eq!(payload.cycles, 2);
        assert_eq!(r.helmet_type, "neuroradiant1070");
    }

    #[tokio::test]
    async fn empty_model_answer_is_no_response() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), Arc::new(SpyExtractor::default()), "   ");
        let err = svc.handle(submission(None, None)).await.unwrap_err();
        assert!(matches!(err, ResolveError::NoResponse));
    }

    #[tokio::test]
    async fn identical_submissions_resolve_identically() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(
            dir.path(),
            Arc::new(SpyExtractor::default()),
            r#"{"condition":"SLEEP","index":13}"#,
        );
        let a = svc.handle(submission(Some("SLEEP"), None)).await.unwrap();
        let b = svc.handle(submission(Some("SLEEP"), None)).await.unwrap();
        assert_eq!(a, b);
    }

    fn env_of(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key: &str| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    fn named(provider: &str, model: &str) -> ProviderChoice {
        ProviderChoice::Named {
            provider: provider.into(),
            model: model.into(),
        }
    }

    #[test]
    fn configured_provider_wins_over_environment() {
        let config = ResolverConfig::builder()
            .provider_name("ollama")
            .model("llama3.2")
            .build()
            .unwrap();
        let env = env_of(&[("EDGEQUAKE_LLM_PROVIDER", "openai"), ("OPENAI_API_KEY", "sk")]);
        assert_eq!(choose_provider(&config, env), named("ollama", "llama3.2"));
    }

    #[test]
    fn environment_provider_uses_environment_model() {
        let config = ResolverConfig::default();
        let env = env_of(&[
            ("EDGEQUAKE_LLM_PROVIDER", "anthropic"),
            ("EDGEQUAKE_MODEL", "claude-sonnet-4-20250514"),
        ]);
        assert_eq!(
            choose_provider(&config, env),
            named("anthropic", "claude-sonnet-4-20250514")
        );
    }

    #[test]
    fn api_key_selects_provider_with_its_default_model() {
        let config = ResolverConfig::default();
        let env = env_of(&[("GEMINI_API_KEY", "g"), ("ANTHROPIC_API_KEY", "a")]);
        assert_eq!(
            choose_provider(&config, env),
            named("anthropic", "claude-3-5-haiku-latest")
        );

        let config = ResolverConfig::builder().model("gpt-4.1").build().unwrap();
        let env = env_of(&[("OPENAI_API_KEY", "sk")]);
        assert_eq!(choose_provider(&config, env), named("openai", "gpt-4.1"));
    }

    #[test]
    fn nothing_configured_falls_back_to_auto_detection() {
        let config = ResolverConfig::default();
        assert_eq!(choose_provider(&config, env_of(&[])), ProviderChoice::AutoDetect);
    }
}
