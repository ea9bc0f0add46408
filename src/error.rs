//! Error types for the protocol resolver.
//!
//! Every failure in the pipeline is a [`ResolveError`]. Each variant maps to
//! exactly one machine-readable [`ErrorCode`] that ends up in the response
//! body, so callers (the web front-end, the CLI) can branch on the code rather
//! than on message text.
//!
//! The variants split into two groups:
//!
//! * **Business-rule failures**: consent missing, no file, the model gave no
//!   answer or an answer outside the closed vocabulary/range, or the tables
//!   have no mapping for a valid pair. These are the caller's problem and
//!   surface as HTTP 400.
//!
//! * **Infrastructure failures**: pdfium could not read the document, the
//!   model transport failed, the model returned something that is not JSON,
//!   tables failed to load. These collapse to `SERVER_ERROR` / HTTP 500.
//!
//! Invalid-condition and invalid-index errors carry the model's *raw* values
//! (as [`serde_json::Value`]) so the response can echo them for diagnostics.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the resolver pipeline and its setup code.
#[derive(Debug, Error)]
pub enum ResolveError {
    // ── Intake errors ─────────────────────────────────────────────────────
    /// Consent flag missing or not one of `true` / `on` / `1`.
    #[error("Consent is required before a brain map can be processed")]
    ConsentRequired,

    /// No PDF was attached to the submission.
    #[error("No PDF file was uploaded")]
    NoFile,

    /// The request body exceeded the configured upload limit.
    #[error("Upload exceeds the {limit}-byte limit")]
    UploadTooLarge { limit: usize },

    /// Request did not carry the configured bearer token.
    #[error("Missing or invalid access token")]
    Unauthorized,

    // ── Model errors ──────────────────────────────────────────────────────
    /// The model returned an empty or missing payload.
    #[error("The language model returned no content")]
    NoResponse,

    /// The model transport failed (network, auth, rate limit, …).
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// The model call exceeded the configured timeout.
    #[error("LLM call timed out after {secs}s")]
    ModelTimeout { secs: u64 },

    /// The model answered, but the answer is not valid JSON.
    #[error("Model output is not valid JSON: {detail}")]
    MalformedResponse { detail: String, raw: String },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Validation errors ─────────────────────────────────────────────────
    /// Effective condition is empty or not part of the router table.
    #[error("Condition {condition} is not one of the supported conditions")]
    InvalidCondition { condition: Value, index: Value },

    /// Index is not an integer in [1, 24].
    #[error("Protocol index {index} is not an integer between 1 and 24")]
    InvalidIndex { condition: Value, index: Value },

    /// Valid condition and index, but no protocol is configured for the pair.
    #[error("No protocol is configured for {condition} index {index}")]
    ProtocolNotFound { condition: String, index: u8 },

    // ── Document errors ───────────────────────────────────────────────────
    /// pdfium could not open or read the uploaded document.
    #[error("Text extraction failed: {detail}")]
    ExtractionFailed { detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH to the directory containing libpdfium, or install it system-wide."
    )]
    PdfiumBindingFailed(String),

    /// CLI input was neither a readable file nor a reachable URL.
    #[error("Failed to load '{input}': {reason}")]
    InputUnavailable { input: String, reason: String },

    /// CLI input was read, but is not a PDF.
    #[error("'{input}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { input: String, magic: [u8; 4] },

    // ── Configuration errors ──────────────────────────────────────────────
    /// A protocol table failed to load or is inconsistent.
    #[error("Protocol table '{table}' could not be loaded: {detail}")]
    TableLoad { table: String, detail: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not stage the upload on disk.
    #[error("Failed to stage upload in '{path}': {source}")]
    UploadStaging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Machine-readable error code placed in `error_code` of the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ConsentRequired,
    NoFile,
    NoResponse,
    InvalidCondition,
    InvalidIndex,
    ProtocolNotFound,
    UploadTooLarge,
    MethodNotAllowed,
    Unauthorized,
    ServerError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConsentRequired => "CONSENT_REQUIRED",
            ErrorCode::NoFile => "NO_FILE",
            ErrorCode::NoResponse => "NO_RESPONSE",
            ErrorCode::InvalidCondition => "INVALID_CONDITION",
            ErrorCode::InvalidIndex => "INVALID_INDEX",
            ErrorCode::ProtocolNotFound => "PROTOCOL_NOT_FOUND",
            ErrorCode::UploadTooLarge => "UPLOAD_TOO_LARGE",
            ErrorCode::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::ServerError => "SERVER_ERROR",
        }
    }

    /// HTTP status the code is reported with.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::ServerError => 500,
            ErrorCode::UploadTooLarge => 413,
            ErrorCode::MethodNotAllowed => 405,
            ErrorCode::Unauthorized => 401,
            _ => 400,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ResolveError {
    /// The response code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ResolveError::ConsentRequired => ErrorCode::ConsentRequired,
            ResolveError::NoFile => ErrorCode::NoFile,
            ResolveError::UploadTooLarge { .. } => ErrorCode::UploadTooLarge,
            ResolveError::Unauthorized => ErrorCode::Unauthorized,
            ResolveError::NoResponse => ErrorCode::NoResponse,
            ResolveError::InvalidCondition { .. } => ErrorCode::InvalidCondition,
            ResolveError::InvalidIndex { .. } => ErrorCode::InvalidIndex,
            ResolveError::ProtocolNotFound { .. } => ErrorCode::ProtocolNotFound,
            _ => ErrorCode::ServerError,
        }
    }

    /// `true` for failures that are the caller's (or the model's) fault
    /// rather than an infrastructure problem.
    pub fn is_client_error(&self) -> bool {
        self.code() != ErrorCode::ServerError
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invalid_index_display_echoes_raw_value() {
        let e = ResolveError::InvalidIndex {
            condition: json!("DEPRESSION"),
            index: json!(638),
        };
        assert!(e.to_string().contains("638"), "got: {e}");
        assert_eq!(e.code(), ErrorCode::InvalidIndex);
    }

    #[test]
    fn infrastructure_errors_collapse_to_server_error() {
        let errors = [
            ResolveError::ExtractionFailed {
                detail: "bad xref".into(),
            },
            ResolveError::LlmApiError {
                message: "503".into(),
            },
            ResolveError::MalformedResponse {
                detail: "EOF".into(),
                raw: "{".into(),
            },
            ResolveError::ModelTimeout { secs: 30 },
            ResolveError::Internal("boom".into()),
        ];
        for e in errors {
            assert_eq!(e.code(), ErrorCode::ServerError, "{e}");
            assert!(!e.is_client_error());
        }
    }

    #[test]
    fn business_rule_errors_are_400() {
        for e in [
            ResolveError::ConsentRequired,
            ResolveError::NoFile,
            ResolveError::NoResponse,
        ] {
            assert_eq!(e.code().http_status(), 400, "{e}");
        }
        let e = ResolveError::ProtocolNotFound {
            condition: "SLEEP".into(),
            index: 9,
        };
        assert_eq!(e.code().http_status(), 400);
        assert!(e.to_string().contains("SLEEP"));
    }

    #[test]
    fn oversized_upload_is_413() {
        let e = ResolveError::UploadTooLarge { limit: 1024 };
        assert_eq!(e.code(), ErrorCode::UploadTooLarge);
        assert_eq!(e.code().http_status(), 413);
        assert!(e.is_client_error());
        assert!(e.to_string().contains("1024"));
    }

    #[test]
    fn error_code_serialises_screaming_snake_case() {
        let s = serde_json::to_string(&ErrorCode::ProtocolNotFound).unwrap();
        assert_eq!(s, "\"PROTOCOL_NOT_FOUND\"");
        assert_eq!(ErrorCode::ConsentRequired.to_string(), "CONSENT_REQUIRED");
    }
}
