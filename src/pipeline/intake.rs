//! Upload intake: turn raw form fields into a validated [`UploadRequest`].
//!
//! The order of checks is fixed: consent first, then the file. A submission
//! without consent is rejected even when a perfectly good PDF is attached, and
//! nothing about the file is inspected until consent is established.

use crate::config::BASELINE_HELMET;
use crate::error::ResolveError;
use tracing::debug;

/// Values accepted as an affirmative consent flag (compared case-insensitively).
pub const CONSENT_VALUES: [&str; 3] = ["true", "on", "1"];

/// A file part as received, before any validation.
#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Form fields as received from the transport.
#[derive(Debug, Clone, Default)]
pub struct RawSubmission {
    pub consent: Option<String>,
    pub condition: Option<String>,
    pub helmet_type: Option<String>,
    pub file: Option<UploadedFile>,
}

/// A submission that passed intake.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub pdf: Vec<u8>,
    /// Clinician-selected condition, untouched. Normalised by the validator.
    pub condition: Option<String>,
    /// Helmet key, verbatim; [`BASELINE_HELMET`] when none was sent.
    pub helmet_type: String,
}

/// `true` when the flag is one of [`CONSENT_VALUES`].
pub fn consent_given(flag: Option<&str>) -> bool {
    flag.map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| CONSENT_VALUES.iter().any(|ok| v.eq_ignore_ascii_case(ok)))
        .unwrap_or(false)
}

/// Validate a raw submission.
pub fn accept(raw: RawSubmission) -> Result<UploadRequest, ResolveError> {
    if !consent_given(raw.consent.as_deref()) {
        return Err(ResolveError::ConsentRequired);
    }

    // Browsers submit an empty, unnamed part when no file was picked.
    let file = raw
        .file
        .filter(|f| !(f.filename.is_empty() && f.bytes.is_empty()))
        .ok_or(ResolveError::NoFile)?;

    let helmet_type = raw
        .helmet_type
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| BASELINE_HELMET.to_string());

    let condition = raw.condition.filter(|c| !c.trim().is_empty());

    debug!(
        "Accepted upload '{}' ({} bytes), condition={:?}, helmet={}",
        file.filename,
        file.bytes.len(),
        condition,
        helmet_type
    );

    Ok(UploadRequest {
        filename: file.filename,
        pdf: file.bytes,
        condition,
        helmet_type,
    })
}
