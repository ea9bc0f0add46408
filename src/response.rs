//! Response bodies for the extract-protocol endpoint and the CLI.
//!
//! ```text
//! 200  {ok:true,  condition, index, protocol_id, phases, helmet_type, [neuroradiant]}
//! 4xx  {ok:false, error_code, message, detail:{condition, index, missing}}
//! 500  {ok:false, error_code:"SERVER_ERROR", message, detail:{…, missing:<error>}}
//! ```

use crate::error::{ErrorCode, ResolveError};
use crate::pipeline::route::NeuroradiantPayload;
use crate::tables::Phase;
use serde::Serialize;
use serde_json::Value;

/// Message used for every `SERVER_ERROR`; the specifics go in `detail.missing`.
pub const SERVER_ERROR_MESSAGE: &str = "The brain map could not be processed";

/// Final answer for one submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub condition: String,
    pub index: u8,
    pub protocol_id: String,
    pub phases: Vec<Phase>,
    pub helmet_type: String,
    /// Present only for the alternate helmet; `null` when it has no entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neuroradiant: Option<Option<NeuroradiantPayload>>,
}

/// 200 body.
#[derive(Debug, Clone, Serialize)]
pub struct SuccessBody {
    pub ok: bool,
    #[serde(flatten)]
    pub resolution: Resolution,
}

impl From<Resolution> for SuccessBody {
    fn from(resolution: Resolution) -> Self {
        Self {
            ok: true,
            resolution,
        }
    }
}

/// Diagnostic values attached to every error body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorDetail {
    pub condition: Value,
    pub index: Value,
    pub missing: Option<String>,
}

/// Error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub error_code: ErrorCode,
    pub message: String,
    pub detail: ErrorDetail,
}

impl ErrorBody {
    /// A body with no diagnostic values beyond `missing`.
    pub fn new(code: ErrorCode, message: impl Into<String>, missing: Option<String>) -> Self {
        Self {
            ok: false,
            error_code: code,
            message: message.into(),
            detail: ErrorDetail {
                missing,
                ..Default::default()
            },
        }
    }

    /// HTTP status this body is sent with.
    pub fn status(&self) -> u16 {
        self.error_code.http_status()
    }
}

impl From<&ResolveError> for ErrorBody {
    fn from(err: &ResolveError) -> Self {
        let code = err.code();
        let detail = match err {
            ResolveError::InvalidCondition { condition, index }
            | ResolveError::InvalidIndex { condition, index } => ErrorDetail {
                condition: condition.clone(),
                index: index.clone(),
                missing: None,
            },
            ResolveError::ProtocolNotFound { condition, index } => ErrorDetail {
                condition: Value::from(condition.as_str()),
                index: Value::from(*index),
                missing: Some(format!("{condition}/{index}")),
            },
            ResolveError::ConsentRequired => missing("consent"),
            ResolveError::NoFile => missing("file"),
            ResolveError::NoResponse => missing("content"),
            ResolveError::Unauthorized => missing("authorization"),
            other => missing(&other.to_string()),
        };
        let message = if code == ErrorCode::ServerError {
            SERVER_ERROR_MESSAGE.to_string()
        } else {
            err.to_string()
        };
        Self {
            ok: false,
            error_code: code,
            message,
            detail,
        }
    }
}

fn missing(what: &str) -> ErrorDetail {
    ErrorDetail {
        missing: Some(what.to_string()),
        ..Default::default()
    }
}

/// Status code and JSON body for a pipeline outcome.
pub fn assemble(outcome: Result<Resolution, ResolveError>) -> (u16, Value) {
    match outcome {
        Ok(resolution) => (200, to_json(&SuccessBody::from(resolution))),
        Err(err) => {
            let body = ErrorBody::from(&err);
            (body.status(), to_json(&body))
        }
    }
}

fn to_json<T: Serialize>(body: &T) -> Value {
    serde_json::to_value(body).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::NeuroradiantStep;
    use serde_json::json;

    fn resolution(neuroradiant: Option<Option<NeuroradiantPayload>>) -> Resolution {
        Resolution {
            condition: "DEPRESSION".into(),
            index: 4,
            protocol_id: "DEP-1".into(),
            phases: vec![Phase {
                name: "Treatment".into(),
                duration_seconds: 600,
                pulse_hz: 10.0,
                intensity_percent: 60,
            }],
            helmet_type: "light".into(),
            neuroradiant,
        }
    }

    #[test]
    fn success_body_omits_neuroradiant_for_baseline() {
        let (status, body) = assemble(Ok(resolution(None)));
        assert_eq!(status, 200);
        assert_eq!(body["ok"], json!(true));
        assert_eq!(body["protocol_id"], json!("DEP-1"));
        assert_eq!(body["index"], json!(4));
        assert_eq!(body["helmet_type"], json!("light"));
        assert_eq!(body["phases"][0]["name"], json!("Treatment"));
        assert!(body.get("neuroradiant").is_none());
    }

    #[test]
    fn success_body_keeps_null_neuroradiant() {
        let (_, body) = assemble(Ok(resolution(Some(None))));
        assert_eq!(body.get("neuroradiant"), Some(&Value::Null));
    }

    #[test]
    fn success_body_includes_neuroradiant_payload() {
        let payload = NeuroradiantPayload {
            protocol_id: "DEP-1".into(),
            cycles: 2,
            steps: vec![NeuroradiantStep {
                name: "Pulse".into(),
                duration_seconds: 300,
                pulse_hz: 10.0,
                intensity_percent: 60,
            }],
        };
        let (_, body) = assemble(Ok(resolution(Some(Some(payload)))));
        assert_eq!(body["neuroradiant"]["protocol_id"], json!("DEP-1"));
        assert_eq!(body["neuroradiant"]["cycles"], json!(2));
        assert_eq!(body["neuroradiant"]["steps"][0]["duration_seconds"], json!(300));
    }

    #[test]
    fn invalid_index_echoes_raw_values() {
        let err = ResolveError::InvalidIndex {
            condition: json!("Sleep"),
            index: json!(638),
        };
        let (status, body) = assemble(Err(err));
        assert_eq!(status, 400);
        assert_eq!(body["ok"], json!(false));
        assert_eq!(body["error_code"], json!("INVALID_INDEX"));
        assert_eq!(body["detail"]["condition"], json!("Sleep"));
        assert_eq!(body["detail"]["index"], json!(638));
        assert_eq!(body["detail"]["missing"], Value::Null);
    }

    #[test]
    fn protocol_not_found_names_missing_key() {
        let err = ResolveError::ProtocolNotFound {
            condition: "SLEEP".into(),
            index: 9,
        };
        let (status, body) = assemble(Err(err));
        assert_eq!(status, 400);
        assert_eq!(body["error_code"], json!("PROTOCOL_NOT_FOUND"));
        assert_eq!(body["detail"]["missing"], json!("SLEEP/9"));
        assert_eq!(body["detail"]["index"], json!(9));
    }

    #[test]
    fn server_error_puts_message_in_missing() {
        let err = ResolveError::ExtractionFailed {
            detail: "xref table corrupt".into(),
        };
        let (status, body) = assemble(Err(err));
        assert_eq!(status, 500);
        assert_eq!(body["error_code"], json!("SERVER_ERROR"));
        assert_eq!(body["message"], json!(SERVER_ERROR_MESSAGE));
        assert!(body["detail"]["missing"]
            .as_str()
            .unwrap()
            .contains("xref table corrupt"));
    }

    #[test]
    fn consent_error_shape() {
        let (status, body) = assemble(Err(ResolveError::ConsentRequired));
        assert_eq!(status, 400);
        assert_eq!(
            body,
            json!({
                "ok": false,
                "error_code": "CONSENT_REQUIRED",
                "message": ResolveError::ConsentRequired.to_string(),
                "detail": {"condition": null, "index": null, "missing": "consent"}
            })
        );
    }
}
