//! Validation of the model's answer against the closed vocabulary and range.
//!
//! Order is fixed: JSON parse, then condition, then index. Both validation
//! errors echo the model's raw `condition` and `index` values (whatever JSON
//! they were, `null` when absent) so a failing brain map can be diagnosed from
//! the response alone.

use crate::error::ResolveError;
use crate::prompts::{MAX_INDEX, MIN_INDEX};
use crate::tables::ProtocolTables;
use serde_json::Value;
use tracing::debug;

/// A condition/index pair that is safe to route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAnswer {
    /// Uppercase router key.
    pub condition: String,
    /// Integer in [`MIN_INDEX`, `MAX_INDEX`].
    pub index: u8,
    /// `true` when the clinician's selection overrode the model.
    pub clinician_override: bool,
}

/// Trim and uppercase a condition string.
pub fn normalise_condition(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Validate the model's raw answer.
///
/// `clinician_condition`, when present and non-blank, replaces whatever
/// condition the model produced.
pub fn validate_answer(
    raw_answer: &str,
    clinician_condition: Option<&str>,
    tables: &ProtocolTables,
) -> Result<ValidatedAnswer, ResolveError> {
    let parsed: Value =
        serde_json::from_str(raw_answer).map_err(|e| ResolveError::MalformedResponse {
            detail: e.to_string(),
            raw: raw_answer.to_string(),
        })?;

    let raw_condition = parsed.get("condition").cloned().unwrap_or(Value::Null);
    let raw_index = parsed.get("index").cloned().unwrap_or(Value::Null);

    let clinician = clinician_condition
        .map(normalise_condition)
        .filter(|c| !c.is_empty());
    let clinician_override = clinician.is_some();
    let condition = clinician
        .or_else(|| raw_condition.as_str().map(normalise_condition))
        .unwrap_or_default();

    if condition.is_empty() || !tables.has_condition(&condition) {
        return Err(ResolveError::InvalidCondition {
            condition: raw_condition,
            index: raw_index,
        });
    }

    let index = match parse_index(&raw_index) {
        Some(i) if (MIN_INDEX..=MAX_INDEX).contains(&i) => i as u8,
        _ => {
            return Err(ResolveError::InvalidIndex {
                condition: raw_condition,
                index: raw_index,
            })
        }
    };

    if clinician_override {
        debug!(
            "Using clinician condition {} (model said {})",
            condition, raw_condition
        );
    }

    Ok(ValidatedAnswer {
        condition,
        index,
        clinician_override,
    })
}

/// Integer value of a JSON index: an integer, an integral float, or a string
/// holding an integer.
fn parse_index(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
