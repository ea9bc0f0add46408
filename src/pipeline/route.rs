//! Routing a validated answer to a protocol, then to its dosing definition.

use crate::config::is_neuroradiant;
use crate::error::ResolveError;
use crate::pipeline::validate::ValidatedAnswer;
use crate::tables::{NeuroradiantStep, Phase, ProtocolTables};
use serde::Serialize;
use tracing::{debug, warn};

/// Alternate-hardware payload returned alongside the baseline phases.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeuroradiantPayload {
    pub protocol_id: String,
    pub cycles: u32,
    pub steps: Vec<NeuroradiantStep>,
}

/// Dosing definition for a resolved protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolDefinition {
    pub phases: Vec<Phase>,
    /// `None` when the baseline helmet was requested.
    /// `Some(None)` when the alternate helmet was requested but has no entry.
    pub neuroradiant: Option<Option<NeuroradiantPayload>>,
}

/// `router[condition][index]`.
///
/// A validated pair with no configured mapping is a data gap in the tables,
/// reported as [`ResolveError::ProtocolNotFound`].
pub fn route_protocol(
    tables: &ProtocolTables,
    answer: &ValidatedAnswer,
) -> Result<String, ResolveError> {
    let id = tables
        .protocol_id(&answer.condition, answer.index)
        .ok_or_else(|| ResolveError::ProtocolNotFound {
            condition: answer.condition.clone(),
            index: answer.index,
        })?;
    debug!(
        "Routed {} #{} → {}",
        answer.condition, answer.index, id
    );
    Ok(id.to_string())
}

/// Look up the phases (empty when undefined) and, for the alternate helmet,
/// the cycle/step payload.
pub fn load_definition(
    tables: &ProtocolTables,
    protocol_id: &str,
    helmet_type: &str,
) -> ProtocolDefinition {
    let phases = match tables.phases(protocol_id) {
        Some(p) => p.to_vec(),
        None => {
            warn!("Protocol {} has no phase definition", protocol_id);
            Vec::new()
        }
    };

    let neuroradiant = is_neuroradiant(helmet_type).then(|| {
        tables
            .neuroradiant(protocol_id)
            .map(|def| NeuroradiantPayload {
                protocol_id: protocol_id.to_string(),
                cycles: def.cycles,
                steps: def.steps.clone(),
            })
    });

    if let Some(None) = neuroradiant {
        warn!("Protocol {} has no neuroradiant definition", protocol_id);
    }

    ProtocolDefinition {
        phases,
        neuroradiant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::NeuroradiantProtocol;
    use std::collections::BTreeMap;

    fn answer(condition: &str, index: u8) -> ValidatedAnswer {
        ValidatedAnswer {
            condition: condition.into(),
            index,
            clinician_override: false,
        }
    }

    fn phase(name: &str) -> Phase {
        Phase {
            name: name.into(),
            duration_seconds: 60,
            pulse_hz: 10.0,
            intensity_percent: 50,
        }
    }

    fn sparse_tables() -> ProtocolTables {
        let mut router = BTreeMap::new();
        router.insert(
            "DEPRESSION".to_string(),
            BTreeMap::from([("4".to_string(), "P".to_string()), ("5".to_string(), "Q".to_string())]),
        );
        let definitions = BTreeMap::from([("P".to_string(), vec![phase("A"), phase("B"), phase("C")])]);
        let neuroradiant = BTreeMap::from([(
            "P".to_string(),
            NeuroradiantProtocol {
                cycles: 2,
                steps: vec![NeuroradiantStep {
                    name: "Pulse".into(),
                    duration_seconds: 300,
                    pulse_hz: 40.0,
                    intensity_percent: 80,
                }],
            },
        )]);
        ProtocolTables::new(router, definitions, neuroradiant).unwrap()
    }

    #[test]
    fn routes_configured_pair() {
        assert_eq!(route_protocol(&sparse_tables(), &answer("DEPRESSION", 4)).unwrap(), "P");
    }

    #[test]
    fn missing_index_key_is_protocol_not_found() {
        match route_protocol(&sparse_tables(), &answer("DEPRESSION", 6)) {
            Err(ResolveError::ProtocolNotFound { condition, index }) => {
                assert_eq!(condition, "DEPRESSION");
                assert_eq!(index, 6);
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn baseline_helmet_has_no_neuroradiant_field() {
        let def = load_definition(&sparse_tables(), "P", "light");
        let names: Vec<_> = def.phases.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
        assert!(def.neuroradiant.is_none());
    }

    #[test]
    fn neuroradiant_helmet_gets_payload() {
        let def = load_definition(&sparse_tables(), "P", "neuroradiant1070");
        let payload = def.neuroradiant.unwrap().unwrap();
        assert_eq!(payload.protocol_id, "P");
        assert_eq!(payload.cycles, 2);
        assert_eq!(payload.steps.len(), 1);
    }

    #[test]
    fn undefined_protocol_yields_empty_phases_and_null_payload() {
        let def = load_definition(&sparse_tables(), "Q", "neuroradiant1070");
        assert!(def.phases.is_empty());
        assert_eq!(def.neuroradiant, Some(None));
    }

    #[test]
    fn unrecognised_helmet_is_treated_as_baseline() {
        let def = load_definition(&sparse_tables(), "P", "infrared9000");
        assert!(def.neuroradiant.is_none());
    }
}
