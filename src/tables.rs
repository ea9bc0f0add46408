//! Static protocol tables: router, phase definitions, alternate hardware.
//!
//! The three tables are loaded once at process start and then shared
//! read-only (behind an `Arc`) by every request. Nothing in the crate holds a
//! mutable reference to them after [`ProtocolTables::load`] returns.
//!
//! ## File format
//!
//! ```text
//! router.json        { "DEPRESSION": { "4": "DEP-1", … }, … }
//! protocols.json     { "DEP-1": [ { name, duration_seconds, pulse_hz, intensity_percent }, … ] }
//! neuroradiant.json  { "DEP-1": { "cycles": 2, "steps": [ … ] } }
//! ```
//!
//! Copies of all three ship inside the binary; a directory passed through
//! [`crate::config::ResolverConfig::tables_dir`] replaces them wholesale.

use crate::error::ResolveError;
use crate::prompts::{CONDITIONS, MAX_INDEX, MIN_INDEX};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

const PACKAGED_ROUTER: &str = include_str!("../data/router.json");
const PACKAGED_PROTOCOLS: &str = include_str!("../data/protocols.json");
const PACKAGED_NEURORADIANT: &str = include_str!("../data/neuroradiant.json");

/// condition → (stringified index → protocol id)
pub type RouterTable = BTreeMap<String, BTreeMap<String, String>>;

/// One step of a baseline protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    pub duration_seconds: u32,
    pub pulse_hz: f32,
    pub intensity_percent: u8,
}

/// One step of a cycle on the alternate helmet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuroradiantStep {
    pub name: String,
    pub duration_seconds: u32,
    pub pulse_hz: f32,
    pub intensity_percent: u8,
}

/// Alternate-hardware definition: `steps` repeated `cycles` times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuroradiantProtocol {
    pub cycles: u32,
    pub steps: Vec<NeuroradiantStep>,
}

/// The three read-only lookup tables.
#[derive(Debug, Clone)]
pub struct ProtocolTables {
    router: RouterTable,
    definitions: BTreeMap<String, Vec<Phase>>,
    neuroradiant: BTreeMap<String, NeuroradiantProtocol>,
}

impl ProtocolTables {
    /// Load from `dir` when given, otherwise use the packaged tables.
    pub fn load(dir: Option<&Path>) -> Result<Self, ResolveError> {
        match dir {
            Some(d) => Self::from_dir(d),
            None => Self::packaged(),
        }
    }

    /// The tables compiled into the crate.
    pub fn packaged() -> Result<Self, ResolveError> {
        Self::from_json(PACKAGED_ROUTER, PACKAGED_PROTOCOLS, PACKAGED_NEURORADIANT)
    }

    /// Read `router.json`, `protocols.json` and `neuroradiant.json` from `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, ResolveError> {
        info!("Loading protocol tables from {}", dir.display());
        let read = |name: &str| -> Result<String, ResolveError> {
            std::fs::read_to_string(dir.join(name)).map_err(|e| ResolveError::TableLoad {
                table: name.to_string(),
                detail: e.to_string(),
            })
        };
        Self::from_json(
            &read("router.json")?,
            &read("protocols.json")?,
            &read("neuroradiant.json")?,
        )
    }

    /// Parse and validate the three tables from JSON text.
    pub fn from_json(
        router: &str,
        protocols: &str,
        neuroradiant: &str,
    ) -> Result<Self, ResolveError> {
        let tables = Self {
            router: parse_table("router.json", router)?,
            definitions: parse_table("protocols.json", protocols)?,
            neuroradiant: parse_table("neuroradiant.json", neuroradiant)?,
        };
        tables.check()?;
        debug!(
            "Protocol tables loaded: {} conditions, {} definitions, {} neuroradiant definitions",
            tables.router.len(),
            tables.definitions.len(),
            tables.neuroradiant.len()
        );
        Ok(tables)
    }

    /// Assemble tables directly, validating them the same way as on load.
    pub fn new(
        router: RouterTable,
        definitions: BTreeMap<String, Vec<Phase>>,
        neuroradiant: BTreeMap<String, NeuroradiantProtocol>,
    ) -> Result<Self, ResolveError> {
        let tables = Self {
            router,
            definitions,
            neuroradiant,
        };
        tables.check()?;
        Ok(tables)
    }

    pub fn router(&self) -> &RouterTable {
        &self.router
    }

    /// `true` when `condition` is a router key.
    pub fn has_condition(&self, condition: &str) -> bool {
        self.router.contains_key(condition)
    }

    /// `router[condition][index]`, if configured.
    pub fn protocol_id(&self, condition: &str, index: u8) -> Option<&str> {
        self.router
            .get(condition)
            .and_then(|by_index| by_index.get(&index.to_string()))
            .map(String::as_str)
    }

    /// Baseline phases for a protocol id, if defined.
    pub fn phases(&self, protocol_id: &str) -> Option<&[Phase]> {
        self.definitions.get(protocol_id).map(Vec::as_slice)
    }

    /// Alternate-hardware definition for a protocol id, if defined.
    pub fn neuroradiant(&self, protocol_id: &str) -> Option<&NeuroradiantProtocol> {
        self.neuroradiant.get(protocol_id)
    }

    /// Router keys must come from the clinical vocabulary and index keys must
    /// be integers in range; anything else could never be reached by a
    /// validated request. Dangling protocol ids are tolerated (they resolve to
    /// an empty phase list) but logged.
    fn check(&self) -> Result<(), ResolveError> {
        for (condition, by_index) in &self.router {
            if !CONDITIONS.contains(&condition.as_str()) {
                return Err(ResolveError::TableLoad {
                    table: "router.json".into(),
                    detail: format!("unknown condition '{condition}'"),
                });
            }
            for (index, protocol_id) in by_index {
                let in_range = index
                    .parse::<i64>()
                    .map(|i| (MIN_INDEX..=MAX_INDEX).contains(&i) && i.to_string() == *index)
                    .unwrap_or(false);
                if !in_range {
                    return Err(ResolveError::TableLoad {
                        table: "router.json".into(),
                        detail: format!("index key '{index}' under '{condition}' is not 1–24"),
                    });
                }
                if !self.definitions.contains_key(protocol_id) {
                    warn!(
                        "Router maps {} #{} to '{}' which has no phase definition",
                        condition, index, protocol_id
                    );
                }
            }
        }
        Ok(())
    }
}

fn parse_table<T: serde::de::DeserializeOwned>(table: &str, json: &str) -> Result<T, ResolveError> {
    serde_json::from_str(json).map_err(|e| ResolveError::TableLoad {
        table: table.to_string(),
        detail: e.to_string(),
    })
}
