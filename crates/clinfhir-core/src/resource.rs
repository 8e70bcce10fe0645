use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kinds of output resources produced by the conversion factories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Patient,
    Organization,
    Encounter,
    Condition,
    Procedure,
    Medication,
    MedicationAdministration,
    Observation,
    Practitioner,
    Location,
    DiagnosticReport,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Patient => "Patient",
            Self::Organization => "Organization",
            Self::Encounter => "Encounter",
            Self::Condition => "Condition",
            Self::Procedure => "Procedure",
            Self::Medication => "Medication",
            Self::MedicationAdministration => "MedicationAdministration",
            Self::Observation => "Observation",
            Self::Practitioner => "Practitioner",
            Self::Location => "Location",
            Self::DiagnosticReport => "DiagnosticReport",
        };
        write!(f, "{name}")
    }
}

/// A `{system, value}` business identifier carried by a mapped resource.
///
/// Used as the match key for conditional creates and for in-admission
/// deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NaturalIdentifier {
    pub system: String,
    pub value: String,
}

impl NaturalIdentifier {
    pub fn new(system: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            value: value.into(),
        }
    }

    /// The `ifNoneExist` search clause the sink matches against.
    pub fn match_clause(&self) -> String {
        format!("identifier={}|{}", self.system, self.value)
    }
}

impl std::fmt::Display for NaturalIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}", self.system, self.value)
    }
}

impl std::str::FromStr for NaturalIdentifier {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('|') {
            Some((system, value)) if !system.is_empty() && !value.is_empty() => {
                Ok(Self::new(system, value))
            }
            _ => Err(crate::error::CoreError::invalid_identifier(s)),
        }
    }
}

/// One mapped unit of output.
///
/// The temporary identifier is generated exactly once and is what other
/// resources in the same bundle use to reference this one. The natural
/// identifier, when present, drives deduplication and conditional creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputResource {
    pub kind: ResourceKind,
    pub temp_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub natural_id: Option<NaturalIdentifier>,
    pub payload: Value,
}

impl OutputResource {
    pub fn new(kind: ResourceKind, payload: Value) -> Self {
        Self {
            kind,
            temp_id: format!("urn:uuid:{}", Uuid::new_v4()),
            natural_id: None,
            payload,
        }
    }

    pub fn with_natural_id(mut self, natural_id: NaturalIdentifier) -> Self {
        self.natural_id = Some(natural_id);
        self
    }
}
