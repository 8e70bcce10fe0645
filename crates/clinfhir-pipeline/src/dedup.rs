//! Admission-scoped deduplication of shared reference entities.

use std::collections::HashMap;

use clinfhir_core::NaturalIdentifier;

/// The three independently deduplicated entity classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupScope {
    Location,
    Caregiver,
    Medication,
}

/// Maps natural identifiers to already-emitted temporary identifiers.
///
/// Scoped to exactly one admission and cleared on every flush: a shared
/// identifier seen twice within the scope yields exactly one
/// conditional-create entry, and later references resolve to the first
/// entry's temporary identifier. Repeats in a different admission are not
/// deduplicated here; the sink still collapses them via conditional create.
#[derive(Debug, Default)]
pub struct DedupRegistry {
    locations: HashMap<String, String>,
    caregivers: HashMap<String, String>,
    medications: HashMap<String, String>,
}

impl DedupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, scope: DedupScope) -> &HashMap<String, String> {
        match scope {
            DedupScope::Location => &self.locations,
            DedupScope::Caregiver => &self.caregivers,
            DedupScope::Medication => &self.medications,
        }
    }

    fn map_mut(&mut self, scope: DedupScope) -> &mut HashMap<String, String> {
        match scope {
            DedupScope::Location => &mut self.locations,
            DedupScope::Caregiver => &mut self.caregivers,
            DedupScope::Medication => &mut self.medications,
        }
    }

    /// Temporary identifier already recorded for this natural identifier, if
    /// any.
    pub fn resolve(&self, scope: DedupScope, natural_id: &NaturalIdentifier) -> Option<&str> {
        self.map(scope).get(&natural_id.to_string()).map(String::as_str)
    }

    /// Records a newly emitted resource's temporary identifier.
    pub fn record(
        &mut self,
        scope: DedupScope,
        natural_id: &NaturalIdentifier,
        temp_id: impl Into<String>,
    ) {
        self.map_mut(scope)
            .insert(natural_id.to_string(), temp_id.into());
    }

    /// Clears all three scopes. Called on every flush.
    pub fn clear(&mut self) {
        self.locations.clear();
        self.caregivers.clear();
        self.medications.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty() && self.caregivers.is_empty() && self.medications.is_empty()
    }
}
