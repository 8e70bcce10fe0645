//! Size-bounded transaction bundles.
//!
//! A bundle is an ordered sequence of entries applied by the sink as one
//! atomic transaction. The assembler flushes a bundle when it reaches the
//! configured entry threshold or at the end of an admission, then resets it
//! for the next generation.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::resource::{NaturalIdentifier, OutputResource};

/// How the sink applies one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum AddMode {
    /// Unconditional create.
    Create,
    /// Create only if no stored resource matches the identifier clause,
    /// otherwise reuse the existing instance.
    ConditionalCreate { if_none_exist: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleEntry {
    pub resource: OutputResource,
    #[serde(flatten)]
    pub add_mode: AddMode,
}

impl BundleEntry {
    pub fn create(resource: OutputResource) -> Self {
        Self {
            resource,
            add_mode: AddMode::Create,
        }
    }

    pub fn conditional_create(resource: OutputResource, natural_id: &NaturalIdentifier) -> Self {
        Self {
            resource,
            add_mode: AddMode::ConditionalCreate {
                if_none_exist: natural_id.match_clause(),
            },
        }
    }
}

/// An ordered, size-bounded set of entries treated as one atomic transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    entries: Vec<BundleEntry>,
    resource_count: usize,
    generation: u32,
}

impl Bundle {
    /// Creates an empty bundle carrying the given generation number.
    pub fn new(generation: u32) -> Self {
        Self {
            entries: Vec::new(),
            resource_count: 0,
            generation,
        }
    }

    /// Appends an entry, keeping the resource counter in lockstep with the
    /// entry sequence.
    pub fn push(&mut self, entry: BundleEntry) {
        self.entries.push(entry);
        self.resource_count += 1;
    }

    pub fn entries(&self) -> &[BundleEntry] {
        &self.entries
    }

    /// Number of resources currently in the bundle. Always equal to
    /// `entries().len()`.
    pub fn resource_count(&self) -> usize {
        self.resource_count
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Serializes the bundle for the queue payload.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Human-readable serialization for console output.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;
    use serde_json::json;

    fn some_resource() -> OutputResource {
        OutputResource::new(ResourceKind::Observation, json!({"value": 1}))
    }

    #[test]
    fn test_counter_matches_entries() {
        let mut bundle = Bundle::new(1);
        assert_eq!(bundle.resource_count(), 0);
        for _ in 0..5 {
            bundle.push(BundleEntry::create(some_resource()));
        }
        assert_eq!(bundle.resource_count(), bundle.entries().len());
        assert_eq!(bundle.resource_count(), 5);
    }

    #[test]
    fn test_conditional_entry_carries_match_clause() {
        let id = NaturalIdentifier::new("http://example.org/pat", "p-9");
        let resource =
            OutputResource::new(ResourceKind::Patient, json!({})).with_natural_id(id.clone());
        let entry = BundleEntry::conditional_create(resource, &id);
        assert_eq!(
            entry.add_mode,
            AddMode::ConditionalCreate {
                if_none_exist: "identifier=http://example.org/pat|p-9".into()
            }
        );
    }

    #[test]
    fn test_serialized_entry_shape() {
        use assert_json_diff::assert_json_include;

        let id = NaturalIdentifier::new("sys", "val");
        let entry = BundleEntry::conditional_create(
            OutputResource::new(ResourceKind::Patient, json!({"gender": "f"}))
                .with_natural_id(id.clone()),
            &id,
        );
        assert_json_include!(
            actual: serde_json::to_value(&entry).unwrap(),
            expected: json!({
                "mode": "conditional-create",
                "if_none_exist": "identifier=sys|val",
                "resource": { "payload": { "gender": "f" } },
            })
        );
    }

    #[test]
    fn test_bundle_roundtrip() {
        let mut bundle = Bundle::new(3);
        let id = NaturalIdentifier::new("sys", "val");
        bundle.push(BundleEntry::conditional_create(
            OutputResource::new(ResourceKind::Patient, json!({"gender": "f"}))
                .with_natural_id(id.clone()),
            &id,
        ));
        bundle.push(BundleEntry::create(some_resource()));

        let text = bundle.to_json().unwrap();
        let back = Bundle::from_json(&text).unwrap();
        assert_eq!(bundle, back);
        assert_eq!(back.generation(), 3);
        assert_eq!(back.resource_count(), 2);
    }
}
