//! Accumulates output resources into size-bounded, deduplicated,
//! self-contained bundles.
//!
//! One assembler is exclusively owned by one worker for one patient and is
//! never shared between threads. It flushes the current bundle to the queue
//! publisher when the entry threshold is reached or an admission ends, and
//! after a threshold flush replays the admission's identity resources into
//! the fresh bundle so every fragment can be applied on its own: the replayed
//! copies carry the same natural identifiers as fragment one, and the sink's
//! conditional-create semantics collapse them to a single stored instance.

use clinfhir_core::{Bundle, BundleEntry, OutputResource, SequenceLabel};

use crate::dedup::{DedupRegistry, DedupScope};
use crate::error::{PipelineError, Result};
use crate::queue::BundlePublisher;

/// The identity resources of one admission, built once by the worker and
/// replayed into every fragment after a threshold flush.
///
/// Medications are deliberately absent: they appear only in an admission's
/// first fragment, before any observation entries.
#[derive(Debug, Clone)]
pub struct BasicResources {
    pub patient: OutputResource,
    pub organization: OutputResource,
    /// Admission encounter, already carrying its diagnosis/procedure links.
    pub encounter: OutputResource,
    pub conditions: Vec<OutputResource>,
    pub procedures: Vec<OutputResource>,
    pub transfers: Vec<TransferPair>,
}

/// A ward location plus the transfer sub-encounter that references it.
#[derive(Debug, Clone)]
pub struct TransferPair {
    pub location: OutputResource,
    pub encounter: OutputResource,
}

/// Per-patient bundle assembler.
pub struct BundleAssembler {
    publisher: BundlePublisher,
    bundle: Bundle,
    registry: DedupRegistry,
    threshold: usize,
    patient_index: usize,
    admission_index: usize,
    flushes: u32,
}

impl BundleAssembler {
    pub fn new(publisher: BundlePublisher, threshold: usize, patient_index: usize) -> Self {
        Self {
            publisher,
            bundle: Bundle::new(1),
            registry: DedupRegistry::new(),
            threshold,
            patient_index,
            admission_index: 0,
            flushes: 0,
        }
    }

    /// Sets the admission segment used in subsequent sequence labels.
    /// Index `0` marks patient-level, pre-admission bundles.
    pub fn begin_admission(&mut self, admission_index: usize) {
        self.admission_index = admission_index;
    }

    /// Number of resources in the current, unflushed bundle.
    pub fn resource_count(&self) -> usize {
        self.bundle.resource_count()
    }

    pub fn generation(&self) -> u32 {
        self.bundle.generation()
    }

    /// Fragments flushed so far for this patient.
    pub fn flush_count(&self) -> u32 {
        self.flushes
    }

    /// Appends an unconditional-create entry.
    pub fn add(&mut self, resource: OutputResource) {
        self.bundle.push(BundleEntry::create(resource));
    }

    /// Appends a conditional-create entry keyed by the resource's natural
    /// identifier.
    pub fn add_conditional(&mut self, resource: OutputResource) -> Result<()> {
        let natural_id = resource.natural_id.clone().ok_or_else(|| {
            PipelineError::mapping(resource.kind.to_string(), "missing natural identifier")
        })?;
        self.bundle
            .push(BundleEntry::conditional_create(resource, &natural_id));
        Ok(())
    }

    /// Appends a conditional-create entry unless the same natural identifier
    /// was already emitted within this admission's registry scope. Returns
    /// the temporary identifier other resources should reference: the new
    /// entry's on first sight, the first entry's on repeats.
    pub fn add_deduped(&mut self, scope: DedupScope, resource: OutputResource) -> Result<String> {
        let natural_id = resource.natural_id.clone().ok_or_else(|| {
            PipelineError::mapping(resource.kind.to_string(), "missing natural identifier")
        })?;
        if let Some(existing) = self.registry.resolve(scope, &natural_id) {
            return Ok(existing.to_string());
        }
        let temp_id = resource.temp_id.clone();
        self.registry.record(scope, &natural_id, temp_id.clone());
        self.bundle
            .push(BundleEntry::conditional_create(resource, &natural_id));
        Ok(temp_id)
    }

    /// Flushes and reseeds the bundle with identity resources once the entry
    /// threshold is reached. Called before every observation-class add; the
    /// boundary is deliberate: a bundle never grows past the threshold.
    pub async fn check_limit(&mut self, basic: &BasicResources) -> Result<()> {
        self.check_limit_for(basic, 1).await
    }

    /// Like [`check_limit`], but for a group of `incoming` entries that must
    /// land in the same fragment (a note and its newly deduplicated author).
    ///
    /// [`check_limit`]: Self::check_limit
    pub async fn check_limit_for(&mut self, basic: &BasicResources, incoming: usize) -> Result<()> {
        if self.bundle.resource_count() + incoming > self.threshold {
            self.flush().await?;
            self.replay_basic(basic)?;
        }
        Ok(())
    }

    /// Serializes and publishes the current bundle under
    /// `{patient}_{admission}_{generation}`, then resets bundle state: empty
    /// entries, counter zero, generation incremented, dedup registry cleared.
    pub async fn flush(&mut self) -> Result<()> {
        let label = SequenceLabel::fragment(
            self.patient_index,
            self.admission_index,
            self.bundle.generation(),
        );
        self.publisher.publish(label, &self.bundle).await?;
        self.flushes += 1;
        self.bundle = Bundle::new(self.bundle.generation() + 1);
        self.registry.clear();
        Ok(())
    }

    /// Forces a flush at the end of an admission, guaranteeing at least one
    /// fragment per admission.
    pub async fn end_admission(&mut self) -> Result<()> {
        self.flush().await
    }

    /// Resets the generation number. Bookkeeping only; the assembler is
    /// discarded after the patient's run.
    pub fn end_patient(&mut self) {
        self.bundle = Bundle::new(1);
        self.registry.clear();
    }

    /// (Re)populates the current bundle with an admission's identity
    /// resources, all via conditional create. Transfer locations are
    /// admission-scope deduplicated; a transfer sub-encounter is emitted only
    /// together with its first-seen location, mirroring fragment one.
    pub fn replay_basic(&mut self, basic: &BasicResources) -> Result<()> {
        self.add_conditional(basic.patient.clone())?;
        self.add_conditional(basic.organization.clone())?;
        for condition in &basic.conditions {
            self.add_conditional(condition.clone())?;
        }
        for procedure in &basic.procedures {
            self.add_conditional(procedure.clone())?;
        }
        for transfer in &basic.transfers {
            let natural_id = transfer.location.natural_id.clone().ok_or_else(|| {
                PipelineError::mapping("Location", "missing natural identifier")
            })?;
            if self
                .registry
                .resolve(DedupScope::Location, &natural_id)
                .is_none()
            {
                self.registry.record(
                    DedupScope::Location,
                    &natural_id,
                    transfer.location.temp_id.clone(),
                );
                self.add_conditional(transfer.location.clone())?;
                self.add_conditional(transfer.encounter.clone())?;
            }
        }
        self.add_conditional(basic.encounter.clone())?;
        Ok(())
    }
}
