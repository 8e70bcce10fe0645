pub mod bundle;
pub mod error;
pub mod label;
pub mod queue;
pub mod record;
pub mod resource;

pub use bundle::{AddMode, Bundle, BundleEntry};
pub use error::{CoreError, Result};
pub use label::SequenceLabel;
pub use queue::{END_PAYLOAD, QueueMessage};
pub use record::{
    Administration, Admission, Caregiver, ChartObservation, ClinicalRecord, Diagnosis,
    ImagingReport, LabObservation, Medication, NoteEvent, ProcedureEvent, Transfer,
};
pub use resource::{NaturalIdentifier, OutputResource, ResourceKind};
