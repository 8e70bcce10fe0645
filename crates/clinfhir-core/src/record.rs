//! The hierarchical per-patient clinical record consumed by the pipeline.
//!
//! A record is fetched once from the record source, handed to exactly one
//! conversion worker, and discarded afterwards. Entity lists keep source
//! order; the worker relies on it when streaming entities into bundles.

use time::OffsetDateTime;

/// One patient's full clinical history.
#[derive(Debug, Clone, Default)]
pub struct ClinicalRecord {
    pub patient_key: String,
    pub gender: String,
    pub birth_date: Option<OffsetDateTime>,
    pub death_date: Option<OffsetDateTime>,
    pub admissions: Vec<Admission>,
    /// Pre-admission imaging reports, emitted as a patient-level bundle
    /// before any admission fragment when imaging output is enabled.
    pub imaging_reports: Vec<ImagingReport>,
}

/// One hospital admission with its ordered entity lists.
#[derive(Debug, Clone, Default)]
pub struct Admission {
    pub admission_key: String,
    pub admission_type: String,
    pub admit_time: Option<OffsetDateTime>,
    pub discharge_time: Option<OffsetDateTime>,
    pub diagnoses: Vec<Diagnosis>,
    pub procedures: Vec<ProcedureEvent>,
    pub medications: Vec<Medication>,
    pub chart_observations: Vec<ChartObservation>,
    pub lab_observations: Vec<LabObservation>,
    pub notes: Vec<NoteEvent>,
    pub transfers: Vec<Transfer>,
}

#[derive(Debug, Clone)]
pub struct Diagnosis {
    pub code: String,
    pub display: Option<String>,
    /// Rank of this diagnosis within the admission, 1-based.
    pub rank: u32,
}

#[derive(Debug, Clone)]
pub struct ProcedureEvent {
    pub code: String,
    pub display: Option<String>,
    pub rank: u32,
}

#[derive(Debug, Clone)]
pub struct Medication {
    /// Drug code; also the medication's dedup key within an admission.
    pub code: String,
    pub name: String,
    pub administrations: Vec<Administration>,
}

#[derive(Debug, Clone)]
pub struct Administration {
    pub dose: f64,
    pub unit: String,
    pub time: Option<OffsetDateTime>,
}

/// Bedside (chart) measurement.
#[derive(Debug, Clone)]
pub struct ChartObservation {
    pub code: String,
    pub label: String,
    pub value: String,
    pub unit: Option<String>,
    pub time: Option<OffsetDateTime>,
}

/// Laboratory result.
#[derive(Debug, Clone)]
pub struct LabObservation {
    pub code: String,
    pub label: String,
    pub value: String,
    pub unit: Option<String>,
    pub abnormal: bool,
    pub time: Option<OffsetDateTime>,
}

/// A free-text clinical note recorded during an admission.
#[derive(Debug, Clone)]
pub struct NoteEvent {
    pub category: String,
    pub description: String,
    pub text: String,
    /// The caregiver who authored the note, when known.
    pub author: Option<Caregiver>,
    pub time: Option<OffsetDateTime>,
}

/// A note author.
#[derive(Debug, Clone)]
pub struct Caregiver {
    /// Stable caregiver key; also the dedup key within an admission.
    pub key: String,
    pub role: String,
}

/// A ward-to-ward transfer within an admission.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub care_unit: String,
    pub in_time: Option<OffsetDateTime>,
    pub out_time: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct ImagingReport {
    pub study_key: String,
    pub modality: String,
    pub conclusion: String,
}

impl ClinicalRecord {
    /// Total number of mappable entities across all admissions.
    pub fn entity_count(&self) -> usize {
        self.admissions
            .iter()
            .map(|a| {
                a.diagnoses.len()
                    + a.procedures.len()
                    + a.medications
                        .iter()
                        .map(|m| 1 + m.administrations.len())
                        .sum::<usize>()
                    + a.chart_observations.len()
                    + a.lab_observations.len()
                    + a.notes.len()
                    + a.transfers.len()
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_count() {
        let record = ClinicalRecord {
            patient_key: "p1".into(),
            admissions: vec![Admission {
                admission_key: "a1".into(),
                diagnoses: vec![Diagnosis {
                    code: "4019".into(),
                    display: None,
                    rank: 1,
                }],
                medications: vec![Medication {
                    code: "rx-1".into(),
                    name: "aspirin".into(),
                    administrations: vec![Administration {
                        dose: 100.0,
                        unit: "mg".into(),
                        time: None,
                    }],
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(record.entity_count(), 3);
    }
}
