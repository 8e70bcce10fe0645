//! Deterministic in-process record source for demo runs and tests.
//!
//! Every record is derived purely from the configured seed and the patient
//! key, so repeated runs with the same parameters produce identical input.

use std::hash::{DefaultHasher, Hash, Hasher};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};

use clinfhir_core::{
    Administration, Admission, Caregiver, ChartObservation, ClinicalRecord, Diagnosis,
    ImagingReport, LabObservation, Medication, NoteEvent, ProcedureEvent, Transfer,
};
use clinfhir_pipeline::{PipelineError, RecordSource, Result};

const DIAGNOSIS_CODES: &[&str] = &["4019", "4280", "25000", "5849", "51881"];
const PROCEDURE_CODES: &[&str] = &["9671", "3893", "966", "3995"];
const DRUG_CODES: &[(&str, &str)] = &[
    ("rx-1658", "heparin"),
    ("rx-2321", "insulin"),
    ("rx-5513", "furosemide"),
    ("rx-8504", "metoprolol"),
];
const CHART_CODES: &[(&str, &str, &str)] = &[
    ("220045", "heart rate", "bpm"),
    ("220179", "systolic blood pressure", "mmHg"),
    ("223761", "temperature", "degF"),
    ("220210", "respiratory rate", "insp/min"),
];
const LAB_CODES: &[(&str, &str, &str)] = &[
    ("50912", "creatinine", "mg/dL"),
    ("50931", "glucose", "mg/dL"),
    ("51221", "hematocrit", "%"),
];
const CARE_UNITS: &[&str] = &["MICU", "SICU", "CCU", "TSICU"];
const NOTE_CATEGORIES: &[(&str, &str)] = &[
    ("Nursing", "Nursing progress note"),
    ("Physician", "Physician progress note"),
    ("Discharge summary", "Discharge summary"),
];
const CAREGIVER_ROLES: &[&str] = &["RN", "MD", "PA"];

/// Generates plausible hierarchical records from a seed.
pub struct SyntheticSource {
    seed: u64,
    key_space: usize,
}

impl SyntheticSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            key_space: 10_000,
        }
    }

    fn rng_for(&self, key: &str) -> fastrand::Rng {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        fastrand::Rng::with_seed(self.seed ^ hasher.finish())
    }

    fn timestamp(rng: &mut fastrand::Rng) -> Option<OffsetDateTime> {
        let base = OffsetDateTime::from_unix_timestamp(1_500_000_000).ok()?;
        Some(base + Duration::hours(rng.i64(0..24 * 365 * 5)))
    }

    fn admission(rng: &mut fastrand::Rng, key: &str, index: usize) -> Admission {
        let admit_time = Self::timestamp(rng);
        let discharge_time = admit_time.map(|t| t + Duration::hours(rng.i64(12..24 * 14)));
        Admission {
            admission_key: format!("{key}-adm-{index}"),
            admission_type: if rng.bool() { "EMERGENCY" } else { "ELECTIVE" }.to_string(),
            admit_time,
            discharge_time,
            diagnoses: (0..rng.usize(1..=3))
                .map(|i| Diagnosis {
                    code: DIAGNOSIS_CODES[rng.usize(..DIAGNOSIS_CODES.len())].to_string(),
                    display: None,
                    rank: i as u32 + 1,
                })
                .collect(),
            procedures: (0..rng.usize(0..=2))
                .map(|i| ProcedureEvent {
                    code: PROCEDURE_CODES[rng.usize(..PROCEDURE_CODES.len())].to_string(),
                    display: None,
                    rank: i as u32 + 1,
                })
                .collect(),
            medications: (0..rng.usize(0..=2))
                .map(|_| {
                    let (code, name) = DRUG_CODES[rng.usize(..DRUG_CODES.len())];
                    Medication {
                        code: code.to_string(),
                        name: name.to_string(),
                        administrations: (0..rng.usize(0..=3))
                            .map(|_| Administration {
                                dose: rng.u32(1..500) as f64,
                                unit: "mg".to_string(),
                                time: Self::timestamp(rng),
                            })
                            .collect(),
                    }
                })
                .collect(),
            chart_observations: (0..rng.usize(5..=20))
                .map(|_| {
                    let (code, label, unit) = CHART_CODES[rng.usize(..CHART_CODES.len())];
                    ChartObservation {
                        code: code.to_string(),
                        label: label.to_string(),
                        value: rng.u32(40..200).to_string(),
                        unit: Some(unit.to_string()),
                        time: Self::timestamp(rng),
                    }
                })
                .collect(),
            lab_observations: (0..rng.usize(5..=20))
                .map(|_| {
                    let (code, label, unit) = LAB_CODES[rng.usize(..LAB_CODES.len())];
                    LabObservation {
                        code: code.to_string(),
                        label: label.to_string(),
                        value: rng.u32(1..300).to_string(),
                        unit: Some(unit.to_string()),
                        abnormal: rng.u8(..10) == 0,
                        time: Self::timestamp(rng),
                    }
                })
                .collect(),
            notes: (0..rng.usize(0..=3))
                .map(|_| {
                    let (category, description) = NOTE_CATEGORIES[rng.usize(..NOTE_CATEGORIES.len())];
                    // A small per-hospital caregiver pool, so authors repeat
                    // within an admission and exercise deduplication.
                    let author = if rng.u8(..4) > 0 {
                        let n = rng.usize(..8);
                        Some(Caregiver {
                            key: format!("cg-{n}"),
                            role: CAREGIVER_ROLES[n % CAREGIVER_ROLES.len()].to_string(),
                        })
                    } else {
                        None
                    };
                    NoteEvent {
                        category: category.to_string(),
                        description: description.to_string(),
                        text: "patient assessed, plan unchanged".to_string(),
                        author,
                        time: Self::timestamp(rng),
                    }
                })
                .collect(),
            transfers: (0..rng.usize(0..=3))
                .map(|_| {
                    let in_time = Self::timestamp(rng);
                    Transfer {
                        care_unit: CARE_UNITS[rng.usize(..CARE_UNITS.len())].to_string(),
                        in_time,
                        out_time: in_time.map(|t| t + Duration::hours(rng.i64(1..96))),
                    }
                })
                .collect(),
        }
    }
}

#[async_trait]
impl RecordSource for SyntheticSource {
    async fn fetch(&self, key: &str) -> Result<ClinicalRecord> {
        let mut rng = self.rng_for(key);
        let admissions = (1..=rng.usize(1..=3))
            .map(|i| Self::admission(&mut rng, key, i))
            .collect();
        let imaging_reports = (0..rng.usize(0..=2))
            .map(|i| ImagingReport {
                study_key: format!("{key}-study-{i}"),
                modality: if rng.bool() { "CR" } else { "CT" }.to_string(),
                conclusion: "no acute findings".to_string(),
            })
            .collect();
        Ok(ClinicalRecord {
            patient_key: key.to_string(),
            gender: if rng.bool() { "female" } else { "male" }.to_string(),
            birth_date: Self::timestamp(&mut rng).map(|t| t - Duration::days(365 * 60)),
            death_date: None,
            admissions,
            imaging_reports,
        })
    }

    async fn list_candidate_keys(&self, n: usize, random: bool) -> Result<Vec<String>> {
        if n > self.key_space {
            return Err(PipelineError::fetch(
                "*",
                format!("requested {n} patients, key space holds {}", self.key_space),
            ));
        }
        let mut indices: Vec<usize> = (0..self.key_space).collect();
        if random {
            let mut rng = fastrand::Rng::with_seed(self.seed);
            rng.shuffle(&mut indices);
        }
        Ok(indices
            .into_iter()
            .take(n)
            .map(|i| format!("{}", 10_000_000 + i))
            .collect())
    }
}
