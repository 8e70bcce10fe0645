//! Resource factories: one pure mapping function per clinical entity kind.
//!
//! Each factory turns one domain entity plus the conversion context into one
//! [`OutputResource`] with a freshly generated temporary identifier and, for
//! entities the sink deduplicates, a natural identifier. Payloads are
//! deterministic for identical input; only the temporary identifier differs
//! between calls. The mapping rules here are intentionally thin; field-level
//! crosswalk logic stays behind the terminology lookup.

use std::sync::Arc;

use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use clinfhir_core::{
    Administration, Admission, Caregiver, ChartObservation, ClinicalRecord, Diagnosis,
    ImagingReport, LabObservation, Medication, NaturalIdentifier, NoteEvent, OutputResource,
    ProcedureEvent, ResourceKind, Transfer,
};

use crate::config::ConversionConfig;
use crate::error::{PipelineError, Result};
use crate::terminology::CodeLookup;

/// Shared per-run context handed to every factory call.
///
/// Built once at pipeline start; the terminology cache is shared across
/// workers by reference, never through global state.
pub struct ConversionContext {
    pub config: ConversionConfig,
    pub terminology: Arc<dyn CodeLookup>,
}

impl ConversionContext {
    pub fn new(config: ConversionConfig, terminology: Arc<dyn CodeLookup>) -> Self {
        Self {
            config,
            terminology,
        }
    }
}

fn fmt_time(time: Option<&OffsetDateTime>, kind: ResourceKind) -> Result<Value> {
    match time {
        Some(t) => {
            let text = t
                .format(&Rfc3339)
                .map_err(|e| PipelineError::mapping(kind.to_string(), e.to_string()))?;
            Ok(Value::String(text))
        }
        None => Ok(Value::Null),
    }
}

fn reference(temp_id: &str) -> Value {
    json!({ "reference": temp_id })
}

pub fn patient_resource(
    record: &ClinicalRecord,
    ctx: &ConversionContext,
) -> Result<OutputResource> {
    let natural_id = NaturalIdentifier::new(
        ctx.config.system_for("patient"),
        record.patient_key.clone(),
    );
    let payload = json!({
        "resourceType": "Patient",
        "identifier": [{ "system": natural_id.system, "value": natural_id.value }],
        "gender": record.gender,
        "birthDate": fmt_time(record.birth_date.as_ref(), ResourceKind::Patient)?,
        "deceasedDateTime": fmt_time(record.death_date.as_ref(), ResourceKind::Patient)?,
    });
    Ok(OutputResource::new(ResourceKind::Patient, payload).with_natural_id(natural_id))
}

/// The top-level organization every encounter and caregiver hangs off.
pub fn organization_resource(ctx: &ConversionContext) -> OutputResource {
    let natural_id = NaturalIdentifier::new(ctx.config.system_for("organization"), "hospital");
    let payload = json!({
        "resourceType": "Organization",
        "identifier": [{ "system": natural_id.system, "value": natural_id.value }],
        "type": "prov",
        "name": "Hospital",
    });
    OutputResource::new(ResourceKind::Organization, payload).with_natural_id(natural_id)
}

pub fn condition_resource(
    diagnosis: &Diagnosis,
    admission: &Admission,
    patient: &OutputResource,
    ctx: &ConversionContext,
) -> Result<OutputResource> {
    let natural_id = NaturalIdentifier::new(
        ctx.config.system_for("condition"),
        format!("{}-{}", admission.admission_key, diagnosis.code),
    );
    let display = diagnosis
        .display
        .clone()
        .or_else(|| ctx.terminology.resolve(&diagnosis.code));
    let payload = json!({
        "resourceType": "Condition",
        "identifier": [{ "system": natural_id.system, "value": natural_id.value }],
        "code": { "code": diagnosis.code, "display": display },
        "subject": reference(&patient.temp_id),
    });
    Ok(OutputResource::new(ResourceKind::Condition, payload).with_natural_id(natural_id))
}

pub fn procedure_resource(
    procedure: &ProcedureEvent,
    admission: &Admission,
    patient: &OutputResource,
    ctx: &ConversionContext,
) -> Result<OutputResource> {
    let natural_id = NaturalIdentifier::new(
        ctx.config.system_for("procedure"),
        format!("{}-{}", admission.admission_key, procedure.code),
    );
    let display = procedure
        .display
        .clone()
        .or_else(|| ctx.terminology.resolve(&procedure.code));
    let payload = json!({
        "resourceType": "Procedure",
        "identifier": [{ "system": natural_id.system, "value": natural_id.value }],
        "code": { "code": procedure.code, "display": display },
        "subject": reference(&patient.temp_id),
    });
    Ok(OutputResource::new(ResourceKind::Procedure, payload).with_natural_id(natural_id))
}

/// The admission encounter, carrying the diagnosis and procedure links of
/// fragment one so replayed copies stay reference-identical.
pub fn encounter_resource(
    admission: &Admission,
    patient: &OutputResource,
    organization: &OutputResource,
    conditions: &[(OutputResource, u32)],
    procedures: &[(OutputResource, u32)],
    ctx: &ConversionContext,
) -> Result<OutputResource> {
    let natural_id = NaturalIdentifier::new(
        ctx.config.system_for("encounter"),
        admission.admission_key.clone(),
    );
    let diagnosis_links: Vec<Value> = conditions
        .iter()
        .chain(procedures.iter())
        .map(|(res, rank)| json!({ "condition": reference(&res.temp_id), "rank": rank }))
        .collect();
    let payload = json!({
        "resourceType": "Encounter",
        "identifier": [{ "system": natural_id.system, "value": natural_id.value }],
        "status": "finished",
        "class": admission.admission_type,
        "subject": reference(&patient.temp_id),
        "serviceProvider": reference(&organization.temp_id),
        "period": {
            "start": fmt_time(admission.admit_time.as_ref(), ResourceKind::Encounter)?,
            "end": fmt_time(admission.discharge_time.as_ref(), ResourceKind::Encounter)?,
        },
        "diagnosis": diagnosis_links,
    });
    Ok(OutputResource::new(ResourceKind::Encounter, payload).with_natural_id(natural_id))
}

pub fn medication_resource(
    medication: &Medication,
    ctx: &ConversionContext,
) -> Result<OutputResource> {
    let natural_id = NaturalIdentifier::new(
        ctx.config.system_for("medication"),
        medication.code.clone(),
    );
    let display = ctx.terminology.resolve(&medication.code);
    let payload = json!({
        "resourceType": "Medication",
        "identifier": [{ "system": natural_id.system, "value": natural_id.value }],
        "code": { "code": medication.code, "display": display },
        "name": medication.name,
    });
    Ok(OutputResource::new(ResourceKind::Medication, payload).with_natural_id(natural_id))
}

/// One administration, referencing the admission-level deduplicated
/// medication through its temporary identifier.
pub fn administration_resource(
    administration: &Administration,
    medication_temp_id: &str,
    encounter: &OutputResource,
) -> Result<OutputResource> {
    let payload = json!({
        "resourceType": "MedicationAdministration",
        "medication": reference(medication_temp_id),
        "context": reference(&encounter.temp_id),
        "dosage": { "value": administration.dose, "unit": administration.unit },
        "effectiveDateTime": fmt_time(
            administration.time.as_ref(),
            ResourceKind::MedicationAdministration,
        )?,
    });
    Ok(OutputResource::new(
        ResourceKind::MedicationAdministration,
        payload,
    ))
}

pub fn chart_observation_resource(
    observation: &ChartObservation,
    patient: &OutputResource,
    encounter: &OutputResource,
) -> Result<OutputResource> {
    let payload = json!({
        "resourceType": "Observation",
        "category": "vital-signs",
        "code": { "code": observation.code, "display": observation.label },
        "value": { "value": observation.value, "unit": observation.unit },
        "subject": reference(&patient.temp_id),
        "encounter": reference(&encounter.temp_id),
        "effectiveDateTime": fmt_time(observation.time.as_ref(), ResourceKind::Observation)?,
    });
    Ok(OutputResource::new(ResourceKind::Observation, payload))
}

pub fn lab_observation_resource(
    observation: &LabObservation,
    patient: &OutputResource,
    encounter: &OutputResource,
) -> Result<OutputResource> {
    let payload = json!({
        "resourceType": "Observation",
        "category": "laboratory",
        "code": { "code": observation.code, "display": observation.label },
        "value": { "value": observation.value, "unit": observation.unit },
        "interpretation": if observation.abnormal { "abnormal" } else { "normal" },
        "subject": reference(&patient.temp_id),
        "encounter": reference(&encounter.temp_id),
        "effectiveDateTime": fmt_time(observation.time.as_ref(), ResourceKind::Observation)?,
    });
    Ok(OutputResource::new(ResourceKind::Observation, payload))
}

/// The note author as a Practitioner, deduplicated per admission through the
/// caregiver registry scope.
pub fn caregiver_resource(caregiver: &Caregiver, ctx: &ConversionContext) -> OutputResource {
    let natural_id = NaturalIdentifier::new(
        ctx.config.system_for("caregiver"),
        caregiver.key.clone(),
    );
    let payload = json!({
        "resourceType": "Practitioner",
        "identifier": [{ "system": natural_id.system, "value": natural_id.value }],
        "qualification": caregiver.role,
    });
    OutputResource::new(ResourceKind::Practitioner, payload).with_natural_id(natural_id)
}

/// A clinical note as a free-text observation, optionally performed by a
/// deduplicated caregiver.
pub fn note_observation_resource(
    note: &NoteEvent,
    patient: &OutputResource,
    encounter: &OutputResource,
    performer_temp_id: Option<&str>,
) -> Result<OutputResource> {
    let performer = match performer_temp_id {
        Some(temp_id) => json!([reference(temp_id)]),
        None => json!([]),
    };
    let payload = json!({
        "resourceType": "Observation",
        "category": "notes",
        "code": { "code": note.category, "display": note.description },
        "valueString": note.text,
        "performer": performer,
        "subject": reference(&patient.temp_id),
        "encounter": reference(&encounter.temp_id),
        "effectiveDateTime": fmt_time(note.time.as_ref(), ResourceKind::Observation)?,
    });
    Ok(OutputResource::new(ResourceKind::Observation, payload))
}

pub fn location_resource(transfer: &Transfer, ctx: &ConversionContext) -> OutputResource {
    let natural_id = NaturalIdentifier::new(
        ctx.config.system_for("location"),
        transfer.care_unit.clone(),
    );
    let payload = json!({
        "resourceType": "Location",
        "identifier": [{ "system": natural_id.system, "value": natural_id.value }],
        "name": transfer.care_unit,
        "physicalType": "wa",
    });
    OutputResource::new(ResourceKind::Location, payload).with_natural_id(natural_id)
}

/// The sub-encounter describing one stay on a ward, part of the admission
/// encounter. `sequence` disambiguates repeated stays on the same ward.
pub fn transfer_encounter_resource(
    transfer: &Transfer,
    sequence: usize,
    admission: &Admission,
    patient: &OutputResource,
    organization: &OutputResource,
    admission_encounter: &OutputResource,
    location: &OutputResource,
    ctx: &ConversionContext,
) -> Result<OutputResource> {
    let natural_id = NaturalIdentifier::new(
        ctx.config.system_for("transfer"),
        format!(
            "{}-{}-{sequence}",
            admission.admission_key, transfer.care_unit
        ),
    );
    let period = json!({
        "start": fmt_time(transfer.in_time.as_ref(), ResourceKind::Encounter)?,
        "end": fmt_time(transfer.out_time.as_ref(), ResourceKind::Encounter)?,
    });
    let payload = json!({
        "resourceType": "Encounter",
        "identifier": [{ "system": natural_id.system, "value": natural_id.value }],
        "status": "finished",
        "class": "transfer",
        "subject": reference(&patient.temp_id),
        "partOf": reference(&admission_encounter.temp_id),
        "serviceProvider": reference(&organization.temp_id),
        "location": [{ "location": reference(&location.temp_id), "period": period }],
    });
    Ok(OutputResource::new(ResourceKind::Encounter, payload).with_natural_id(natural_id))
}

pub fn imaging_report_resource(
    report: &ImagingReport,
    patient: &OutputResource,
) -> OutputResource {
    let payload = json!({
        "resourceType": "DiagnosticReport",
        "study": report.study_key,
        "modality": report.modality,
        "conclusion": report.conclusion,
        "subject": reference(&patient.temp_id),
    });
    OutputResource::new(ResourceKind::DiagnosticReport, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminology::TableLookup;

    fn ctx() -> ConversionContext {
        let mut table = TableLookup::new();
        table.insert("4019", "Essential hypertension");
        ConversionContext::new(ConversionConfig::default(), Arc::new(table))
    }

    fn record() -> ClinicalRecord {
        ClinicalRecord {
            patient_key: "10000032".into(),
            gender: "f".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_patient_resource_has_natural_id() {
        let ctx = ctx();
        let resource = patient_resource(&record(), &ctx).unwrap();
        let natural_id = resource.natural_id.as_ref().unwrap();
        assert_eq!(natural_id.value, "10000032");
        assert!(natural_id.system.ends_with("/patient"));
        assert_eq!(resource.payload["resourceType"], "Patient");
    }

    #[test]
    fn test_condition_display_resolved_through_terminology() {
        let ctx = ctx();
        let patient = patient_resource(&record(), &ctx).unwrap();
        let admission = Admission {
            admission_key: "adm-1".into(),
            ..Default::default()
        };
        let diagnosis = Diagnosis {
            code: "4019".into(),
            display: None,
            rank: 1,
        };
        let condition = condition_resource(&diagnosis, &admission, &patient, &ctx).unwrap();
        assert_eq!(condition.payload["code"]["display"], "Essential hypertension");
        assert_eq!(condition.natural_id.as_ref().unwrap().value, "adm-1-4019");
    }

    #[test]
    fn test_encounter_carries_diagnosis_links() {
        let ctx = ctx();
        let patient = patient_resource(&record(), &ctx).unwrap();
        let organization = organization_resource(&ctx);
        let admission = Admission {
            admission_key: "adm-1".into(),
            admission_type: "EMERGENCY".into(),
            ..Default::default()
        };
        let diagnosis = Diagnosis {
            code: "4019".into(),
            display: None,
            rank: 2,
        };
        let condition = condition_resource(&diagnosis, &admission, &patient, &ctx).unwrap();
        let conditions = vec![(condition.clone(), 2)];

        let encounter =
            encounter_resource(&admission, &patient, &organization, &conditions, &[], &ctx)
                .unwrap();
        assert_eq!(
            encounter.payload["diagnosis"][0]["condition"]["reference"],
            condition.temp_id
        );
        assert_eq!(encounter.payload["diagnosis"][0]["rank"], 2);
        assert_eq!(encounter.payload["subject"]["reference"], patient.temp_id);
    }

    #[test]
    fn test_medication_dedup_key_is_code() {
        let ctx = ctx();
        let medication = Medication {
            code: "rx-850087".into(),
            name: "metformin".into(),
            administrations: vec![],
        };
        let resource = medication_resource(&medication, &ctx).unwrap();
        assert_eq!(resource.natural_id.as_ref().unwrap().value, "rx-850087");
    }

    #[test]
    fn test_administration_references_medication_temp_id() {
        let ctx = ctx();
        let patient = patient_resource(&record(), &ctx).unwrap();
        let organization = organization_resource(&ctx);
        let admission = Admission::default();
        let encounter =
            encounter_resource(&admission, &patient, &organization, &[], &[], &ctx).unwrap();
        let administration = Administration {
            dose: 500.0,
            unit: "mg".into(),
            time: None,
        };
        let resource =
            administration_resource(&administration, "urn:uuid:med-1", &encounter).unwrap();
        assert_eq!(resource.payload["medication"]["reference"], "urn:uuid:med-1");
        assert!(resource.natural_id.is_none());
    }

    #[test]
    fn test_caregiver_dedup_key_is_caregiver_key() {
        let ctx = ctx();
        let caregiver = Caregiver {
            key: "cg-2217".into(),
            role: "RN".into(),
        };
        let resource = caregiver_resource(&caregiver, &ctx);
        let natural_id = resource.natural_id.as_ref().unwrap();
        assert_eq!(natural_id.value, "cg-2217");
        assert!(natural_id.system.ends_with("/caregiver"));
        assert_eq!(resource.payload["resourceType"], "Practitioner");
    }

    #[test]
    fn test_note_observation_performer_is_optional() {
        let ctx = ctx();
        let patient = patient_resource(&record(), &ctx).unwrap();
        let organization = organization_resource(&ctx);
        let admission = Admission::default();
        let encounter =
            encounter_resource(&admission, &patient, &organization, &[], &[], &ctx).unwrap();
        let note = NoteEvent {
            category: "Nursing".into(),
            description: "Nursing note".into(),
            text: "patient resting comfortably".into(),
            author: None,
            time: None,
        };

        let unsigned =
            note_observation_resource(&note, &patient, &encounter, None).unwrap();
        assert_eq!(unsigned.payload["performer"], json!([]));

        let signed =
            note_observation_resource(&note, &patient, &encounter, Some("urn:uuid:cg-1")).unwrap();
        assert_eq!(signed.payload["performer"][0]["reference"], "urn:uuid:cg-1");
        assert_eq!(signed.payload["valueString"], "patient resting comfortably");
    }

    #[test]
    fn test_identical_input_maps_to_identical_payload() {
        let ctx = ctx();
        let a = patient_resource(&record(), &ctx).unwrap();
        let b = patient_resource(&record(), &ctx).unwrap();
        assert_eq!(a.payload, b.payload);
        assert_ne!(a.temp_id, b.temp_id);
    }
}
