//! Conversion worker: drives one patient's record through the factories and
//! the bundle assembler.
//!
//! Entity order within an admission is fixed: identity resources first
//! (patient, organization, encounter with its diagnosis/procedure links,
//! transfer locations), then medications with their administrations, then
//! chart observations, then lab observations, then clinical notes with their
//! deduplicated authors. The size limit is checked before every
//! observation-class add. All side effects go through the queue publisher;
//! the worker never touches a sink directly.

use std::time::Instant;

use clinfhir_core::OutputResource;

use crate::assembler::{BasicResources, BundleAssembler, TransferPair};
use crate::dedup::DedupScope;
use crate::error::{PipelineError, Result};
use crate::factory::{self, ConversionContext};
use crate::metrics::TimingLog;
use crate::queue::BundlePublisher;
use crate::scheduler::CancelFlag;
use crate::source::RecordSource;
use crate::summary::PatientStats;

/// Converts one patient end to end.
///
/// Fetch and mapping failures abort this patient only; publish failures are
/// fatal to the run and propagate as such.
pub async fn convert_patient(
    source: &dyn RecordSource,
    publisher: BundlePublisher,
    ctx: &ConversionContext,
    timing: &TimingLog,
    cancel: &CancelFlag,
    patient_index: usize,
    key: &str,
) -> Result<PatientStats> {
    let start = Instant::now();

    tracing::info!(patient = patient_index, key, "fetching record");
    let record = tokio::time::timeout(ctx.config.fetch_timeout(), source.fetch(key))
        .await
        .map_err(|_| PipelineError::FetchTimeout {
            key: key.to_string(),
            seconds: ctx.config.fetch_timeout_secs,
        })??;

    tracing::info!(
        patient = patient_index,
        key,
        admissions = record.admissions.len(),
        "converting"
    );

    let mut assembler =
        BundleAssembler::new(publisher, ctx.config.bundle_threshold, patient_index);
    let patient = factory::patient_resource(&record, ctx)?;
    let organization = factory::organization_resource(ctx);

    // Pre-admission imaging reports become one patient-level bundle with
    // admission segment 0.
    if ctx.config.include_imaging && !record.imaging_reports.is_empty() {
        assembler.begin_admission(0);
        for report in &record.imaging_reports {
            assembler.add(factory::imaging_report_resource(report, &patient));
        }
        assembler.flush().await?;
    }

    for (i, admission) in record.admissions.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        assembler.begin_admission(i + 1);

        let conditions: Vec<(OutputResource, u32)> = admission
            .diagnoses
            .iter()
            .map(|d| factory::condition_resource(d, admission, &patient, ctx).map(|r| (r, d.rank)))
            .collect::<Result<_>>()?;
        let procedures: Vec<(OutputResource, u32)> = admission
            .procedures
            .iter()
            .map(|p| factory::procedure_resource(p, admission, &patient, ctx).map(|r| (r, p.rank)))
            .collect::<Result<_>>()?;
        let encounter = factory::encounter_resource(
            admission,
            &patient,
            &organization,
            &conditions,
            &procedures,
            ctx,
        )?;
        let transfers: Vec<TransferPair> = admission
            .transfers
            .iter()
            .enumerate()
            .map(|(sequence, transfer)| {
                let location = factory::location_resource(transfer, ctx);
                let transfer_encounter = factory::transfer_encounter_resource(
                    transfer,
                    sequence,
                    admission,
                    &patient,
                    &organization,
                    &encounter,
                    &location,
                    ctx,
                )?;
                Ok(TransferPair {
                    location,
                    encounter: transfer_encounter,
                })
            })
            .collect::<Result<_>>()?;

        let basic = BasicResources {
            patient: patient.clone(),
            organization: organization.clone(),
            encounter: encounter.clone(),
            conditions: conditions.into_iter().map(|(r, _)| r).collect(),
            procedures: procedures.into_iter().map(|(r, _)| r).collect(),
            transfers,
        };
        assembler.replay_basic(&basic)?;

        // Medications land only in the admission's first fragment, ahead of
        // the observation stream; administrations reference the deduplicated
        // medication entry.
        for medication in &admission.medications {
            let resource = factory::medication_resource(medication, ctx)?;
            let medication_temp_id = assembler.add_deduped(DedupScope::Medication, resource)?;
            for administration in &medication.administrations {
                assembler.add(factory::administration_resource(
                    administration,
                    &medication_temp_id,
                    &encounter,
                )?);
            }
        }

        for observation in &admission.chart_observations {
            assembler.check_limit(&basic).await?;
            assembler.add(factory::chart_observation_resource(
                observation,
                &patient,
                &encounter,
            )?);
        }
        for observation in &admission.lab_observations {
            assembler.check_limit(&basic).await?;
            assembler.add(factory::lab_observation_resource(
                observation,
                &patient,
                &encounter,
            )?);
        }

        // A note and its author travel as one group: the performer reference
        // must resolve within the same fragment.
        for note in &admission.notes {
            match &note.author {
                Some(author) => {
                    assembler.check_limit_for(&basic, 2).await?;
                    let resource = factory::caregiver_resource(author, ctx);
                    let performer = assembler.add_deduped(DedupScope::Caregiver, resource)?;
                    assembler.add(factory::note_observation_resource(
                        note,
                        &patient,
                        &encounter,
                        Some(&performer),
                    )?);
                }
                None => {
                    assembler.check_limit(&basic).await?;
                    assembler.add(factory::note_observation_resource(
                        note,
                        &patient,
                        &encounter,
                        None,
                    )?);
                }
            }
        }

        assembler.end_admission().await?;
    }

    let fragments = assembler.flush_count();
    assembler.end_patient();

    let elapsed = start.elapsed();
    timing.add(patient_index, key, record.admissions.len(), elapsed);
    tracing::info!(
        patient = patient_index,
        key,
        fragments,
        elapsed_ms = elapsed.as_millis() as u64,
        "patient done"
    );

    Ok(PatientStats {
        admissions: record.admissions.len(),
        fragments,
        elapsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionConfig;
    use crate::queue::bundle_channel;
    use crate::terminology::TableLookup;
    use async_trait::async_trait;
    use clinfhir_core::{
        Admission, Caregiver, ChartObservation, ClinicalRecord, Diagnosis, ImagingReport,
        LabObservation, Medication, NoteEvent, QueueMessage, ResourceKind,
    };
    use std::sync::Arc;

    struct FixedSource(ClinicalRecord);

    #[async_trait]
    impl RecordSource for FixedSource {
        async fn fetch(&self, key: &str) -> Result<ClinicalRecord> {
            if key == "missing" {
                return Err(PipelineError::fetch(key, "no such patient"));
            }
            Ok(self.0.clone())
        }

        async fn list_candidate_keys(&self, n: usize, _random: bool) -> Result<Vec<String>> {
            Ok((0..n).map(|i| format!("p-{i}")).collect())
        }
    }

    fn chart(code: &str) -> ChartObservation {
        ChartObservation {
            code: code.into(),
            label: code.into(),
            value: "1".into(),
            unit: None,
            time: None,
        }
    }

    fn lab(code: &str) -> LabObservation {
        LabObservation {
            code: code.into(),
            label: code.into(),
            value: "1".into(),
            unit: None,
            abnormal: false,
            time: None,
        }
    }

    fn context(threshold: usize, include_imaging: bool) -> ConversionContext {
        ConversionContext::new(
            ConversionConfig {
                bundle_threshold: threshold,
                include_imaging,
                ..Default::default()
            },
            Arc::new(TableLookup::new()),
        )
    }

    async fn run(
        record: ClinicalRecord,
        ctx: &ConversionContext,
    ) -> (PatientStats, Vec<QueueMessage>) {
        let (publisher, mut rx) = bundle_channel(256);
        let source = FixedSource(record);
        let timing = TimingLog::new();
        let cancel = CancelFlag::new();
        let stats = convert_patient(&source, publisher, ctx, &timing, &cancel, 0, "p-0")
            .await
            .unwrap();
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        (stats, messages)
    }

    fn two_admission_record() -> ClinicalRecord {
        ClinicalRecord {
            patient_key: "p-0".into(),
            gender: "m".into(),
            admissions: vec![
                Admission {
                    admission_key: "adm-1".into(),
                    admission_type: "EMERGENCY".into(),
                    diagnoses: vec![Diagnosis {
                        code: "4019".into(),
                        display: None,
                        rank: 1,
                    }],
                    medications: vec![Medication {
                        code: "rx-1".into(),
                        name: "aspirin".into(),
                        administrations: vec![],
                    }],
                    chart_observations: vec![chart("hr"), chart("bp")],
                    lab_observations: vec![lab("glucose")],
                    ..Default::default()
                },
                Admission {
                    admission_key: "adm-2".into(),
                    admission_type: "ELECTIVE".into(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_one_fragment_per_admission_under_threshold() {
        let ctx = context(1000, false);
        let (stats, messages) = run(two_admission_record(), &ctx).await;
        assert_eq!(stats.admissions, 2);
        assert_eq!(stats.fragments, 2);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sequence_label, "0_1_1");
        assert_eq!(messages[1].sequence_label, "0_2_2");
    }

    #[tokio::test]
    async fn test_admission_entry_order() {
        let ctx = context(1000, false);
        let (_, messages) = run(two_admission_record(), &ctx).await;
        let bundle = messages[0].bundle().unwrap();
        let kinds: Vec<String> = bundle
            .entries()
            .iter()
            .map(|e| e.resource.kind.to_string())
            .collect();
        assert_eq!(
            kinds,
            vec![
                "Patient",
                "Organization",
                "Condition",
                "Encounter",
                "Medication",
                "Observation",
                "Observation",
                "Observation",
            ]
        );
    }

    #[tokio::test]
    async fn test_zero_admissions_with_imaging_yields_one_patient_level_fragment() {
        let ctx = context(1000, true);
        let record = ClinicalRecord {
            patient_key: "p-0".into(),
            imaging_reports: vec![ImagingReport {
                study_key: "s-1".into(),
                modality: "CR".into(),
                conclusion: "clear".into(),
            }],
            ..Default::default()
        };
        let (stats, messages) = run(record, &ctx).await;
        assert_eq!(stats.fragments, 1);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sequence_label, "0_0_1");
    }

    #[tokio::test]
    async fn test_imaging_disabled_emits_nothing_for_reports() {
        let ctx = context(1000, false);
        let record = ClinicalRecord {
            patient_key: "p-0".into(),
            imaging_reports: vec![ImagingReport {
                study_key: "s-1".into(),
                modality: "CR".into(),
                conclusion: "clear".into(),
            }],
            ..Default::default()
        };
        let (stats, messages) = run(record, &ctx).await;
        assert_eq!(stats.fragments, 0);
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_generations_continue_across_admissions() {
        let ctx = context(1000, true);
        let mut record = two_admission_record();
        record.imaging_reports = vec![ImagingReport {
            study_key: "s-1".into(),
            modality: "CR".into(),
            conclusion: "clear".into(),
        }];
        let (_, messages) = run(record, &ctx).await;
        let labels: Vec<&str> = messages.iter().map(|m| m.sequence_label.as_str()).collect();
        assert_eq!(labels, vec!["0_0_1", "0_1_2", "0_2_3"]);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_patient_without_fragments() {
        let (publisher, mut rx) = bundle_channel(8);
        let ctx = context(1000, false);
        let source = FixedSource(ClinicalRecord::default());
        let timing = TimingLog::new();
        let cancel = CancelFlag::new();
        let err = convert_patient(&source, publisher, &ctx, &timing, &cancel, 0, "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Fetch { .. }));
        assert!(rx.try_recv().is_err());
        assert!(timing.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_between_admissions() {
        let (publisher, _rx) = bundle_channel(256);
        let ctx = context(1000, false);
        let source = FixedSource(two_admission_record());
        let timing = TimingLog::new();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = convert_patient(&source, publisher, &ctx, &timing, &cancel, 0, "p-0")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }

    fn note(text: &str, author_key: Option<&str>) -> NoteEvent {
        NoteEvent {
            category: "Nursing".into(),
            description: "Progress note".into(),
            text: text.into(),
            author: author_key.map(|key| Caregiver {
                key: key.into(),
                role: "RN".into(),
            }),
            time: None,
        }
    }

    #[tokio::test]
    async fn test_note_authors_dedup_per_admission() {
        let ctx = context(1000, false);
        let mut record = two_admission_record();
        record.admissions[0].notes = vec![
            note("first", Some("cg-7")),
            note("second", Some("cg-7")),
            note("unsigned", None),
        ];
        record.admissions[1].notes = vec![note("later", Some("cg-7"))];

        let (_, messages) = run(record, &ctx).await;
        let first = messages[0].bundle().unwrap();
        let practitioners: Vec<_> = first
            .entries()
            .iter()
            .filter(|e| e.resource.kind == ResourceKind::Practitioner)
            .collect();
        assert_eq!(practitioners.len(), 1);

        let performer_refs: Vec<String> = first
            .entries()
            .iter()
            .filter_map(|e| e.resource.payload["performer"].get(0))
            .map(|p| p["reference"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(performer_refs.len(), 2);
        assert!(performer_refs.iter().all(|r| *r == practitioners[0].resource.temp_id));

        // The dedup registry resets between admissions, so the same author
        // gets a fresh entry in the next admission's fragment.
        let second = messages[1].bundle().unwrap();
        let again: Vec<_> = second
            .entries()
            .iter()
            .filter(|e| e.resource.kind == ResourceKind::Practitioner)
            .collect();
        assert_eq!(again.len(), 1);
        assert_ne!(again[0].resource.temp_id, practitioners[0].resource.temp_id);
    }

    #[tokio::test]
    async fn test_counter_fidelity_across_fragments() {
        // Threshold low enough to force several flushes within one admission.
        let ctx = context(5, false);
        let mut record = two_admission_record();
        record.admissions.truncate(1);
        record.admissions[0].chart_observations =
            (0..17).map(|i| chart(&format!("c-{i}"))).collect();
        record.admissions[0].lab_observations = vec![];
        record.admissions[0].medications = vec![];

        let (_, messages) = run(record, &ctx).await;
        let bundles: Vec<_> = messages.iter().map(|m| m.bundle().unwrap()).collect();
        let observations: usize = bundles
            .iter()
            .flat_map(|b| b.entries())
            .filter(|e| e.resource.kind.to_string() == "Observation")
            .count();
        assert_eq!(observations, 17);
        for bundle in &bundles {
            assert!(bundle.resource_count() <= 5);
            assert_eq!(bundle.resource_count(), bundle.entries().len());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_timeout_surfaces() {
        struct StalledSource;

        #[async_trait]
        impl RecordSource for StalledSource {
            async fn fetch(&self, _key: &str) -> Result<ClinicalRecord> {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Ok(ClinicalRecord::default())
            }

            async fn list_candidate_keys(&self, _n: usize, _random: bool) -> Result<Vec<String>> {
                Ok(vec![])
            }
        }

        let (publisher, _rx) = bundle_channel(8);
        let ctx = context(1000, false);
        let timing = TimingLog::new();
        let cancel = CancelFlag::new();
        let err = convert_patient(
            &StalledSource,
            publisher,
            &ctx,
            &timing,
            &cancel,
            0,
            "p-0",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::FetchTimeout { .. }));
    }
}
