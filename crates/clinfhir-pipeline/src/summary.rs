//! Per-run outcome aggregation.
//!
//! Worker failures are isolated per patient and collected here instead of
//! being printed and forgotten; the scheduler returns one summary for the
//! whole run.

use std::time::Duration;

use crate::error::PipelineError;

/// Instrumentation for one successfully converted patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatientStats {
    pub admissions: usize,
    pub fragments: u32,
    pub elapsed: Duration,
}

/// Terminal state of one patient task.
#[derive(Debug)]
pub struct PatientOutcome {
    pub patient_index: usize,
    pub patient_key: String,
    pub result: Result<PatientStats, PipelineError>,
}

/// Aggregated outcomes of one pipeline run.
#[derive(Debug)]
pub struct RunSummary {
    pub outcomes: Vec<PatientOutcome>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn converted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.converted()
    }

    pub fn total_fragments(&self) -> u64 {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(|s| u64::from(s.fragments))
            .sum()
    }

    /// Patient keys and errors for every failed task.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &PipelineError)> {
        self.outcomes.iter().filter_map(|o| {
            o.result
                .as_ref()
                .err()
                .map(|e| (o.patient_key.as_str(), e))
        })
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "converted {} of {} patients ({} fragments) in {} ms",
            self.converted(),
            self.outcomes.len(),
            self.total_fragments(),
            self.elapsed.as_millis()
        )
    }
}
