//! Sequence labels identifying bundle fragments.
//!
//! Data fragments are labelled `{patient}_{admission}_{generation}`. The
//! admission segment is `0` for patient-level bundles produced before any
//! admission (imaging reports). The bare label `"0"` is reserved for the
//! termination sentinel and the single unnumbered file artifact.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SequenceLabel {
    /// The reserved `"0"` label.
    Sentinel,
    Fragment {
        /// Zero-based index of the patient in the run's key list.
        patient: usize,
        /// One-based admission index; `0` for pre-admission bundles.
        admission: usize,
        generation: u32,
    },
}

impl SequenceLabel {
    pub fn fragment(patient: usize, admission: usize, generation: u32) -> Self {
        Self::Fragment {
            patient,
            admission,
            generation,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, Self::Sentinel)
    }
}

impl std::fmt::Display for SequenceLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sentinel => write!(f, "0"),
            Self::Fragment {
                patient,
                admission,
                generation,
            } => write!(f, "{patient}_{admission}_{generation}"),
        }
    }
}

impl FromStr for SequenceLabel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "0" {
            return Ok(Self::Sentinel);
        }
        let parts: Vec<&str> = s.split('_').collect();
        if parts.len() != 3 {
            return Err(CoreError::invalid_label(s));
        }
        let patient = parts[0]
            .parse()
            .map_err(|_| CoreError::invalid_label(s))?;
        let admission = parts[1]
            .parse()
            .map_err(|_| CoreError::invalid_label(s))?;
        let generation = parts[2]
            .parse()
            .map_err(|_| CoreError::invalid_label(s))?;
        Ok(Self::Fragment {
            patient,
            admission,
            generation,
        })
    }
}
