use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default bundle size threshold, in entries per bundle.
pub const DEFAULT_BUNDLE_THRESHOLD: usize = 15_000;

/// Default number of concurrently converting patient workers.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Default timeout around a single record fetch.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 120;

/// Tuning knobs for a conversion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Flush the current bundle once it holds this many entries.
    pub bundle_threshold: usize,
    /// Maximum number of patient workers running at once.
    pub pool_size: usize,
    /// Timeout around one record fetch, in seconds.
    pub fetch_timeout_secs: u64,
    /// Emit pre-admission imaging reports as a patient-level bundle.
    pub include_imaging: bool,
    /// Base URL for the natural identifier systems assigned by the factories.
    pub identifier_system: String,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            bundle_threshold: DEFAULT_BUNDLE_THRESHOLD,
            pool_size: DEFAULT_POOL_SIZE,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            include_imaging: false,
            identifier_system: "http://clinfhir.org/identifiers".to_string(),
        }
    }
}

impl ConversionConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Identifier system URL for one resource kind, e.g.
    /// `http://clinfhir.org/identifiers/patient`.
    pub fn system_for(&self, segment: &str) -> String {
        format!("{}/{segment}", self.identifier_system.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConversionConfig::default();
        assert_eq!(config.bundle_threshold, 15_000);
        assert_eq!(config.pool_size, 10);
        assert!(!config.include_imaging);
    }

    #[test]
    fn test_system_for_trims_trailing_slash() {
        let config = ConversionConfig {
            identifier_system: "http://example.org/ids/".into(),
            ..Default::default()
        };
        assert_eq!(config.system_for("patient"), "http://example.org/ids/patient");
    }
}
