use async_trait::async_trait;

use clinfhir_core::ClinicalRecord;

use crate::error::PipelineError;

/// Contract for the clinical record source.
///
/// Implementations must be safe to call concurrently from multiple workers;
/// any connection pooling or per-call state is their own concern. The
/// pipeline fetches each record exactly once and never shares it between
/// workers.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Returns the fully materialized record for one patient key.
    async fn fetch(&self, key: &str) -> Result<ClinicalRecord, PipelineError>;

    /// Returns up to `n` candidate patient keys, in source order or randomly
    /// sampled.
    async fn list_candidate_keys(
        &self,
        n: usize,
        random: bool,
    ) -> Result<Vec<String>, PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_object_safe(_: &dyn RecordSource) {}
}
