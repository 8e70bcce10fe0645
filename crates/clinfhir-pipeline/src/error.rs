use thiserror::Error;

/// Error types for pipeline operations.
///
/// Fetch and mapping failures are fatal to one patient's task only; channel
/// and protocol failures are fatal to the whole run, since a lost fragment is
/// silently incorrect.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Record fetch failed for patient {key}: {message}")]
    Fetch { key: String, message: String },

    #[error("Record fetch timed out for patient {key} after {seconds}s")]
    FetchTimeout { key: String, seconds: u64 },

    #[error("Mapping failed for {kind}: {message}")]
    Mapping { kind: String, message: String },

    #[error("Handoff channel closed before all bundles were published")]
    ChannelClosed,

    #[error("Queue protocol violation: {0}")]
    Protocol(String),

    #[error("Conversion cancelled")]
    Cancelled,

    #[error(transparent)]
    Core(#[from] clinfhir_core::CoreError),
}

impl PipelineError {
    pub fn fetch(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn mapping(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mapping {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Whether this error must abort the whole pipeline run rather than just
    /// the one patient task it occurred in.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ChannelClosed | Self::Protocol(_))
    }
}

/// Convenience result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
