use thiserror::Error;

/// Error types for output dispatch.
///
/// Transport faults are transient and retried by the repository; a rejected
/// transaction is a definitive answer from the server and never retried.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bundle serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport failure talking to the repository: {0}")]
    Transport(String),

    #[error("Repository rejected transaction with status {status}: {message}")]
    TransactionRejected { status: u16, message: String },

    #[error("Dispatcher misconfigured: {0}")]
    Configuration(String),
}

impl SinkError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Whether another submission attempt can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Convenience result type for sink operations
pub type Result<T> = std::result::Result<T, SinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_faults_are_retryable() {
        assert!(SinkError::transport("connection reset").is_retryable());
        assert!(
            !SinkError::TransactionRejected {
                status: 422,
                message: "bad reference".into()
            }
            .is_retryable()
        );
        assert!(!SinkError::configuration("no output directory").is_retryable());
    }
}
