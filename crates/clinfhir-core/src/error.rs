use thiserror::Error;

/// Core error types for clinfhir record and bundle handling
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid sequence label: {0}")]
    InvalidLabel(String),

    #[error("Invalid natural identifier: {0}")]
    InvalidIdentifier(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a new InvalidLabel error
    pub fn invalid_label(label: impl Into<String>) -> Self {
        Self::InvalidLabel(label.into())
    }

    /// Create a new InvalidIdentifier error
    pub fn invalid_identifier(identifier: impl Into<String>) -> Self {
        Self::InvalidIdentifier(identifier.into())
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
