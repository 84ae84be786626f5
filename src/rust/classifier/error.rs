use std::io;

/// Represents the different types of errors that can occur while training, evaluating
/// or persisting a message classifier.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// Malformed text or labels in the input corpus
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// A stage was used before it was fitted
    #[error("Not fitted: {0}")]
    NotFitted(String),
    /// Label matrix shape inconsistent with the features or the category list
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },
    /// Training was requested on zero rows
    #[error("Training set is empty")]
    EmptyTrainingSet,
    /// Evaluation or loading was requested with no categories
    #[error("Category set is empty")]
    EmptyCategorySet,
    /// The persisted model cannot be decoded or has an incompatible schema
    #[error("Corrupt artifact: {0}")]
    CorruptArtifact(String),
    /// Invalid trainer configuration
    #[error("Configuration error: {0}")]
    Config(String),
    /// Malformed input table
    #[error("Table error: {0}")]
    Table(#[from] csv::Error),
    /// I/O failure, surfaced unmodified
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ClassifierError {
    pub(crate) fn dimension_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClassifierError>;
