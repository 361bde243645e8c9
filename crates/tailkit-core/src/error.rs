use thiserror::Error;

/// Errors that can occur in tailkit-core.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// CSV parsing error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// JSON (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// An id has no counterpart in the vocabulary it was resolved against.
    #[error("Vocabulary mismatch: {kind} id {id} is not in the trained vocabulary")]
    VocabularyMismatch {
        /// `"entity"` or `"relation"`.
        kind: &'static str,
        /// The offending dense id.
        id: usize,
    },
    /// Input failed validation.
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for tailkit-core.
pub type Result<T> = std::result::Result<T, Error>;
