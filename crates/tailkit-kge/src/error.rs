use thiserror::Error;

/// Errors that can occur in tailkit-kge.
#[derive(Error, Debug)]
pub enum Error {
    /// Error from the linking/vocabulary layer.
    #[error(transparent)]
    Core(tailkit_core::Error),
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Binary model (de)serialization error.
    #[error("Model encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    /// Array shape mismatch.
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    /// No usable triple was found in the training input.
    #[error("Empty training set: no well-formed triples")]
    EmptyTrainingSet,
    /// Training stopped before any epoch finished, so there is no state
    /// worth keeping.
    #[error("No completed epoch: training was interrupted before the first epoch finished")]
    NoCompletedEpoch,
    /// Prediction was requested but no trained model is loaded.
    #[error("Model unavailable: no trained model is loaded")]
    ModelUnavailable,
    /// An id is outside the trained vocabulary.
    #[error("Vocabulary mismatch: {kind} id {id} is not in the trained vocabulary")]
    VocabularyMismatch {
        /// `"entity"` or `"relation"`.
        kind: &'static str,
        /// The offending dense id.
        id: usize,
    },
    /// A model file failed validation.
    #[error("Invalid model: {0}")]
    InvalidModel(String),
    /// Training configuration is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// Operation not supported by the model or configuration.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

impl From<tailkit_core::Error> for Error {
    fn from(e: tailkit_core::Error) -> Self {
        match e {
            tailkit_core::Error::VocabularyMismatch { kind, id } => {
                Error::VocabularyMismatch { kind, id }
            }
            other => Error::Core(other),
        }
    }
}

/// Result type alias for tailkit-kge.
pub type Result<T> = std::result::Result<T, Error>;
