//! Progression errors.

use drill_core::{LevelId, OperationType};
use drill_storage::StorageError;

/// Error type for progression operations.
pub type Result<T> = std::result::Result<T, ProgressError>;

/// Errors surfaced by the progression engine.
///
/// Too little data is not an error; it is reported as
/// [`Evaluation::InsufficientData`](crate::Evaluation::InsufficientData).
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    /// No levels exist for the operation type
    #[error("no levels configured for {0}")]
    Configuration(OperationType),

    /// A checkpoint references a level the catalog does not have
    #[error("level {0} referenced by a checkpoint is missing from the catalog")]
    MissingLevel(LevelId),

    /// The policy thresholds are out of range
    #[error("invalid progression policy: {0}")]
    InvalidPolicy(String),

    /// Another evaluation already moved the track past this cursor
    #[error("concurrent progression update: {0}")]
    Conflict(String),

    /// The outcome or checkpoint store failed
    #[error("store unavailable: {0}")]
    StoreUnavailable(StorageError),
}

impl From<StorageError> for ProgressError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(msg) => ProgressError::Conflict(msg),
            other => ProgressError::StoreUnavailable(other),
        }
    }
}
