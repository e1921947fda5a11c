//! Storage trait abstraction.

use async_trait::async_trait;
use drill_core::{
    Checkpoint, CheckpointId, LearnerId, Level, LevelId, NewCheckpoint, NewOutcome,
    OperationType, Outcome, OutcomeId,
};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A write would break an append-only invariant
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Backend-specific failure
    #[error("{0}")]
    Backend(String),
}

/// Data-access interface of the progression core.
///
/// Levels are read-only once saved. Outcomes and checkpoints are append-only;
/// identities are assigned by the store and strictly increase.
#[async_trait]
pub trait Storage: Send + Sync {
    // === Level catalog ===

    /// Persist catalog levels. Levels with an existing identity are replaced.
    async fn save_levels(&self, levels: &[Level]) -> Result<()>;

    /// All levels of an operation type, ordered by rank.
    async fn get_levels(&self, operation: OperationType) -> Result<Vec<Level>>;

    /// Load a level by identity.
    async fn get_level(&self, id: LevelId) -> Result<Option<Level>>;

    /// Load the level of an operation type at `rank`.
    async fn get_level_by_rank(&self, operation: OperationType, rank: u32) -> Result<Option<Level>>;

    // === Outcomes ===

    /// Append an outcome and return its identity.
    async fn append_outcome(&self, outcome: NewOutcome) -> Result<OutcomeId>;

    /// Outcomes of `learner` at `level` with identity greater than `after`,
    /// ascending by identity.
    async fn get_outcomes(
        &self,
        learner: &LearnerId,
        level: LevelId,
        after: OutcomeId,
    ) -> Result<Vec<Outcome>>;

    /// All outcomes of a learner, ascending by identity.
    async fn list_outcomes(&self, learner: &LearnerId) -> Result<Vec<Outcome>>;

    /// Identity of the learner's most recent outcome.
    async fn latest_outcome_id(&self, learner: &LearnerId) -> Result<Option<OutcomeId>>;

    /// Every learner with at least one outcome or checkpoint, sorted.
    async fn list_learners(&self) -> Result<Vec<LearnerId>>;

    // === Checkpoints ===

    /// Append a checkpoint atomically and return its identity.
    ///
    /// Fails with [`StorageError::Conflict`] if the cursor is lower than the
    /// cursor of the latest checkpoint for the same learner and operation type.
    async fn append_checkpoint(&self, checkpoint: NewCheckpoint) -> Result<CheckpointId>;

    /// Most recent checkpoint for a learner and operation type.
    async fn get_latest_checkpoint(
        &self,
        learner: &LearnerId,
        operation: OperationType,
    ) -> Result<Option<Checkpoint>>;

    /// Checkpoint history for a learner and operation type, ascending by identity.
    async fn list_checkpoints(
        &self,
        learner: &LearnerId,
        operation: OperationType,
    ) -> Result<Vec<Checkpoint>>;

    /// Every learner's checkpoints for an operation type, ascending by identity.
    async fn list_operation_checkpoints(&self, operation: OperationType) -> Result<Vec<Checkpoint>>;
}

/// Reject a checkpoint whose cursor runs behind the track's latest cursor.
pub(crate) fn check_cursor(latest: Option<&Checkpoint>, next: &NewCheckpoint) -> Result<()> {
    match latest {
        Some(prev) if next.cursor < prev.cursor => Err(StorageError::Conflict(format!(
            "cursor {} for {}/{} is behind checkpoint {} (cursor {})",
            next.cursor, next.learner_id, next.operation, prev.id, prev.cursor
        ))),
        _ => Ok(()),
    }
}
