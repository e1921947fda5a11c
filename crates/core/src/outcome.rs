//! Outcome model - the persisted result of one answered question.

use serde::{Deserialize, Serialize};
use crate::id::{LearnerId, LevelId, OutcomeId, SessionId};
use crate::operation::OperationType;
use crate::Time;

/// An outcome as handed to the store, before it has been given an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOutcome {
    /// Learner who answered
    pub learner_id: LearnerId,

    /// Training session the answer belongs to
    pub session_id: Option<SessionId>,

    /// Level active when the question was asked
    pub level_id: LevelId,

    /// Operation type of the question
    pub operation: OperationType,

    /// Whether the answer counts as correct (a correct retry counts)
    pub correct: bool,

    /// Whether the question needed a retry
    pub corrected: bool,

    /// Time spent answering, in milliseconds
    pub elapsed_ms: u64,

    /// Absolute distance between the first answer and the solution
    pub error_magnitude: u64,

    /// When the answer was given
    pub answered_at: Time,
}

impl NewOutcome {
    /// Attach the identity assigned by the store.
    pub fn with_id(self, id: OutcomeId) -> Outcome {
        Outcome {
            id,
            learner_id: self.learner_id,
            session_id: self.session_id,
            level_id: self.level_id,
            operation: self.operation,
            correct: self.correct,
            corrected: self.corrected,
            elapsed_ms: self.elapsed_ms,
            error_magnitude: self.error_magnitude,
            answered_at: self.answered_at,
        }
    }
}

/// A persisted outcome. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Store-assigned identity, strictly increasing
    pub id: OutcomeId,

    /// Learner who answered
    pub learner_id: LearnerId,

    /// Training session the answer belongs to
    #[serde(default)]
    pub session_id: Option<SessionId>,

    /// Level active when the question was asked
    pub level_id: LevelId,

    /// Operation type of the question
    pub operation: OperationType,

    /// Whether the answer counts as correct
    pub correct: bool,

    /// Whether the question needed a retry
    #[serde(default)]
    pub corrected: bool,

    /// Time spent answering, in milliseconds
    pub elapsed_ms: u64,

    /// Absolute distance between the first answer and the solution
    pub error_magnitude: u64,

    /// When the answer was given
    pub answered_at: Time,
}

impl Outcome {
    /// Score contributed to the learner's total: +1 if correct, -1 otherwise.
    pub fn score(&self) -> i64 {
        if self.correct {
            1
        } else {
            -1
        }
    }
}
