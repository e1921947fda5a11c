//! Checkpoint model - append-only progression history.

use serde::{Deserialize, Serialize};
use crate::id::{CheckpointId, LearnerId, LevelId, OutcomeId};
use crate::operation::OperationType;
use crate::Time;

/// What a progression evaluation did to the learner's level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Evolution {
    /// First checkpoint for the track
    Initialized,
    /// Success rate reached the advance threshold
    Advanced,
    /// Success rate fell below the regress threshold
    Regressed,
    /// Success rate in between
    Held,
}

impl Evolution {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Evolution::Initialized => "initialized",
            Evolution::Advanced => "advanced",
            Evolution::Regressed => "regressed",
            Evolution::Held => "held",
        }
    }
}

impl std::fmt::Display for Evolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Evolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initialized" => Ok(Evolution::Initialized),
            "advanced" => Ok(Evolution::Advanced),
            "regressed" => Ok(Evolution::Regressed),
            "held" => Ok(Evolution::Held),
            other => Err(format!("unknown evolution: {other}")),
        }
    }
}

/// A checkpoint as handed to the store, before it has been given an identity.
///
/// Written atomically: level, rate, tag and cursor land together or not at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCheckpoint {
    /// Learner the checkpoint belongs to
    pub learner_id: LearnerId,

    /// Operation type of the track
    pub operation: OperationType,

    /// Level the learner is at as of this checkpoint
    pub level_id: LevelId,

    /// Success rate of the deciding window (0 for initialization)
    pub success_rate: f64,

    /// What happened
    pub evolution: Evolution,

    /// Highest outcome identity consumed
    pub cursor: OutcomeId,

    /// When the checkpoint was taken
    pub created_at: Time,
}

impl NewCheckpoint {
    /// Attach the identity assigned by the store.
    pub fn with_id(self, id: CheckpointId) -> Checkpoint {
        Checkpoint {
            id,
            learner_id: self.learner_id,
            operation: self.operation,
            level_id: self.level_id,
            success_rate: self.success_rate,
            evolution: self.evolution,
            cursor: self.cursor,
            created_at: self.created_at,
        }
    }
}

/// A persisted checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Store-assigned identity
    pub id: CheckpointId,

    /// Learner the checkpoint belongs to
    pub learner_id: LearnerId,

    /// Operation type of the track
    pub operation: OperationType,

    /// Level the learner is at as of this checkpoint
    pub level_id: LevelId,

    /// Success rate of the deciding window (0 for initialization)
    pub success_rate: f64,

    /// What happened
    pub evolution: Evolution,

    /// Highest outcome identity consumed
    pub cursor: OutcomeId,

    /// When the checkpoint was taken
    pub created_at: Time,
}
