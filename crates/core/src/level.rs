//! Level model - one rung of an operation type's difficulty ladder.

use serde::{Deserialize, Serialize};
use crate::id::LevelId;
use crate::operation::OperationType;

/// Inclusive operand range `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperandRange {
    /// Lowest operand value
    pub min: u64,
    /// Highest operand value
    pub max: u64,
}

impl OperandRange {
    /// Create a new range. Returns `None` when `min > max` or `min == 0`.
    pub fn new(min: u64, max: u64) -> Option<Self> {
        (min >= 1 && min <= max).then_some(Self { min, max })
    }

    /// Number of values in the range.
    pub fn width(&self) -> u64 {
        self.max - self.min + 1
    }

    /// Whether `value` lies in the range.
    pub fn contains(&self, value: u64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

impl std::fmt::Display for OperandRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// A curriculum level.
///
/// Levels are generated once and never mutated. Within one operation type the
/// rank defines a total order of difficulty, starting at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    /// Unique identifier
    pub id: LevelId,

    /// Operation type this level drills
    pub operation: OperationType,

    /// 1-based rank within the operation type
    pub rank: u32,

    /// Range the first operand is drawn from
    pub operand1: OperandRange,

    /// Range the second operand is drawn from
    pub operand2: OperandRange,

    /// Number of outcomes required before progression is evaluated
    pub mastery_criterion: u32,

    /// Human-readable pairing of range labels, e.g. `B1×A`
    pub label: String,
}

impl Level {
    /// Whether this is the first rung of its ladder.
    pub fn is_first(&self) -> bool {
        self.rank == 1
    }
}
