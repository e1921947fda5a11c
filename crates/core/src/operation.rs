//! Arithmetic operation types.

use serde::{Deserialize, Serialize};

/// The arithmetic operation a level drills.
///
/// Each operation type has its own independent difficulty ladder and its own
/// progression track per learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OperationType {
    /// `a + b`
    Addition,
    /// `a - b`
    Subtraction,
    /// `a × b`
    Multiplication,
}

impl OperationType {
    /// All operation types, in catalog order.
    pub const ALL: [OperationType; 3] = [
        OperationType::Addition,
        OperationType::Subtraction,
        OperationType::Multiplication,
    ];

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Addition => "addition",
            OperationType::Subtraction => "subtraction",
            OperationType::Multiplication => "multiplication",
        }
    }

    /// Symbol used when rendering a question.
    pub fn symbol(&self) -> char {
        match self {
            OperationType::Addition => '+',
            OperationType::Subtraction => '-',
            OperationType::Multiplication => '×',
        }
    }

    /// Compute `a <op> b`, saturating at the bounds of `i64`.
    pub fn apply(&self, a: u64, b: u64) -> i64 {
        let a = i64::try_from(a).unwrap_or(i64::MAX);
        let b = i64::try_from(b).unwrap_or(i64::MAX);
        match self {
            OperationType::Addition => a.saturating_add(b),
            OperationType::Subtraction => a.saturating_sub(b),
            OperationType::Multiplication => a.saturating_mul(b),
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an operation type name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation type: {0}")]
pub struct ParseOperationError(pub String);

impl std::str::FromStr for OperationType {
    type Err = ParseOperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "addition" | "add" | "+" => Ok(OperationType::Addition),
            "subtraction" | "sub" | "soustraction" | "-" => Ok(OperationType::Subtraction),
            "multiplication" | "mul" | "*" | "x" | "×" => Ok(OperationType::Multiplication),
            _ => Err(ParseOperationError(s.to_string())),
        }
    }
}
