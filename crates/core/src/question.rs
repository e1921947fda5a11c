//! Question model.

use serde::{Deserialize, Serialize};
use crate::id::LevelId;
use crate::operation::OperationType;

/// A generated arithmetic question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Level the operands were drawn from
    pub level_id: LevelId,

    /// Operation to perform
    pub operation: OperationType,

    /// Left operand
    pub operand1: u64,

    /// Right operand
    pub operand2: u64,

    /// Expected answer
    pub expected: i64,

    /// Offered answers when asked as multiple choice, empty otherwise.
    /// Exactly one of them equals `expected`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<i64>,
}

impl Question {
    /// Build a question and compute its solution.
    pub fn new(level_id: LevelId, operation: OperationType, operand1: u64, operand2: u64) -> Self {
        Self {
            level_id,
            operation,
            operand1,
            operand2,
            expected: operation.apply(operand1, operand2),
            choices: Vec::new(),
        }
    }

    /// Whether the learner picks from [`Question::choices`].
    pub fn is_multiple_choice(&self) -> bool {
        !self.choices.is_empty()
    }

    /// Value of the choice at `index`.
    pub fn choice(&self, index: usize) -> Option<i64> {
        self.choices.get(index).copied()
    }

    /// Absolute distance between `given` and the solution.
    pub fn error_of(&self, given: i64) -> u64 {
        given.abs_diff(self.expected)
    }

    /// Text shown to the learner, e.g. `12 × 7`.
    pub fn text(&self) -> String {
        format!("{} {} {}", self.operand1, self.operation.symbol(), self.operand2)
    }
}

impl std::fmt::Display for Question {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_solution_and_error() {
        let q = Question::new(LevelId(3), OperationType::Subtraction, 4, 9);
        assert_eq!(q.expected, -5);
        assert_eq!(q.error_of(-5), 0);
        assert_eq!(q.error_of(5), 10);
        assert_eq!(q.text(), "4 - 9");
        assert!(!q.is_multiple_choice());
    }

    #[test]
    fn test_choices_are_optional_in_json() {
        let mut q = Question::new(LevelId(1), OperationType::Addition, 2, 2);
        let json = serde_json::to_string(&q).unwrap();
        assert!(!json.contains("choices"));
        assert_eq!(serde_json::from_str::<Question>(&json).unwrap(), q);

        q.choices = vec![3, 4, 5, 6];
        assert!(q.is_multiple_choice());
        assert_eq!(q.choice(1), Some(4));
        assert_eq!(q.choice(4), None);
    }
}
