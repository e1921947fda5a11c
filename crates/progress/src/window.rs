//! Evaluation window over a level's recent outcomes.

use drill_core::{Level, Outcome, OutcomeId};

use crate::policy::{success_rate, Decision, ProgressionPolicy};

/// Result of scoring a full window.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    /// Outcomes gathered since the last cursor, surplus included
    pub gathered: usize,
    /// Correct outcomes among the `window` most recent
    pub correct: usize,
    /// Window size (the level's mastery criterion)
    pub window: usize,
    /// `correct / window`, rounded to two places
    pub success_rate: f64,
    /// What the policy makes of the rate
    pub decision: Decision,
    /// Highest identity among the gathered outcomes
    pub cursor: OutcomeId,
}

/// Score the outcomes gathered for `level` since the last checkpoint.
///
/// Outcomes from another level or operation type are ignored. Returns `None`
/// when fewer than the level's mastery criterion remain. Otherwise the rate is
/// computed over the most recent `criterion` outcomes only, while the cursor
/// moves past every gathered outcome so surplus is never scored later.
pub fn assess(level: &Level, outcomes: &[Outcome], policy: &ProgressionPolicy) -> Option<Assessment> {
    let mut scoped: Vec<&Outcome> = outcomes
        .iter()
        .filter(|o| o.level_id == level.id && o.operation == level.operation)
        .collect();
    scoped.sort_by_key(|o| o.id);

    let window = usize::try_from(level.mastery_criterion.max(1)).ok()?;
    if scoped.len() < window {
        return None;
    }

    let recent = &scoped[scoped.len() - window..];
    let correct = recent.iter().filter(|o| o.correct).count();
    let rate = success_rate(correct, window);

    Some(Assessment {
        gathered: scoped.len(),
        correct,
        window,
        success_rate: rate,
        decision: policy.decide(rate),
        cursor: scoped.last().map(|o| o.id)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use drill_core::{LearnerId, LevelId, OperandRange, OperationType};

    fn level(criterion: u32) -> Level {
        Level {
            id: LevelId(5),
            operation: OperationType::Addition,
            rank: 5,
            operand1: OperandRange::new(10, 54).unwrap(),
            operand2: OperandRange::new(1, 9).unwrap(),
            mastery_criterion: criterion,
            label: "B1×A1".to_string(),
        }
    }

    fn outcome(id: u64, correct: bool) -> Outcome {
        Outcome {
            id: OutcomeId(id),
            learner_id: LearnerId::new("ada"),
            session_id: None,
            level_id: LevelId(5),
            operation: OperationType::Addition,
            correct,
            corrected: false,
            elapsed_ms: 1000,
            error_magnitude: 0,
            answered_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_too_few_outcomes() {
        let outcomes: Vec<Outcome> = (1..=9).map(|i| outcome(i, true)).collect();
        assert!(assess(&level(10), &outcomes, &ProgressionPolicy::default()).is_none());
        assert!(assess(&level(10), &[], &ProgressionPolicy::default()).is_none());
    }

    #[test]
    fn test_surplus_is_consumed_but_not_scored() {
        // Two old failures, then 9 of the last 10 correct.
        let mut outcomes = vec![outcome(1, false), outcome(2, false)];
        outcomes.extend((3..=12).map(|i| outcome(i, i != 7)));

        let a = assess(&level(10), &outcomes, &ProgressionPolicy::default()).unwrap();
        assert_eq!(a.gathered, 12);
        assert_eq!(a.correct, 9);
        assert_eq!(a.success_rate, 0.9);
        assert_eq!(a.decision, Decision::Advance);
        assert_eq!(a.cursor, OutcomeId(12));
    }

    #[test]
    fn test_foreign_outcomes_are_ignored() {
        let mut outcomes: Vec<Outcome> = (1..=10).map(|i| outcome(i, false)).collect();
        let mut other_level = outcome(11, true);
        other_level.level_id = LevelId(4);
        let mut other_op = outcome(12, true);
        other_op.operation = OperationType::Multiplication;
        outcomes.push(other_level);
        outcomes.push(other_op);

        let a = assess(&level(10), &outcomes, &ProgressionPolicy::default()).unwrap();
        assert_eq!(a.gathered, 10);
        assert_eq!(a.correct, 0);
        assert_eq!(a.decision, Decision::Regress);
        assert_eq!(a.cursor, OutcomeId(10));
    }

    #[test]
    fn test_unsorted_input_uses_identity_order() {
        let mut outcomes: Vec<Outcome> = (1..=4).map(|i| outcome(i, i > 2)).collect();
        outcomes.reverse();
        let a = assess(&level(2), &outcomes, &ProgressionPolicy::default()).unwrap();
        assert_eq!(a.correct, 2);
        assert_eq!(a.cursor, OutcomeId(4));
    }
}
