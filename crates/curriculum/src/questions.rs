//! Question sampling from a level.

use std::collections::BTreeSet;

use drill_core::{Level, OperationType, Question};
use rand::seq::SliceRandom;
use rand::Rng;

/// Choices offered for a multiple-choice question.
pub const DEFAULT_CHOICES: usize = 4;

/// Draw one question with operands uniform over the level's ranges.
pub fn sample_question<R: Rng + ?Sized>(level: &Level, rng: &mut R) -> Question {
    let a = rng.gen_range(level.operand1.min..=level.operand1.max);
    let b = rng.gen_range(level.operand2.min..=level.operand2.max);
    Question::new(level.id, level.operation, a, b)
}

/// Draw `count` questions from each level and shuffle them together.
pub fn sample_mixed<R: Rng + ?Sized>(levels: &[&Level], count: usize, rng: &mut R) -> Vec<Question> {
    let mut questions = Vec::with_capacity(levels.len() * count);
    for level in levels {
        for _ in 0..count {
            questions.push(sample_question(level, rng));
        }
    }
    questions.shuffle(rng);
    questions
}

/// Wrong answers a learner might plausibly give, ascending.
///
/// Off-by-one, off-by-two and off-by-ten slips, the neighbouring products of a
/// multiplication, and the sign slip of a subtraction. Negative values are left
/// out when the solution is not negative.
pub fn distractors(question: &Question) -> Vec<i64> {
    let expected = question.expected;
    let (a, b, op) = (question.operand1, question.operand2, question.operation);

    let mut candidates: BTreeSet<i64> = [-10, -2, -1, 1, 2, 10]
        .iter()
        .filter_map(|d| expected.checked_add(*d))
        .collect();
    match op {
        OperationType::Multiplication => {
            candidates.insert(op.apply(a, b.saturating_add(1)));
            candidates.insert(op.apply(a.saturating_add(1), b));
            if b > 0 {
                candidates.insert(op.apply(a, b - 1));
            }
            if a > 0 {
                candidates.insert(op.apply(a - 1, b));
            }
        }
        OperationType::Subtraction => {
            candidates.insert(op.apply(b, a));
        }
        OperationType::Addition => {}
    }

    candidates.remove(&expected);
    if expected >= 0 {
        candidates.retain(|c| *c >= 0);
    }
    candidates.into_iter().collect()
}

/// Turn `question` into a multiple-choice question with `count` shuffled
/// choices, exactly one of them correct.
///
/// A `count` below 2 leaves the question free-answer.
pub fn with_choices<R: Rng + ?Sized>(mut question: Question, count: usize, rng: &mut R) -> Question {
    if count < 2 {
        return question;
    }
    let wanted = count - 1;

    let pool = distractors(&question);
    let mut choices: Vec<i64> = pool.choose_multiple(rng, wanted).copied().collect();
    let mut step = 3;
    while choices.len() < wanted {
        let Some(extra) = question.expected.checked_add(step) else {
            break;
        };
        if !choices.contains(&extra) {
            choices.push(extra);
        }
        step += 1;
    }

    choices.push(question.expected);
    choices.shuffle(rng);
    question.choices = choices;
    question
}
