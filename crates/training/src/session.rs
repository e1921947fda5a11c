//! Per-session answer state.

use std::time::Duration;

use chrono::Utc;
use drill_core::{LearnerId, NewOutcome, Question, SessionId, Time};
use serde::Serialize;

/// Misuse of the session state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Every question has been answered
    #[error("session is finished")]
    Finished,

    /// The current question is waiting for its retry
    #[error("the current question is waiting for a retry")]
    RetryPending,

    /// `retry` was called without a failed first attempt
    #[error("no retry pending")]
    NoPendingRetry,

    /// The picked choice does not exist on the current question
    #[error("no choice {0} on this question")]
    InvalidChoice(usize),
}

/// What an attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptResult {
    /// Right answer; the session moved on
    Correct,
    /// Wrong answer
    Incorrect {
        /// Whether a retry may still be submitted
        can_retry: bool,
    },
}

/// A finished question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// The question
    pub question: Question,
    /// Final verdict
    pub correct: bool,
    /// Correct only on the retry
    pub corrected: bool,
    /// `|given - expected|` of the first attempt
    pub error_magnitude: u64,
    /// Time spent over all attempts
    pub elapsed_ms: u64,
    /// When the question was closed
    pub answered_at: Time,
}

impl Answer {
    /// +1 if correct, -1 otherwise.
    pub fn score(&self) -> i64 {
        if self.correct {
            1
        } else {
            -1
        }
    }

    /// Outcome to persist for this answer.
    pub fn to_outcome(&self, learner: &LearnerId, session: SessionId) -> NewOutcome {
        NewOutcome {
            learner_id: learner.clone(),
            session_id: Some(session),
            level_id: self.question.level_id,
            operation: self.question.operation,
            correct: self.correct,
            corrected: self.corrected,
            elapsed_ms: self.elapsed_ms,
            error_magnitude: self.error_magnitude,
            answered_at: self.answered_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Fresh,
    AwaitingRetry { first_error: u64, elapsed_ms: u64 },
}

/// One learner's drill, owned by the caller.
#[derive(Debug, Clone)]
pub struct TrainingSession {
    id: SessionId,
    learner: LearnerId,
    questions: Vec<Question>,
    answers: Vec<Answer>,
    attempt: Attempt,
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

impl TrainingSession {
    /// Start a session over `questions`, asked in order.
    pub fn new(learner: LearnerId, questions: Vec<Question>) -> Self {
        Self {
            id: SessionId::new(),
            learner,
            questions,
            answers: Vec::new(),
            attempt: Attempt::Fresh,
        }
    }

    /// Session identity.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Learner.
    pub fn learner(&self) -> &LearnerId {
        &self.learner
    }

    /// Planned questions.
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Closed questions, in order.
    pub fn answers(&self) -> &[Answer] {
        &self.answers
    }

    /// Question awaiting an answer.
    pub fn current(&self) -> Option<&Question> {
        self.questions.get(self.answers.len())
    }

    /// Zero-based index of the current question.
    pub fn position(&self) -> usize {
        self.answers.len()
    }

    /// Whether every question is closed.
    pub fn is_finished(&self) -> bool {
        self.current().is_none()
    }

    /// Whether the current question failed once and may be retried.
    pub fn retry_pending(&self) -> bool {
        matches!(self.attempt, Attempt::AwaitingRetry { .. })
    }

    /// Sum of answer scores so far.
    pub fn score(&self) -> i64 {
        self.answers.iter().map(Answer::score).sum()
    }

    /// First attempt at the current question.
    pub fn submit(&mut self, given: i64, elapsed: Duration) -> Result<AttemptResult, SessionError> {
        let question = self.current().cloned().ok_or(SessionError::Finished)?;
        if self.retry_pending() {
            return Err(SessionError::RetryPending);
        }

        let error = question.error_of(given);
        if error == 0 {
            self.close(question, true, false, 0, millis(elapsed));
            return Ok(AttemptResult::Correct);
        }

        self.attempt = Attempt::AwaitingRetry {
            first_error: error,
            elapsed_ms: millis(elapsed),
        };
        Ok(AttemptResult::Incorrect { can_retry: true })
    }

    /// Second and last attempt after a wrong first answer.
    pub fn retry(&mut self, given: i64, elapsed: Duration) -> Result<AttemptResult, SessionError> {
        let question = self.current().cloned().ok_or(SessionError::Finished)?;
        let Attempt::AwaitingRetry { first_error, elapsed_ms } = self.attempt else {
            return Err(SessionError::NoPendingRetry);
        };

        let total = elapsed_ms.saturating_add(millis(elapsed));
        let correct = question.error_of(given) == 0;
        self.close(question, correct, correct, first_error, total);

        Ok(if correct {
            AttemptResult::Correct
        } else {
            AttemptResult::Incorrect { can_retry: false }
        })
    }

    /// First attempt by picking one of the current question's choices.
    pub fn submit_choice(&mut self, index: usize, elapsed: Duration) -> Result<AttemptResult, SessionError> {
        let given = self.picked(index)?;
        self.submit(given, elapsed)
    }

    /// Retry by picking one of the current question's choices.
    pub fn retry_choice(&mut self, index: usize, elapsed: Duration) -> Result<AttemptResult, SessionError> {
        let given = self.picked(index)?;
        self.retry(given, elapsed)
    }

    fn picked(&self, index: usize) -> Result<i64, SessionError> {
        self.current()
            .ok_or(SessionError::Finished)?
            .choice(index)
            .ok_or(SessionError::InvalidChoice(index))
    }

    /// Close the current question as incorrect.
    ///
    /// Giving up before any attempt counts as answering 0.
    pub fn give_up(&mut self) -> Result<(), SessionError> {
        let question = self.current().cloned().ok_or(SessionError::Finished)?;
        let (error, elapsed_ms) = match self.attempt {
            Attempt::AwaitingRetry { first_error, elapsed_ms } => (first_error, elapsed_ms),
            Attempt::Fresh => (question.error_of(0), 0),
        };
        self.close(question, false, false, error, elapsed_ms);
        Ok(())
    }

    /// Split into learner, session identity and closed answers.
    pub fn into_answers(self) -> (LearnerId, SessionId, Vec<Answer>) {
        (self.learner, self.id, self.answers)
    }

    fn close(&mut self, question: Question, correct: bool, corrected: bool, error: u64, elapsed_ms: u64) {
        self.answers.push(Answer {
            question,
            correct,
            corrected,
            error_magnitude: error,
            elapsed_ms,
            answered_at: Utc::now(),
        });
        self.attempt = Attempt::Fresh;
    }
}
