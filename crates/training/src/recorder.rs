//! Recording finished sessions.

use std::collections::BTreeSet;
use std::sync::Arc;

use drill_core::{LearnerId, OperationType, OutcomeId, SessionId};
use drill_progress::{Evaluation, ProgressError, ProgressionEngine};
use drill_storage::StorageError;
use tracing::info;

use crate::session::{SessionError, TrainingSession};

/// Errors raised while planning or recording a session.
#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    /// Progression failed
    #[error(transparent)]
    Progress(#[from] ProgressError),

    /// Storing outcomes failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The session was driven incorrectly
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// What recording a session did.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Session identity
    pub session_id: SessionId,
    /// Learner
    pub learner_id: LearnerId,
    /// Identities of the appended outcomes, in answer order
    pub outcome_ids: Vec<OutcomeId>,
    /// Correct answers
    pub correct: usize,
    /// Sum of answer scores
    pub score: i64,
    /// One evaluation per operation type that was practiced
    pub evaluations: Vec<(OperationType, Evaluation)>,
}

/// Persists answers and runs progression.
pub struct SessionRecorder {
    engine: Arc<ProgressionEngine>,
}

impl SessionRecorder {
    /// Create a recorder.
    pub fn new(engine: Arc<ProgressionEngine>) -> Self {
        Self { engine }
    }

    /// Append one outcome per closed question, then evaluate each practiced
    /// operation type once.
    ///
    /// Questions left open are dropped.
    pub async fn record(&self, session: TrainingSession) -> Result<SessionReport, TrainingError> {
        let (learner, session_id, answers) = session.into_answers();
        let storage = self.engine.storage();

        let mut outcome_ids = Vec::with_capacity(answers.len());
        let mut practiced = BTreeSet::new();
        for answer in &answers {
            let id = storage.append_outcome(answer.to_outcome(&learner, session_id)).await?;
            outcome_ids.push(id);
            practiced.insert(answer.question.operation);
        }

        let mut evaluations = Vec::with_capacity(practiced.len());
        for operation in practiced {
            evaluations.push((operation, self.engine.evaluate(&learner, operation).await?));
        }

        let correct = answers.iter().filter(|a| a.correct).count();
        let score = answers.iter().map(|a| a.score()).sum();
        info!(
            "Recorded session {} for {}: {}/{} correct",
            session_id,
            learner,
            correct,
            answers.len()
        );

        Ok(SessionReport {
            session_id,
            learner_id: learner,
            outcome_ids,
            correct,
            score,
            evaluations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{AnswerMode, SessionPlanner, TrainingConfig};
    use drill_core::Evolution;
    use drill_curriculum::{seed_catalog, Catalog, CurriculumConfig};
    use drill_storage::{MemoryStorage, Storage};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;

    async fn setup() -> (Arc<MemoryStorage>, SessionPlanner, SessionRecorder) {
        let storage = Arc::new(MemoryStorage::new());
        seed_catalog(storage.as_ref(), &Catalog::generate(&CurriculumConfig::default()))
            .await
            .unwrap();
        let engine = Arc::new(ProgressionEngine::new(storage.clone()));
        let planner = SessionPlanner::new(engine.clone()).with_config(TrainingConfig {
            questions_per_operation: 10,
            ..TrainingConfig::default()
        });
        (storage, planner, SessionRecorder::new(engine))
    }

    #[tokio::test]
    async fn test_perfect_session_advances_every_track() {
        let (storage, planner, recorder) = setup().await;
        let learner = LearnerId::new("ada");
        let mut session = planner.plan(&learner, &mut StdRng::seed_from_u64(11)).await.unwrap();

        while let Some(q) = session.current() {
            let expected = q.expected;
            session.submit(expected, Duration::from_millis(800)).unwrap();
        }
        let report = recorder.record(session).await.unwrap();

        assert_eq!(report.outcome_ids.len(), 30);
        assert!(report.outcome_ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(report.correct, 30);
        assert_eq!(report.score, 30);
        assert_eq!(report.evaluations.len(), 3);
        for (op, evaluation) in &report.evaluations {
            assert_eq!(evaluation.checkpoint().unwrap().evolution, Evolution::Advanced, "{op}");
        }

        let outcomes = storage.list_outcomes(&learner).await.unwrap();
        assert!(outcomes.iter().all(|o| o.session_id == Some(report.session_id)));
    }

    #[tokio::test]
    async fn test_partial_session_only_evaluates_practiced_tracks() {
        let (storage, planner, recorder) = setup().await;
        let learner = LearnerId::new("ada");
        let mut session = planner.plan(&learner, &mut StdRng::seed_from_u64(5)).await.unwrap();

        let first_op = session.current().unwrap().operation;
        session.give_up().unwrap();
        let report = recorder.record(session).await.unwrap();

        assert_eq!(report.outcome_ids.len(), 1);
        assert_eq!(report.score, -1);
        assert_eq!(report.evaluations.len(), 1);
        assert_eq!(report.evaluations[0].0, first_op);
        assert!(matches!(
            report.evaluations[0].1,
            Evaluation::InsufficientData { gathered: 1, required: 10, .. }
        ));

        let outcome = &storage.list_outcomes(&learner).await.unwrap()[0];
        assert!(!outcome.correct);
    }

    #[tokio::test]
    async fn test_multiple_choice_session_is_recorded_like_free_answers() {
        let (storage, planner, recorder) = setup().await;
        let planner = planner.with_config(TrainingConfig {
            questions_per_operation: 10,
            answer_mode: AnswerMode::MultipleChoice,
            choices: 4,
        });
        let learner = LearnerId::new("ada");
        let mut session = planner.plan(&learner, &mut StdRng::seed_from_u64(13)).await.unwrap();

        // Every addition is first picked wrong then fixed on the retry.
        while let Some(q) = session.current() {
            let right = q.choices.iter().position(|c| *c == q.expected).unwrap();
            let wrong = (right + 1) % q.choices.len();
            if q.operation == OperationType::Addition {
                session.submit_choice(wrong, Duration::from_millis(900)).unwrap();
                session.retry_choice(right, Duration::from_millis(600)).unwrap();
            } else {
                session.submit_choice(right, Duration::from_millis(700)).unwrap();
            }
        }
        let report = recorder.record(session).await.unwrap();
        assert_eq!(report.correct, 30);

        let outcomes = storage.list_outcomes(&learner).await.unwrap();
        let additions: Vec<_> = outcomes.iter().filter(|o| o.operation == OperationType::Addition).collect();
        assert_eq!(additions.len(), 10);
        assert!(additions.iter().all(|o| o.corrected && o.elapsed_ms == 1500 && o.error_magnitude > 0));
        assert!(outcomes
            .iter()
            .filter(|o| o.operation != OperationType::Addition)
            .all(|o| !o.corrected && o.error_magnitude == 0));

        for (op, evaluation) in &report.evaluations {
            assert_eq!(evaluation.checkpoint().unwrap().evolution, Evolution::Advanced, "{op}");
        }
    }

    #[tokio::test]
    async fn test_empty_session_writes_nothing() {
        let (storage, _, recorder) = setup().await;
        let learner = LearnerId::new("ada");
        let report = recorder
            .record(TrainingSession::new(learner.clone(), Vec::new()))
            .await
            .unwrap();
        assert!(report.outcome_ids.is_empty());
        assert!(report.evaluations.is_empty());
        assert!(storage.list_outcomes(&learner).await.unwrap().is_empty());
    }
}
