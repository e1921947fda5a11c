//! Session planning.

use std::sync::Arc;

use drill_core::{LearnerId, Level};
use drill_curriculum::{sample_mixed, with_choices, DEFAULT_CHOICES};
use drill_progress::{ProgressError, ProgressionEngine};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::recorder::TrainingError;
use crate::session::TrainingSession;

/// Questions drawn per operation type when nothing else is configured.
pub const DEFAULT_QUESTIONS_PER_OPERATION: usize = 5;

/// How the learner answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    /// Type the number
    #[default]
    Free,
    /// Pick one of the offered choices
    MultipleChoice,
}

/// Training configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Questions drawn from each operation type's current level
    pub questions_per_operation: usize,
    /// Answer mode of planned questions
    pub answer_mode: AnswerMode,
    /// Choices per question in multiple-choice mode
    pub choices: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            questions_per_operation: DEFAULT_QUESTIONS_PER_OPERATION,
            answer_mode: AnswerMode::default(),
            choices: DEFAULT_CHOICES,
        }
    }
}

/// Builds sessions from each track's current level.
pub struct SessionPlanner {
    engine: Arc<ProgressionEngine>,
    config: TrainingConfig,
}

impl SessionPlanner {
    /// Create a planner with the default configuration.
    pub fn new(engine: Arc<ProgressionEngine>) -> Self {
        Self {
            engine,
            config: TrainingConfig::default(),
        }
    }

    /// Set configuration.
    pub fn with_config(mut self, config: TrainingConfig) -> Self {
        self.config = config;
        self
    }

    /// Levels the learner is currently at, initializing missing tracks.
    pub async fn current_levels(&self, learner: &LearnerId) -> Result<Vec<Level>, TrainingError> {
        let checkpoints = self.engine.initialize_all(learner).await?;
        let mut levels = Vec::with_capacity(checkpoints.len());
        for cp in checkpoints {
            let level = self
                .engine
                .storage()
                .get_level(cp.level_id)
                .await?
                .ok_or(ProgressError::MissingLevel(cp.level_id))?;
            levels.push(level);
        }
        Ok(levels)
    }

    /// Plan a shuffled session across every operation type.
    pub async fn plan<R: Rng + ?Sized>(
        &self,
        learner: &LearnerId,
        rng: &mut R,
    ) -> Result<TrainingSession, TrainingError> {
        let levels = self.current_levels(learner).await?;
        let refs: Vec<&Level> = levels.iter().collect();
        let mut questions = sample_mixed(&refs, self.config.questions_per_operation, rng);
        if self.config.answer_mode == AnswerMode::MultipleChoice {
            questions = questions
                .into_iter()
                .map(|q| with_choices(q, self.config.choices, &mut *rng))
                .collect();
        }

        debug!(
            "Planned {} questions for {} at {}",
            questions.len(),
            learner,
            levels.iter().map(|l| l.label.as_str()).collect::<Vec<_>>().join(", ")
        );
        Ok(TrainingSession::new(learner.clone(), questions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drill_core::OperationType;
    use drill_curriculum::{seed_catalog, Catalog, CurriculumConfig};
    use drill_storage::MemoryStorage;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    async fn planner() -> SessionPlanner {
        let storage = Arc::new(MemoryStorage::new());
        seed_catalog(storage.as_ref(), &Catalog::generate(&CurriculumConfig::default()))
            .await
            .unwrap();
        SessionPlanner::new(Arc::new(ProgressionEngine::new(storage)))
    }

    #[tokio::test]
    async fn test_plan_draws_from_every_track() {
        let planner = planner().await.with_config(TrainingConfig {
            questions_per_operation: 4,
            ..TrainingConfig::default()
        });
        let learner = LearnerId::new("ada");
        let session = planner.plan(&learner, &mut StdRng::seed_from_u64(3)).await.unwrap();

        assert_eq!(session.questions().len(), 12);
        for op in OperationType::ALL {
            assert_eq!(session.questions().iter().filter(|q| q.operation == op).count(), 4);
        }
        for q in session.questions() {
            assert!(q.operand1 <= 9 && q.operand2 <= 9);
        }
        assert_eq!(session.position(), 0);
        assert!(session.questions().iter().all(|q| !q.is_multiple_choice()));
    }

    #[tokio::test]
    async fn test_plan_multiple_choice() {
        let planner = planner().await.with_config(TrainingConfig {
            questions_per_operation: 3,
            answer_mode: AnswerMode::MultipleChoice,
            choices: 4,
        });
        let session = planner
            .plan(&LearnerId::new("ada"), &mut StdRng::seed_from_u64(8))
            .await
            .unwrap();

        assert_eq!(session.questions().len(), 9);
        for q in session.questions() {
            assert_eq!(q.choices.len(), 4);
            assert_eq!(q.choices.iter().filter(|c| **c == q.expected).count(), 1);
        }
    }

    #[tokio::test]
    async fn test_plan_initializes_tracks() {
        let planner = planner().await;
        let learner = LearnerId::new("ada");
        let levels = planner.current_levels(&learner).await.unwrap();
        assert_eq!(levels.len(), 3);
        assert!(levels.iter().all(|l| l.rank == 1));
    }

    #[tokio::test]
    async fn test_plan_without_catalog_fails() {
        let planner = SessionPlanner::new(Arc::new(ProgressionEngine::new(Arc::new(MemoryStorage::new()))));
        let err = planner
            .plan(&LearnerId::new("ada"), &mut StdRng::seed_from_u64(0))
            .await
            .unwrap_err();
        assert!(matches!(err, TrainingError::Progress(ProgressError::Configuration(_))));
    }
}
