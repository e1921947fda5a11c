//! Progression engine.
//!
//! Owns the checkpoint state machine for every (learner, operation type)
//! track: the first evaluation initializes a track at rank 1, later ones score
//! the outcomes gathered since the track's cursor and append a new checkpoint.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use drill_core::{Checkpoint, Evolution, LearnerId, Level, NewCheckpoint, OperationType, OutcomeId};
use drill_storage::Storage;
use tracing::{debug, info, warn};

use crate::error::{ProgressError, Result};
use crate::policy::{Decision, ProgressionPolicy};
use crate::window::{assess, Assessment};

/// What a call to [`ProgressionEngine::evaluate`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// The track had no checkpoint; one was written at rank 1
    Initialized(Checkpoint),

    /// A full window was scored and a checkpoint appended
    Evaluated {
        /// The new checkpoint
        checkpoint: Checkpoint,
        /// Rank before the evaluation
        previous_rank: u32,
        /// Rank after the evaluation
        rank: u32,
        /// How the window scored
        assessment: Assessment,
    },

    /// Not enough outcomes since the cursor; nothing was written
    InsufficientData {
        /// Level the learner is at
        level: Level,
        /// Outcomes gathered so far
        gathered: usize,
        /// Outcomes needed
        required: usize,
    },
}

impl Evaluation {
    /// Checkpoint written by this evaluation, if any.
    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        match self {
            Evaluation::Initialized(cp) | Evaluation::Evaluated { checkpoint: cp, .. } => Some(cp),
            Evaluation::InsufficientData { .. } => None,
        }
    }
}

type TrackKey = (LearnerId, OperationType);
type TrackLocks = Mutex<HashMap<TrackKey, Arc<tokio::sync::Mutex<()>>>>;

/// A held track lock. Dropping it releases the track and forgets every track
/// nobody is holding or waiting on, so the map only holds live tracks.
struct TrackGuard<'a> {
    tracks: &'a TrackLocks,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for TrackGuard<'_> {
    fn drop(&mut self) {
        let mut tracks = self.tracks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Released under the map lock: a new caller cannot clone the entry in between.
        self.guard.take();
        tracks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

/// Serializes evaluations per track and appends checkpoints.
pub struct ProgressionEngine {
    storage: Arc<dyn Storage>,
    policy: ProgressionPolicy,
    tracks: TrackLocks,
}

impl ProgressionEngine {
    /// Create an engine with the default policy.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            policy: ProgressionPolicy::default(),
            tracks: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the policy after validating it.
    pub fn with_policy(mut self, policy: ProgressionPolicy) -> Result<Self> {
        policy.validate()?;
        self.policy = policy;
        Ok(self)
    }

    /// Active policy.
    pub fn policy(&self) -> &ProgressionPolicy {
        &self.policy
    }

    /// Underlying store.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Wait for exclusive use of a track.
    async fn lock_track(&self, learner: &LearnerId, operation: OperationType) -> TrackGuard<'_> {
        let lock = {
            let mut tracks = self.tracks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            tracks.entry((learner.clone(), operation)).or_default().clone()
        };
        TrackGuard {
            tracks: &self.tracks,
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.tracks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    /// Make sure the track has a checkpoint, writing the initial one if needed.
    pub async fn initialize(&self, learner: &LearnerId, operation: OperationType) -> Result<Checkpoint> {
        let _track = self.lock_track(learner, operation).await;

        match self.storage.get_latest_checkpoint(learner, operation).await? {
            Some(checkpoint) => Ok(checkpoint),
            None => self.write_initial(learner, operation).await,
        }
    }

    /// Initialize every operation type's track for a learner.
    pub async fn initialize_all(&self, learner: &LearnerId) -> Result<Vec<Checkpoint>> {
        let mut checkpoints = Vec::with_capacity(OperationType::ALL.len());
        for operation in OperationType::ALL {
            checkpoints.push(self.initialize(learner, operation).await?);
        }
        Ok(checkpoints)
    }

    /// Run one progression evaluation for a track.
    ///
    /// Holding the track lock for the whole read-decide-append sequence means
    /// two concurrent calls can never consume the same window twice.
    pub async fn evaluate(&self, learner: &LearnerId, operation: OperationType) -> Result<Evaluation> {
        let _track = self.lock_track(learner, operation).await;

        let Some(latest) = self.storage.get_latest_checkpoint(learner, operation).await? else {
            let checkpoint = self.write_initial(learner, operation).await?;
            return Ok(Evaluation::Initialized(checkpoint));
        };

        let level = self
            .storage
            .get_level(latest.level_id)
            .await?
            .ok_or(ProgressError::MissingLevel(latest.level_id))?;

        let outcomes = self
            .storage
            .get_outcomes(learner, level.id, latest.cursor)
            .await?;

        let Some(assessment) = assess(&level, &outcomes, &self.policy) else {
            let required = level.mastery_criterion as usize;
            debug!(
                "{}/{}: {} of {} outcomes at {}, nothing to do",
                learner,
                operation,
                outcomes.len(),
                required,
                level.label
            );
            return Ok(Evaluation::InsufficientData {
                gathered: outcomes.len(),
                required,
                level,
            });
        };

        let target = self.resolve_target(&level, assessment.decision).await?;
        let checkpoint = self
            .append(NewCheckpoint {
                learner_id: learner.clone(),
                operation,
                level_id: target.id,
                success_rate: assessment.success_rate,
                evolution: assessment.decision.evolution(),
                cursor: assessment.cursor,
                created_at: Utc::now(),
            })
            .await?;

        info!(
            "{}/{}: {} at {:.2} ({}/{}), rank {} -> {}",
            learner,
            operation,
            checkpoint.evolution,
            assessment.success_rate,
            assessment.correct,
            assessment.window,
            level.rank,
            target.rank
        );

        Ok(Evaluation::Evaluated {
            checkpoint,
            previous_rank: level.rank,
            rank: target.rank,
            assessment,
        })
    }

    /// Evaluate every operation type's track for a learner.
    pub async fn evaluate_all(&self, learner: &LearnerId) -> Result<Vec<(OperationType, Evaluation)>> {
        let mut results = Vec::with_capacity(OperationType::ALL.len());
        for operation in OperationType::ALL {
            results.push((operation, self.evaluate(learner, operation).await?));
        }
        Ok(results)
    }

    /// Level to move to; the current one at either end of the ladder.
    async fn resolve_target(&self, level: &Level, decision: Decision) -> Result<Level> {
        let rank = match decision {
            Decision::Advance => level.rank.checked_add(1),
            Decision::Regress if level.is_first() => None,
            Decision::Regress => level.rank.checked_sub(1),
            Decision::Hold => None,
        };
        let Some(rank) = rank else {
            return Ok(level.clone());
        };

        match self.storage.get_level_by_rank(level.operation, rank).await? {
            Some(next) => Ok(next),
            None => {
                debug!("{} has no rank {}, staying at {}", level.operation, rank, level.rank);
                Ok(level.clone())
            }
        }
    }

    async fn write_initial(&self, learner: &LearnerId, operation: OperationType) -> Result<Checkpoint> {
        let first = self
            .storage
            .get_levels(operation)
            .await?
            .into_iter()
            .next()
            .ok_or(ProgressError::Configuration(operation))?;
        let cursor = self
            .storage
            .latest_outcome_id(learner)
            .await?
            .unwrap_or(OutcomeId::NONE);

        let checkpoint = self
            .append(NewCheckpoint {
                learner_id: learner.clone(),
                operation,
                level_id: first.id,
                success_rate: 0.0,
                evolution: Evolution::Initialized,
                cursor,
                created_at: Utc::now(),
            })
            .await?;
        info!("{}/{}: initialized at {} (cursor {})", learner, operation, first.label, cursor);
        Ok(checkpoint)
    }

    async fn append(&self, new: NewCheckpoint) -> Result<Checkpoint> {
        match self.storage.append_checkpoint(new.clone()).await {
            Ok(id) => Ok(new.with_id(id)),
            Err(err) => {
                warn!("Failed to append checkpoint for {}/{}: {}", new.learner_id, new.operation, err);
                Err(err.into())
            }
        }
    }
}
