//! Learner progress views.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drill_core::{Checkpoint, Evolution, LearnerId, Level, OperationType};
use drill_storage::Storage;
use serde::Serialize;

use crate::badges::{BadgeReport, BadgeStats};
use crate::error::{ProgressError, Result};
use crate::stats::{leaderboard, ranking, streak_days, total_score, LeaderboardEntry, Ranking};

/// Read-only progress queries.
#[async_trait]
pub trait ProgressTracker: Send + Sync {
    /// Level the learner is at, or `None` before initialization.
    async fn current_level(&self, learner: &LearnerId, operation: OperationType) -> Result<Option<Level>>;

    /// Checkpoint history, ascending by identity.
    async fn history(&self, learner: &LearnerId, operation: OperationType) -> Result<Vec<Checkpoint>>;

    /// What the latest checkpoint did to the learner's rank.
    async fn level_change(&self, learner: &LearnerId, operation: OperationType) -> Result<Option<LevelChange>>;

    /// Standing on one operation type relative to every other learner.
    async fn ranking(&self, learner: &LearnerId, operation: OperationType) -> Result<Option<Ranking>>;

    /// Take a progress snapshot.
    async fn snapshot(&self, learner: &LearnerId) -> Result<ProgressSnapshot>;

    /// Learners ordered by cumulative score, at most `limit` of them.
    async fn leaderboard(&self, limit: Option<usize>) -> Result<Vec<LeaderboardEntry>>;

    /// Every badge and whether the learner has earned it.
    async fn badges(&self, learner: &LearnerId) -> Result<BadgeReport>;
}

/// The most recent transition of a track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelChange {
    /// Tag of the latest checkpoint
    pub evolution: Evolution,
    /// Rank before it, if there was an earlier checkpoint
    pub previous_rank: Option<u32>,
    /// Rank after it
    pub rank: u32,
}

/// Where a learner stands on one operation type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Standing {
    /// Operation type
    pub operation: OperationType,
    /// Current level
    pub level: Level,
    /// Levels on the ladder
    pub total_levels: usize,
    /// Success rate of the latest checkpoint
    pub success_rate: f64,
    /// Tag of the latest checkpoint
    pub evolution: Evolution,
}

/// A snapshot of progress at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    /// When snapshot was taken
    pub timestamp: DateTime<Utc>,

    /// Learner
    pub learner_id: LearnerId,

    /// One entry per initialized operation type
    pub standings: Vec<Standing>,

    /// Sum of outcome scores
    pub total_score: i64,

    /// Consecutive practice days
    pub streak_days: u32,
}

/// Progress tracker reading straight from a store.
pub struct BasicProgressTracker {
    storage: Arc<dyn Storage>,
}

impl BasicProgressTracker {
    /// Create a new progress tracker.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    async fn level_of(&self, checkpoint: &Checkpoint) -> Result<Level> {
        self.storage
            .get_level(checkpoint.level_id)
            .await?
            .ok_or(ProgressError::MissingLevel(checkpoint.level_id))
    }
}

#[async_trait]
impl ProgressTracker for BasicProgressTracker {
    async fn current_level(&self, learner: &LearnerId, operation: OperationType) -> Result<Option<Level>> {
        match self.storage.get_latest_checkpoint(learner, operation).await? {
            Some(cp) => Ok(Some(self.level_of(&cp).await?)),
            None => Ok(None),
        }
    }

    async fn history(&self, learner: &LearnerId, operation: OperationType) -> Result<Vec<Checkpoint>> {
        Ok(self.storage.list_checkpoints(learner, operation).await?)
    }

    async fn level_change(&self, learner: &LearnerId, operation: OperationType) -> Result<Option<LevelChange>> {
        let history = self.storage.list_checkpoints(learner, operation).await?;
        let Some((latest, earlier)) = history.split_last() else {
            return Ok(None);
        };

        let rank = self.level_of(latest).await?.rank;
        let previous_rank = match earlier.last() {
            Some(prev) => Some(self.level_of(prev).await?.rank),
            None => None,
        };

        Ok(Some(LevelChange {
            evolution: latest.evolution,
            previous_rank,
            rank,
        }))
    }

    async fn ranking(&self, learner: &LearnerId, operation: OperationType) -> Result<Option<Ranking>> {
        let ranks: HashMap<_, _> = self
            .storage
            .get_levels(operation)
            .await?
            .into_iter()
            .map(|l| (l.id, l.rank))
            .collect();
        let checkpoints = self.storage.list_operation_checkpoints(operation).await?;
        Ok(ranking(&checkpoints, &ranks, learner))
    }

    async fn snapshot(&self, learner: &LearnerId) -> Result<ProgressSnapshot> {
        let mut standings = Vec::new();
        for operation in OperationType::ALL {
            let Some(cp) = self.storage.get_latest_checkpoint(learner, operation).await? else {
                continue;
            };
            let level = self.level_of(&cp).await?;
            let total_levels = self.storage.get_levels(operation).await?.len();
            standings.push(Standing {
                operation,
                level,
                total_levels,
                success_rate: cp.success_rate,
                evolution: cp.evolution,
            });
        }

        let outcomes = self.storage.list_outcomes(learner).await?;
        let timestamp = Utc::now();

        Ok(ProgressSnapshot {
            timestamp,
            learner_id: learner.clone(),
            standings,
            total_score: total_score(&outcomes),
            streak_days: streak_days(&outcomes, timestamp.date_naive()),
        })
    }

    async fn leaderboard(&self, limit: Option<usize>) -> Result<Vec<LeaderboardEntry>> {
        let mut histories = Vec::new();
        for learner in self.storage.list_learners().await? {
            let outcomes = self.storage.list_outcomes(&learner).await?;
            histories.push((learner, outcomes));
        }
        Ok(leaderboard(
            histories.iter().map(|(learner, outcomes)| (learner, outcomes.as_slice())),
            limit,
        ))
    }

    async fn badges(&self, learner: &LearnerId) -> Result<BadgeReport> {
        let mut ranks = Vec::new();
        for operation in OperationType::ALL {
            if let Some(cp) = self.storage.get_latest_checkpoint(learner, operation).await? {
                ranks.push(self.level_of(&cp).await?.rank);
            }
        }
        let outcomes = self.storage.list_outcomes(learner).await?;
        let stats = BadgeStats::from_history(&outcomes, &ranks, Utc::now().date_naive());
        Ok(BadgeReport::new(stats))
    }
}
