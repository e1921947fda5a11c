//! In-memory storage backend.
//!
//! Keeps everything in process memory. Used by tests and as a scratch store.

use std::collections::{BTreeMap, BTreeSet};
use async_trait::async_trait;
use drill_core::{
    Checkpoint, CheckpointId, LearnerId, Level, LevelId, NewCheckpoint, NewOutcome,
    OperationType, Outcome, OutcomeId,
};
use tokio::sync::RwLock;

use super::trait_::{check_cursor, Result, Storage};

#[derive(Default)]
struct State {
    levels: BTreeMap<LevelId, Level>,
    outcomes: Vec<Outcome>,
    checkpoints: Vec<Checkpoint>,
}

/// Process-local storage backend.
#[derive(Default)]
pub struct MemoryStorage {
    state: RwLock<State>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save_levels(&self, levels: &[Level]) -> Result<()> {
        let mut state = self.state.write().await;
        for level in levels {
            state.levels.insert(level.id, level.clone());
        }
        Ok(())
    }

    async fn get_levels(&self, operation: OperationType) -> Result<Vec<Level>> {
        let state = self.state.read().await;
        let mut levels: Vec<Level> = state
            .levels
            .values()
            .filter(|l| l.operation == operation)
            .cloned()
            .collect();
        levels.sort_by_key(|l| l.rank);
        Ok(levels)
    }

    async fn get_level(&self, id: LevelId) -> Result<Option<Level>> {
        Ok(self.state.read().await.levels.get(&id).cloned())
    }

    async fn get_level_by_rank(&self, operation: OperationType, rank: u32) -> Result<Option<Level>> {
        let state = self.state.read().await;
        Ok(state
            .levels
            .values()
            .find(|l| l.operation == operation && l.rank == rank)
            .cloned())
    }

    async fn append_outcome(&self, outcome: NewOutcome) -> Result<OutcomeId> {
        let mut state = self.state.write().await;
        let id = OutcomeId(state.outcomes.last().map_or(0, |o| o.id.get()) + 1);
        state.outcomes.push(outcome.with_id(id));
        Ok(id)
    }

    async fn get_outcomes(
        &self,
        learner: &LearnerId,
        level: LevelId,
        after: OutcomeId,
    ) -> Result<Vec<Outcome>> {
        let state = self.state.read().await;
        Ok(state
            .outcomes
            .iter()
            .filter(|o| o.id > after && o.level_id == level && &o.learner_id == learner)
            .cloned()
            .collect())
    }

    async fn list_outcomes(&self, learner: &LearnerId) -> Result<Vec<Outcome>> {
        let state = self.state.read().await;
        Ok(state
            .outcomes
            .iter()
            .filter(|o| &o.learner_id == learner)
            .cloned()
            .collect())
    }

    async fn latest_outcome_id(&self, learner: &LearnerId) -> Result<Option<OutcomeId>> {
        let state = self.state.read().await;
        Ok(state
            .outcomes
            .iter()
            .rev()
            .find(|o| &o.learner_id == learner)
            .map(|o| o.id))
    }

    async fn list_learners(&self) -> Result<Vec<LearnerId>> {
        let state = self.state.read().await;
        let learners: BTreeSet<&LearnerId> = state
            .outcomes
            .iter()
            .map(|o| &o.learner_id)
            .chain(state.checkpoints.iter().map(|c| &c.learner_id))
            .collect();
        Ok(learners.into_iter().cloned().collect())
    }

    async fn append_checkpoint(&self, checkpoint: NewCheckpoint) -> Result<CheckpointId> {
        let mut state = self.state.write().await;
        let latest = state
            .checkpoints
            .iter()
            .rev()
            .find(|c| c.learner_id == checkpoint.learner_id && c.operation == checkpoint.operation);
        check_cursor(latest, &checkpoint)?;

        let id = CheckpointId(state.checkpoints.last().map_or(0, |c| c.id.get()) + 1);
        state.checkpoints.push(checkpoint.with_id(id));
        Ok(id)
    }

    async fn get_latest_checkpoint(
        &self,
        learner: &LearnerId,
        operation: OperationType,
    ) -> Result<Option<Checkpoint>> {
        let state = self.state.read().await;
        Ok(state
            .checkpoints
            .iter()
            .rev()
            .find(|c| &c.learner_id == learner && c.operation == operation)
            .cloned())
    }

    async fn list_checkpoints(
        &self,
        learner: &LearnerId,
        operation: OperationType,
    ) -> Result<Vec<Checkpoint>> {
        let state = self.state.read().await;
        Ok(state
            .checkpoints
            .iter()
            .filter(|c| &c.learner_id == learner && c.operation == operation)
            .cloned()
            .collect())
    }

    async fn list_operation_checkpoints(&self, operation: OperationType) -> Result<Vec<Checkpoint>> {
        let state = self.state.read().await;
        Ok(state
            .checkpoints
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect())
    }
}
