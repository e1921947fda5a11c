//! JSON file storage implementation.
//!
//! Stores one JSON file per entity under a data directory and keeps a small
//! per-kind sequence marker (last id + updated_at) under `meta/`.
//!
//! Every write holds an exclusive lock on `meta/.lock`, so handles in
//! different processes (or several handles in one process) never hand out the
//! same identity. Files are written to a uniquely named temp file in the
//! target directory and then persisted; new records refuse to replace an
//! existing file, so a record is either fully present or absent.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use async_trait::async_trait;
use drill_core::{
    Checkpoint, CheckpointId, LearnerId, Level, LevelId, NewCheckpoint, NewOutcome,
    OperationType, Outcome, OutcomeId,
};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::trait_::{check_cursor, Result, Storage, StorageError};

const LEVELS: &str = "levels";
const OUTCOMES: &str = "outcomes";
const CHECKPOINTS: &str = "checkpoints";
const META: &str = "meta";
const LOCK_FILE: &str = ".lock";

#[derive(Debug, Default, Serialize, Deserialize)]
struct SequenceMeta {
    last_id: u64,
    #[serde(default)]
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// How a file is put in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Persist {
    /// Fail with a conflict if the target exists
    Create,
    /// Overwrite the target
    Replace,
}

/// Exclusive lock on the data directory, released on drop.
struct DirLock {
    _file: File,
}

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
    /// Serializes writers of this handle before they queue on the file lock
    write_lock: Mutex<()>,
}

impl JsonStorage {
    /// Create storage, creating the data and meta subdirectories if needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join(LEVELS)).await?;
        fs::create_dir_all(root.join(OUTCOMES)).await?;
        fs::create_dir_all(root.join(CHECKPOINTS)).await?;
        fs::create_dir_all(root.join(META)).await?;

        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Root data directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn level_path(&self, id: LevelId) -> PathBuf {
        self.root.join(LEVELS).join(format!("{:06}.json", id.get()))
    }
    fn outcome_path(&self, id: OutcomeId) -> PathBuf {
        self.root.join(OUTCOMES).join(format!("{:012}.json", id.get()))
    }
    fn checkpoint_path(&self, id: CheckpointId) -> PathBuf {
        self.root.join(CHECKPOINTS).join(format!("{:012}.json", id.get()))
    }

    fn meta_path(&self, kind: &str) -> PathBuf {
        self.root.join(META).join(format!("{}.seq.json", kind))
    }

    /// Take the cross-process directory lock.
    async fn lock_dir(&self) -> Result<DirLock> {
        let path = self.root.join(META).join(LOCK_FILE);
        tokio::task::spawn_blocking(move || -> Result<DirLock> {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)?;
            fs4::fs_std::FileExt::lock_exclusive(&file)?;
            Ok(DirLock { _file: file })
        })
        .await
        .map_err(|e| StorageError::Backend(format!("directory lock task failed: {e}")))?
    }

    /// Read and increment the per-kind sequence, return the new id.
    ///
    /// Callers must hold the directory lock.
    async fn next_id(&self, kind: &str) -> Result<u64> {
        let path = self.meta_path(kind);
        let mut meta: SequenceMeta = read_json(&path).await?.unwrap_or_default();
        meta.last_id += 1;
        meta.updated_at = Some(chrono::Utc::now());
        write_file(path, serde_json::to_vec_pretty(&meta)?, Persist::Replace).await?;
        Ok(meta.last_id)
    }

    async fn all_outcomes(&self) -> Result<Vec<Outcome>> {
        let mut outcomes: Vec<Outcome> = list_dir(&self.root.join(OUTCOMES)).await?;
        outcomes.sort_by_key(|o| o.id);
        Ok(outcomes)
    }

    async fn all_checkpoints(&self) -> Result<Vec<Checkpoint>> {
        let mut checkpoints: Vec<Checkpoint> = list_dir(&self.root.join(CHECKPOINTS)).await?;
        checkpoints.sort_by_key(|c| c.id);
        Ok(checkpoints)
    }
}

#[async_trait]
impl Storage for JsonStorage {
    async fn save_levels(&self, levels: &[Level]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let _dir = self.lock_dir().await?;
        for level in levels {
            let json = serde_json::to_vec_pretty(level)?;
            write_file(self.level_path(level.id), json, Persist::Replace).await?;
        }
        debug!("Saved {} levels", levels.len());
        Ok(())
    }

    async fn get_levels(&self, operation: OperationType) -> Result<Vec<Level>> {
        let all: Vec<Level> = list_dir(&self.root.join(LEVELS)).await?;
        let mut levels: Vec<Level> = all.into_iter().filter(|l| l.operation == operation).collect();
        levels.sort_by_key(|l| l.rank);
        Ok(levels)
    }

    async fn get_level(&self, id: LevelId) -> Result<Option<Level>> {
        read_json(&self.level_path(id)).await
    }

    async fn get_level_by_rank(&self, operation: OperationType, rank: u32) -> Result<Option<Level>> {
        Ok(self
            .get_levels(operation)
            .await?
            .into_iter()
            .find(|l| l.rank == rank))
    }

    async fn append_outcome(&self, outcome: NewOutcome) -> Result<OutcomeId> {
        let _guard = self.write_lock.lock().await;
        let _dir = self.lock_dir().await?;
        let id = OutcomeId(self.next_id(OUTCOMES).await?);
        let json = serde_json::to_vec_pretty(&outcome.with_id(id))?;
        write_file(self.outcome_path(id), json, Persist::Create).await?;
        Ok(id)
    }

    async fn get_outcomes(
        &self,
        learner: &LearnerId,
        level: LevelId,
        after: OutcomeId,
    ) -> Result<Vec<Outcome>> {
        Ok(self
            .all_outcomes()
            .await?
            .into_iter()
            .filter(|o| o.id > after && o.level_id == level && &o.learner_id == learner)
            .collect())
    }

    async fn list_outcomes(&self, learner: &LearnerId) -> Result<Vec<Outcome>> {
        Ok(self
            .all_outcomes()
            .await?
            .into_iter()
            .filter(|o| &o.learner_id == learner)
            .collect())
    }

    async fn latest_outcome_id(&self, learner: &LearnerId) -> Result<Option<OutcomeId>> {
        Ok(self.list_outcomes(learner).await?.last().map(|o| o.id))
    }

    async fn list_learners(&self) -> Result<Vec<LearnerId>> {
        let mut learners: Vec<LearnerId> = self
            .all_outcomes()
            .await?
            .into_iter()
            .map(|o| o.learner_id)
            .chain(self.all_checkpoints().await?.into_iter().map(|c| c.learner_id))
            .collect();
        learners.sort();
        learners.dedup();
        Ok(learners)
    }

    async fn append_checkpoint(&self, checkpoint: NewCheckpoint) -> Result<CheckpointId> {
        let _guard = self.write_lock.lock().await;
        let _dir = self.lock_dir().await?;
        let latest = self
            .get_latest_checkpoint(&checkpoint.learner_id, checkpoint.operation)
            .await?;
        check_cursor(latest.as_ref(), &checkpoint)?;

        let id = CheckpointId(self.next_id(CHECKPOINTS).await?);
        let json = serde_json::to_vec_pretty(&checkpoint.with_id(id))?;
        write_file(self.checkpoint_path(id), json, Persist::Create).await?;
        Ok(id)
    }

    async fn get_latest_checkpoint(
        &self,
        learner: &LearnerId,
        operation: OperationType,
    ) -> Result<Option<Checkpoint>> {
        Ok(self.list_checkpoints(learner, operation).await?.pop())
    }

    async fn list_checkpoints(
        &self,
        learner: &LearnerId,
        operation: OperationType,
    ) -> Result<Vec<Checkpoint>> {
        Ok(self
            .all_checkpoints()
            .await?
            .into_iter()
            .filter(|c| &c.learner_id == learner && c.operation == operation)
            .collect())
    }

    async fn list_operation_checkpoints(&self, operation: OperationType) -> Result<Vec<Checkpoint>> {
        Ok(self
            .all_checkpoints()
            .await?
            .into_iter()
            .filter(|c| c.operation == operation)
            .collect())
    }
}

/// Write `bytes` to a fresh temp file next to `path`, then move it into place.
async fn write_file(path: PathBuf, bytes: Vec<u8>, mode: Persist) -> Result<()> {
    tokio::task::spawn_blocking(move || -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| StorageError::Backend(format!("{} has no parent", path.display())))?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;

        let persisted = match mode {
            Persist::Create => tmp.persist_noclobber(&path),
            Persist::Replace => tmp.persist(&path),
        };
        match persisted {
            Ok(_) => Ok(()),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                warn!("Refusing to overwrite {}", path.display());
                Err(StorageError::Conflict(format!("{} already exists", path.display())))
            }
            Err(e) => Err(e.error.into()),
        }
    })
    .await
    .map_err(|e| StorageError::Backend(format!("write task failed: {e}")))?
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Read every `*.json` file of a directory. Temp files are skipped.
async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        if let Some(item) = read_json(&entry.path()).await? {
            items.push(item);
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drill_core::{Evolution, OperandRange};
    use std::sync::Arc;

    fn level(id: u64, rank: u32) -> Level {
        Level {
            id: LevelId(id),
            operation: OperationType::Multiplication,
            rank,
            operand1: OperandRange::new(1, 5).unwrap(),
            operand2: OperandRange::new(6, 9).unwrap(),
            mastery_criterion: 10,
            label: "A1×A2".to_string(),
        }
    }

    fn outcome(level: u64, correct: bool) -> NewOutcome {
        NewOutcome {
            learner_id: LearnerId::new("ada"),
            session_id: None,
            level_id: LevelId(level),
            operation: OperationType::Multiplication,
            correct,
            corrected: false,
            elapsed_ms: 800,
            error_magnitude: if correct { 0 } else { 3 },
            answered_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_levels_persist_and_sort() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();

        storage.save_levels(&[level(12, 2), level(11, 1)]).await.unwrap();

        let levels = storage.get_levels(OperationType::Multiplication).await.unwrap();
        assert_eq!(levels.iter().map(|l| l.rank).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(storage.get_level(LevelId(12)).await.unwrap().unwrap().rank, 2);
        assert!(storage.get_level(LevelId(99)).await.unwrap().is_none());
        assert!(storage.get_levels(OperationType::Addition).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_outcome_ids_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let first = {
            let storage = JsonStorage::new(dir.path()).await.unwrap();
            storage.append_outcome(outcome(1, true)).await.unwrap();
            storage.append_outcome(outcome(1, false)).await.unwrap()
        };

        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let next = storage.append_outcome(outcome(1, true)).await.unwrap();
        assert!(next > first);

        let learner = LearnerId::new("ada");
        let all = storage.get_outcomes(&learner, LevelId(1), OutcomeId::NONE).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));
        assert_eq!(storage.latest_outcome_id(&learner).await.unwrap(), Some(next));
    }

    #[tokio::test]
    async fn test_checkpoints_append_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let learner = LearnerId::new("ada");

        for (cursor, evolution) in [(0, Evolution::Initialized), (10, Evolution::Held)] {
            storage
                .append_checkpoint(NewCheckpoint {
                    learner_id: learner.clone(),
                    operation: OperationType::Multiplication,
                    level_id: LevelId(11),
                    success_rate: 0.6,
                    evolution,
                    cursor: OutcomeId(cursor),
                    created_at: chrono::Utc::now(),
                })
                .await
                .unwrap();
        }

        let latest = storage
            .get_latest_checkpoint(&learner, OperationType::Multiplication)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.evolution, Evolution::Held);
        assert_eq!(latest.cursor, OutcomeId(10));
        assert!(storage
            .get_latest_checkpoint(&learner, OperationType::Addition)
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            storage.list_operation_checkpoints(OperationType::Multiplication).await.unwrap().len(),
            2
        );
    }

    fn checkpoint(learner: &str, cursor: u64) -> NewCheckpoint {
        NewCheckpoint {
            learner_id: LearnerId::new(learner),
            operation: OperationType::Multiplication,
            level_id: LevelId(11),
            success_rate: 0.5,
            evolution: Evolution::Held,
            cursor: OutcomeId(cursor),
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_checkpoint_cursor_regression_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();

        storage.append_checkpoint(checkpoint("ada", 10)).await.unwrap();
        let err = storage.append_checkpoint(checkpoint("ada", 5)).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        // Same cursor is fine, other learners are independent.
        storage.append_checkpoint(checkpoint("ada", 10)).await.unwrap();
        storage.append_checkpoint(checkpoint("bob", 1)).await.unwrap();

        let history = storage
            .list_checkpoints(&LearnerId::new("ada"), OperationType::Multiplication)
            .await
            .unwrap();
        assert_eq!(history.iter().map(|c| c.cursor).collect::<Vec<_>>(), vec![OutcomeId(10); 2]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_handles_share_one_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let a = Arc::new(JsonStorage::new(dir.path()).await.unwrap());
        let b = Arc::new(JsonStorage::new(dir.path()).await.unwrap());

        let mut tasks = Vec::new();
        for i in 0..120 {
            let storage = if i % 2 == 0 { a.clone() } else { b.clone() };
            tasks.push(tokio::spawn(async move {
                storage.append_outcome(outcome(1, i % 3 == 0)).await
            }));
        }

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 120);
        assert_eq!(ids.first(), Some(&OutcomeId(1)));
        assert_eq!(ids.last(), Some(&OutcomeId(120)));

        let files = std::fs::read_dir(dir.path().join(OUTCOMES)).unwrap().count();
        assert_eq!(files, 120);
        assert_eq!(a.list_outcomes(&LearnerId::new("ada")).await.unwrap().len(), 120);
        assert_eq!(b.latest_outcome_id(&LearnerId::new("ada")).await.unwrap(), Some(OutcomeId(120)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_handles_cannot_regress_a_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let a = JsonStorage::new(dir.path()).await.unwrap();
        let b = JsonStorage::new(dir.path()).await.unwrap();

        a.append_checkpoint(checkpoint("ada", 20)).await.unwrap();
        let err = b.append_checkpoint(checkpoint("ada", 19)).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        let id = b.append_checkpoint(checkpoint("ada", 21)).await.unwrap();
        let latest = a
            .get_latest_checkpoint(&LearnerId::new("ada"), OperationType::Multiplication)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, id);
        assert_eq!(id, CheckpointId(2));
    }

    #[tokio::test]
    async fn test_existing_record_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let id = storage.append_outcome(outcome(1, true)).await.unwrap();

        // A stale sequence marker would hand out the same id again.
        std::fs::remove_file(storage.meta_path(OUTCOMES)).unwrap();
        let err = storage.append_outcome(outcome(1, false)).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        let kept = storage.list_outcomes(&LearnerId::new("ada")).await.unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, id);
        assert!(kept[0].correct);

        let leftovers = std::fs::read_dir(dir.path().join(OUTCOMES))
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().extension().is_none())
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_list_learners_is_sorted_and_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        assert!(storage.list_learners().await.unwrap().is_empty());

        storage.append_outcome(outcome(1, true)).await.unwrap();
        storage.append_outcome(outcome(1, true)).await.unwrap();
        storage.append_checkpoint(checkpoint("zoe", 0)).await.unwrap();
        storage.append_checkpoint(checkpoint("bob", 0)).await.unwrap();

        assert_eq!(
            storage.list_learners().await.unwrap(),
            vec![LearnerId::new("ada"), LearnerId::new("bob"), LearnerId::new("zoe")]
        );
    }
}
