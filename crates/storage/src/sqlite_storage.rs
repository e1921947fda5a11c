//! SQLite storage backend.
//!
//! Relational layout with one table per entity. Identities come from
//! `INTEGER PRIMARY KEY AUTOINCREMENT`, so they strictly increase and are never
//! reused. Checkpoints are appended with a single conditional `INSERT`, which
//! makes the cursor check and the write one atomic statement.

use std::path::Path;
use std::str::FromStr;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drill_core::{
    Checkpoint, CheckpointId, Evolution, LearnerId, Level, LevelId, NewCheckpoint, NewOutcome,
    OperandRange, OperationType, Outcome, OutcomeId, SessionId,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::debug;

use super::trait_::{Result, Storage, StorageError};

/// SQLite storage implementation.
#[derive(Clone)]
pub struct SqliteStorage {
    /// Database connection pool
    pool: sqlx::SqlitePool,
}

fn db_err(e: sqlx::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

fn decode_err(what: &str, value: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(format!("invalid {what} in database: {value}"))
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

impl SqliteStorage {
    /// Create a new SQLite storage instance from a connection URL.
    pub async fn new(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)
            .map_err(db_err)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;

        Ok(storage)
    }

    /// Create a new SQLite storage instance from a path.
    pub async fn new_from_path(path: &Path) -> Result<Self> {
        Self::new(&format!("sqlite://{}", path.display())).await
    }

    /// Create an in-memory SQLite storage for testing.
    ///
    /// A single connection is kept so every query sees the same database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;

        Ok(storage)
    }

    /// Initialize the database schema.
    async fn init_schema(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS levels (
                id INTEGER PRIMARY KEY,
                operation TEXT NOT NULL,
                rank INTEGER NOT NULL,
                operand1_min INTEGER NOT NULL,
                operand1_max INTEGER NOT NULL,
                operand2_min INTEGER NOT NULL,
                operand2_max INTEGER NOT NULL,
                mastery_criterion INTEGER NOT NULL,
                label TEXT NOT NULL,
                UNIQUE (operation, rank)
            )",
            "CREATE TABLE IF NOT EXISTS outcomes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                learner_id TEXT NOT NULL,
                session_id TEXT,
                level_id INTEGER NOT NULL REFERENCES levels(id),
                operation TEXT NOT NULL,
                correct INTEGER NOT NULL,
                corrected INTEGER NOT NULL,
                elapsed_ms INTEGER NOT NULL,
                error_magnitude INTEGER NOT NULL,
                answered_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS checkpoints (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                learner_id TEXT NOT NULL,
                operation TEXT NOT NULL,
                level_id INTEGER NOT NULL REFERENCES levels(id),
                success_rate REAL NOT NULL,
                evolution TEXT NOT NULL,
                cursor INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_outcomes_window ON outcomes(learner_id, level_id, id)",
            "CREATE INDEX IF NOT EXISTS idx_checkpoints_track ON checkpoints(learner_id, operation, id)",
        ];

        for sql in statements {
            sqlx::query(sql).execute(&self.pool).await.map_err(db_err)?;
        }

        Ok(())
    }

    /// Check if the database is healthy.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    fn level_from_row(row: &SqliteRow) -> Result<Level> {
        let operation: String = row.try_get("operation").map_err(db_err)?;
        let range = |min: &str, max: &str| -> Result<OperandRange> {
            let lo: i64 = row.try_get(min).map_err(db_err)?;
            let hi: i64 = row.try_get(max).map_err(db_err)?;
            OperandRange::new(to_u64(lo), to_u64(hi))
                .ok_or_else(|| decode_err("operand range", format!("[{lo}, {hi}]")))
        };

        Ok(Level {
            id: LevelId(to_u64(row.try_get("id").map_err(db_err)?)),
            operation: OperationType::from_str(&operation).map_err(|e| decode_err("operation", e))?,
            rank: row.try_get::<u32, _>("rank").map_err(db_err)?,
            operand1: range("operand1_min", "operand1_max")?,
            operand2: range("operand2_min", "operand2_max")?,
            mastery_criterion: row.try_get::<u32, _>("mastery_criterion").map_err(db_err)?,
            label: row.try_get("label").map_err(db_err)?,
        })
    }

    fn outcome_from_row(row: &SqliteRow) -> Result<Outcome> {
        let operation: String = row.try_get("operation").map_err(db_err)?;
        let session: Option<String> = row.try_get("session_id").map_err(db_err)?;
        let session_id = session
            .map(|s| SessionId::from_str(&s).map_err(|e| decode_err("session id", e)))
            .transpose()?;

        Ok(Outcome {
            id: OutcomeId(to_u64(row.try_get("id").map_err(db_err)?)),
            learner_id: LearnerId::new(row.try_get::<String, _>("learner_id").map_err(db_err)?),
            session_id,
            level_id: LevelId(to_u64(row.try_get("level_id").map_err(db_err)?)),
            operation: OperationType::from_str(&operation).map_err(|e| decode_err("operation", e))?,
            correct: row.try_get("correct").map_err(db_err)?,
            corrected: row.try_get("corrected").map_err(db_err)?,
            elapsed_ms: to_u64(row.try_get("elapsed_ms").map_err(db_err)?),
            error_magnitude: to_u64(row.try_get("error_magnitude").map_err(db_err)?),
            answered_at: row.try_get::<DateTime<Utc>, _>("answered_at").map_err(db_err)?,
        })
    }

    fn checkpoint_from_row(row: &SqliteRow) -> Result<Checkpoint> {
        let operation: String = row.try_get("operation").map_err(db_err)?;
        let evolution: String = row.try_get("evolution").map_err(db_err)?;

        Ok(Checkpoint {
            id: CheckpointId(to_u64(row.try_get("id").map_err(db_err)?)),
            learner_id: LearnerId::new(row.try_get::<String, _>("learner_id").map_err(db_err)?),
            operation: OperationType::from_str(&operation).map_err(|e| decode_err("operation", e))?,
            level_id: LevelId(to_u64(row.try_get("level_id").map_err(db_err)?)),
            success_rate: row.try_get("success_rate").map_err(db_err)?,
            evolution: Evolution::from_str(&evolution).map_err(|e| decode_err("evolution", e))?,
            cursor: OutcomeId(to_u64(row.try_get("cursor").map_err(db_err)?)),
            created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(db_err)?,
        })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    // === Level catalog ===

    async fn save_levels(&self, levels: &[Level]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for level in levels {
            sqlx::query(
                "INSERT OR REPLACE INTO levels
                    (id, operation, rank, operand1_min, operand1_max, operand2_min, operand2_max,
                     mastery_criterion, label)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(to_i64(level.id.get()))
            .bind(level.operation.as_str())
            .bind(level.rank)
            .bind(to_i64(level.operand1.min))
            .bind(to_i64(level.operand1.max))
            .bind(to_i64(level.operand2.min))
            .bind(to_i64(level.operand2.max))
            .bind(level.mastery_criterion)
            .bind(&level.label)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        debug!("Saved {} levels", levels.len());
        Ok(())
    }

    async fn get_levels(&self, operation: OperationType) -> Result<Vec<Level>> {
        let rows = sqlx::query("SELECT * FROM levels WHERE operation = ? ORDER BY rank")
            .bind(operation.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter().map(Self::level_from_row).collect()
    }

    async fn get_level(&self, id: LevelId) -> Result<Option<Level>> {
        let row = sqlx::query("SELECT * FROM levels WHERE id = ?")
            .bind(to_i64(id.get()))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(Self::level_from_row).transpose()
    }

    async fn get_level_by_rank(&self, operation: OperationType, rank: u32) -> Result<Option<Level>> {
        let row = sqlx::query("SELECT * FROM levels WHERE operation = ? AND rank = ?")
            .bind(operation.as_str())
            .bind(rank)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(Self::level_from_row).transpose()
    }

    // === Outcomes ===

    async fn append_outcome(&self, outcome: NewOutcome) -> Result<OutcomeId> {
        let result = sqlx::query(
            "INSERT INTO outcomes
                (learner_id, session_id, level_id, operation, correct, corrected, elapsed_ms,
                 error_magnitude, answered_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(outcome.learner_id.as_str())
        .bind(outcome.session_id.map(|s| s.to_string()))
        .bind(to_i64(outcome.level_id.get()))
        .bind(outcome.operation.as_str())
        .bind(outcome.correct)
        .bind(outcome.corrected)
        .bind(to_i64(outcome.elapsed_ms))
        .bind(to_i64(outcome.error_magnitude))
        .bind(outcome.answered_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(OutcomeId(to_u64(result.last_insert_rowid())))
    }

    async fn get_outcomes(
        &self,
        learner: &LearnerId,
        level: LevelId,
        after: OutcomeId,
    ) -> Result<Vec<Outcome>> {
        let rows = sqlx::query(
            "SELECT * FROM outcomes WHERE learner_id = ? AND level_id = ? AND id > ? ORDER BY id",
        )
        .bind(learner.as_str())
        .bind(to_i64(level.get()))
        .bind(to_i64(after.get()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(Self::outcome_from_row).collect()
    }

    async fn list_outcomes(&self, learner: &LearnerId) -> Result<Vec<Outcome>> {
        let rows = sqlx::query("SELECT * FROM outcomes WHERE learner_id = ? ORDER BY id")
            .bind(learner.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter().map(Self::outcome_from_row).collect()
    }

    async fn latest_outcome_id(&self, learner: &LearnerId) -> Result<Option<OutcomeId>> {
        let id: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM outcomes WHERE learner_id = ?")
            .bind(learner.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(id.map(|id| OutcomeId(to_u64(id))))
    }

    async fn list_learners(&self) -> Result<Vec<LearnerId>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT learner_id FROM outcomes UNION SELECT learner_id FROM checkpoints ORDER BY 1",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(names.into_iter().map(LearnerId::new).collect())
    }

    // === Checkpoints ===

    async fn append_checkpoint(&self, checkpoint: NewCheckpoint) -> Result<CheckpointId> {
        let result = sqlx::query(
            "INSERT INTO checkpoints
                (learner_id, operation, level_id, success_rate, evolution, cursor, created_at)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7
             WHERE ?6 >= COALESCE(
                (SELECT cursor FROM checkpoints
                  WHERE learner_id = ?1 AND operation = ?2
                  ORDER BY id DESC LIMIT 1),
                0)",
        )
        .bind(checkpoint.learner_id.as_str())
        .bind(checkpoint.operation.as_str())
        .bind(to_i64(checkpoint.level_id.get()))
        .bind(checkpoint.success_rate)
        .bind(checkpoint.evolution.as_str())
        .bind(to_i64(checkpoint.cursor.get()))
        .bind(checkpoint.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict(format!(
                "cursor {} for {}/{} is behind the latest checkpoint",
                checkpoint.cursor, checkpoint.learner_id, checkpoint.operation
            )));
        }

        Ok(CheckpointId(to_u64(result.last_insert_rowid())))
    }

    async fn get_latest_checkpoint(
        &self,
        learner: &LearnerId,
        operation: OperationType,
    ) -> Result<Option<Checkpoint>> {
        let row = sqlx::query(
            "SELECT * FROM checkpoints WHERE learner_id = ? AND operation = ?
             ORDER BY id DESC LIMIT 1",
        )
        .bind(learner.as_str())
        .bind(operation.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(Self::checkpoint_from_row).transpose()
    }

    async fn list_checkpoints(
        &self,
        learner: &LearnerId,
        operation: OperationType,
    ) -> Result<Vec<Checkpoint>> {
        let rows = sqlx::query(
            "SELECT * FROM checkpoints WHERE learner_id = ? AND operation = ? ORDER BY id",
        )
        .bind(learner.as_str())
        .bind(operation.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(Self::checkpoint_from_row).collect()
    }

    async fn list_operation_checkpoints(&self, operation: OperationType) -> Result<Vec<Checkpoint>> {
        let rows = sqlx::query("SELECT * FROM checkpoints WHERE operation = ? ORDER BY id")
            .bind(operation.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter().map(Self::checkpoint_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_level(id: u64, rank: u32) -> Level {
        Level {
            id: LevelId(id),
            operation: OperationType::Addition,
            rank,
            operand1: OperandRange::new(10, 54).unwrap(),
            operand2: OperandRange::new(1, 9).unwrap(),
            mastery_criterion: 10,
            label: "B1×A".to_string(),
        }
    }

    fn create_test_outcome(correct: bool) -> NewOutcome {
        NewOutcome {
            learner_id: LearnerId::new("ada"),
            session_id: Some(SessionId::new()),
            level_id: LevelId(1),
            operation: OperationType::Addition,
            correct,
            corrected: !correct,
            elapsed_ms: 2500,
            error_magnitude: if correct { 0 } else { 10 },
            answered_at: Utc::now(),
        }
    }

    fn create_test_checkpoint(cursor: u64) -> NewCheckpoint {
        NewCheckpoint {
            learner_id: LearnerId::new("ada"),
            operation: OperationType::Addition,
            level_id: LevelId(1),
            success_rate: 0.9,
            evolution: Evolution::Advanced,
            cursor: OutcomeId(cursor),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_health_check() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        assert!(storage.health_check().await);
    }

    #[tokio::test]
    async fn test_level_operations() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        storage
            .save_levels(&[create_test_level(2, 2), create_test_level(1, 1)])
            .await
            .unwrap();

        let levels = storage.get_levels(OperationType::Addition).await.unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0], create_test_level(1, 1));

        let by_rank = storage.get_level_by_rank(OperationType::Addition, 2).await.unwrap();
        assert_eq!(by_rank.unwrap().id, LevelId(2));
        assert!(storage.get_level(LevelId(3)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_outcome_operations() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        storage.save_levels(&[create_test_level(1, 1)]).await.unwrap();

        let first = storage.append_outcome(create_test_outcome(true)).await.unwrap();
        let second = storage.append_outcome(create_test_outcome(false)).await.unwrap();
        assert!(second > first);

        let learner = LearnerId::new("ada");
        let window = storage.get_outcomes(&learner, LevelId(1), first).await.unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].id, second);
        assert!(!window[0].correct);
        assert!(window[0].session_id.is_some());

        assert_eq!(storage.latest_outcome_id(&learner).await.unwrap(), Some(second));
        assert_eq!(storage.latest_outcome_id(&LearnerId::new("bob")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_checkpoint_compare_and_append() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        storage.save_levels(&[create_test_level(1, 1)]).await.unwrap();

        storage.append_checkpoint(create_test_checkpoint(12)).await.unwrap();
        let err = storage.append_checkpoint(create_test_checkpoint(11)).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        let id = storage.append_checkpoint(create_test_checkpoint(12)).await.unwrap();
        let latest = storage
            .get_latest_checkpoint(&LearnerId::new("ada"), OperationType::Addition)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, id);
        assert_eq!(latest.evolution, Evolution::Advanced);
        assert_eq!(latest.success_rate, 0.9);
    }

    #[tokio::test]
    async fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drill.db");
        {
            let storage = SqliteStorage::new_from_path(&path).await.unwrap();
            storage.save_levels(&[create_test_level(1, 1)]).await.unwrap();
            storage.append_outcome(create_test_outcome(true)).await.unwrap();
            storage.append_checkpoint(create_test_checkpoint(1)).await.unwrap();
        }

        let storage = SqliteStorage::new_from_path(&path).await.unwrap();
        assert_eq!(storage.get_levels(OperationType::Addition).await.unwrap().len(), 1);
        assert_eq!(storage.list_learners().await.unwrap(), vec![LearnerId::new("ada")]);
        let err = storage.append_checkpoint(create_test_checkpoint(0)).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }
}
