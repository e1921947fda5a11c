//! The level catalog.
//!
//! Read-only after generation, so a single instance can be shared process-wide.

use std::collections::{BTreeMap, HashMap};
use drill_core::{Level, LevelId, OperationType};
use drill_storage::{Storage, StorageError};
use tracing::{debug, info};

use crate::generator::{CurriculumConfig, CurriculumGenerator};

/// Errors raised while building or seeding a catalog.
#[derive(Debug, thiserror::Error)]
pub enum CurriculumError {
    /// No levels exist for an operation type
    #[error("no levels for {0}; has the catalog been seeded?")]
    EmptyCatalog(OperationType),

    /// The stored levels differ from the generated ones
    #[error("stored {0} levels differ from the generated catalog")]
    CatalogMismatch(OperationType),

    /// Storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result of seeding one operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedAction {
    /// Levels were written
    Written(usize),
    /// Identical levels were already stored
    Unchanged,
}

/// Levels of every operation type, indexed by rank and identity.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    ladders: BTreeMap<OperationType, Vec<Level>>,
    index: HashMap<LevelId, (OperationType, usize)>,
}

impl Catalog {
    /// Generate the catalog for all operation types.
    ///
    /// Identities are assigned sequentially in (operation type, rank) order,
    /// so regenerating with the same configuration yields the same catalog.
    pub fn generate(config: &CurriculumConfig) -> Self {
        let generator = CurriculumGenerator::new().with_config(config.clone());
        let mut next_id = 1;
        let mut ladders = BTreeMap::new();
        for operation in OperationType::ALL {
            let levels = generator.generate(operation, next_id);
            next_id += levels.len() as u64;
            ladders.insert(operation, levels);
        }
        Self::from_ladders(ladders)
    }

    /// Load the catalog from a store.
    pub async fn load(storage: &dyn Storage) -> Result<Self, CurriculumError> {
        let mut ladders = BTreeMap::new();
        for operation in OperationType::ALL {
            let levels = storage.get_levels(operation).await?;
            if levels.is_empty() {
                return Err(CurriculumError::EmptyCatalog(operation));
            }
            ladders.insert(operation, levels);
        }
        Ok(Self::from_ladders(ladders))
    }

    fn from_ladders(ladders: BTreeMap<OperationType, Vec<Level>>) -> Self {
        let index = ladders
            .iter()
            .flat_map(|(op, levels)| {
                levels.iter().enumerate().map(move |(i, l)| (l.id, (*op, i)))
            })
            .collect();
        Self { ladders, index }
    }

    /// Levels of an operation type, ordered by rank.
    pub fn levels(&self, operation: OperationType) -> &[Level] {
        self.ladders.get(&operation).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every level, grouped by operation type.
    pub fn all(&self) -> impl Iterator<Item = &Level> {
        self.ladders.values().flatten()
    }

    /// Look up a level by identity.
    pub fn level(&self, id: LevelId) -> Option<&Level> {
        let (operation, i) = self.index.get(&id)?;
        self.ladders.get(operation)?.get(*i)
    }

    /// Look up a level by operation type and rank.
    pub fn by_rank(&self, operation: OperationType, rank: u32) -> Option<&Level> {
        let i = usize::try_from(rank.checked_sub(1)?).ok()?;
        self.levels(operation).get(i)
    }

    /// Lowest-rank level of an operation type.
    pub fn first(&self, operation: OperationType) -> Option<&Level> {
        self.levels(operation).first()
    }

    /// Next-harder level, if any.
    pub fn next(&self, level: &Level) -> Option<&Level> {
        self.by_rank(level.operation, level.rank.checked_add(1)?)
    }

    /// Next-easier level, if any.
    pub fn previous(&self, level: &Level) -> Option<&Level> {
        self.by_rank(level.operation, level.rank.checked_sub(1)?)
    }

    /// Total number of levels.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the catalog holds no levels.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Write the catalog to a store.
///
/// An operation type with no stored levels is written; one whose stored levels
/// equal the catalog's is left alone; any other state is a mismatch, because
/// learners' checkpoints reference the stored levels.
pub async fn seed_catalog(
    storage: &dyn Storage,
    catalog: &Catalog,
) -> Result<Vec<(OperationType, SeedAction)>, CurriculumError> {
    let mut report = Vec::new();

    for operation in OperationType::ALL {
        let levels = catalog.levels(operation);
        if levels.is_empty() {
            return Err(CurriculumError::EmptyCatalog(operation));
        }

        let stored = storage.get_levels(operation).await?;
        let action = if stored.is_empty() {
            storage.save_levels(levels).await?;
            info!("Seeded {} {} levels", levels.len(), operation);
            SeedAction::Written(levels.len())
        } else if stored.as_slice() == levels {
            debug!("{} levels already seeded", operation);
            SeedAction::Unchanged
        } else {
            return Err(CurriculumError::CatalogMismatch(operation));
        };
        report.push((operation, action));
    }

    Ok(report)
}
