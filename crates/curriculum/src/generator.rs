//! Curriculum generation.
//!
//! Orders pairs of operand ranges by non-decreasing difficulty:
//! ```text
//! A×A  →  for each next class X:  X-parts × lower ranges  →  X-parts × X-parts  →  X × X
//! ```
//! then keeps the first `max_levels` pairs as ranks `1..=K`.

use std::collections::HashSet;
use drill_core::{Level, LevelId, OperationType};
use serde::{Deserialize, Serialize};

use crate::classes::{magnitude_classes, LabeledRange, MagnitudeClass};

/// Default class boundaries, one per order of magnitude.
pub const DEFAULT_BOUNDARIES: [u64; 6] = [1, 10, 100, 1_000, 10_000, 100_000];

/// Default cap on the number of levels per operation type.
pub const DEFAULT_MAX_LEVELS: usize = 100;

/// Default number of outcomes evaluated per progression decision.
pub const DEFAULT_MASTERY_CRITERION: u32 = 10;

/// Configuration for curriculum generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurriculumConfig {
    /// Lower boundary of each magnitude class, increasing
    pub boundaries: Vec<u64>,
    /// Number of sub-ranges of the first class
    pub first_class_parts: u32,
    /// Maximum number of levels per operation type
    pub max_levels: usize,
    /// Mastery criterion given to every level
    pub mastery_criterion: u32,
}

impl Default for CurriculumConfig {
    fn default() -> Self {
        Self {
            boundaries: DEFAULT_BOUNDARIES.to_vec(),
            first_class_parts: 2,
            max_levels: DEFAULT_MAX_LEVELS,
            mastery_criterion: DEFAULT_MASTERY_CRITERION,
        }
    }
}

/// Builds the ordered operand-range pairs of one curriculum.
struct PairOrdering {
    pairs: Vec<(LabeledRange, LabeledRange)>,
    seen: HashSet<(String, String)>,
}

impl PairOrdering {
    fn new() -> Self {
        Self {
            pairs: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Add a pair unless the same two ranges were already paired, in either order.
    fn add(&mut self, a: &LabeledRange, b: &LabeledRange) {
        let key = if a.label <= b.label {
            (a.label.clone(), b.label.clone())
        } else {
            (b.label.clone(), a.label.clone())
        };
        if self.seen.insert(key) {
            self.pairs.push((a.clone(), b.clone()));
        }
    }
}

/// Order every pairing of the given classes by non-decreasing difficulty.
pub fn ordered_pairs(classes: &[MagnitudeClass]) -> Vec<(LabeledRange, LabeledRange)> {
    let mut ordering = PairOrdering::new();
    let Some((first, rest)) = classes.split_first() else {
        return Vec::new();
    };

    for a in &first.parts {
        for b in &first.parts {
            ordering.add(a, b);
        }
    }

    for (offset, class) in rest.iter().enumerate() {
        let lower = &classes[..=offset];

        for part in &class.parts {
            for prev in lower.iter().flat_map(MagnitudeClass::ranges) {
                ordering.add(part, prev);
            }
        }

        for (i, a) in class.parts.iter().enumerate() {
            for b in &class.parts[..=i] {
                ordering.add(a, b);
            }
        }

        ordering.add(&class.whole, &class.whole);
    }

    ordering.pairs
}

/// Deterministic curriculum generator.
#[derive(Debug, Clone, Default)]
pub struct CurriculumGenerator {
    config: CurriculumConfig,
}

impl CurriculumGenerator {
    /// Create a generator with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: CurriculumConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &CurriculumConfig {
        &self.config
    }

    /// Operand-range pairs surviving the level cap, ordered by rank.
    pub fn pairs(&self) -> Vec<(LabeledRange, LabeledRange)> {
        let mut pairs = ordered_pairs(&magnitude_classes(&self.config));
        pairs.truncate(self.config.max_levels);
        pairs
    }

    /// Levels of one operation type. Identities start at `first_id`.
    pub fn generate(&self, operation: OperationType, first_id: u64) -> Vec<Level> {
        self.pairs()
            .into_iter()
            .zip(1u32..)
            .map(|((op1, op2), rank)| Level {
                id: LevelId(first_id + u64::from(rank) - 1),
                operation,
                rank,
                operand1: op1.range,
                operand2: op2.range,
                mastery_criterion: self.config.mastery_criterion.max(1),
                label: format!("{}×{}", op1.label, op2.label),
            })
            .collect()
    }
}
