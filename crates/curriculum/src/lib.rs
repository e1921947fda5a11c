//! Curriculum (Layer 1)
//!
//! Magnitude classes, the ordered difficulty ladder, the level catalog, and
//! question sampling.

#![warn(missing_docs)]

pub mod classes;
pub mod generator;
pub mod catalog;
pub mod questions;

pub use classes::{magnitude_classes, LabeledRange, MagnitudeClass};
pub use generator::{
    ordered_pairs, CurriculumConfig, CurriculumGenerator, DEFAULT_BOUNDARIES,
    DEFAULT_MASTERY_CRITERION, DEFAULT_MAX_LEVELS,
};
pub use catalog::{seed_catalog, Catalog, CurriculumError, SeedAction};
pub use questions::{distractors, sample_mixed, sample_question, with_choices, DEFAULT_CHOICES};
