//! Drill core data models.
//!
//! This crate defines the data structures shared by the curriculum generator,
//! the progression engine and the training-session layer.

#![warn(missing_docs)]

// Core identities
mod id;

// Curriculum
mod operation;
mod level;

// Learner history
mod outcome;
mod checkpoint;

// Training
mod question;

// Re-exports
pub use id::*;

pub use operation::{OperationType, ParseOperationError};
pub use level::{Level, OperandRange};
pub use outcome::{NewOutcome, Outcome};
pub use checkpoint::{Checkpoint, Evolution, NewCheckpoint};
pub use question::Question;

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
