//! Training Sessions (Layer 4)
//!
//! Planning a drill, walking a learner through it, and recording the answers.

#![warn(missing_docs)]

pub mod session;
pub mod planner;
pub mod recorder;

pub use session::{Answer, AttemptResult, SessionError, TrainingSession};
pub use planner::{AnswerMode, SessionPlanner, TrainingConfig, DEFAULT_QUESTIONS_PER_OPERATION};
pub use recorder::{SessionRecorder, SessionReport, TrainingError};
