//! Progression (Layer 3)
//!
//! The checkpoint state machine that moves learners along the level ladder,
//! the policy deciding each move, and read-only progress views: rankings, a
//! score leaderboard and badges.

#![warn(missing_docs)]

pub mod error;
pub mod policy;
pub mod window;
pub mod engine;
pub mod stats;
pub mod badges;
pub mod tracker;

pub use error::{ProgressError, Result};
pub use policy::{success_rate, Decision, ProgressionPolicy, ADVANCE_THRESHOLD, REGRESS_THRESHOLD};
pub use window::{assess, Assessment};
pub use engine::{Evaluation, ProgressionEngine};
pub use stats::{
    leaderboard, longest_streak, ranking, streak_days, total_score, LeaderboardEntry, Ranking,
};
pub use badges::{
    tier_progress, Badge, BadgeCategory, BadgeReport, BadgeStats, BadgeStatus, Metric, TierProgress,
    BADGES,
};
pub use tracker::{BasicProgressTracker, LevelChange, ProgressSnapshot, ProgressTracker, Standing};
