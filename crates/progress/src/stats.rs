//! Scores, streaks and rankings derived from stored history.

use std::collections::{BTreeSet, HashMap};

use chrono::{Days, NaiveDate};
use drill_core::{Checkpoint, CheckpointId, LearnerId, LevelId, Outcome};
use serde::Serialize;

/// Sum of outcome scores: +1 per correct answer, -1 otherwise.
pub fn total_score(outcomes: &[Outcome]) -> i64 {
    outcomes.iter().map(Outcome::score).sum()
}

/// Consecutive UTC days with at least one outcome, ending `today` or the day
/// before. Zero when the most recent practice day is older than that.
pub fn streak_days(outcomes: &[Outcome], today: NaiveDate) -> u32 {
    let days: BTreeSet<NaiveDate> = outcomes.iter().map(|o| o.answered_at.date_naive()).collect();

    let mut day = if days.contains(&today) {
        today
    } else {
        match today.checked_sub_days(Days::new(1)) {
            Some(yesterday) if days.contains(&yesterday) => yesterday,
            _ => return 0,
        }
    };

    let mut streak = 0;
    while days.contains(&day) {
        streak += 1;
        match day.checked_sub_days(Days::new(1)) {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}

/// Longest run of consecutive UTC practice days ever.
pub fn longest_streak(outcomes: &[Outcome]) -> u32 {
    let days: BTreeSet<NaiveDate> = outcomes.iter().map(|o| o.answered_at.date_naive()).collect();

    let mut longest = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;
    for day in days {
        let follows = previous
            .and_then(|p| p.checked_add_days(Days::new(1)))
            .is_some_and(|next| next == day);
        run = if follows { run + 1 } else { 1 };
        longest = longest.max(run);
        previous = Some(day);
    }
    longest
}

/// Where a learner stands among everyone on one operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ranking {
    /// Rank of the learner's latest checkpoint
    pub rank: u32,
    /// Highest rank the learner ever reached
    pub best_rank: u32,
    /// Share of learners whose best rank is strictly below `rank`, in percent
    pub percentile: u32,
    /// Learners with at least one checkpoint
    pub learners: usize,
}

/// Rank `learner`'s current level against every learner's best rank.
///
/// `ranks` maps level identities to their rank. Returns `None` when the
/// learner has no checkpoint on this operation type.
pub fn ranking(
    checkpoints: &[Checkpoint],
    ranks: &HashMap<LevelId, u32>,
    learner: &LearnerId,
) -> Option<Ranking> {
    let mut best: HashMap<&LearnerId, u32> = HashMap::new();
    let mut latest: Option<(CheckpointId, u32)> = None;
    for cp in checkpoints {
        let Some(&rank) = ranks.get(&cp.level_id) else {
            continue;
        };
        let entry = best.entry(&cp.learner_id).or_insert(rank);
        *entry = (*entry).max(rank);
        if &cp.learner_id == learner && latest.map_or(true, |(id, _)| cp.id > id) {
            latest = Some((cp.id, rank));
        }
    }

    let (_, rank) = latest?;
    let best_rank = *best.get(learner)?;
    let below = best.values().filter(|r| **r < rank).count();
    let learners = best.len();
    let percentile = (100.0 * below as f64 / learners as f64).round() as u32;

    Some(Ranking {
        rank,
        best_rank,
        percentile,
        learners,
    })
}

/// One row of the score leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    /// 1-based place
    pub position: usize,
    /// Learner
    pub learner_id: LearnerId,
    /// Cumulative score
    pub score: i64,
    /// Answers recorded
    pub answers: usize,
}

/// Order learners by cumulative score, highest first. Ties go by learner id.
pub fn leaderboard<'a>(
    histories: impl IntoIterator<Item = (&'a LearnerId, &'a [Outcome])>,
    limit: Option<usize>,
) -> Vec<LeaderboardEntry> {
    let mut rows: Vec<(&LearnerId, i64, usize)> = histories
        .into_iter()
        .map(|(learner, outcomes)| (learner, total_score(outcomes), outcomes.len()))
        .collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    rows.into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(i, (learner, score, answers))| LeaderboardEntry {
            position: i + 1,
            learner_id: learner.clone(),
            score,
            answers,
        })
        .collect()
}
