//! Achievement badges derived from a learner's history.
//!
//! Badges are never stored: they are recomputed from outcomes and the
//! current level of each track whenever they are shown.

use std::collections::HashMap;

use chrono::NaiveDate;
use drill_core::{Outcome, SessionId};
use serde::Serialize;

use crate::policy::success_rate;
use crate::stats::{longest_streak, streak_days, total_score};

/// Badge family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeCategory {
    /// Average current rank across operation types
    Level,
    /// Consecutive practice days
    Streak,
    /// Average answer time
    Speed,
    /// One-off accomplishments
    Performance,
}

/// The statistic a badge threshold is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// [`BadgeStats::average_level`]
    AverageLevel,
    /// [`BadgeStats::best_streak`]
    BestStreak,
    /// [`BadgeStats::average_elapsed_ms`]; lower is better
    AverageTime,
    /// [`BadgeStats::perfect_sessions`]
    PerfectSessions,
    /// [`BadgeStats::total_sessions`]
    TotalSessions,
    /// [`BadgeStats::success_rate`]
    SuccessRate,
    /// [`BadgeStats::total_score`]
    TotalScore,
}

impl Metric {
    /// Whether smaller values are better.
    pub fn lower_is_better(self) -> bool {
        matches!(self, Metric::AverageTime)
    }
}

/// A badge definition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Badge {
    /// Stable identifier
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    /// Family
    pub category: BadgeCategory,
    /// Statistic checked
    pub metric: Metric,
    /// Value to reach (or go under, for lower-is-better metrics)
    pub threshold: f64,
}

const fn badge(
    id: &'static str,
    name: &'static str,
    category: BadgeCategory,
    metric: Metric,
    threshold: f64,
) -> Badge {
    Badge {
        id,
        name,
        category,
        metric,
        threshold,
    }
}

/// Every badge. Tiers of one metric are listed from easiest to hardest.
pub static BADGES: [Badge; 18] = [
    badge("level_worm", "Worm", BadgeCategory::Level, Metric::AverageLevel, 0.0),
    badge("level_bee", "Bee", BadgeCategory::Level, Metric::AverageLevel, 10.0),
    badge("level_bear", "Bear", BadgeCategory::Level, Metric::AverageLevel, 25.0),
    badge("level_eagle", "Eagle", BadgeCategory::Level, Metric::AverageLevel, 45.0),
    badge("level_unicorn", "Unicorn", BadgeCategory::Level, Metric::AverageLevel, 65.0),
    badge("level_dragon", "Dragon", BadgeCategory::Level, Metric::AverageLevel, 85.0),
    badge("streak_discipline", "Discipline", BadgeCategory::Streak, Metric::BestStreak, 3.0),
    badge("streak_focus", "Focus", BadgeCategory::Streak, Metric::BestStreak, 7.0),
    badge("streak_on_fire", "On Fire", BadgeCategory::Streak, Metric::BestStreak, 14.0),
    badge("streak_momentum", "Momentum", BadgeCategory::Streak, Metric::BestStreak, 30.0),
    badge("speed_quick", "Quick", BadgeCategory::Speed, Metric::AverageTime, 5000.0),
    badge("speed_swift", "Swift", BadgeCategory::Speed, Metric::AverageTime, 3000.0),
    badge("speed_rapid", "Rapid", BadgeCategory::Speed, Metric::AverageTime, 2000.0),
    badge("speed_lightning", "Lightning", BadgeCategory::Speed, Metric::AverageTime, 1500.0),
    badge("perf_perfectionist", "Perfectionist", BadgeCategory::Performance, Metric::PerfectSessions, 10.0),
    badge("perf_worker", "Worker", BadgeCategory::Performance, Metric::TotalSessions, 100.0),
    badge("perf_precise", "Precise", BadgeCategory::Performance, Metric::SuccessRate, 90.0),
    badge("perf_centurion", "Centurion", BadgeCategory::Performance, Metric::TotalScore, 10000.0),
];

/// Statistics badges are checked against.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BadgeStats {
    /// Mean current rank over initialized operation types
    pub average_level: f64,
    /// Consecutive practice days ending today or yesterday
    pub current_streak: u32,
    /// Longest run of practice days ever
    pub best_streak: u32,
    /// Mean answer time, `None` without answers
    pub average_elapsed_ms: Option<f64>,
    /// Mean distance of first answers from the solution, `None` without answers
    pub mean_error_magnitude: Option<f64>,
    /// Sessions where every question was right on the first try
    pub perfect_sessions: usize,
    /// Sessions with at least one recorded answer
    pub total_sessions: usize,
    /// Correct answers in percent
    pub success_rate: f64,
    /// Cumulative score
    pub total_score: i64,
}

impl BadgeStats {
    /// Compute statistics from a learner's outcomes and current ranks.
    ///
    /// Outcomes without a session count towards every statistic except the
    /// session counts.
    pub fn from_history(outcomes: &[Outcome], current_ranks: &[u32], today: NaiveDate) -> Self {
        let average_level = if current_ranks.is_empty() {
            0.0
        } else {
            current_ranks.iter().map(|r| f64::from(*r)).sum::<f64>() / current_ranks.len() as f64
        };

        let mut sessions: HashMap<SessionId, bool> = HashMap::new();
        for outcome in outcomes {
            if let Some(session) = outcome.session_id {
                let perfect = sessions.entry(session).or_insert(true);
                *perfect &= outcome.correct && !outcome.corrected;
            }
        }

        let answers = outcomes.len();
        let mean = |total: u64| (answers > 0).then(|| total as f64 / answers as f64);
        let correct = outcomes.iter().filter(|o| o.correct).count();

        Self {
            average_level,
            current_streak: streak_days(outcomes, today),
            best_streak: longest_streak(outcomes),
            average_elapsed_ms: mean(outcomes.iter().map(|o| o.elapsed_ms).sum()),
            mean_error_magnitude: mean(outcomes.iter().map(|o| o.error_magnitude).sum()),
            perfect_sessions: sessions.values().filter(|p| **p).count(),
            total_sessions: sessions.len(),
            success_rate: (success_rate(correct, answers) * 100.0).round(),
            total_score: total_score(outcomes),
        }
    }

    /// Value of a metric, `None` when it cannot be measured yet.
    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::AverageLevel => Some(self.average_level),
            Metric::BestStreak => Some(f64::from(self.best_streak)),
            Metric::AverageTime => self.average_elapsed_ms,
            Metric::PerfectSessions => Some(self.perfect_sessions as f64),
            Metric::TotalSessions => Some(self.total_sessions as f64),
            Metric::SuccessRate => Some(self.success_rate),
            Metric::TotalScore => Some(self.total_score as f64),
        }
    }
}

impl Badge {
    /// Whether the statistics reach this badge.
    pub fn is_met(&self, stats: &BadgeStats) -> bool {
        match stats.value(self.metric) {
            Some(v) if self.metric.lower_is_better() => v < self.threshold,
            Some(v) => v >= self.threshold,
            None => false,
        }
    }

    /// How close the statistics are to this badge, 0 to 100.
    pub fn progress(&self, stats: &BadgeStats) -> u32 {
        if self.is_met(stats) {
            return 100;
        }
        let Some(v) = stats.value(self.metric) else {
            return 0;
        };
        let ratio = if self.metric.lower_is_better() {
            if v > 0.0 {
                self.threshold / v
            } else {
                0.0
            }
        } else if self.threshold > 0.0 {
            v / self.threshold
        } else {
            0.0
        };
        percent(ratio)
    }
}

fn percent(ratio: f64) -> u32 {
    (ratio * 100.0).round().clamp(0.0, 100.0) as u32
}

/// A badge and whether it is unlocked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BadgeStatus {
    /// Definition
    pub badge: &'static Badge,
    /// Reached
    pub unlocked: bool,
    /// Percent of the way there
    pub progress: u32,
}

/// Position inside a tiered metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierProgress {
    /// Hardest tier reached
    pub current: Option<&'static Badge>,
    /// Tier after it, `None` at the top
    pub next: Option<&'static Badge>,
    /// Percent of the way from `current` to `next`
    pub progress: u32,
    /// Distance left to `next`, in the metric's unit
    pub remaining: u64,
}

/// Where the statistics sit among the tiers of `metric`.
///
/// `None` for metrics with a single badge or without a value yet.
pub fn tier_progress(metric: Metric, stats: &BadgeStats) -> Option<TierProgress> {
    let tiers: Vec<&'static Badge> = BADGES.iter().filter(|b| b.metric == metric).collect();
    if tiers.len() < 2 {
        return None;
    }
    let value = stats.value(metric)?;

    let reached = tiers.iter().take_while(|b| b.is_met(stats)).count();
    let current = reached.checked_sub(1).map(|i| tiers[i]);
    let Some(next) = tiers.get(reached).copied() else {
        return Some(TierProgress {
            current,
            next: None,
            progress: 100,
            remaining: 0,
        });
    };

    let (progress, remaining) = if metric.lower_is_better() {
        let progress = match current {
            Some(c) if c.threshold > next.threshold => percent((c.threshold - value) / (c.threshold - next.threshold)),
            _ => 0,
        };
        // The tier needs a value strictly below its threshold.
        (progress, (value - next.threshold).floor().max(0.0) as u64 + 1)
    } else {
        let start = current.map_or(0.0, |c| c.threshold);
        let progress = if next.threshold > start {
            percent((value - start) / (next.threshold - start))
        } else {
            0
        };
        (progress, (next.threshold - value).ceil().max(0.0) as u64)
    };

    Some(TierProgress {
        current,
        next: Some(next),
        progress,
        remaining,
    })
}

/// Every badge with its status, plus tier positions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BadgeReport {
    /// Statistics the report was computed from
    pub stats: BadgeStats,
    /// One entry per badge, in [`BADGES`] order
    pub badges: Vec<BadgeStatus>,
    /// Level tiers
    pub level: Option<TierProgress>,
    /// Streak tiers
    pub streak: Option<TierProgress>,
    /// Speed tiers
    pub speed: Option<TierProgress>,
}

impl BadgeReport {
    /// Check every badge against `stats`.
    pub fn new(stats: BadgeStats) -> Self {
        let badges = BADGES
            .iter()
            .map(|badge| BadgeStatus {
                badge,
                unlocked: badge.is_met(&stats),
                progress: badge.progress(&stats),
            })
            .collect();

        Self {
            level: tier_progress(Metric::AverageLevel, &stats),
            streak: tier_progress(Metric::BestStreak, &stats),
            speed: tier_progress(Metric::AverageTime, &stats),
            badges,
            stats,
        }
    }

    /// Unlocked badges.
    pub fn unlocked(&self) -> impl Iterator<Item = &BadgeStatus> {
        self.badges.iter().filter(|s| s.unlocked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use drill_core::{LearnerId, LevelId, OperationType, OutcomeId};

    fn outcome(day: u32, session: Option<SessionId>, correct: bool, corrected: bool, elapsed_ms: u64) -> Outcome {
        Outcome {
            id: OutcomeId(1),
            learner_id: LearnerId::new("ada"),
            session_id: session,
            level_id: LevelId(1),
            operation: OperationType::Addition,
            correct,
            corrected,
            elapsed_ms,
            error_magnitude: if correct && !corrected { 0 } else { 4 },
            answered_at: Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap(),
        }
    }

    fn stats() -> BadgeStats {
        BadgeStats {
            average_level: 0.0,
            current_streak: 0,
            best_streak: 0,
            average_elapsed_ms: None,
            mean_error_magnitude: None,
            perfect_sessions: 0,
            total_sessions: 0,
            success_rate: 0.0,
            total_score: 0,
        }
    }

    #[test]
    fn test_stats_from_history() {
        let perfect = Some(SessionId::new());
        let retried = Some(SessionId::new());
        let outcomes = vec![
            outcome(1, perfect, true, false, 1000),
            outcome(1, perfect, true, false, 2000),
            outcome(2, retried, true, true, 3000),
            outcome(2, retried, false, false, 4000),
            outcome(3, None, true, false, 5000),
        ];
        let today = NaiveDate::from_ymd_opt(2024, 5, 4).unwrap();
        let stats = BadgeStats::from_history(&outcomes, &[4, 1, 7], today);

        assert_eq!(stats.average_level, 4.0);
        assert_eq!(stats.current_streak, 3);
        assert_eq!(stats.best_streak, 3);
        assert_eq!(stats.average_elapsed_ms, Some(3000.0));
        assert_eq!(stats.mean_error_magnitude, Some(1.6));
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.perfect_sessions, 1);
        assert_eq!(stats.success_rate, 80.0);
        assert_eq!(stats.total_score, 3);
    }

    #[test]
    fn test_empty_history() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 4).unwrap();
        let stats = BadgeStats::from_history(&[], &[], today);
        assert_eq!(stats.average_elapsed_ms, None);
        assert_eq!(stats.success_rate, 0.0);

        let report = BadgeReport::new(stats);
        let unlocked: Vec<&str> = report.unlocked().map(|s| s.badge.id).collect();
        assert_eq!(unlocked, vec!["level_worm"]);
        assert!(report.speed.is_none());
    }

    #[test]
    fn test_speed_badges_need_strictly_lower_time() {
        let stats = BadgeStats {
            average_elapsed_ms: Some(3000.0),
            ..stats()
        };
        let report = BadgeReport::new(stats);
        let speed: Vec<(&str, bool)> = report
            .badges
            .iter()
            .filter(|s| s.badge.category == BadgeCategory::Speed)
            .map(|s| (s.badge.id, s.unlocked))
            .collect();
        assert_eq!(
            speed,
            vec![
                ("speed_quick", true),
                ("speed_swift", false),
                ("speed_rapid", false),
                ("speed_lightning", false)
            ]
        );

        let slower = BadgeStats {
            average_elapsed_ms: Some(3500.0),
            ..self::stats()
        };
        let tier = tier_progress(Metric::AverageTime, &slower).unwrap();
        assert_eq!(tier.current.unwrap().id, "speed_quick");
        assert_eq!(tier.next.unwrap().id, "speed_swift");
        assert_eq!(tier.progress, 75);
        assert_eq!(tier.remaining, 501);
    }

    #[test]
    fn test_level_tier_progress() {
        let stats = BadgeStats {
            average_level: 17.5,
            ..stats()
        };
        let tier = tier_progress(Metric::AverageLevel, &stats).unwrap();
        assert_eq!(tier.current.unwrap().id, "level_bee");
        assert_eq!(tier.next.unwrap().id, "level_bear");
        assert_eq!(tier.progress, 50);
        assert_eq!(tier.remaining, 8);

        let top = BadgeStats {
            average_level: 92.0,
            ..stats
        };
        let tier = tier_progress(Metric::AverageLevel, &top).unwrap();
        assert_eq!(tier.current.unwrap().id, "level_dragon");
        assert!(tier.next.is_none());
        assert_eq!(tier.progress, 100);
    }

    #[test]
    fn test_streak_tier_before_first_badge() {
        let stats = BadgeStats {
            best_streak: 2,
            ..stats()
        };
        let tier = tier_progress(Metric::BestStreak, &stats).unwrap();
        assert!(tier.current.is_none());
        assert_eq!(tier.next.unwrap().id, "streak_discipline");
        assert_eq!(tier.progress, 67);
        assert_eq!(tier.remaining, 1);

        assert!(tier_progress(Metric::TotalScore, &stats).is_none());
    }

    #[test]
    fn test_performance_badges() {
        let stats = BadgeStats {
            perfect_sessions: 10,
            total_sessions: 40,
            success_rate: 90.0,
            total_score: 2500,
            ..stats()
        };
        let report = BadgeReport::new(stats);
        let status = |id: &str| report.badges.iter().find(|s| s.badge.id == id).unwrap().clone();

        assert!(status("perf_perfectionist").unlocked);
        assert!(status("perf_precise").unlocked);
        assert!(!status("perf_worker").unlocked);
        assert_eq!(status("perf_worker").progress, 40);
        assert_eq!(status("perf_centurion").progress, 25);
    }
}
