//! Drill CLI - adaptive arithmetic practice.

mod config;

use config::{Backend, Config};

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use drill_core::{LearnerId, OperationType};
use drill_curriculum::{seed_catalog, Catalog, SeedAction};
use drill_progress::{
    BasicProgressTracker, Evaluation, ProgressTracker, ProgressionEngine, TierProgress,
};
use drill_storage::{JsonStorage, Storage};
use drill_training::{AnswerMode, AttemptResult, SessionPlanner, SessionRecorder, TrainingSession};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "drill")]
#[command(about = "Adaptive arithmetic practice", long_about = None)]
struct Cli {
    /// Config file (default: ./drill.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory, overriding the config file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and store the level catalog
    Seed,
    /// Print the level ladder of an operation type
    Levels {
        /// Operation type
        #[arg(long)]
        op: OperationType,
        /// Only the first n levels
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show a learner's progress
    Status {
        #[arg(long)]
        learner: String,
    },
    /// Show checkpoint history
    History {
        #[arg(long)]
        learner: String,
        #[arg(long)]
        op: OperationType,
    },
    /// Run progression evaluation
    Evaluate {
        #[arg(long)]
        learner: String,
        /// Only this operation type
        #[arg(long)]
        op: Option<OperationType>,
    },
    /// Show ranking percentile
    Rank {
        #[arg(long)]
        learner: String,
        #[arg(long)]
        op: OperationType,
    },
    /// Show learners by cumulative score
    Leaderboard {
        /// Number of learners shown
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show earned and pending badges
    Badges {
        #[arg(long)]
        learner: String,
    },
    /// Practice interactively
    Train {
        #[arg(long)]
        learner: String,
        /// Questions per operation type
        #[arg(long)]
        per_op: Option<usize>,
        /// Pick answers from a list instead of typing them
        #[arg(long)]
        multiple_choice: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    let storage = open_storage(&config).await?;
    let engine = Arc::new(ProgressionEngine::new(storage.clone()).with_policy(config.policy)?);
    let tracker = BasicProgressTracker::new(storage.clone());

    match cli.command {
        Commands::Seed => {
            let catalog = Catalog::generate(&config.curriculum);
            for (op, action) in seed_catalog(storage.as_ref(), &catalog).await? {
                match action {
                    SeedAction::Written(n) => println!("{op}: seeded {n} levels"),
                    SeedAction::Unchanged => println!("{op}: already seeded"),
                }
            }
        }
        Commands::Levels { op, limit } => {
            let levels = storage.get_levels(op).await?;
            if levels.is_empty() {
                bail!("no {op} levels; run `drill seed` first");
            }
            println!("{} levels ({})", op, levels.len());
            for level in levels.iter().take(limit.unwrap_or(usize::MAX)) {
                println!(
                    "  {:>3} | {:<8} | {} x {} | id {}",
                    level.rank, level.label, level.operand1, level.operand2, level.id
                );
            }
        }
        Commands::Status { learner } => {
            let learner = LearnerId::new(learner);
            let snapshot = tracker.snapshot(&learner).await?;

            println!("Learner {}", snapshot.learner_id);
            if snapshot.standings.is_empty() {
                println!("  No progress yet; run `drill train --learner {}`", learner);
            }
            for s in &snapshot.standings {
                println!(
                    "  {:<14} rank {:>3}/{} ({}) | last {} at {:.2}",
                    s.operation.as_str(),
                    s.level.rank,
                    s.total_levels,
                    s.level.label,
                    s.evolution,
                    s.success_rate
                );
            }
            println!("  Score: {}", snapshot.total_score);
            println!("  Streak: {} day(s)", snapshot.streak_days);
        }
        Commands::History { learner, op } => {
            let learner = LearnerId::new(learner);
            let history = tracker.history(&learner, op).await?;
            println!("{} history for {} ({})", op, learner, history.len());
            for cp in history {
                let label = storage
                    .get_level(cp.level_id)
                    .await?
                    .map(|l| format!("#{} {}", l.rank, l.label))
                    .unwrap_or_else(|| format!("level {}", cp.level_id));
                println!(
                    "  {} | {:<11} | {:<14} | rate {:.2} | cursor {}",
                    cp.created_at.format("%Y-%m-%d %H:%M"),
                    cp.evolution,
                    label,
                    cp.success_rate,
                    cp.cursor
                );
            }
        }
        Commands::Evaluate { learner, op } => {
            let learner = LearnerId::new(learner);
            let results = match op {
                Some(op) => vec![(op, engine.evaluate(&learner, op).await?)],
                None => engine.evaluate_all(&learner).await?,
            };
            for (op, evaluation) in &results {
                println!("{}: {}", op, describe(evaluation));
            }
        }
        Commands::Rank { learner, op } => {
            let learner = LearnerId::new(learner);
            match tracker.ranking(&learner, op).await? {
                Some(r) => println!(
                    "{}: rank {} (best {}), ahead of {}% of {} learner(s)",
                    op, r.rank, r.best_rank, r.percentile, r.learners
                ),
                None => println!("{}: no progress for {}", op, learner),
            }
        }
        Commands::Leaderboard { limit } => {
            let rows = tracker.leaderboard(Some(limit)).await?;
            if rows.is_empty() {
                println!("No learners yet");
            }
            for row in rows {
                println!(
                    "  {:>3}. {:<16} {:>6} ({} answers)",
                    row.position,
                    row.learner_id.as_str(),
                    row.score,
                    row.answers
                );
            }
        }
        Commands::Badges { learner } => {
            let learner = LearnerId::new(learner);
            let report = tracker.badges(&learner).await?;
            println!(
                "Badges for {} ({}/{})",
                learner,
                report.unlocked().count(),
                report.badges.len()
            );
            for status in &report.badges {
                println!(
                    "  [{}] {:<14} {:>3}%",
                    if status.unlocked { "x" } else { " " },
                    status.badge.name,
                    status.progress
                );
            }

            let stats = &report.stats;
            println!(
                "  Average level {:.1}, streak {} (best {}), {} session(s), {} perfect",
                stats.average_level,
                stats.current_streak,
                stats.best_streak,
                stats.total_sessions,
                stats.perfect_sessions
            );
            if let Some(ms) = stats.average_elapsed_ms {
                println!(
                    "  Average time {:.0} ms, mean error {:.1}, success {:.0}%",
                    ms,
                    stats.mean_error_magnitude.unwrap_or_default(),
                    stats.success_rate
                );
            }
            for (label, tier) in [
                ("Level", &report.level),
                ("Streak", &report.streak),
                ("Speed", &report.speed),
            ] {
                if let Some(tier) = tier {
                    println!("  {}: {}", label, describe_tier(tier));
                }
            }
        }
        Commands::Train {
            learner,
            per_op,
            multiple_choice,
        } => {
            let learner = LearnerId::new(learner);
            let mut training = config.training.clone();
            if let Some(n) = per_op {
                training.questions_per_operation = n;
            }
            if multiple_choice {
                training.answer_mode = AnswerMode::MultipleChoice;
            }

            let planner = SessionPlanner::new(engine.clone()).with_config(training);
            let mut session = planner.plan(&learner, &mut rand::thread_rng()).await?;
            info!("Session {} with {} questions", session.id(), session.questions().len());

            run_session(&mut session).await?;

            let report = SessionRecorder::new(engine).record(session).await?;
            println!();
            println!(
                "{}/{} correct, score {:+}",
                report.correct,
                report.outcome_ids.len(),
                report.score
            );
            for (op, evaluation) in &report.evaluations {
                println!("  {}: {}", op, describe(evaluation));
            }
        }
    }

    Ok(())
}

async fn open_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    debug!("Opening {:?} store in {}", config.backend, config.data_dir.display());
    match config.backend {
        Backend::Json => Ok(Arc::new(JsonStorage::new(&config.data_dir).await?)),
        Backend::Sqlite => open_sqlite(&config.data_dir).await,
    }
}

#[cfg(feature = "sqlite")]
async fn open_sqlite(dir: &Path) -> Result<Arc<dyn Storage>> {
    tokio::fs::create_dir_all(dir).await?;
    let storage = drill_storage::SqliteStorage::new_from_path(&dir.join("drill.db")).await?;
    Ok(Arc::new(storage))
}

#[cfg(not(feature = "sqlite"))]
async fn open_sqlite(_dir: &Path) -> Result<Arc<dyn Storage>> {
    bail!("backend \"sqlite\" needs a build with `--features sqlite`")
}

fn describe_tier(tier: &TierProgress) -> String {
    let current = tier.current.map_or("none", |b| b.name);
    match tier.next {
        Some(next) => format!(
            "{} -> {} {}% ({} to go)",
            current, next.name, tier.progress, tier.remaining
        ),
        None => format!("{} (top tier)", current),
    }
}

fn describe(evaluation: &Evaluation) -> String {
    match evaluation {
        Evaluation::Initialized(_) => "started at rank 1".to_string(),
        Evaluation::Evaluated {
            checkpoint,
            previous_rank,
            rank,
            ..
        } => format!(
            "{} at {:.2}, rank {} -> {}",
            checkpoint.evolution, checkpoint.success_rate, previous_rank, rank
        ),
        Evaluation::InsufficientData {
            level,
            gathered,
            required,
        } => format!("{} answers of {} at {}", gathered, required, level.label),
    }
}

enum Reply {
    Number(i64),
    Choice(usize),
    Skip,
    Quit,
}

/// Index of a choice letter (`a` is 0), if it names one of `choices`.
fn choice_index(text: &str, choices: usize) -> Option<usize> {
    let mut chars = text.chars();
    let (Some(c), None) = (chars.next(), chars.next()) else {
        return None;
    };
    let index = u32::from(c.to_ascii_lowercase()).checked_sub(u32::from('a'))?;
    let index = usize::try_from(index).ok()?;
    (index < choices).then_some(index)
}

fn choice_letter(index: usize) -> char {
    u32::try_from(index)
        .ok()
        .and_then(|i| char::from_u32(u32::from('a') + i))
        .unwrap_or('?')
}

async fn read_reply(lines: &mut Lines<BufReader<Stdin>>, choices: usize) -> Result<Reply> {
    loop {
        let Some(line) = lines.next_line().await? else {
            return Ok(Reply::Quit);
        };
        match line.trim() {
            "q" | "quit" => return Ok(Reply::Quit),
            "" | "?" => return Ok(Reply::Skip),
            text if choices > 0 => match choice_index(text, choices) {
                Some(i) => return Ok(Reply::Choice(i)),
                None => {
                    print!("  a letter from a to {} please: ", choice_letter(choices - 1));
                    std::io::stdout().flush()?;
                }
            },
            text => match text.parse() {
                Ok(n) => return Ok(Reply::Number(n)),
                Err(_) => {
                    print!("  a number please (empty to skip, q to stop): ");
                    std::io::stdout().flush()?;
                }
            },
        }
    }
}

/// Ask every question on stdin. Stopping early leaves the rest unanswered.
async fn run_session(session: &mut TrainingSession) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let total = session.questions().len();

    while let Some(question) = session.current().cloned() {
        println!("[{}/{}] {} = ?", session.position() + 1, total, question.text());
        if question.is_multiple_choice() {
            let listed: Vec<String> = question
                .choices
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{}) {}", choice_letter(i), c))
                .collect();
            println!("  {}", listed.join("   "));
        }
        print!("> ");
        std::io::stdout().flush()?;

        let choices = question.choices.len();
        let started = Instant::now();
        let result = match read_reply(&mut lines, choices).await? {
            Reply::Quit => return Ok(()),
            Reply::Skip => {
                session.give_up()?;
                println!("  answer: {}", question.expected);
                continue;
            }
            Reply::Number(n) => session.submit(n, started.elapsed())?,
            Reply::Choice(i) => session.submit_choice(i, started.elapsed())?,
        };
        if result == AttemptResult::Correct {
            println!("  correct");
            continue;
        }

        print!("  not quite, try again: ");
        std::io::stdout().flush()?;
        let started = Instant::now();
        let retried = match read_reply(&mut lines, choices).await? {
            Reply::Quit => {
                session.give_up()?;
                return Ok(());
            }
            Reply::Skip => {
                session.give_up()?;
                None
            }
            Reply::Number(n) => Some(session.retry(n, started.elapsed())?),
            Reply::Choice(i) => Some(session.retry_choice(i, started.elapsed())?),
        };
        if retried == Some(AttemptResult::Correct) {
            println!("  correct");
            continue;
        }
        println!("  answer: {}", question.expected);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_letters() {
        assert_eq!(choice_index("a", 4), Some(0));
        assert_eq!(choice_index("D", 4), Some(3));
        assert_eq!(choice_index("e", 4), None);
        assert_eq!(choice_index("ab", 4), None);
        assert_eq!(choice_index("7", 4), None);
        assert_eq!(choice_letter(2), 'c');
    }

    fn config_in(dir: &Path, backend: Backend) -> Config {
        Config {
            data_dir: dir.join("data"),
            backend,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_json_backend_opens_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(&config_in(dir.path(), Backend::Json)).await.unwrap();
        assert!(storage.list_learners().await.unwrap().is_empty());
        assert!(dir.path().join("data").join("meta").is_dir());
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_sqlite_backend_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(&config_in(dir.path(), Backend::Sqlite)).await.unwrap();
        assert!(storage.list_learners().await.unwrap().is_empty());
        assert!(dir.path().join("data").join("drill.db").is_file());
    }

    #[cfg(not(feature = "sqlite"))]
    #[tokio::test]
    async fn test_sqlite_backend_needs_the_feature() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_storage(&config_in(dir.path(), Backend::Sqlite)).await.err().unwrap();
        assert!(err.to_string().contains("--features sqlite"));
    }
}
