//! Terminal front end for the adaptive quiz.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use quiz_core::model::{Difficulty, SessionConfig};
use storage::repository::{HistoryRow, Storage};
use tracing_subscriber::EnvFilter;

mod play;

/// Adaptive multiple-choice quiz with a laboratory escape-room theme.
#[derive(Parser, Debug)]
#[command(name = "quiz")]
#[command(version, about, long_about = None)]
struct Cli {
    /// SQLite database holding quiz history
    #[arg(long, global = true, env = "QUIZ_DB_URL", default_value = "sqlite://quiz.sqlite3")]
    db: String,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a session
    Play(PlayArgs),
    /// Show past results
    History(HistoryArgs),
}

#[derive(Args, Debug)]
struct PlayArgs {
    /// Subject to be quizzed on
    topic: String,

    /// Starting difficulty: easy, medium or hard
    #[arg(short, long, default_value_t = Difficulty::Medium)]
    difficulty: Difficulty,

    /// Questions per level
    #[arg(short, long, default_value_t = SessionConfig::DEFAULT_QUESTIONS_PER_LEVEL)]
    questions: u32,

    /// Number of levels
    #[arg(short, long, default_value_t = SessionConfig::DEFAULT_TOTAL_LEVELS)]
    levels: u32,

    /// Seconds to wait for a batch of questions
    #[arg(long, default_value_t = 60)]
    timeout: u64,
}

#[derive(Args, Debug)]
struct HistoryArgs {
    /// Only show sessions for this topic
    topic: Option<String>,

    /// Maximum number of sessions to list
    #[arg(short = 'n', long, default_value_t = 20)]
    limit: u32,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose.
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let db_url = normalize_sqlite_url(&cli.db);
    prepare_sqlite_file(&db_url)?;
    let storage = Storage::sqlite(&db_url)
        .await
        .with_context(|| format!("opening {db_url}"))?;
    tracing::debug!(db_url, "history store ready");

    match cli.command {
        Command::Play(args) => play::run(&storage, &args).await,
        Command::History(args) => show_history(&storage, &args).await,
    }
}

async fn show_history(storage: &Storage, args: &HistoryArgs) -> anyhow::Result<()> {
    let rows: Vec<HistoryRow> = match &args.topic {
        Some(topic) => {
            let entries = storage.history.entries_for_topic(topic).await?;
            let limit = usize::try_from(args.limit).unwrap_or(usize::MAX);
            let skip = entries.len().saturating_sub(limit);
            // Ids are not needed per topic; number them by attempt.
            entries
                .into_iter()
                .enumerate()
                .skip(skip)
                .rev()
                .map(|(attempt, entry)| {
                    HistoryRow::new(i64::try_from(attempt + 1).unwrap_or(i64::MAX), entry)
                })
                .collect()
        }
        None => storage.history.list_rows(args.limit).await?,
    };

    if args.json {
        let entries: Vec<_> = rows.iter().map(|row| &row.entry).collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No sessions recorded yet.");
        return Ok(());
    }
    println!("{:>4}  {:<20}  {:>7}  {:>8}  date", "#", "topic", "score", "accuracy");
    for row in &rows {
        let entry = &row.entry;
        println!(
            "{:>4}  {:<20}  {:>7}  {:>7.1}%  {}",
            row.id,
            entry.topic(),
            format!("{}/{}", entry.correct_answers(), entry.total_questions()),
            entry.accuracy_percent(),
            entry.completed_at().format("%Y-%m-%d %H:%M"),
        );
    }
    Ok(())
}

fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return trimmed.to_owned();
    }

    let path = Path::new(trimmed.strip_prefix("sqlite:").unwrap_or(trimmed));
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// sqlx will not create a missing database file, so touch it first.
fn prepare_sqlite_file(db_url: &str) -> anyhow::Result<()> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let Some(path) = db_url.strip_prefix("sqlite://") else {
        bail!("invalid database url: {db_url}");
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        bail!("invalid database url: {db_url}");
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("creating {}", path.display()))?;
    }
    Ok(())
}
