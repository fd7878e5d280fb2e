use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use quiz_core::model::OptionLabel;
use quiz_core::parser::ExplanationMode;
use services::{
    AnswerFeedback, Clock, FinalStats, LevelEvaluation, LevelOutcome, LlmQuestionSource,
    SessionEngine, SessionError, SessionPhase,
};
use storage::repository::Storage;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::PlayArgs;

/// Line-oriented stdin reader.
struct Terminal {
    lines: Lines<BufReader<Stdin>>,
}

impl Terminal {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Print `text` and read one trimmed line; `None` at end of input.
    async fn prompt(&mut self, text: &str) -> anyhow::Result<Option<String>> {
        print!("{text}");
        std::io::stdout().flush()?;
        Ok(self
            .lines
            .next_line()
            .await?
            .map(|line| line.trim().to_owned()))
    }

    async fn confirm(&mut self, text: &str) -> anyhow::Result<bool> {
        Ok(match self.prompt(text).await? {
            None => false,
            Some(answer) => !matches!(answer.to_ascii_lowercase().as_str(), "n" | "no" | "q"),
        })
    }
}

pub async fn run(storage: &Storage, args: &PlayArgs) -> anyhow::Result<()> {
    let source = LlmQuestionSource::from_env()?;
    if !source.enabled() {
        bail!("no question source configured; set QUIZ_AI_API_KEY");
    }
    let mut engine = SessionEngine::new(
        Clock::default_clock(),
        Arc::new(source),
        Arc::clone(&storage.history),
    )
    .with_fetch_timeout(Duration::from_secs(args.timeout))
    .with_explanations(ExplanationMode::Required);
    let mut term = Terminal::new();

    start(&mut engine, args).await?;

    loop {
        match engine.phase() {
            SessionPhase::Answering => {
                if !ask_question(&mut engine, &mut term).await? {
                    return abandon(&mut engine);
                }
            }
            SessionPhase::LevelComplete => report_level(&engine.evaluate_level()?),
            SessionPhase::LevelPassed => {
                if !term.confirm("Continue to the next level? [Y/n] ").await? {
                    return abandon(&mut engine);
                }
                println!("Generating questions...");
                report_load(engine.advance_level().await)?;
            }
            SessionPhase::LevelFailed | SessionPhase::Ready => {
                if !term.confirm("Try this level again? [Y/n] ").await? {
                    return abandon(&mut engine);
                }
                println!("Generating questions...");
                report_load(engine.retry_level().await)?;
            }
            SessionPhase::Finished => match engine.end_session().await {
                Ok(stats) => {
                    print_stats(&stats);
                    return Ok(());
                }
                Err(err) if err.is_recoverable() => {
                    eprintln!("Could not save your result: {err}");
                    if !term.confirm("Try saving again? [Y/n] ").await? {
                        return abandon(&mut engine);
                    }
                }
                Err(err) => return Err(err.into()),
            },
            SessionPhase::Loading { .. } => {
                engine.abort_load();
            }
            SessionPhase::Idle => return Ok(()),
        }
    }
}

async fn start(engine: &mut SessionEngine, args: &PlayArgs) -> anyhow::Result<()> {
    println!(
        "Welcome to the laboratory. Generating {} questions about {}...",
        args.difficulty, args.topic
    );
    report_load(
        engine
            .start_session(&args.topic, args.difficulty, args.questions, args.levels)
            .await,
    )
}

/// Recoverable load failures are shown and leave the session in place.
fn report_load(result: Result<(), SessionError>) -> anyhow::Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.is_recoverable() => {
            eprintln!("Could not load questions: {err}");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn abandon(engine: &mut SessionEngine) -> anyhow::Result<()> {
    engine.quit_session();
    println!("You leave the laboratory. Nothing was recorded.");
    Ok(())
}

/// Returns false when the player quits.
async fn ask_question(engine: &mut SessionEngine, term: &mut Terminal) -> anyhow::Result<bool> {
    let state = engine.state().context("no active session")?;
    let index = state.current_question_index();
    if index == 0 {
        println!();
        println!(
            "=== Level {}/{} ({}) ===",
            state.current_level(),
            state.config().total_levels(),
            state.level_difficulty().title()
        );
        if let Some(description) = engine.level_description() {
            println!("{description}");
        }
    }
    let remaining = engine
        .progress()
        .map(|p| p.remaining_label())
        .unwrap_or_default();
    let question = engine
        .current_question()
        .context("no question to answer")?;

    println!();
    println!("[{remaining} left] {}", question.text());
    for option in question.options() {
        println!("  {option}");
    }

    loop {
        let Some(input) = term.prompt("Your answer (A-D, q to quit): ").await? else {
            return Ok(false);
        };
        if input.eq_ignore_ascii_case("q") {
            return Ok(false);
        }
        let Ok(label) = input.parse::<OptionLabel>() else {
            println!("Please enter A, B, C or D.");
            continue;
        };
        if let Some(feedback) = engine.submit_answer(index, label)? {
            print_feedback(&feedback);
        }
        return Ok(true);
    }
}

fn print_feedback(feedback: &AnswerFeedback) {
    if feedback.is_correct {
        println!("Correct!");
    } else {
        println!("Incorrect. The answer was {}.", feedback.correct_label);
    }
    if let Some(explanation) = &feedback.explanation {
        println!("{explanation}");
    }
}

fn report_level(evaluation: &LevelEvaluation) {
    let result = &evaluation.result;
    println!();
    println!(
        "Level {} result: {}/{} correct ({:.0}%).",
        result.level_index(),
        result.questions_correct(),
        result.questions_total(),
        result.success_rate() * 100.0
    );
    match evaluation.outcome {
        LevelOutcome::Passed => println!("The door unlocks. A new chamber awaits."),
        LevelOutcome::Failed => println!("The door stays sealed. You need at least half right."),
        LevelOutcome::SessionComplete => println!("You escaped the laboratory!"),
    }
}

fn print_stats(stats: &FinalStats) {
    println!();
    println!("=== Game over: {} ===", stats.topic);
    println!(
        "Score: {}/{} ({:.2}%)",
        stats.total_correct, stats.total_answered, stats.feedback.accuracy_percent
    );
    println!(
        "Levels: {} at {} difficulty",
        stats.total_levels,
        stats.base_difficulty.title()
    );
    println!("Time: {}", stats.elapsed_display());
    println!();
    println!("{}", stats.feedback.text);
}
