use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use quiz_core::model::{Difficulty, HistoryEntry, OptionLabel};
use quiz_core::parser::{EXPLANATION_PLACEHOLDER, ExplanationMode};
use quiz_core::time::fixed_now;
use serde_json::json;
use services::sessions::Improvement;
use services::{
    Clock, LevelOutcome, QuestionRequest, QuestionSource, ScriptedQuestionSource, SessionEngine,
    SessionError, SessionPhase, SourceError, StateError,
};
use storage::repository::{HistoryRepository, HistoryRow, InMemoryRepository, StorageError};

use OptionLabel::{A, B};

/// `count` questions whose correct answer is always A.
fn batch(count: usize) -> String {
    let items: Vec<_> = (1..=count)
        .map(|i| {
            json!({
                "question": format!("Question {i}?"),
                "options": ["A. one", "B. two", "C. three", "D. four"],
                "correct_answer": "A",
                "topic": format!("Subtopic {i}"),
            })
        })
        .collect();
    serde_json::to_string(&items).unwrap()
}

fn engine(source: &Arc<ScriptedQuestionSource>, history: &Arc<InMemoryRepository>) -> SessionEngine {
    SessionEngine::new(Clock::fixed(fixed_now()), source.clone(), history.clone())
}

fn answer_all(engine: &mut SessionEngine, labels: &[OptionLabel]) {
    for (index, label) in labels.iter().enumerate() {
        engine
            .submit_answer(index, *label)
            .unwrap()
            .expect("question should be unanswered");
        let state = engine.state().unwrap();
        assert!(state.total_correct() <= state.total_answered());
    }
}

#[tokio::test]
async fn start_loads_first_level_at_base_difficulty() {
    let source = Arc::new(ScriptedQuestionSource::new().with_response(format!(
        "\"level_description\": \"The lab hums quietly.\"\n{}",
        batch(3)
    )));
    let history = Arc::new(InMemoryRepository::new());
    let mut engine = engine(&source, &history);

    engine
        .start_session("Chemistry", Difficulty::Medium, 3, 5)
        .await
        .unwrap();

    assert_eq!(engine.phase(), SessionPhase::Answering);
    assert_eq!(engine.level_description(), Some("The lab hums quietly."));
    assert_eq!(engine.current_question().unwrap().text(), "Question 1?");

    let requests = source.requests();
    assert_eq!(
        requests,
        vec![QuestionRequest {
            topic: "Chemistry".into(),
            num_questions: 3,
            difficulty: Difficulty::Medium,
            level: 1,
            performance_score: None,
        }]
    );

    let progress = engine.progress().unwrap();
    assert_eq!(progress.level, 1);
    assert_eq!(progress.remaining_in_level, 3);
    assert_eq!(progress.remaining_label(), "3 Questions");
}

#[tokio::test]
async fn invalid_configuration_creates_no_session() {
    let source = Arc::new(ScriptedQuestionSource::new().with_response(batch(3)));
    let history = Arc::new(InMemoryRepository::new());
    let mut engine = engine(&source, &history);

    for (topic, per_level, levels) in [("  ", 3, 5), ("Rust", 0, 5), ("Rust", 3, 0)] {
        let err = engine
            .start_session(topic, Difficulty::Easy, per_level, levels)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)), "{err}");
        assert!(!err.is_recoverable());
    }
    assert_eq!(engine.phase(), SessionPhase::Idle);
    assert!(engine.state().is_none());
    assert!(source.requests().is_empty());
}

#[tokio::test]
async fn two_of_four_passes_and_one_of_four_fails() {
    let source = Arc::new(
        ScriptedQuestionSource::new()
            .with_response(batch(4))
            .with_response(batch(4)),
    );
    let history = Arc::new(InMemoryRepository::new());
    let mut engine = engine(&source, &history);
    engine
        .start_session("Rust", Difficulty::Medium, 4, 3)
        .await
        .unwrap();

    answer_all(&mut engine, &[A, A, B, B]);
    assert_eq!(engine.phase(), SessionPhase::LevelComplete);
    let evaluation = engine.evaluate_level().unwrap();
    assert_eq!(evaluation.outcome, LevelOutcome::Passed);
    assert!((evaluation.result.success_rate() - 0.5).abs() < f64::EPSILON);
    assert_eq!(engine.phase(), SessionPhase::LevelPassed);

    engine.advance_level().await.unwrap();
    assert_eq!(engine.state().unwrap().current_level(), 2);
    answer_all(&mut engine, &[A, B, B, B]);
    let evaluation = engine.evaluate_level().unwrap();
    assert_eq!(evaluation.outcome, LevelOutcome::Failed);
    assert_eq!(engine.phase(), SessionPhase::LevelFailed);
    assert_eq!(engine.state().unwrap().level_results().len(), 2);
}

#[tokio::test]
async fn retry_keeps_totals_and_adjusts_difficulty() {
    let source = Arc::new(
        ScriptedQuestionSource::new()
            .with_response(batch(3))
            .with_response(batch(3)),
    );
    let history = Arc::new(InMemoryRepository::new());
    let mut engine = engine(&source, &history);
    engine
        .start_session("Rust", Difficulty::Medium, 3, 2)
        .await
        .unwrap();

    answer_all(&mut engine, &[A, B, B]);
    assert_eq!(engine.evaluate_level().unwrap().outcome, LevelOutcome::Failed);
    assert!(matches!(
        engine.advance_level().await.unwrap_err(),
        SessionError::State(StateError::InvalidPhase { .. })
    ));

    engine.retry_level().await.unwrap();
    let state = engine.state().unwrap();
    assert_eq!(state.current_level(), 1);
    assert_eq!(state.current_question_index(), 0);
    assert_eq!(state.correct_in_level(), 0);
    assert_eq!(state.total_correct(), 1);
    assert_eq!(state.total_answered(), 3);
    assert_eq!(
        state.incorrect_topics(),
        &["Subtopic 2".to_owned(), "Subtopic 3".to_owned()]
    );

    // 1 of 3 correct is below 50, so the retry is requested one step easier.
    let retry = &source.requests()[1];
    assert_eq!(retry.level, 1);
    assert_eq!(retry.difficulty, Difficulty::Easy);
    assert_eq!(state.level_difficulty(), Difficulty::Easy);
}

#[tokio::test]
async fn second_answer_for_same_question_is_a_no_op() {
    let source = Arc::new(ScriptedQuestionSource::new().with_response(batch(2)));
    let history = Arc::new(InMemoryRepository::new());
    let mut engine = engine(&source, &history);
    engine
        .start_session("Rust", Difficulty::Easy, 2, 1)
        .await
        .unwrap();

    let feedback = engine.submit_answer(0, B).unwrap().unwrap();
    assert!(!feedback.is_correct);
    assert_eq!(feedback.correct_label, A);
    assert!(!feedback.level_complete);

    assert_eq!(engine.submit_answer(0, A).unwrap(), None);
    let state = engine.state().unwrap();
    assert_eq!(state.total_answered(), 1);
    assert_eq!(state.total_correct(), 0);
    assert_eq!(state.current_question_index(), 1);

    let err = engine.submit_answer(5, A).unwrap_err();
    assert!(matches!(
        err,
        SessionError::State(StateError::NotActiveQuestion {
            requested: 5,
            active: 1
        })
    ));

    let last = engine.submit_answer(1, A).unwrap().unwrap();
    assert!(last.level_complete);
    assert_eq!(engine.submit_answer(1, B).unwrap(), None);
    assert_eq!(engine.state().unwrap().total_answered(), 2);
}

#[tokio::test]
async fn answering_again_after_evaluation_is_a_no_op() {
    let source = Arc::new(ScriptedQuestionSource::new().with_response(batch(2)));
    let history = Arc::new(InMemoryRepository::new());
    let mut engine = engine(&source, &history);
    engine
        .start_session("Rust", Difficulty::Easy, 2, 2)
        .await
        .unwrap();
    answer_all(&mut engine, &[A, B]);
    assert_eq!(engine.submit_answer(1, A).unwrap(), None);

    engine.evaluate_level().unwrap();
    assert_eq!(engine.phase(), SessionPhase::LevelPassed);
    assert_eq!(engine.submit_answer(1, A).unwrap(), None);
    assert_eq!(engine.submit_answer(0, B).unwrap(), None);

    let state = engine.state().unwrap();
    assert_eq!(state.total_answered(), 2);
    assert_eq!(state.total_correct(), 1);
    assert_eq!(engine.phase(), SessionPhase::LevelPassed);

    // Indices past the level were never answered.
    assert!(matches!(
        engine.submit_answer(2, A).unwrap_err(),
        SessionError::State(StateError::InvalidPhase { .. })
    ));
}

#[tokio::test]
async fn passing_every_level_records_one_history_entry() {
    let source = Arc::new(
        ScriptedQuestionSource::new()
            .with_response(batch(3))
            .with_response(batch(3)),
    );
    let history = Arc::new(InMemoryRepository::new());
    let mut engine = engine(&source, &history);
    engine
        .start_session("Rust", Difficulty::Medium, 3, 2)
        .await
        .unwrap();

    answer_all(&mut engine, &[A, A, A]);
    assert_eq!(engine.evaluate_level().unwrap().outcome, LevelOutcome::Passed);
    engine.advance_level().await.unwrap();
    // Perfect score so far: level 2 is requested one step harder.
    assert_eq!(source.requests()[1].difficulty, Difficulty::Hard);
    assert_eq!(source.requests()[1].performance_score, Some(100.0));

    answer_all(&mut engine, &[A, B, A]);
    assert_eq!(
        engine.evaluate_level().unwrap().outcome,
        LevelOutcome::SessionComplete
    );
    assert_eq!(engine.phase(), SessionPhase::Finished);

    let mut clock = engine.clock();
    clock.advance(chrono::Duration::seconds(95));
    engine.set_clock(clock);

    let stats = engine.end_session().await.unwrap();
    assert_eq!(stats.total_correct, 5);
    assert_eq!(stats.total_answered, 6);
    assert_eq!(stats.total_levels, 2);
    assert_eq!(stats.base_difficulty, Difficulty::Medium);
    assert_eq!(stats.elapsed_seconds, 95);
    assert_eq!(stats.elapsed_display(), "1:35");
    assert_eq!(stats.feedback.weak_topics, vec!["Subtopic 2"]);
    assert_eq!(stats.feedback.improvement, Improvement::FirstAttempt);

    assert_eq!(history.len().unwrap(), 1);
    let entry = history.get_entry(stats.history_id).await.unwrap();
    assert_eq!(entry.total_questions(), stats.total_answered);
    assert_eq!(entry.correct_answers(), 5);

    assert_eq!(engine.phase(), SessionPhase::Idle);
    assert!(engine.state().is_none());
}

#[tokio::test]
async fn failed_load_leaves_session_untouched() {
    let source = Arc::new(
        ScriptedQuestionSource::new()
            .with_response(batch(2))
            .with_failure(SourceError::EmptyResponse)
            .with_response("I'm sorry, I can't help with that.")
            .with_response(batch(1))
            .with_response(batch(2)),
    );
    let history = Arc::new(InMemoryRepository::new());
    let mut engine = engine(&source, &history);
    engine
        .start_session("Rust", Difficulty::Medium, 2, 2)
        .await
        .unwrap();
    answer_all(&mut engine, &[A, A]);
    engine.evaluate_level().unwrap();
    let before = engine.state().unwrap().clone();

    let err = engine.advance_level().await.unwrap_err();
    assert!(matches!(err, SessionError::SourceUnavailable(_)));
    assert!(err.is_recoverable());

    let err = engine.advance_level().await.unwrap_err();
    assert!(matches!(err, SessionError::Parse(_)), "{err}");

    let err = engine.advance_level().await.unwrap_err();
    assert!(matches!(err, SessionError::Schema(_)), "{err}");

    assert_eq!(engine.phase(), SessionPhase::LevelPassed);
    let after = engine.state().unwrap();
    assert_eq!(after.current_level(), before.current_level());
    assert_eq!(after.current_question_index(), before.current_question_index());
    assert_eq!(after.total_correct(), before.total_correct());
    assert_eq!(after.total_answered(), before.total_answered());
    assert_eq!(after.questions(), before.questions());

    engine.advance_level().await.unwrap();
    assert_eq!(engine.state().unwrap().current_level(), 2);
    assert_eq!(engine.phase(), SessionPhase::Answering);
}

#[tokio::test]
async fn failed_first_load_can_be_retried() {
    let source = Arc::new(
        ScriptedQuestionSource::new()
            .with_failure(SourceError::Disabled)
            .with_response(batch(2)),
    );
    let history = Arc::new(InMemoryRepository::new());
    let mut engine = engine(&source, &history);

    let err = engine
        .start_session("Rust", Difficulty::Hard, 2, 3)
        .await
        .unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(engine.phase(), SessionPhase::Ready);
    let state = engine.state().unwrap();
    assert_eq!(state.current_level(), 1);
    assert!(state.questions().is_empty());
    assert!(engine.current_question().is_none());

    engine.retry_level().await.unwrap();
    assert_eq!(engine.phase(), SessionPhase::Answering);
    // The placeholder is used when the response has no description.
    assert_eq!(
        engine.level_description(),
        Some("Level 1: The laboratory grows more ominous as you progress deeper.")
    );
}

#[tokio::test]
async fn operations_out_of_phase_are_rejected() {
    let source = Arc::new(ScriptedQuestionSource::new().with_response(batch(2)));
    let history = Arc::new(InMemoryRepository::new());
    let mut engine = engine(&source, &history);

    assert!(matches!(
        engine.submit_answer(0, A).unwrap_err(),
        SessionError::State(StateError::NoSession)
    ));
    assert!(matches!(
        engine.end_session().await.unwrap_err(),
        SessionError::State(StateError::NoSession)
    ));

    engine
        .start_session("Rust", Difficulty::Easy, 2, 2)
        .await
        .unwrap();
    assert!(matches!(
        engine.evaluate_level().unwrap_err(),
        SessionError::State(StateError::InvalidPhase {
            phase: SessionPhase::Answering,
            ..
        })
    ));
    assert!(matches!(
        engine.load_level(2).await.unwrap_err(),
        SessionError::State(StateError::InvalidPhase { .. })
    ));
    assert!(matches!(
        engine
            .start_session("Other", Difficulty::Easy, 1, 1)
            .await
            .unwrap_err(),
        SessionError::State(_)
    ));

    answer_all(&mut engine, &[A, A]);
    engine.evaluate_level().unwrap();
    let err = engine.load_level(3).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::State(StateError::LevelOutOfSequence {
            requested: 3,
            current: 1
        })
    ));
    assert!(!err.is_recoverable());
    assert_eq!(source.requests().len(), 1);
}

#[tokio::test]
async fn quitting_discards_the_session_without_history() {
    let source = Arc::new(
        ScriptedQuestionSource::new()
            .with_response(batch(1))
            .with_response(batch(1)),
    );
    let history = Arc::new(InMemoryRepository::new());
    let mut engine = engine(&source, &history);
    engine
        .start_session("Rust", Difficulty::Easy, 1, 1)
        .await
        .unwrap();
    answer_all(&mut engine, &[A]);
    engine.evaluate_level().unwrap();

    engine.quit_session();
    assert_eq!(engine.phase(), SessionPhase::Idle);
    assert!(engine.state().is_none());
    assert_eq!(history.len().unwrap(), 0);

    engine
        .start_session("Rust", Difficulty::Easy, 1, 1)
        .await
        .unwrap();
    assert_eq!(engine.state().unwrap().total_answered(), 0);
}

#[tokio::test]
async fn feedback_compares_with_previous_attempt() {
    let source = Arc::new(ScriptedQuestionSource::new().with_response(batch(4)));
    let history = Arc::new(InMemoryRepository::new());
    let earlier = fixed_now() - chrono::Duration::days(1);
    history
        .append_entry(&HistoryEntry::new("Rust", 1, 2, earlier).unwrap())
        .await
        .unwrap();
    history
        .append_entry(&HistoryEntry::new("Geology", 0, 4, earlier).unwrap())
        .await
        .unwrap();

    let mut engine = engine(&source, &history);
    engine
        .start_session("rust", Difficulty::Medium, 4, 1)
        .await
        .unwrap();
    answer_all(&mut engine, &[A, A, A, B]);
    engine.evaluate_level().unwrap();

    let stats = engine.end_session().await.unwrap();
    assert_eq!(
        stats.feedback.improvement,
        Improvement::Changed {
            delta_percent: 25.0
        }
    );
    assert!(stats.feedback.text.contains("Subtopic 4"));
    assert!(stats.feedback.text.contains("improved by 25.00%"));
    assert_eq!(history.entries_for_topic("Rust").await.unwrap().len(), 2);
}

#[tokio::test]
async fn required_explanations_are_filled_in() {
    let source = Arc::new(ScriptedQuestionSource::new().with_response(batch(1)));
    let history = Arc::new(InMemoryRepository::new());
    let mut engine = engine(&source, &history).with_explanations(ExplanationMode::Required);
    engine
        .start_session("Rust", Difficulty::Easy, 1, 1)
        .await
        .unwrap();
    let feedback = engine.submit_answer(0, A).unwrap().unwrap();
    assert_eq!(feedback.explanation.as_deref(), Some(EXPLANATION_PLACEHOLDER));
}

/// Delegates to an in-memory repository but fails the first append.
struct FlakyHistory {
    inner: InMemoryRepository,
    fail_next_append: AtomicBool,
}

#[async_trait]
impl HistoryRepository for FlakyHistory {
    async fn append_entry(&self, entry: &HistoryEntry) -> Result<i64, StorageError> {
        if self.fail_next_append.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Connection("disk unavailable".into()));
        }
        self.inner.append_entry(entry).await
    }

    async fn get_entry(&self, id: i64) -> Result<HistoryEntry, StorageError> {
        self.inner.get_entry(id).await
    }

    async fn entries_for_topic(&self, topic: &str) -> Result<Vec<HistoryEntry>, StorageError> {
        self.inner.entries_for_topic(topic).await
    }

    async fn list_rows(&self, limit: u32) -> Result<Vec<HistoryRow>, StorageError> {
        self.inner.list_rows(limit).await
    }
}

#[tokio::test]
async fn failed_history_write_can_be_retried_once() {
    let source = Arc::new(ScriptedQuestionSource::new().with_response(batch(1)));
    let inner = InMemoryRepository::new();
    let history = Arc::new(FlakyHistory {
        inner: inner.clone(),
        fail_next_append: AtomicBool::new(true),
    });
    let mut engine = SessionEngine::new(Clock::fixed(fixed_now()), source, history);
    engine
        .start_session("Rust", Difficulty::Easy, 1, 1)
        .await
        .unwrap();
    answer_all(&mut engine, &[A]);
    engine.evaluate_level().unwrap();

    let err = engine.end_session().await.unwrap_err();
    assert!(matches!(err, SessionError::Storage(_)));
    assert_eq!(engine.phase(), SessionPhase::Finished);
    assert_eq!(inner.len().unwrap(), 0);

    engine.end_session().await.unwrap();
    assert_eq!(inner.len().unwrap(), 1);
}

/// Never answers within a test's lifetime.
struct StalledSource;

#[async_trait]
impl QuestionSource for StalledSource {
    async fn fetch(&self, _request: &QuestionRequest) -> Result<String, SourceError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(batch(1))
    }
}

#[tokio::test]
async fn slow_source_times_out_as_unavailable() {
    let history = Arc::new(InMemoryRepository::new());
    let mut engine = SessionEngine::new(Clock::fixed(fixed_now()), Arc::new(StalledSource), history)
        .with_fetch_timeout(Duration::from_millis(20));

    let err = engine
        .start_session("Rust", Difficulty::Easy, 1, 1)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::SourceUnavailable(SourceError::Timeout(_))
    ));
    assert_eq!(engine.phase(), SessionPhase::Ready);
}

#[tokio::test]
async fn abandoned_load_can_be_aborted() {
    let history = Arc::new(InMemoryRepository::new());
    let mut engine = SessionEngine::new(Clock::fixed(fixed_now()), Arc::new(StalledSource), history);

    let dropped = tokio::time::timeout(
        Duration::from_millis(20),
        engine.start_session("Rust", Difficulty::Easy, 1, 1),
    )
    .await;
    assert!(dropped.is_err());
    assert_eq!(engine.phase(), SessionPhase::Loading { level: 1 });

    let loading = |err: SessionError| {
        matches!(
            err,
            SessionError::State(StateError::InvalidPhase {
                phase: SessionPhase::Loading { level: 1 },
                ..
            })
        )
    };
    assert!(loading(engine.submit_answer(0, A).unwrap_err()));
    assert!(loading(engine.evaluate_level().unwrap_err()));
    assert!(loading(engine.retry_level().await.unwrap_err()));
    assert!(loading(engine.advance_level().await.unwrap_err()));
    assert!(loading(engine.load_level(1).await.unwrap_err()));
    assert!(loading(engine.end_session().await.unwrap_err()));
    assert_eq!(engine.phase(), SessionPhase::Loading { level: 1 });

    assert!(engine.abort_load());
    assert_eq!(engine.phase(), SessionPhase::Ready);
    assert!(!engine.abort_load());
}
