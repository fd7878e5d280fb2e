use std::sync::Arc;
use std::time::Duration;

use quiz_core::advisor::{effective_difficulty, performance_score};
use quiz_core::model::{Difficulty, HistoryEntry, LevelResult, OptionLabel, Question, SessionConfig};
use quiz_core::parser::{
    ExplanationMode, ParseOptions, ParsedBatch, default_level_description, parse_questions,
};
use quiz_core::time::format_elapsed;
use storage::repository::HistoryRepository;

use super::feedback::SessionFeedback;
use super::progress::SessionProgress;
use super::state::{SessionPhase, SessionState};
use crate::Clock;
use crate::error::{SessionError, SourceError, StateError};
use crate::source::{QuestionRequest, QuestionSource};

/// Result of answering the active question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerFeedback {
    pub selected: OptionLabel,
    pub is_correct: bool,
    pub correct_label: OptionLabel,
    pub explanation: Option<String>,
    /// True when this answer was the last one in the level.
    pub level_complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelOutcome {
    /// Passed; `advance_level` loads the next one.
    Passed,
    /// Failed; `retry_level` reloads the same level.
    Failed,
    /// Passed the last level; `end_session` records the result.
    SessionComplete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LevelEvaluation {
    pub result: LevelResult,
    pub outcome: LevelOutcome,
}

/// Summary returned by `end_session`.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalStats {
    pub topic: String,
    pub base_difficulty: Difficulty,
    pub total_levels: u32,
    pub total_correct: u32,
    pub total_answered: u32,
    pub elapsed_seconds: u64,
    pub feedback: SessionFeedback,
    /// Storage id of the appended history entry.
    pub history_id: i64,
}

impl FinalStats {
    /// Elapsed time as `m:ss`.
    #[must_use]
    pub fn elapsed_display(&self) -> String {
        format_elapsed(self.elapsed_seconds)
    }
}

/// Drives one quiz session at a time through its levels.
///
/// All mutating operations take `&mut self`; the only suspension point is the
/// question fetch inside a level load. If a load future is dropped before it
/// completes, call [`SessionEngine::abort_load`] to leave the `Loading` phase.
pub struct SessionEngine {
    clock: Clock,
    source: Arc<dyn QuestionSource>,
    history: Arc<dyn HistoryRepository>,
    fetch_timeout: Option<Duration>,
    explanations: ExplanationMode,
    phase: SessionPhase,
    phase_before_load: Option<SessionPhase>,
    state: Option<SessionState>,
}

impl SessionEngine {
    #[must_use]
    pub fn new(
        clock: Clock,
        source: Arc<dyn QuestionSource>,
        history: Arc<dyn HistoryRepository>,
    ) -> Self {
        Self {
            clock,
            source,
            history,
            fetch_timeout: None,
            explanations: ExplanationMode::default(),
            phase: SessionPhase::Idle,
            phase_before_load: None,
            state: None,
        }
    }

    /// Fail a fetch that takes longer than `timeout` with `SourceUnavailable`.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_explanations(mut self, mode: ExplanationMode) -> Self {
        self.explanations = mode;
        self
    }

    pub fn set_clock(&mut self, clock: Clock) {
        self.clock = clock;
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn state(&self) -> Option<&SessionState> {
        self.state.as_ref()
    }

    /// The question awaiting an answer, if any.
    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        if self.phase != SessionPhase::Answering {
            return None;
        }
        self.state.as_ref()?.current_question()
    }

    #[must_use]
    pub fn level_description(&self) -> Option<&str> {
        self.state.as_ref()?.level_description()
    }

    #[must_use]
    pub fn progress(&self) -> Option<SessionProgress> {
        let state = self.state.as_ref()?;
        let questions_in_level = state.questions.len();
        let answered_in_level = state.current_question_index.min(questions_in_level);
        let cleared = state
            .level_results
            .iter()
            .filter(|result| result.passed())
            .count();
        let total_levels = state.config.total_levels();
        Some(SessionProgress {
            level: state.current_level,
            total_levels,
            questions_in_level,
            answered_in_level,
            remaining_in_level: questions_in_level - answered_in_level,
            correct_in_level: state.correct_in_level,
            total_correct: state.total_correct,
            total_answered: state.total_answered,
            levels_cleared: cleared as f64 / f64::from(total_levels),
        })
    }

    //
    // ─── LIFECYCLE ─────────────────────────────────────────────────────────────
    //

    /// Validate the configuration, create the session at level 1 and load it.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` (no session is created) for a bad
    /// configuration, and `SessionError::State` if a session already exists.
    /// A failed first load is returned as-is; the session then stays `Ready`
    /// and can be retried with `retry_level`.
    pub async fn start_session(
        &mut self,
        topic: &str,
        base_difficulty: Difficulty,
        questions_per_level: u32,
        total_levels: u32,
    ) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Idle {
            return Err(self.invalid_phase("start a session"));
        }
        let config = SessionConfig::new(topic, base_difficulty, questions_per_level, total_levels)?;
        let state = SessionState::new(config, self.clock.now());
        tracing::info!(
            session = %state.id(),
            topic = state.topic(),
            difficulty = %base_difficulty,
            questions_per_level,
            total_levels,
            "session started"
        );
        self.state = Some(state);
        self.phase = SessionPhase::Ready;
        self.load_level(1).await
    }

    /// Fetch and install the questions for `level`.
    ///
    /// Allowed from `Ready` or `LevelFailed` for the current level, and from
    /// `LevelPassed` for the next one. Nothing changes unless the load succeeds.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::State` for a disallowed phase or level, and
    /// `SourceUnavailable`, `Parse` or `Schema` when the batch cannot be loaded.
    pub async fn load_level(&mut self, level: u32) -> Result<(), SessionError> {
        let (request, expected) = self.prepare_load(level)?;

        let previous = self.phase;
        self.phase = SessionPhase::Loading { level };
        self.phase_before_load = Some(previous);

        let loaded = self.fetch_batch(&request, expected).await;
        self.phase_before_load = None;

        match loaded {
            Ok(batch) => {
                self.commit_level(level, request.difficulty, batch);
                Ok(())
            }
            Err(err) => {
                self.phase = previous;
                tracing::warn!(level, error = %err, "level load failed");
                Err(err)
            }
        }
    }

    /// Leave the `Loading` phase after a load future was dropped mid-fetch.
    ///
    /// Returns true if a load was interrupted.
    pub fn abort_load(&mut self) -> bool {
        match (self.phase, self.phase_before_load.take()) {
            (SessionPhase::Loading { level }, Some(previous)) => {
                tracing::debug!(level, "level load abandoned");
                self.phase = previous;
                true
            }
            _ => false,
        }
    }

    /// Answer the active question.
    ///
    /// Returns `Ok(None)` without touching the score when `question_index`
    /// was already answered in the most recently loaded level, before or
    /// after that level is evaluated.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::State` when no question is awaiting an answer or
    /// `question_index` is not the active one.
    pub fn submit_answer(
        &mut self,
        question_index: usize,
        selected: OptionLabel,
    ) -> Result<Option<AnswerFeedback>, SessionError> {
        let phase = self.phase;
        let state = self.state.as_mut().ok_or(StateError::NoSession)?;

        let answered_phase = matches!(
            phase,
            SessionPhase::Answering
                | SessionPhase::LevelComplete
                | SessionPhase::LevelPassed
                | SessionPhase::LevelFailed
                | SessionPhase::Finished
        );
        if answered_phase && question_index < state.current_question_index {
            tracing::debug!(question_index, "duplicate answer ignored");
            return Ok(None);
        }
        if phase != SessionPhase::Answering {
            return Err(StateError::InvalidPhase {
                operation: "submit an answer",
                phase,
            }
            .into());
        }
        if question_index != state.current_question_index {
            return Err(StateError::NotActiveQuestion {
                requested: question_index,
                active: state.current_question_index,
            }
            .into());
        }

        let question = state
            .questions
            .get(question_index)
            .ok_or(StateError::NotActiveQuestion {
                requested: question_index,
                active: state.current_question_index,
            })?;
        let is_correct = question.is_correct(selected);
        let correct_label = question.correct_label();
        let explanation = question.explanation().map(str::to_owned);
        let missed_topic = (!is_correct).then(|| {
            question
                .topic()
                .unwrap_or_else(|| state.config.topic())
                .to_owned()
        });

        state.total_answered += 1;
        if is_correct {
            state.total_correct += 1;
            state.correct_in_level += 1;
        }
        if let Some(topic) = missed_topic {
            state.incorrect_topics.push(topic);
        }
        state.current_question_index += 1;

        let level_complete = state.current_question_index >= state.questions.len();
        if level_complete {
            self.phase = SessionPhase::LevelComplete;
        }

        Ok(Some(AnswerFeedback {
            selected,
            is_correct,
            correct_label,
            explanation,
            level_complete,
        }))
    }

    /// Score the finished level and decide what comes next.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::State` unless every question in the level has
    /// been answered.
    pub fn evaluate_level(&mut self) -> Result<LevelEvaluation, SessionError> {
        if self.phase != SessionPhase::LevelComplete {
            return Err(self.invalid_phase("evaluate the level"));
        }
        let state = self.state.as_mut().ok_or(StateError::NoSession)?;

        let total = u32::try_from(state.questions.len()).unwrap_or(u32::MAX);
        let result = LevelResult::new(state.current_level, total, state.correct_in_level)?;
        let outcome = match (result.passed(), state.is_last_level()) {
            (true, true) => LevelOutcome::SessionComplete,
            (true, false) => LevelOutcome::Passed,
            (false, _) => LevelOutcome::Failed,
        };
        state.level_results.push(result);

        tracing::info!(
            level = result.level_index(),
            correct = result.questions_correct(),
            total = result.questions_total(),
            ?outcome,
            "level evaluated"
        );

        self.phase = match outcome {
            LevelOutcome::SessionComplete => SessionPhase::Finished,
            LevelOutcome::Passed => SessionPhase::LevelPassed,
            LevelOutcome::Failed => SessionPhase::LevelFailed,
        };
        Ok(LevelEvaluation { result, outcome })
    }

    /// Load the level after a passed one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::State` unless the current level was passed, or
    /// the load error; the level counter only moves on success.
    pub async fn advance_level(&mut self) -> Result<(), SessionError> {
        if self.phase != SessionPhase::LevelPassed {
            return Err(self.invalid_phase("advance to the next level"));
        }
        let next = self.current_level()? + 1;
        self.load_level(next).await
    }

    /// Reload the current level after a failed attempt, or after the first
    /// load of a new session failed. Session totals are kept.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::State` from any other phase, or the load error.
    pub async fn retry_level(&mut self) -> Result<(), SessionError> {
        if !matches!(self.phase, SessionPhase::LevelFailed | SessionPhase::Ready) {
            return Err(self.invalid_phase("retry the level"));
        }
        let level = self.current_level()?;
        self.load_level(level).await
    }

    /// Record the finished session in history and return its final stats.
    ///
    /// On a storage failure the session stays `Finished`, so the call can be
    /// repeated without writing a duplicate entry.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::State` unless the last level was passed, and
    /// `SessionError::Storage` if history cannot be read or written.
    pub async fn end_session(&mut self) -> Result<FinalStats, SessionError> {
        if self.phase != SessionPhase::Finished {
            return Err(self.invalid_phase("end the session"));
        }
        let state = self.state.as_ref().ok_or(StateError::NoSession)?;

        let now = self.clock.now();
        let elapsed_seconds = self.clock.elapsed_secs(state.started_at);
        let prior = self.history.entries_for_topic(state.topic()).await?;
        let feedback = SessionFeedback::build(
            &state.incorrect_topics,
            state.total_correct,
            state.total_answered,
            &prior,
        );
        let entry = HistoryEntry::new(
            state.topic(),
            state.total_correct,
            state.total_answered,
            now,
        )?;
        let history_id = self.history.append_entry(&entry).await?;

        let stats = FinalStats {
            topic: state.topic().to_owned(),
            base_difficulty: state.config.base_difficulty(),
            total_levels: state.config.total_levels(),
            total_correct: state.total_correct,
            total_answered: state.total_answered,
            elapsed_seconds,
            feedback,
            history_id,
        };
        tracing::info!(
            session = %state.id(),
            history_id,
            correct = stats.total_correct,
            answered = stats.total_answered,
            elapsed = %stats.elapsed_display(),
            "session recorded"
        );

        self.state = None;
        self.phase = SessionPhase::Idle;
        Ok(stats)
    }

    /// Abandon the session from any phase without writing history.
    pub fn quit_session(&mut self) {
        if let Some(state) = self.state.take() {
            tracing::info!(session = %state.id(), phase = %self.phase, "session abandoned");
        }
        self.phase = SessionPhase::Idle;
        self.phase_before_load = None;
    }

    //
    // ─── INTERNALS ─────────────────────────────────────────────────────────────
    //

    fn invalid_phase(&self, operation: &'static str) -> SessionError {
        if self.state.is_none() {
            return StateError::NoSession.into();
        }
        StateError::InvalidPhase {
            operation,
            phase: self.phase,
        }
        .into()
    }

    fn current_level(&self) -> Result<u32, StateError> {
        self.state
            .as_ref()
            .map(SessionState::current_level)
            .ok_or(StateError::NoSession)
    }

    fn prepare_load(&self, level: u32) -> Result<(QuestionRequest, usize), SessionError> {
        let state = self.state.as_ref().ok_or(StateError::NoSession)?;
        let current = state.current_level;
        let in_sequence = match self.phase {
            SessionPhase::Ready | SessionPhase::LevelFailed => level == current,
            SessionPhase::LevelPassed => {
                level == current + 1 && level <= state.config.total_levels()
            }
            _ => return Err(self.invalid_phase("load a level")),
        };
        if !in_sequence {
            return Err(StateError::LevelOutOfSequence {
                requested: level,
                current,
            }
            .into());
        }

        let score = performance_score(state.total_correct, state.total_answered);
        let difficulty = effective_difficulty(state.config.base_difficulty(), score);
        let request = QuestionRequest {
            topic: state.topic().to_owned(),
            num_questions: state.config.questions_per_level(),
            difficulty,
            level,
            performance_score: score,
        };
        let expected = usize::try_from(request.num_questions).unwrap_or(usize::MAX);
        Ok((request, expected))
    }

    async fn fetch_batch(
        &self,
        request: &QuestionRequest,
        expected: usize,
    ) -> Result<ParsedBatch, SessionError> {
        tracing::debug!(
            level = request.level,
            difficulty = %request.difficulty,
            score = ?request.performance_score,
            "fetching questions"
        );
        let fetch = self.source.fetch(request);
        let raw = match self.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, fetch)
                .await
                .map_err(|_| SourceError::Timeout(limit))??,
            None => fetch.await?,
        };
        let options = ParseOptions::expecting(expected).with_explanations(self.explanations);
        Ok(parse_questions(&raw, &options)?)
    }

    fn commit_level(&mut self, level: u32, difficulty: Difficulty, batch: ParsedBatch) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        state.current_level = level;
        state.current_question_index = 0;
        state.correct_in_level = 0;
        state.questions = batch.questions;
        state.level_difficulty = difficulty;
        state.level_description = Some(
            batch
                .level_description
                .unwrap_or_else(|| default_level_description(level)),
        );
        tracing::info!(
            level,
            difficulty = %difficulty,
            questions = state.questions.len(),
            "level loaded"
        );
        self.phase = SessionPhase::Answering;
    }
}
