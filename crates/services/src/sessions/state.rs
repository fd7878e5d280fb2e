use std::fmt;

use chrono::{DateTime, Utc};
use quiz_core::model::{Difficulty, LevelResult, Question, SessionConfig, SessionId};

//
// ─── PHASE ─────────────────────────────────────────────────────────────────────
//

/// Where a session is in its lifecycle.
///
/// ```text
/// Idle ─start─▶ Ready ─load─▶ Loading ─ok─▶ Answering ─last answer─▶ LevelComplete
///                 ▲              │err                                    │evaluate
///                 └──────────────┘                    ┌──────────────────┼───────────────┐
///                                                     ▼                  ▼               ▼
///                                               LevelFailed        LevelPassed        Finished
///                                                (retry)            (advance)        (end_session)
/// ```
///
/// A failed load returns to whichever phase preceded it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No session.
    Idle,
    /// Session started but no level has loaded yet.
    Ready,
    /// Waiting on the question source.
    Loading { level: u32 },
    /// A question is awaiting an answer.
    Answering,
    /// Every question in the level is answered; awaiting evaluation.
    LevelComplete,
    LevelPassed,
    LevelFailed,
    /// The last level was passed; awaiting `end_session`.
    Finished,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Ready => f.write_str("ready"),
            Self::Loading { level } => write!(f, "loading level {level}"),
            Self::Answering => f.write_str("answering"),
            Self::LevelComplete => f.write_str("awaiting level evaluation"),
            Self::LevelPassed => f.write_str("between levels"),
            Self::LevelFailed => f.write_str("awaiting a level retry"),
            Self::Finished => f.write_str("finished"),
        }
    }
}

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// Mutable game state for one session. Only `SessionEngine` writes to it.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub(crate) id: SessionId,
    pub(crate) config: SessionConfig,
    pub(crate) current_level: u32,
    pub(crate) current_question_index: usize,
    pub(crate) correct_in_level: u32,
    pub(crate) total_correct: u32,
    pub(crate) total_answered: u32,
    pub(crate) questions: Vec<Question>,
    pub(crate) level_difficulty: Difficulty,
    pub(crate) level_description: Option<String>,
    pub(crate) incorrect_topics: Vec<String>,
    pub(crate) level_results: Vec<LevelResult>,
    pub(crate) started_at: DateTime<Utc>,
}

impl SessionState {
    pub(crate) fn new(config: SessionConfig, started_at: DateTime<Utc>) -> Self {
        let level_difficulty = config.base_difficulty();
        Self {
            id: SessionId::new(),
            config,
            current_level: 1,
            current_question_index: 0,
            correct_in_level: 0,
            total_correct: 0,
            total_answered: 0,
            questions: Vec::new(),
            level_difficulty,
            level_description: None,
            incorrect_topics: Vec::new(),
            level_results: Vec::new(),
            started_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        self.config.topic()
    }

    #[must_use]
    pub fn current_level(&self) -> u32 {
        self.current_level
    }

    #[must_use]
    pub fn current_question_index(&self) -> usize {
        self.current_question_index
    }

    #[must_use]
    pub fn correct_in_level(&self) -> u32 {
        self.correct_in_level
    }

    #[must_use]
    pub fn total_correct(&self) -> u32 {
        self.total_correct
    }

    #[must_use]
    pub fn total_answered(&self) -> u32 {
        self.total_answered
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Difficulty the current level's questions were requested at.
    #[must_use]
    pub fn level_difficulty(&self) -> Difficulty {
        self.level_difficulty
    }

    #[must_use]
    pub fn level_description(&self) -> Option<&str> {
        self.level_description.as_deref()
    }

    /// Topic tags of every incorrectly answered question, duplicates included.
    #[must_use]
    pub fn incorrect_topics(&self) -> &[String] {
        &self.incorrect_topics
    }

    /// Every evaluated level attempt, retries included.
    #[must_use]
    pub fn level_results(&self) -> &[LevelResult] {
        &self.level_results
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_question_index)
    }

    pub(crate) fn is_last_level(&self) -> bool {
        self.current_level >= self.config.total_levels()
    }
}
