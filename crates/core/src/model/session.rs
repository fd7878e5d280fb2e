use thiserror::Error;

use crate::model::Difficulty;

/// Minimum share of correct answers needed to pass a level.
pub const LEVEL_PASS_THRESHOLD: f64 = 0.5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionConfigError {
    #[error("topic cannot be empty")]
    EmptyTopic,

    #[error("questions per level must be > 0")]
    InvalidQuestionsPerLevel,

    #[error("total levels must be > 0")]
    InvalidTotalLevels,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LevelResultError {
    #[error("level index must be >= 1")]
    InvalidLevelIndex,

    #[error("correct answers ({correct}) exceed questions ({total})")]
    CorrectExceedsTotal { correct: u32, total: u32 },
}

//
// ─── SESSION CONFIG ────────────────────────────────────────────────────────────
//

/// Validated parameters for starting a quiz session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    topic: String,
    base_difficulty: Difficulty,
    questions_per_level: u32,
    total_levels: u32,
}

impl SessionConfig {
    pub const DEFAULT_QUESTIONS_PER_LEVEL: u32 = 3;
    pub const DEFAULT_TOTAL_LEVELS: u32 = 5;

    /// Creates a session config.
    ///
    /// # Errors
    ///
    /// Returns `SessionConfigError` if the topic is blank or either count is zero.
    pub fn new(
        topic: impl Into<String>,
        base_difficulty: Difficulty,
        questions_per_level: u32,
        total_levels: u32,
    ) -> Result<Self, SessionConfigError> {
        let topic = topic.into().trim().to_owned();
        if topic.is_empty() {
            return Err(SessionConfigError::EmptyTopic);
        }
        if questions_per_level == 0 {
            return Err(SessionConfigError::InvalidQuestionsPerLevel);
        }
        if total_levels == 0 {
            return Err(SessionConfigError::InvalidTotalLevels);
        }

        Ok(Self {
            topic,
            base_difficulty,
            questions_per_level,
            total_levels,
        })
    }

    /// Config for `topic` with the game's defaults: medium difficulty,
    /// 3 questions per level, 5 levels.
    ///
    /// # Errors
    ///
    /// Returns `SessionConfigError::EmptyTopic` if the topic is blank.
    pub fn with_defaults(topic: impl Into<String>) -> Result<Self, SessionConfigError> {
        Self::new(
            topic,
            Difficulty::default(),
            Self::DEFAULT_QUESTIONS_PER_LEVEL,
            Self::DEFAULT_TOTAL_LEVELS,
        )
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn base_difficulty(&self) -> Difficulty {
        self.base_difficulty
    }

    #[must_use]
    pub fn questions_per_level(&self) -> u32 {
        self.questions_per_level
    }

    #[must_use]
    pub fn total_levels(&self) -> u32 {
        self.total_levels
    }
}

//
// ─── LEVEL RESULT ──────────────────────────────────────────────────────────────
//

/// Outcome of one attempt at a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelResult {
    level_index: u32,
    questions_total: u32,
    questions_correct: u32,
}

impl LevelResult {
    /// # Errors
    ///
    /// Returns `LevelResultError` for a zero level index or more correct
    /// answers than questions.
    pub fn new(
        level_index: u32,
        questions_total: u32,
        questions_correct: u32,
    ) -> Result<Self, LevelResultError> {
        if level_index == 0 {
            return Err(LevelResultError::InvalidLevelIndex);
        }
        if questions_correct > questions_total {
            return Err(LevelResultError::CorrectExceedsTotal {
                correct: questions_correct,
                total: questions_total,
            });
        }
        Ok(Self {
            level_index,
            questions_total,
            questions_correct,
        })
    }

    #[must_use]
    pub fn level_index(&self) -> u32 {
        self.level_index
    }

    #[must_use]
    pub fn questions_total(&self) -> u32 {
        self.questions_total
    }

    #[must_use]
    pub fn questions_correct(&self) -> u32 {
        self.questions_correct
    }

    /// Share of correct answers in `[0, 1]`; an empty level counts as 0.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.questions_total == 0 {
            return 0.0;
        }
        f64::from(self.questions_correct) / f64::from(self.questions_total)
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.questions_total > 0 && self.success_rate() >= LEVEL_PASS_THRESHOLD
    }
}
