mod difficulty;
mod history;
mod ids;
mod question;
mod session;

pub use ids::{ParseIdError, SessionId};

pub use difficulty::{Difficulty, ParseDifficultyError};
pub use history::{HistoryEntry, HistoryEntryError, accuracy_percent};
pub use question::{
    AnswerOption, OPTIONS_PER_QUESTION, OptionLabel, ParseLabelError, Question, QuestionError,
};
pub use session::{
    LEVEL_PASS_THRESHOLD, LevelResult, LevelResultError, SessionConfig, SessionConfigError,
};
