#![forbid(unsafe_code)]

pub mod error;
pub mod llm_source;
pub mod sessions;
pub mod source;

pub use quiz_core::Clock;

pub use error::{LlmConfigError, SessionError, SourceError, StateError};
pub use llm_source::{LlmConfig, LlmQuestionSource};
pub use sessions::{
    AnswerFeedback, FinalStats, LevelEvaluation, LevelOutcome, SessionEngine, SessionFeedback,
    SessionPhase, SessionProgress, SessionState,
};
pub use source::{QuestionRequest, QuestionSource, ScriptedQuestionSource};
