mod engine;
mod feedback;
mod progress;
mod state;

pub use engine::{AnswerFeedback, FinalStats, LevelEvaluation, LevelOutcome, SessionEngine};
pub use feedback::{Direction, Improvement, SessionFeedback};
pub use progress::SessionProgress;
pub use state::{SessionPhase, SessionState};
