//! Difficulty adaptation between levels.
//!
//! The advisor is a pure function of the base tier and the player's rolling
//! accuracy. It has no access to session state so it can be tested and reused
//! on its own.

use crate::model::Difficulty;

/// Accuracy strictly above this steps the difficulty up one tier.
pub const STEP_UP_ABOVE: f64 = 80.0;

/// Accuracy strictly below this steps the difficulty down one tier.
pub const STEP_DOWN_BELOW: f64 = 50.0;

/// Rolling accuracy percentage, or `None` when nothing has been answered yet.
///
/// "No answers" is kept distinct from a score of zero so the first level of a
/// session is never downgraded.
#[must_use]
pub fn performance_score(total_correct: u32, total_answered: u32) -> Option<f64> {
    if total_answered == 0 {
        return None;
    }
    Some(100.0 * f64::from(total_correct) / f64::from(total_answered))
}

/// Effective difficulty for the next batch of questions.
///
/// - score `> 80`: one tier up (capped at `Hard`)
/// - score `< 50`: one tier down (floored at `Easy`)
/// - anything else, including no score or a non-finite one: unchanged
///
/// # Examples
///
/// ```
/// # use quiz_core::advisor::effective_difficulty;
/// # use quiz_core::model::Difficulty;
/// assert_eq!(effective_difficulty(Difficulty::Medium, Some(85.0)), Difficulty::Hard);
/// assert_eq!(effective_difficulty(Difficulty::Medium, Some(80.0)), Difficulty::Medium);
/// assert_eq!(effective_difficulty(Difficulty::Medium, None), Difficulty::Medium);
/// ```
#[must_use]
pub fn effective_difficulty(base: Difficulty, performance_score: Option<f64>) -> Difficulty {
    match performance_score {
        Some(score) if score > STEP_UP_ABOVE => base.step_up(),
        Some(score) if score < STEP_DOWN_BELOW => base.step_down(),
        _ => base,
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
