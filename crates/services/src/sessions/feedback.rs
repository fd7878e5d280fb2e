use quiz_core::model::{HistoryEntry, accuracy_percent};

/// How this session compares with the most recent earlier one on the topic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Improvement {
    FirstAttempt,
    /// Accuracy difference in percentage points, rounded to two decimals.
    Changed { delta_percent: f64 },
}

impl Improvement {
    #[must_use]
    pub fn direction(&self) -> Option<Direction> {
        match *self {
            Self::FirstAttempt => None,
            Self::Changed { delta_percent } if delta_percent > 0.0 => Some(Direction::Improved),
            Self::Changed { delta_percent } if delta_percent < 0.0 => Some(Direction::Decreased),
            Self::Changed { .. } => Some(Direction::Unchanged),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Improved,
    Decreased,
    Unchanged,
}

/// End-of-session feedback shown on the game-over screen.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionFeedback {
    /// Distinct topics of missed questions, in the order they were first missed.
    pub weak_topics: Vec<String>,
    pub improvement: Improvement,
    pub accuracy_percent: f64,
    pub text: String,
}

impl SessionFeedback {
    /// Build feedback from the missed topics and the prior history for the topic.
    ///
    /// `prior` must not contain the session being summarized.
    #[must_use]
    pub fn build(
        incorrect_topics: &[String],
        total_correct: u32,
        total_answered: u32,
        prior: &[HistoryEntry],
    ) -> Self {
        let weak_topics = dedupe(incorrect_topics);
        let accuracy = accuracy_percent(total_correct, total_answered);

        let improvement = prior
            .iter()
            .max_by_key(|entry| entry.completed_at())
            .map_or(Improvement::FirstAttempt, |last| Improvement::Changed {
                delta_percent: round2(accuracy - last.accuracy_percent()),
            });

        let text = format!(
            "{} {}",
            topics_message(&weak_topics),
            improvement_message(improvement)
        );

        Self {
            weak_topics,
            improvement,
            accuracy_percent: round2(accuracy),
            text,
        }
    }
}

fn dedupe(topics: &[String]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for topic in topics {
        if !seen.iter().any(|t| t == topic) {
            seen.push(topic.clone());
        }
    }
    seen
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn topics_message(weak_topics: &[String]) -> String {
    if weak_topics.is_empty() {
        "Excellent work! You answered every question correctly.".to_owned()
    } else {
        format!(
            "Consider reviewing these areas: {}.",
            weak_topics.join(", ")
        )
    }
}

fn improvement_message(improvement: Improvement) -> String {
    match improvement {
        Improvement::FirstAttempt => {
            "This was your first attempt at this topic, so it sets your baseline.".to_owned()
        }
        Improvement::Changed { delta_percent } => match improvement.direction() {
            Some(Direction::Improved) => {
                format!("Your accuracy improved by {delta_percent:.2}% since your last attempt.")
            }
            Some(Direction::Decreased) => format!(
                "Your accuracy decreased by {:.2}% since your last attempt.",
                delta_percent.abs()
            ),
            _ => "Your accuracy is unchanged since your last attempt.".to_owned(),
        },
    }
}
