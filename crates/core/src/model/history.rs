use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HistoryEntryError {
    #[error("topic cannot be empty")]
    EmptyTopic,

    #[error("correct answers ({correct}) exceed total questions ({total})")]
    CorrectExceedsTotal { correct: u32, total: u32 },
}

/// Outcome of one completed quiz session, as persisted to history.
///
/// Serialized with the field names used by the stored log
/// (`correctAnswers`, `totalQuestions`, `date`). Deserializing goes through
/// [`HistoryEntry::new`], so a stored entry is validated like a fresh one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "StoredEntry")]
pub struct HistoryEntry {
    topic: String,
    correct_answers: u32,
    total_questions: u32,
    #[serde(rename = "date")]
    completed_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
    topic: String,
    correct_answers: u32,
    total_questions: u32,
    date: DateTime<Utc>,
}

impl TryFrom<StoredEntry> for HistoryEntry {
    type Error = HistoryEntryError;

    fn try_from(raw: StoredEntry) -> Result<Self, Self::Error> {
        Self::new(raw.topic, raw.correct_answers, raw.total_questions, raw.date)
    }
}

impl HistoryEntry {
    /// # Errors
    ///
    /// Returns `HistoryEntryError` for a blank topic or inconsistent counts.
    pub fn new(
        topic: impl Into<String>,
        correct_answers: u32,
        total_questions: u32,
        completed_at: DateTime<Utc>,
    ) -> Result<Self, HistoryEntryError> {
        let topic = topic.into().trim().to_owned();
        if topic.is_empty() {
            return Err(HistoryEntryError::EmptyTopic);
        }
        if correct_answers > total_questions {
            return Err(HistoryEntryError::CorrectExceedsTotal {
                correct: correct_answers,
                total: total_questions,
            });
        }
        Ok(Self {
            topic,
            correct_answers,
            total_questions,
            completed_at,
        })
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn correct_answers(&self) -> u32 {
        self.correct_answers
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    /// Accuracy as a percentage in `[0, 100]`; zero questions counts as 0.
    #[must_use]
    pub fn accuracy_percent(&self) -> f64 {
        accuracy_percent(self.correct_answers, self.total_questions)
    }
}

/// `100 * correct / total`, or 0 when nothing was answered.
#[must_use]
pub fn accuracy_percent(correct: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    100.0 * f64::from(correct) / f64::from(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn entry_serializes_with_stored_field_names() {
        let entry = HistoryEntry::new("Rust", 7, 10, fixed_now()).unwrap();
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["topic"], "Rust");
        assert_eq!(json["correctAnswers"], 7);
        assert_eq!(json["totalQuestions"], 10);
        assert_eq!(json["date"], "2023-11-14T22:13:20Z");
    }

    #[test]
    fn stored_json_is_validated_on_load() {
        let entry: HistoryEntry = serde_json::from_value(serde_json::json!({
            "topic": " Rust ",
            "correctAnswers": 2,
            "totalQuestions": 3,
            "date": "2023-11-14T22:13:20Z"
        }))
        .unwrap();
        assert_eq!(entry, HistoryEntry::new("Rust", 2, 3, fixed_now()).unwrap());

        let too_many = serde_json::from_value::<HistoryEntry>(serde_json::json!({
            "topic": "Rust",
            "correctAnswers": 4,
            "totalQuestions": 3,
            "date": "2023-11-14T22:13:20Z"
        }));
        assert!(too_many.is_err());

        let blank = serde_json::from_value::<HistoryEntry>(serde_json::json!({
            "topic": "  ",
            "correctAnswers": 0,
            "totalQuestions": 0,
            "date": "2023-11-14T22:13:20Z"
        }));
        assert!(blank.is_err());
    }

    #[test]
    fn entry_rejects_inconsistent_counts() {
        let err = HistoryEntry::new("Rust", 3, 2, fixed_now()).unwrap_err();
        assert!(matches!(err, HistoryEntryError::CorrectExceedsTotal { .. }));
        let err = HistoryEntry::new("  ", 0, 0, fixed_now()).unwrap_err();
        assert_eq!(err, HistoryEntryError::EmptyTopic);
    }

    #[test]
    fn accuracy_handles_zero_questions() {
        assert_eq!(accuracy_percent(0, 0), 0.0);
        let entry = HistoryEntry::new("Rust", 3, 4, fixed_now()).unwrap();
        assert!((entry.accuracy_percent() - 75.0).abs() < f64::EPSILON);
    }
}
