use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of answer options every question carries.
pub const OPTIONS_PER_QUESTION: usize = 4;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question text cannot be empty")]
    EmptyText,

    #[error("expected 4 options, got {found}")]
    OptionCount { found: usize },

    #[error("option {label} has no text")]
    EmptyOption { label: OptionLabel },

    #[error("duplicate option label {label}")]
    DuplicateLabel { label: OptionLabel },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid option label: {0:?}")]
pub struct ParseLabelError(pub String);

//
// ─── OPTION LABEL ──────────────────────────────────────────────────────────────
//

/// One-letter label identifying an answer option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionLabel {
    A,
    B,
    C,
    D,
}

impl OptionLabel {
    pub const ALL: [OptionLabel; OPTIONS_PER_QUESTION] =
        [OptionLabel::A, OptionLabel::B, OptionLabel::C, OptionLabel::D];

    /// Maps an ASCII letter (either case) to a label.
    #[must_use]
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(Self::A),
            'B' => Some(Self::B),
            'C' => Some(Self::C),
            'D' => Some(Self::D),
            _ => None,
        }
    }

    /// Label at a zero-based position, if within `A..=D`.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Self::A => 'A',
            Self::B => 'B',
            Self::C => 'C',
            Self::D => 'D',
        }
    }
}

impl fmt::Display for OptionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for OptionLabel {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_char(c).ok_or_else(|| ParseLabelError(s.to_string())),
            _ => Err(ParseLabelError(s.to_string())),
        }
    }
}

//
// ─── ANSWER OPTION ─────────────────────────────────────────────────────────────
//

/// A single labelled answer choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOption {
    pub label: OptionLabel,
    pub text: String,
}

impl AnswerOption {
    #[must_use]
    pub fn new(label: OptionLabel, text: impl Into<String>) -> Self {
        Self {
            label,
            text: text.into(),
        }
    }
}

impl fmt::Display for AnswerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {}", self.label, self.text)
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A validated multiple-choice question.
///
/// Invariants, enforced by [`Question::new`]:
/// - non-empty text
/// - exactly four options with unique labels and non-empty text
///
/// Four unique labels drawn from `A..=D` cover every label, so the correct
/// label is always present among the options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    text: String,
    options: [AnswerOption; OPTIONS_PER_QUESTION],
    correct_label: OptionLabel,
    explanation: Option<String>,
    topic: Option<String>,
}

impl Question {
    /// Build a question, validating its structure.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` when any of the invariants above is violated.
    pub fn new(
        text: impl Into<String>,
        options: Vec<AnswerOption>,
        correct_label: OptionLabel,
        explanation: Option<String>,
        topic: Option<String>,
    ) -> Result<Self, QuestionError> {
        let text = text.into().trim().to_owned();
        if text.is_empty() {
            return Err(QuestionError::EmptyText);
        }

        let found = options.len();
        let options: [AnswerOption; OPTIONS_PER_QUESTION] = options
            .try_into()
            .map_err(|_| QuestionError::OptionCount { found })?;

        let mut seen = HashSet::with_capacity(OPTIONS_PER_QUESTION);
        for option in &options {
            if option.text.trim().is_empty() {
                return Err(QuestionError::EmptyOption {
                    label: option.label,
                });
            }
            if !seen.insert(option.label) {
                return Err(QuestionError::DuplicateLabel {
                    label: option.label,
                });
            }
        }

        Ok(Self {
            text,
            options,
            correct_label,
            explanation: explanation
                .map(|e| e.trim().to_owned())
                .filter(|e| !e.is_empty()),
            topic: topic.map(|t| t.trim().to_owned()).filter(|t| !t.is_empty()),
        })
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[AnswerOption] {
        &self.options
    }

    #[must_use]
    pub fn correct_label(&self) -> OptionLabel {
        self.correct_label
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    /// Topic tag the question was generated for, when the source provided one.
    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    #[must_use]
    pub fn is_correct(&self, selected: OptionLabel) -> bool {
        selected == self.correct_label
    }

    pub(crate) fn set_explanation(&mut self, explanation: String) {
        self.explanation = Some(explanation);
    }
}
