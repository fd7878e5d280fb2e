//! Extraction and validation of question batches from raw model output.
//!
//! Model output is untrusted: it may wrap the JSON in prose or code fences,
//! truncate it, or return objects that only loosely follow the requested
//! shape. Parsing is two-staged:
//!
//! 1. the span from the first `[` to the last `]` is decoded as JSON, if present;
//! 2. otherwise the whole input is decoded as a single JSON value.
//!
//! Every element must then validate as a [`Question`]; one bad element rejects
//! the whole batch.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::model::{AnswerOption, OPTIONS_PER_QUESTION, OptionLabel, Question, QuestionError};

/// Explanation used when the caller requires one and the model omitted it.
pub const EXPLANATION_PLACEHOLDER: &str = "No explanation was provided for this question.";

/// `A. text`, `b) text`, `(C) text` or a bare `D.`; the text must be
/// separated by whitespace so `A.D. 1066` is not read as a label.
static LABEL_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*\(?([A-Da-d])\s*[.):](?:\s+(.*))?$").expect("label prefix regex is valid")
});

static LEVEL_DESCRIPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""level_description"\s*:\s*("(?:[^"\\]|\\.)*")"#)
        .expect("level description regex is valid")
});

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// The response could not be decoded as JSON at all.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("response is not valid JSON: {message}")]
pub struct ParseError {
    message: String,
}

impl ParseError {
    fn from_json(err: &serde_json::Error) -> Self {
        Self {
            message: err.to_string(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The response decoded but does not describe a valid question batch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SchemaError {
    #[error("expected a JSON array of questions, found {found}")]
    NotAnArray { found: &'static str },

    #[error("expected {expected} questions, got {found}")]
    CountMismatch { expected: usize, found: usize },

    #[error("question {index}: missing field `{field}`")]
    MissingField { index: usize, field: &'static str },

    #[error("question {index}: malformed entry: {message}")]
    Malformed { index: usize, message: String },

    #[error("question {index}: cannot resolve correct answer {raw:?}")]
    InvalidCorrectAnswer { index: usize, raw: String },

    #[error("question {index}: {source}")]
    Question {
        index: usize,
        #[source]
        source: QuestionError,
    },
}

/// Either stage of parsing failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResponseError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

//
// ─── OPTIONS ───────────────────────────────────────────────────────────────────
//

/// Whether parsed questions must carry an explanation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExplanationMode {
    /// Pass explanations through when present, leave them empty otherwise.
    #[default]
    Optional,
    /// Fill missing explanations with [`EXPLANATION_PLACEHOLDER`].
    Required,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    pub expected_count: Option<usize>,
    pub explanations: ExplanationMode,
}

impl ParseOptions {
    /// Options requiring exactly `count` questions.
    #[must_use]
    pub fn expecting(count: usize) -> Self {
        Self {
            expected_count: Some(count),
            explanations: ExplanationMode::Optional,
        }
    }

    #[must_use]
    pub fn with_explanations(mut self, mode: ExplanationMode) -> Self {
        self.explanations = mode;
        self
    }
}

//
// ─── PARSED BATCH ──────────────────────────────────────────────────────────────
//

/// A validated batch of questions plus the optional flavour text for the level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBatch {
    pub questions: Vec<Question>,
    pub level_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    #[serde(alias = "text")]
    question: Option<String>,
    options: Option<Vec<String>>,
    #[serde(alias = "correctAnswer", alias = "answer")]
    correct_answer: Option<String>,
    explanation: Option<String>,
    topic: Option<String>,
}

//
// ─── PARSING ───────────────────────────────────────────────────────────────────
//

/// Parse raw model output into a validated question batch.
///
/// # Errors
///
/// Returns `ResponseError::Parse` when no JSON can be decoded, and
/// `ResponseError::Schema` when the decoded value is not a valid batch.
pub fn parse_questions(raw: &str, options: &ParseOptions) -> Result<ParsedBatch, ResponseError> {
    let value = decode(raw)?;
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(SchemaError::NotAnArray {
                found: json_kind(&other),
            }
            .into());
        }
    };

    let mut questions = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let mut question = validate_element(index, item)?;
        if options.explanations == ExplanationMode::Required && question.explanation().is_none() {
            question.set_explanation(EXPLANATION_PLACEHOLDER.to_owned());
        }
        questions.push(question);
    }

    if let Some(expected) = options.expected_count {
        if questions.len() != expected {
            return Err(SchemaError::CountMismatch {
                expected,
                found: questions.len(),
            }
            .into());
        }
    }

    Ok(ParsedBatch {
        questions,
        level_description: extract_level_description(raw),
    })
}

/// Finds a `"level_description": "..."` value anywhere in the raw output.
#[must_use]
pub fn extract_level_description(raw: &str) -> Option<String> {
    let captures = LEVEL_DESCRIPTION.captures(raw)?;
    let literal = captures.get(1)?.as_str();
    serde_json::from_str::<String>(literal)
        .ok()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
}

/// Flavour text shown when the model did not describe the level.
#[must_use]
pub fn default_level_description(level: u32) -> String {
    format!("Level {level}: The laboratory grows more ominous as you progress deeper.")
}

fn decode(raw: &str) -> Result<Value, ParseError> {
    let candidate = array_span(raw).unwrap_or(raw);
    serde_json::from_str(candidate).map_err(|e| ParseError::from_json(&e))
}

/// First `[` through the last `]`, greedy.
fn array_span(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    (end > start).then(|| &raw[start..=end])
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn validate_element(index: usize, item: Value) -> Result<Question, SchemaError> {
    let raw: RawQuestion = serde_json::from_value(item).map_err(|e| SchemaError::Malformed {
        index,
        message: e.to_string(),
    })?;

    let text = raw.question.ok_or(SchemaError::MissingField {
        index,
        field: "question",
    })?;
    let raw_options = raw.options.ok_or(SchemaError::MissingField {
        index,
        field: "options",
    })?;
    let raw_correct = raw.correct_answer.ok_or(SchemaError::MissingField {
        index,
        field: "correct_answer",
    })?;

    let options = label_options(index, &raw_options)?;
    let correct_label = resolve_correct_label(index, &raw_correct, &options)?;

    Question::new(text, options, correct_label, raw.explanation, raw.topic)
        .map_err(|source| SchemaError::Question { index, source })
}

/// Splits `"A. Paris"` style entries into label and text.
///
/// Options count as labelled only when every entry carries a prefix and the
/// prefixes are exactly A to D. Anything else is labelled by position with the
/// text kept verbatim.
fn label_options(index: usize, raw: &[String]) -> Result<Vec<AnswerOption>, SchemaError> {
    let prefixed: Option<Vec<AnswerOption>> = raw
        .iter()
        .map(|entry| {
            let caps = LABEL_PREFIX.captures(entry)?;
            let letter = caps.get(1)?.as_str().chars().next()?;
            let text = caps.get(2)?.as_str().trim();
            Some(AnswerOption::new(OptionLabel::from_char(letter)?, text))
        })
        .collect();

    if let Some(options) = prefixed.filter(|options| covers_every_label(options)) {
        return Ok(options);
    }

    if raw.len() > OPTIONS_PER_QUESTION {
        return Err(SchemaError::Question {
            index,
            source: QuestionError::OptionCount { found: raw.len() },
        });
    }
    Ok(raw
        .iter()
        .zip(OptionLabel::ALL)
        .map(|(text, label)| AnswerOption::new(label, text.trim()))
        .collect())
}

fn covers_every_label(options: &[AnswerOption]) -> bool {
    options.len() == OPTIONS_PER_QUESTION
        && OptionLabel::ALL
            .iter()
            .all(|label| options.iter().any(|option| option.label == *label))
}

/// Accepts `"B"`, `"b"`, `"B."`, `"B) Rome"`, or the exact text of an option.
fn resolve_correct_label(
    index: usize,
    raw: &str,
    options: &[AnswerOption],
) -> Result<OptionLabel, SchemaError> {
    if let Ok(label) = raw.parse::<OptionLabel>() {
        return Ok(label);
    }
    // Option text wins over a prefix so "A.D. 1492" finds its own option.
    let wanted = raw.trim();
    if let Some(option) = options
        .iter()
        .find(|option| option.text.eq_ignore_ascii_case(wanted))
    {
        return Ok(option.label);
    }
    LABEL_PREFIX
        .captures(raw)
        .and_then(|caps| caps.get(1)?.as_str().chars().next())
        .and_then(OptionLabel::from_char)
        .ok_or_else(|| SchemaError::InvalidCorrectAnswer {
            index,
            raw: raw.to_owned(),
        })
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
