use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use quiz_core::model::Difficulty;
use serde::Serialize;

use crate::error::SourceError;

/// What the engine asks a question source for.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRequest {
    pub topic: String,
    pub num_questions: u32,
    pub difficulty: Difficulty,
    pub level: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_score: Option<f64>,
}

/// Produces raw model output for a batch of questions.
///
/// Implementations return the text untouched; validation is the parser's job.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Fetch raw text expected to contain a JSON array of questions.
    ///
    /// # Errors
    ///
    /// Returns `SourceError` when the source cannot produce a response.
    async fn fetch(&self, request: &QuestionRequest) -> Result<String, SourceError>;
}

/// Replays canned responses in order and records every request.
///
/// Useful in tests and offline demos. Once the script runs out, every fetch
/// fails with `SourceError::Other`.
#[derive(Default)]
pub struct ScriptedQuestionSource {
    responses: Mutex<VecDeque<Result<String, SourceError>>>,
    requests: Mutex<Vec<QuestionRequest>>,
}

impl ScriptedQuestionSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    #[must_use]
    pub fn with_response(self, raw: impl Into<String>) -> Self {
        self.push(Ok(raw.into()));
        self
    }

    /// Queue a failure.
    #[must_use]
    pub fn with_failure(self, err: SourceError) -> Self {
        self.push(Err(err));
        self
    }

    pub fn push(&self, response: Result<String, SourceError>) {
        if let Ok(mut guard) = self.responses.lock() {
            guard.push_back(response);
        }
    }

    /// Requests received so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<QuestionRequest> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl QuestionSource for ScriptedQuestionSource {
    async fn fetch(&self, request: &QuestionRequest) -> Result<String, SourceError> {
        if let Ok(mut guard) = self.requests.lock() {
            guard.push(request.clone());
        }
        self.responses
            .lock()
            .map_err(|e| SourceError::Other(e.to_string()))?
            .pop_front()
            .unwrap_or_else(|| Err(SourceError::Other("scripted responses exhausted".into())))
    }
}
