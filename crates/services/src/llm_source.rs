use std::env;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{LlmConfigError, SourceError};
use crate::source::{QuestionRequest, QuestionSource};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl LlmConfig {
    /// # Errors
    ///
    /// Returns `LlmConfigError::InvalidBaseUrl` if `base_url` does not parse.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, LlmConfigError> {
        let base_url = base_url.into();
        if Url::parse(&base_url).is_err() {
            return Err(LlmConfigError::InvalidBaseUrl(base_url));
        }
        Ok(Self {
            base_url,
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Reads `QUIZ_AI_API_KEY`, `QUIZ_AI_BASE_URL` and `QUIZ_AI_MODEL`.
    ///
    /// Returns `Ok(None)` when no API key is set.
    ///
    /// # Errors
    ///
    /// Returns `LlmConfigError::InvalidBaseUrl` if the base URL is set but invalid.
    pub fn from_env() -> Result<Option<Self>, LlmConfigError> {
        let Some(api_key) = env::var("QUIZ_AI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
        else {
            return Ok(None);
        };
        let base_url = env::var("QUIZ_AI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let model = env::var("QUIZ_AI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());
        Self::new(base_url, api_key, model).map(Some)
    }
}

/// Question source backed by an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct LlmQuestionSource {
    client: Client,
    config: Option<LlmConfig>,
}

impl LlmQuestionSource {
    /// # Errors
    ///
    /// Returns `LlmConfigError` if the environment holds an invalid base URL.
    pub fn from_env() -> Result<Self, LlmConfigError> {
        Ok(Self::new(LlmConfig::from_env()?))
    }

    #[must_use]
    pub fn new(config: Option<LlmConfig>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.is_some()
    }
}

#[async_trait]
impl QuestionSource for LlmQuestionSource {
    async fn fetch(&self, request: &QuestionRequest) -> Result<String, SourceError> {
        let config = self.config.as_ref().ok_or(SourceError::Disabled)?;

        let url = format!(
            "{}/chat/completions",
            config.base_url.trim_end_matches('/')
        );
        let payload = ChatRequest {
            model: config.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: build_prompt(request),
            }],
            temperature: 0.7,
        };

        tracing::debug!(
            model = %config.model,
            topic = %request.topic,
            level = request.level,
            difficulty = %request.difficulty,
            "requesting questions"
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(&config.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SourceError::HttpStatus(response.status()));
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(SourceError::EmptyResponse)?;

        Ok(content)
    }
}

/// Prompt asking the model for one level's worth of questions.
#[must_use]
pub fn build_prompt(request: &QuestionRequest) -> String {
    let QuestionRequest {
        topic,
        num_questions,
        difficulty,
        level,
        ..
    } = request;
    let difficulty = difficulty.title();
    format!(
        r#"Generate {num_questions} multiple-choice questions about {topic} at a {difficulty} difficulty level.

For each question:
1. Make the question appropriate for Level {level} (higher levels are more challenging).
2. Provide exactly 4 answer choices labeled A, B, C, and D.
3. Indicate which letter is the correct answer.
4. Add a one-sentence explanation of the correct answer.
5. Format the response as a JSON array of objects with this structure:
   {{
     "question": "The question text",
     "options": ["A. First option", "B. Second option", "C. Third option", "D. Fourth option"],
     "correct_answer": "A",
     "explanation": "Why the answer is correct",
     "topic": "A short sub-topic tag"
   }}
6. Also include a "level_description" field with a short atmospheric description for Level {level} of a mysterious laboratory-themed escape room game."#
    )
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}
