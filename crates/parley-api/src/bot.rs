//! Stateless chat assistant: one user turn in, one reply out.

use async_trait::async_trait;
use axum::{Json, extract::State};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use parley_types::api::{AskRequest, AskResponse};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult, FieldError};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Error)]
pub enum BotError {
    #[error("no API key configured for the bot provider")]
    MissingApiKey,

    #[error("request to bot provider failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("bot provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("bot provider returned no text")]
    EmptyReply,
}

/// Anything that can turn a prompt into a reply.
#[async_trait]
pub trait TextGenerator: Send + Sync + 'static {
    async fn generate(&self, prompt: &str) -> Result<String, BotError>;
}

/// Gemini `generateContent` client.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate.
    fn first_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        (!text.is_empty()).then_some(text)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, BotError> {
        let api_key = self.api_key.as_deref().ok_or(BotError::MissingApiKey)?;
        let url = format!("{}/models/{}:generateContent", GEMINI_BASE_URL, self.model);

        let body = GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: prompt }],
            }],
        };

        let response = self
            .http
            .post(&url)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        debug!("Bot reply received from {}", self.model);
        parsed.first_text().ok_or(BotError::EmptyReply)
    }
}

pub async fn ask(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<AskRequest>, ApiError>,
) -> ApiResult<Json<AskResponse>> {
    if req.message.trim().is_empty() {
        return Err(ApiError::invalid(vec![FieldError {
            field: "message",
            message: "Message is required".into(),
        }]));
    }

    let reply = state.bot.generate(&req.message).await?;

    Ok(Json(AskResponse { reply }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_candidate_text_is_joined() {
        let raw = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "Hello"}, {"text": ", world"}], "role": "model"}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.first_text().as_deref(), Some("Hello, world"));
    }

    #[test]
    fn blocked_prompt_has_no_text() {
        let parsed: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        assert!(parsed.first_text().is_none());
    }

    #[test]
    fn request_body_is_a_single_user_turn() {
        let body = GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: "hi" }],
            }],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"contents": [{"role": "user", "parts": [{"text": "hi"}]}]})
        );
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let client = GeminiClient::new(Some("  ".into()), "gemini-2.0-flash");
        assert!(matches!(
            client.generate("hi").await,
            Err(BotError::MissingApiKey)
        ));
    }
}
