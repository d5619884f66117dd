/// LLM client. The single point of entry for Gemini `generateContent` calls.
///
/// No other module may call the generation endpoint directly. The client is
/// one-shot: no retry, no backoff, no streaming. The API key is supplied by the
/// caller per request and checked before any network traffic.
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash-latest";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Gemini API key is not set")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Blocked by API: {reason}{}", details_suffix(.safety_ratings))]
    Blocked {
        reason: String,
        safety_ratings: Option<Value>,
    },

    #[error("No content received from Gemini")]
    EmptyResponse,
}

fn details_suffix(ratings: &Option<Value>) -> String {
    ratings
        .as_ref()
        .map(|r| format!(" (details: {r})"))
        .unwrap_or_default()
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<CandidateContent>,
    pub finish_reason: Option<String>,
    pub safety_ratings: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
pub struct ResponsePart {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
    pub safety_ratings: Option<Value>,
}

impl GenerateResponse {
    /// Extracts the first candidate's first text part, or the reason there is none.
    pub fn into_text(self) -> Result<String, LlmError> {
        if let Some(PromptFeedback {
            block_reason: Some(reason),
            safety_ratings,
        }) = self.prompt_feedback
        {
            return Err(LlmError::Blocked {
                reason,
                safety_ratings,
            });
        }

        let first = self.candidates.into_iter().next().ok_or(LlmError::EmptyResponse)?;
        let text = first
            .content
            .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
            .filter(|t| !t.trim().is_empty());

        match (text, first.finish_reason.as_deref()) {
            (Some(text), _) => Ok(text),
            (None, Some("SAFETY")) => Err(LlmError::Blocked {
                reason: "SAFETY".to_string(),
                safety_ratings: first.safety_ratings,
            }),
            (None, _) => Err(LlmError::EmptyResponse),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: String,
}

/// Anything that can turn a prompt into an answer. `AppState` holds an
/// `Arc<dyn AnswerEngine>` so the session flow does not depend on Gemini itself.
#[async_trait]
pub trait AnswerEngine: Send + Sync {
    async fn generate(&self, api_key: Option<&str>, prompt: &str) -> Result<String, LlmError>;

    fn model(&self) -> &str;
}

/// Client for the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(client: Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    /// Makes a raw call and returns the parsed response body.
    pub async fn call(&self, api_key: &str, prompt: &str) -> Result<GenerateResponse, LlmError> {
        let request_body = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", api_key)])
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Gemini API returned {status}");
            let message = serde_json::from_str::<GeminiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| {
                    status
                        .canonical_reason()
                        .map(str::to_string)
                        .unwrap_or(body)
                });
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let parsed: GenerateResponse = serde_json::from_str(&body)?;
        debug!(
            "Gemini call succeeded: {} candidate(s), prompt {} chars",
            parsed.candidates.len(),
            prompt.len()
        );
        Ok(parsed)
    }
}

#[async_trait]
impl AnswerEngine for GeminiClient {
    async fn generate(&self, api_key: Option<&str>, prompt: &str) -> Result<String, LlmError> {
        let api_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(LlmError::MissingApiKey)?;
        self.call(api_key, prompt).await?.into_text()
    }

    fn model(&self) -> &str {
        &self.model
    }
}
