use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

pub const SYSTEM_PROMPT_PREFIX: &str =
    "You are a helpful assistant. Use the following context when responding:\n\n";

pub const NAMING_INSTRUCTION: &str = "Based on the file provided, generate a file name in this format: \
[year published]_[aspect of the technology]_[main topic]_[primary application].pdf. \
Please do not give any response except for the file name. \
Do not include symbols like /, \\, ~, !, @, #, or $ in the file name.";

#[derive(Debug, Error)]
pub enum NamingError {
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("completion API returned {status}: {body}")]
    Api { status: StatusCode, body: String },

    #[error("invalid completion response: {0}")]
    InvalidResponse(String),

    #[error("model returned an empty filename")]
    EmptyResponse,
}

impl NamingError {
    /// Transport failures, rate limits and server errors are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            NamingError::Request(_) => true,
            NamingError::Api { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            NamingError::InvalidResponse(_) | NamingError::EmptyResponse => false,
        }
    }
}

#[async_trait]
pub trait NamingAgent: Send + Sync {
    /// Proposes a single-line filename for the document described by `context`.
    async fn propose_filename(&self, api_key: &str, context: &str) -> Result<String, NamingError>;
}

/// Chat completion client for any OpenAI-compatible endpoint.
pub struct OpenAiNamingAgent {
    client: Client,
    base_url: String,
    model: String,
}

impl OpenAiNamingAgent {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, NamingError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    fn request_body(&self, context: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "temperature": 0.0,
            "messages": [
                {
                    "role": "system",
                    "content": format!("{SYSTEM_PROMPT_PREFIX}{context}.")
                },
                {
                    "role": "user",
                    "content": NAMING_INSTRUCTION
                }
            ]
        })
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl NamingAgent for OpenAiNamingAgent {
    #[tracing::instrument(skip(self, api_key, context), fields(model = %self.model))]
    async fn propose_filename(&self, api_key: &str, context: &str) -> Result<String, NamingError> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&self.request_body(context))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NamingError::Api { status, body });
        }

        let raw_bytes = response.bytes().await?;
        let completion: ChatCompletion = serde_json::from_slice(&raw_bytes).map_err(|e| {
            tracing::error!(
                raw_response = %String::from_utf8_lossy(&raw_bytes),
                "Failed to parse completion JSON"
            );
            NamingError::InvalidResponse(e.to_string())
        })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let proposed = first_line(&content).ok_or(NamingError::EmptyResponse)?;
        tracing::info!(proposed = %proposed, "Model proposed filename");
        Ok(proposed)
    }
}

/// First non-blank line, trimmed.
pub fn first_line(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
