//! Groq: OpenAI-compatible chat completions with an image part.
//!
//! Fast, but request bodies are capped at 4 MiB, so this provider reports a
//! payload limit and the orchestrator renders pages within it. One request
//! per call and no retry; a failure goes straight back to the orchestrator,
//! which falls back to Gemini.

use crate::config::ExplainConfig;
use crate::error::{ExplainError, ProviderError};
use crate::pipeline::encode::RasterImage;
use crate::provider::{http_client, truncate_chars, Completion, VisionProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const NAME: &str = "Groq";

/// Characters of an error body kept in [`ProviderError::Api`].
const ERROR_BODY_LIMIT: usize = 200;

pub struct GroqProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    timeout: Duration,
    max_tokens: u32,
    temperature: f32,
    byte_budget: usize,
}

impl GroqProvider {
    pub fn new(api_key: String, config: &ExplainConfig) -> Result<Self, ExplainError> {
        Ok(Self {
            client: http_client(NAME)?,
            api_key,
            model: config.groq_model.clone(),
            endpoint: format!(
                "{}/openai/v1/chat/completions",
                config.groq_base_url.trim_end_matches('/')
            ),
            timeout: Duration::from_secs(config.request_timeout_secs),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            byte_budget: config.byte_budget,
        })
    }

    async fn send(&self, body: &ChatRequest<'_>) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(ProviderError::Api {
                provider: NAME.to_string(),
                status: status.as_u16(),
                body: truncate_chars(&text, ERROR_BODY_LIMIT),
            });
        }
        parse_response(&text)
    }
}

#[async_trait]
impl VisionProvider for GroqProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn payload_limit(&self) -> Option<usize> {
        Some(self.byte_budget)
    }

    async fn submit(
        &self,
        prompt: &str,
        image: &RasterImage,
        pinned_model: Option<&str>,
    ) -> Result<Completion, ProviderError> {
        let model = pinned_model.unwrap_or(self.model.as_str());
        let body = build_request(model, prompt, image, self.max_tokens, self.temperature);
        debug!(
            "{NAME}: POST {} model={} image={} (~{} bytes)",
            self.endpoint,
            model,
            image.mime_type,
            image.estimated_transmitted_size()
        );

        let text = tokio::time::timeout(self.timeout, self.send(&body))
            .await
            .map_err(|_| ProviderError::Timeout {
                provider: NAME.to_string(),
                secs: self.timeout.as_secs(),
            })??;

        Ok(Completion {
            text,
            provider: NAME.to_string(),
            model: model.to_string(),
        })
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    ProviderError::Transport {
        provider: NAME.to_string(),
        detail: e.to_string(),
    }
}

// ── Wire format ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

fn build_request<'a>(
    model: &'a str,
    prompt: &'a str,
    image: &RasterImage,
    max_tokens: u32,
    temperature: f32,
) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: vec![ChatMessage {
            role: "user",
            content: vec![
                ContentPart::Text { text: prompt },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.data_uri(),
                    },
                },
            ],
        }],
        max_tokens,
        temperature,
    }
}

/// Extract `choices[0].message.content`, trimmed.
fn parse_response(body: &str) -> Result<String, ProviderError> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| ProviderError::Transport {
        provider: NAME.to_string(),
        detail: format!("invalid response JSON: {e}"),
    })?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ProviderError::EmptyResponse {
            provider: NAME.to_string(),
        })
}
