//! Gemini: `generateContent` with inline image data, across several models.
//!
//! Free-tier Gemini keys hit per-minute quotas quickly and not every key can
//! see every model, so this provider layers two policies over the raw call
//! (see [`crate::provider::retry`]):
//!
//! 1. per model, up to `max_attempts` attempts, each raced against the
//!    request timeout, sleeping between rate-limited attempts;
//! 2. across models, skipping those the API reports as not found.
//!
//! Error classes are decided from the status line plus body text, because
//! Gemini reports quota exhaustion with several different statuses but
//! always mentions "quota" or 429 in the message.

use crate::config::ExplainConfig;
use crate::error::{ExplainError, ProviderError};
use crate::pipeline::encode::RasterImage;
use crate::provider::retry::{parse_retry_hint, retry_rate_limited, try_models, RetryPolicy};
use crate::provider::{http_client, truncate_chars, Completion, VisionProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const NAME: &str = "Gemini";

/// Characters of an error body kept in error messages.
const ERROR_BODY_LIMIT: usize = 200;

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    models: Vec<String>,
    base_url: String,
    timeout: Duration,
    policy: RetryPolicy,
}

impl GeminiProvider {
    pub fn new(api_key: String, config: &ExplainConfig) -> Result<Self, ExplainError> {
        Ok(Self {
            client: http_client(NAME)?,
            api_key,
            models: config
                .gemini_models
                .iter()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect(),
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            policy: RetryPolicy {
                max_attempts: config.max_attempts,
                default_backoff: Duration::from_millis(config.default_retry_ms),
                max_backoff: Duration::from_millis(config.max_retry_ms),
            },
        })
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    /// One model, with rate-limit retries and a timeout per attempt.
    async fn generate_with_retry(
        &self,
        model: &str,
        prompt: &str,
        image: &RasterImage,
    ) -> Result<String, ProviderError> {
        let label = format!("{NAME}/{model}");
        retry_rate_limited(&self.policy, &label, || async move {
            tokio::time::timeout(self.timeout, self.generate(model, prompt, image))
                .await
                .map_err(|_| ProviderError::Timeout {
                    provider: NAME.to_string(),
                    secs: self.timeout.as_secs(),
                })?
        })
        .await
    }

    /// A single `generateContent` request.
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        image: &RasterImage,
    ) -> Result<String, ProviderError> {
        let url = self.endpoint(model);
        debug!(
            "{NAME}: POST {} image={} (~{} bytes)",
            url,
            image.mime_type,
            image.estimated_transmitted_size()
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&build_request(prompt, image))
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                provider: NAME.to_string(),
                detail: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| ProviderError::Transport {
            provider: NAME.to_string(),
            detail: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(classify_failure(model, status.as_u16(), &text));
        }
        parse_response(&text)
    }
}

#[async_trait]
impl VisionProvider for GeminiProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn submit(
        &self,
        prompt: &str,
        image: &RasterImage,
        pinned_model: Option<&str>,
    ) -> Result<Completion, ProviderError> {
        let (model, text) = match pinned_model {
            Some(model) => {
                let text = self.generate_with_retry(model, prompt, image).await?;
                (model.to_string(), text)
            }
            None => {
                try_models(NAME, &self.models, |model| async move {
                    self.generate_with_retry(&model, prompt, image).await
                })
                .await?
            }
        };

        Ok(Completion {
            text,
            provider: NAME.to_string(),
            model,
        })
    }
}

/// Map a non-success response to an error class.
///
/// Rate-limit class: status 429 or "quota" anywhere in the body.
/// Model class: status 404 or "not found" in the body.
fn classify_failure(model: &str, status: u16, body: &str) -> ProviderError {
    let lower = body.to_lowercase();
    let message = truncate_chars(&error_message(body), ERROR_BODY_LIMIT);

    if status == 429 || lower.contains("429") || lower.contains("quota") {
        ProviderError::RateLimited {
            provider: NAME.to_string(),
            status,
            message,
            // The hint usually sits past the excerpt, so parse the full body.
            retry_after_ms: parse_retry_hint(body),
        }
    } else if status == 404 || lower.contains("404") || lower.contains("not found") {
        ProviderError::ModelUnavailable {
            provider: NAME.to_string(),
            model: model.to_string(),
            status,
            message,
        }
    } else {
        ProviderError::Api {
            provider: NAME.to_string(),
            status,
            body: message,
        }
    }
}

/// `error.message` from a Google API error envelope, or the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.trim().to_string())
}

// ── Wire format ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
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
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

fn build_request<'a>(prompt: &'a str, image: &'a RasterImage) -> GenerateRequest<'a> {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![
                Part::Text { text: prompt },
                Part::Inline {
                    inline_data: InlineData {
                        mime_type: image.mime_type,
                        data: &image.data,
                    },
                },
            ],
        }],
    }
}

/// Concatenate the text parts of the first candidate.
fn parse_response(body: &str) -> Result<String, ProviderError> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Transport {
            provider: NAME.to_string(),
            detail: format!("invalid response JSON: {e}"),
        })?;

    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        return Err(ProviderError::EmptyResponse {
            provider: NAME.to_string(),
        });
    }
    Ok(text.to_string())
}
