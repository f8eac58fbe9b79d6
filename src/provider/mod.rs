//! Vision providers: one capability, two implementations.
//!
//! ```text
//!              ┌──────────────────┐
//!  prompt ───▶ │  VisionProvider  │ ───▶ Completion { text, provider, model }
//!  image  ───▶ │  ::submit        │
//!              └────────┬─────────┘
//!           ┌───────────┴───────────┐
//!      GroqProvider            GeminiProvider
//!      (primary)               (fallback)
//!      one request, 90s        per model: ≤3 attempts, 90s each,
//!      no retry, payload       rate-limit backoff; 404 → next model
//!      limit = byte budget
//! ```
//!
//! Both are always compiled in; which ones run is decided by the configured
//! credentials (see [`ProviderSet::from_config`]).

pub mod gemini;
pub mod groq;
pub mod retry;

use crate::config::ExplainConfig;
use crate::error::{ExplainError, ProviderError};
use crate::pipeline::encode::RasterImage;
use async_trait::async_trait;
use std::sync::Arc;

pub use gemini::GeminiProvider;
pub use groq::GroqProvider;

/// Text produced by a provider for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    /// Provider name, e.g. `"Groq"`.
    pub provider: String,
    /// Model identifier that produced the text.
    pub model: String,
}

/// A remote vision model that turns an image plus prompt into text.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Human-readable provider name used in logs and placeholders.
    fn name(&self) -> &str;

    /// Maximum estimated transmitted image size this provider accepts.
    /// `None` means no limit.
    fn payload_limit(&self) -> Option<usize> {
        None
    }

    /// Submit one page.
    ///
    /// With `pinned_model = Some(m)` only `m` is used (it answered for an
    /// earlier page). With `None` the provider picks from its own model list.
    async fn submit(
        &self,
        prompt: &str,
        image: &RasterImage,
        pinned_model: Option<&str>,
    ) -> Result<Completion, ProviderError>;
}

/// The providers reachable for one run, in priority order.
#[derive(Clone)]
pub struct ProviderSet {
    pub primary: Option<Arc<dyn VisionProvider>>,
    pub fallback: Option<Arc<dyn VisionProvider>>,
    /// Budget for a primary that reports no limit of its own.
    pub(crate) default_budget: usize,
}

impl ProviderSet {
    /// Build providers from injected instances or credentials.
    ///
    /// # Errors
    /// [`ExplainError::NoProviderConfigured`] when neither provider is available.
    pub fn from_config(config: &ExplainConfig) -> Result<Self, ExplainError> {
        let primary = match (&config.primary_provider, &config.groq_api_key) {
            (Some(p), _) => Some(Arc::clone(p)),
            (None, Some(key)) => {
                Some(Arc::new(GroqProvider::new(key.clone(), config)?) as Arc<dyn VisionProvider>)
            }
            (None, None) => None,
        };
        let fallback = match (&config.fallback_provider, &config.gemini_api_key) {
            (Some(p), _) => Some(Arc::clone(p)),
            (None, Some(key)) => {
                Some(Arc::new(GeminiProvider::new(key.clone(), config)?) as Arc<dyn VisionProvider>)
            }
            (None, None) => None,
        };

        if primary.is_none() && fallback.is_none() {
            return Err(ExplainError::NoProviderConfigured {
                hint: "Set GROQ_API_KEY or GEMINI_API_KEY (or pass --groq-key / --gemini-key)."
                    .into(),
            });
        }
        Ok(Self {
            primary,
            fallback,
            default_budget: config.byte_budget,
        })
    }

    /// Byte budget for rendered pages, if the primary provider is a
    /// candidate at all: its own limit, else the configured budget.
    pub fn byte_budget(&self) -> Option<usize> {
        self.primary
            .as_ref()
            .map(|p| p.payload_limit().unwrap_or(self.default_budget))
    }
}

/// Build a `reqwest` client shared by both providers.
///
/// No client-level timeout: each provider races its own request against
/// `tokio::time::timeout` so the error can be classified.
pub(crate) fn http_client(provider: &str) -> Result<reqwest::Client, ExplainError> {
    reqwest::Client::builder()
        .user_agent(concat!("edgequake-pdf-explain/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ExplainError::Internal(format!("{provider} HTTP client: {e}")))
}

/// Cut `body` to at most `max` characters on a char boundary.
pub(crate) fn truncate_chars(body: &str, max: usize) -> String {
    body.chars().take(max).collect()
}
