//! Configuration types for page explanation runs.
//!
//! All run behaviour is controlled through [`ExplainConfig`], built via its
//! [`ExplainConfigBuilder`] or read from the environment with
//! [`ExplainConfig::from_env`]. Credentials are read once, when the config is
//! built; the pipeline never touches the environment afterwards.

use crate::error::ExplainError;
use crate::progress::ProgressCallback;
use crate::provider::VisionProvider;
use std::fmt;
use std::sync::Arc;

/// Default Groq vision model.
pub const DEFAULT_GROQ_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";

/// Gemini models tried in order until one exists for the configured key.
pub const DEFAULT_GEMINI_MODELS: &[&str] = &[
    "gemini-2.0-flash",
    "gemini-pro-vision",
    "gemini-1.5-pro",
    "gemini-1.5-flash",
];

/// Groq rejects request bodies over 4 MiB; 3 MiB of image leaves room for
/// base64 expansion and the JSON envelope.
pub const DEFAULT_BYTE_BUDGET: usize = 3 * 1024 * 1024;

pub const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Configuration for one explanation run.
///
/// # Example
/// ```rust
/// use edgequake_pdf_explain::ExplainConfig;
///
/// let config = ExplainConfig::builder()
///     .groq_api_key("gsk_test")
///     .page_delay_ms(1000)
///     .build()
///     .unwrap();
/// assert!(config.has_any_provider());
/// ```
#[derive(Clone)]
pub struct ExplainConfig {
    /// Groq API key. Enables the primary (size-constrained) provider.
    pub groq_api_key: Option<String>,

    /// Gemini API key. Enables the fallback (quota-constrained) provider.
    pub gemini_api_key: Option<String>,

    /// Groq model identifier. Default: [`DEFAULT_GROQ_MODEL`].
    pub groq_model: String,

    /// Gemini model identifiers in priority order. Default: [`DEFAULT_GEMINI_MODELS`].
    pub gemini_models: Vec<String>,

    /// Base URL for the Groq API. Default: [`DEFAULT_GROQ_BASE_URL`].
    pub groq_base_url: String,

    /// Base URL for the Gemini API. Default: [`DEFAULT_GEMINI_BASE_URL`].
    pub gemini_base_url: String,

    /// Pre-constructed primary provider. Takes precedence over `groq_api_key`.
    pub primary_provider: Option<Arc<dyn VisionProvider>>,

    /// Pre-constructed fallback provider. Takes precedence over `gemini_api_key`.
    pub fallback_provider: Option<Arc<dyn VisionProvider>>,

    /// Page render scale relative to the PDF's natural size. Default: 2.0.
    pub render_scale: f32,

    /// Maximum estimated transmitted image size for the primary provider,
    /// unless the provider reports its own `payload_limit`.
    /// Default: [`DEFAULT_BYTE_BUDGET`].
    pub byte_budget: usize,

    /// JPEG quality (1–100) used when a page is downscaled. Default: 85.
    pub jpeg_quality: u8,

    /// Per-request timeout in seconds, for both providers. Default: 90.
    pub request_timeout_secs: u64,

    /// Attempts per Gemini model on rate-limit errors. Default: 3.
    pub max_attempts: u32,

    /// Backoff when a rate-limit error carries no `retry in X s` hint. Default: 4000.
    pub default_retry_ms: u64,

    /// Upper bound on any rate-limit backoff. Default: 5000.
    pub max_retry_ms: u64,

    /// Pause between pages to respect per-minute quotas. Default: 3000.
    pub page_delay_ms: u64,

    /// Maximum tokens the model may generate per page. Default: 1024.
    pub max_tokens: u32,

    /// Sampling temperature. Default: 0.4.
    pub temperature: f32,

    /// Custom prompt template. `{page}` and `{total}` are substituted.
    pub prompt_template: Option<String>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            groq_api_key: None,
            gemini_api_key: None,
            groq_model: DEFAULT_GROQ_MODEL.to_string(),
            gemini_models: DEFAULT_GEMINI_MODELS.iter().map(|m| m.to_string()).collect(),
            groq_base_url: DEFAULT_GROQ_BASE_URL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            primary_provider: None,
            fallback_provider: None,
            render_scale: 2.0,
            byte_budget: DEFAULT_BYTE_BUDGET,
            jpeg_quality: 85,
            request_timeout_secs: 90,
            max_attempts: 3,
            default_retry_ms: 4000,
            max_retry_ms: 5000,
            page_delay_ms: 3000,
            max_tokens: 1024,
            temperature: 0.4,
            prompt_template: None,
            password: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExplainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |k: &Option<String>| k.as_ref().map(|_| "<redacted>");
        f.debug_struct("ExplainConfig")
            .field("groq_api_key", &redact(&self.groq_api_key))
            .field("gemini_api_key", &redact(&self.gemini_api_key))
            .field("groq_model", &self.groq_model)
            .field("gemini_models", &self.gemini_models)
            .field(
                "primary_provider",
                &self.primary_provider.as_ref().map(|p| p.name().to_string()),
            )
            .field(
                "fallback_provider",
                &self.fallback_provider.as_ref().map(|p| p.name().to_string()),
            )
            .field("render_scale", &self.render_scale)
            .field("byte_budget", &self.byte_budget)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("page_delay_ms", &self.page_delay_ms)
            .finish()
    }
}

impl ExplainConfig {
    /// Create a new builder for `ExplainConfig`.
    pub fn builder() -> ExplainConfigBuilder {
        ExplainConfigBuilder {
            config: Self::default(),
        }
    }

    /// Default configuration with credentials read from the environment.
    ///
    /// Reads `GROQ_API_KEY` and `GEMINI_API_KEY` (falling back to
    /// `GOOGLE_API_KEY`). Empty values count as unset.
    pub fn from_env() -> Self {
        Self {
            groq_api_key: env_key(&["GROQ_API_KEY"]),
            gemini_api_key: env_key(&["GEMINI_API_KEY", "GOOGLE_API_KEY"]),
            ..Self::default()
        }
    }

    /// True when at least one provider can be constructed.
    pub fn has_any_provider(&self) -> bool {
        self.primary_provider.is_some()
            || self.fallback_provider.is_some()
            || self.groq_api_key.is_some()
            || self.gemini_api_key.is_some()
    }
}

fn env_key(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|n| std::env::var(n).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Builder for [`ExplainConfig`].
#[derive(Debug)]
pub struct ExplainConfigBuilder {
    config: ExplainConfig,
}

impl ExplainConfigBuilder {
    /// Start from an existing config, e.g. one returned by [`ExplainConfig::from_env`].
    pub fn from_config(config: ExplainConfig) -> Self {
        Self { config }
    }

    pub fn groq_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.groq_api_key = Some(key.into()).filter(|k: &String| !k.is_empty());
        self
    }

    pub fn gemini_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.gemini_api_key = Some(key.into()).filter(|k: &String| !k.is_empty());
        self
    }

    pub fn groq_model(mut self, model: impl Into<String>) -> Self {
        self.config.groq_model = model.into();
        self
    }

    pub fn gemini_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.gemini_models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn groq_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.groq_base_url = url.into();
        self
    }

    pub fn gemini_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.gemini_base_url = url.into();
        self
    }

    pub fn primary_provider(mut self, provider: Arc<dyn VisionProvider>) -> Self {
        self.config.primary_provider = Some(provider);
        self
    }

    pub fn fallback_provider(mut self, provider: Arc<dyn VisionProvider>) -> Self {
        self.config.fallback_provider = Some(provider);
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale;
        self
    }

    pub fn byte_budget(mut self, bytes: usize) -> Self {
        self.config.byte_budget = bytes;
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn default_retry_ms(mut self, ms: u64) -> Self {
        self.config.default_retry_ms = ms;
        self
    }

    pub fn max_retry_ms(mut self, ms: u64) -> Self {
        self.config.max_retry_ms = ms;
        self
    }

    pub fn page_delay_ms(mut self, ms: u64) -> Self {
        self.config.page_delay_ms = ms;
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn prompt_template(mut self, template: impl Into<String>) -> Self {
        self.config.prompt_template = Some(template.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// A config with no provider at all is *valid* here; the run itself
    /// reports [`ExplainError::NoProviderConfigured`] before any page.
    pub fn build(self) -> Result<ExplainConfig, ExplainError> {
        let c = &self.config;
        if !(c.render_scale.is_finite() && c.render_scale > 0.0) {
            return Err(ExplainError::InvalidConfig(format!(
                "render scale must be > 0, got {}",
                c.render_scale
            )));
        }
        if c.jpeg_quality == 0 || c.jpeg_quality > 100 {
            return Err(ExplainError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        if c.max_attempts == 0 {
            return Err(ExplainError::InvalidConfig(
                "max attempts must be ≥ 1".into(),
            ));
        }
        if c.gemini_models.iter().all(|m| m.trim().is_empty()) {
            return Err(ExplainError::InvalidConfig(
                "at least one Gemini model is required".into(),
            ));
        }
        if c.byte_budget == 0 {
            return Err(ExplainError::InvalidConfig(
                "byte budget must be > 0".into(),
            ));
        }
        Ok(self.config)
    }
}
