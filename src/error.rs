//! Error types for the edgequake-pdf-explain library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`ExplainError`] — **Fatal**: the run cannot proceed at all (no provider
//!   credential, unreadable input, corrupt PDF). Returned as
//!   `Err(ExplainError)` from the top-level `explain*` functions.
//!
//! * [`ProviderError`] — **Per request**: one call to Groq or Gemini failed.
//!   Its variant decides what happens next: Gemini retries rate limits and
//!   skips unknown models, everything else propagates to the orchestrator,
//!   which demotes the pinned provider and tries the alternate.
//!
//! * [`PageError`] — **Per page**: no explanation could be produced for one
//!   page. Its `Display` output is the placeholder text recorded in place of
//!   an explanation, so operators can diagnose a failure from the output alone.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf-explain library.
///
/// Page-level failures never surface here; they are recorded as placeholder
/// entries in [`crate::output::ExplanationOutput`].
#[derive(Debug, Error)]
pub enum ExplainError {
    // ── Configuration ─────────────────────────────────────────────────────
    /// Neither the Groq nor the Gemini credential is configured.
    #[error("No vision provider is configured.\n{hint}")]
    NoProviderConfigured { hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes were read, but they are not a PDF.
    #[error("Input is not a valid PDF: '{source_name}'\nFirst bytes: {magic:?}")]
    NotAPdf { source_name: String, magic: Vec<u8> },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF")]
    WrongPassword,

    /// Could not bind to a pdfium library within the bounded number of attempts.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Place libpdfium next to the binary, install it system-wide, or\n\
set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failed request to one vision provider.
///
/// The `Display` text doubles as the "last error" message embedded in page
/// placeholders, so it always names the provider.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ProviderError {
    /// The request did not settle before the per-request timeout.
    #[error("{provider}: request timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },

    /// HTTP 429 or a quota message. `retry_after_ms` is the parsed
    /// `retry in X s` hint, if the provider supplied one.
    #[error("{provider} {status}: {message}")]
    RateLimited {
        provider: String,
        status: u16,
        message: String,
        retry_after_ms: Option<u64>,
    },

    /// HTTP 404 or a "not found" message for the requested model.
    #[error("{provider} {status}: model '{model}' not found: {message}")]
    ModelUnavailable {
        provider: String,
        model: String,
        status: u16,
        message: String,
    },

    /// Any other non-success response.
    #[error("{provider} {status}: {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    /// Success status but no text in the response.
    #[error("Empty response from {provider}")]
    EmptyResponse { provider: String },

    /// The request never produced an HTTP response (DNS, TLS, reset, bad JSON).
    #[error("{provider}: {detail}")]
    Transport { provider: String, detail: String },

    /// The provider has no model identifiers to try.
    #[error("{provider}: no models configured")]
    NoModels { provider: String },
}

impl ProviderError {
    /// Whether this error warrants a backoff-and-retry on the same model.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }

    /// Whether this error means "try the next model identifier".
    pub fn is_model_unavailable(&self) -> bool {
        matches!(self, ProviderError::ModelUnavailable { .. })
    }
}

/// A page for which no explanation could be produced.
///
/// The `Display` output is the deterministic placeholder stored in the
/// result map in place of an explanation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PageError {
    /// The page could not be rasterised or encoded; no provider was called.
    #[error("Error generating explanation for page {page}: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// Every reachable provider failed for this page.
    #[error("Explanation unavailable for page {page}. {detail}")]
    Unavailable { page: usize, detail: String },
}

impl PageError {
    /// 1-based page number the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. } | PageError::Unavailable { page, .. } => *page,
        }
    }
}

/// Does this message look like a quota or rate-limit failure?
///
/// Used to tell the operator that waiting (or a paid plan) will help, as
/// opposed to a broken key or an unreadable page.
pub fn is_quota_message(text: &str) -> bool {
    let t = text.to_lowercase();
    t.contains("429")
        || t.contains("quota")
        || t.contains("rate limit")
        || t.contains("exceeded your current quota")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_placeholder_embeds_page_and_detail() {
        let e = PageError::RenderFailed {
            page: 4,
            detail: "bitmap allocation failed".into(),
        };
        assert_eq!(
            e.to_string(),
            "Error generating explanation for page 4: bitmap allocation failed"
        );
        assert_eq!(e.page(), 4);
    }

    #[test]
    fn unavailable_placeholder_embeds_last_error() {
        let last = ProviderError::Api {
            provider: "Groq".into(),
            status: 500,
            body: "upstream exploded".into(),
        };
        let e = PageError::Unavailable {
            page: 7,
            detail: last.to_string(),
        };
        assert_eq!(
            e.to_string(),
            "Explanation unavailable for page 7. Groq 500: upstream exploded"
        );
    }

    #[test]
    fn provider_error_classes() {
        let rl = ProviderError::RateLimited {
            provider: "Gemini".into(),
            status: 429,
            message: "quota".into(),
            retry_after_ms: None,
        };
        assert!(rl.is_rate_limited());
        assert!(!rl.is_model_unavailable());

        let nf = ProviderError::ModelUnavailable {
            provider: "Gemini".into(),
            model: "gemini-pro-vision".into(),
            status: 404,
            message: "not found".into(),
        };
        assert!(nf.is_model_unavailable());
        assert!(!nf.is_rate_limited());

        let t = ProviderError::Timeout {
            provider: "Groq".into(),
            secs: 90,
        };
        assert!(t.to_string().contains("90s"));
        assert!(!t.is_rate_limited());
    }

    #[test]
    fn no_provider_display_includes_hint() {
        let e = ExplainError::NoProviderConfigured {
            hint: "Set GROQ_API_KEY or GEMINI_API_KEY".into(),
        };
        assert!(e.to_string().contains("GROQ_API_KEY"));
    }

    #[test]
    fn quota_message_detection() {
        assert!(is_quota_message("Gemini 429: Resource has been exhausted"));
        assert!(is_quota_message("You exceeded your current QUOTA"));
        assert!(is_quota_message("Rate limit reached for model"));
        assert!(!is_quota_message("Groq 401: invalid api key"));
        assert!(!is_quota_message(""));
    }
}
