//! # edgequake-pdf-explain
//!
//! Explain every page of a PDF with a vision language model.
//!
//! ## Why this crate?
//!
//! Slide decks and reports are mostly charts, tables and diagrams that text
//! extraction cannot read. This crate renders each page to an image and asks
//! a vision model to explain it: main content, background, a written
//! analysis of every visual, and key takeaways.
//!
//! Two providers are supported. Groq is fast but caps request size, so pages
//! are downscaled to fit. Gemini is slower and quota-limited per minute, so
//! it retries rate limits with the server's suggested delay and walks a list
//! of models. Whichever answers is pinned for the following pages and
//! demoted as soon as it fails.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    read local file or download from URL
//!  ├─ 2. Render   rasterise one page via pdfium (spawn_blocking)
//!  ├─ 3. Encode   PNG, or JPEG downscaled to the Groq byte budget
//!  ├─ 4. Explain  pinned provider → probe Groq → probe Gemini models
//!  ├─ 5. Polish   strip fences, normalise whitespace
//!  └─ 6. Output   one entry per page + stats; pause, next page
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf_explain::{explain, ExplainConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads GROQ_API_KEY and GEMINI_API_KEY (or GOOGLE_API_KEY)
//!     let config = ExplainConfig::from_env();
//!     let output = explain("lecture.pdf", &config).await?;
//!     println!("{}", output.to_markdown());
//!     eprintln!("{}/{} pages explained",
//!         output.stats.explained_pages,
//!         output.stats.total_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-explain` binary (clap + anyhow + tracing-subscriber) |
//!
//! ```toml
//! edgequake-pdf-explain = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod explain;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExplainConfig, ExplainConfigBuilder};
pub use error::{is_quota_message, ExplainError, PageError, ProviderError};
pub use explain::{
    explain, explain_from_bytes, explain_sync, explain_to_file, explain_with_renderer, inspect,
};
pub use output::{ExplanationOutput, ExplanationStats, PageExplanation};
pub use pipeline::encode::RasterImage;
pub use pipeline::render::{PageRenderer, PdfiumRenderer};
pub use progress::{ExplainProgressCallback, NoopProgressCallback, ProgressCallback};
pub use provider::{Completion, GeminiProvider, GroqProvider, ProviderSet, VisionProvider};
pub use stream::{explain_stream, explain_stream_with_renderer, PageStream};
