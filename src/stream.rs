//! Streaming explanation API: emit pages as they are finalised.
//!
//! ## Why stream?
//!
//! With a pause between pages and up to a few retries per page, a 40-slide
//! deck takes minutes. [`explain_stream`] yields each [`PageExplanation`] as
//! soon as it is final, in page order. Dropping the stream stops the run
//! between pages; everything already yielded stays valid. The inter-page
//! pause is taken when the *next* page is polled, so a consumer that stops
//! after page `k` never waits for it.

use crate::config::ExplainConfig;
use crate::error::ExplainError;
use crate::explain::PageLoop;
use crate::output::PageExplanation;
use crate::pipeline::input;
use crate::pipeline::render::{PageRenderer, PdfiumRenderer};
use crate::provider::ProviderSet;
use futures::stream;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of finalised pages.
pub type PageStream = Pin<Box<dyn Stream<Item = PageExplanation> + Send>>;

/// Explain a PDF file or URL, streaming pages in order.
///
/// # Returns
/// - `Ok(PageStream)` — one item per page, placeholders included
/// - `Err(ExplainError)` — fatal error before any page (no provider, not a
///   PDF, unreadable document)
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf_explain::{explain_stream, ExplainConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut pages = explain_stream("deck.pdf", &ExplainConfig::from_env()).await?;
/// while let Some(page) = pages.next().await {
///     println!("## Page {}\n\n{}\n", page.page_num, page.text);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn explain_stream(
    input_str: impl AsRef<str>,
    config: &ExplainConfig,
) -> Result<PageStream, ExplainError> {
    let input_str = input_str.as_ref();
    let providers = ProviderSet::from_config(config)?;
    info!("Starting streaming explanation: {}", input_str);

    let bytes = input::read_input(input_str, config.download_timeout_secs).await?;
    let renderer = PdfiumRenderer::open(bytes, config.password.clone()).await?;
    Ok(page_stream(PageLoop::new(Arc::new(renderer), providers, config)))
}

/// Streaming counterpart of [`crate::explain::explain_with_renderer`].
pub fn explain_stream_with_renderer(
    renderer: Arc<dyn PageRenderer>,
    config: &ExplainConfig,
) -> Result<PageStream, ExplainError> {
    let providers = ProviderSet::from_config(config)?;
    Ok(page_stream(PageLoop::new(renderer, providers, config)))
}

fn page_stream(pages: PageLoop) -> PageStream {
    Box::pin(stream::unfold(pages, |mut pages| async move {
        let entry = pages.next_page().await?;
        Some((entry, pages))
    }))
}
