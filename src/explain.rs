//! Eager (whole-document) explanation entry points.
//!
//! ## Why one page at a time?
//!
//! Both providers are quota-limited per minute. Pages are processed strictly
//! in order, with a pause between them, and the provider that answered last
//! stays pinned for the next page (see [`crate::pipeline::llm`]). Parallel
//! pages would only burn quota faster and make the pinning meaningless.
//!
//! Use [`crate::stream::explain_stream`] instead to receive pages as they are
//! finalised, or to stop a long run early by dropping the stream.

use crate::config::ExplainConfig;
use crate::error::{ExplainError, PageError};
use crate::output::{ExplanationOutput, ExplanationStats, PageExplanation};
use crate::pipeline::llm::{self, ActiveProvider, PipelineState};
use crate::pipeline::render::{self, PageRenderer, PdfiumRenderer};
use crate::pipeline::{input, postprocess};
use crate::prompts;
use crate::provider::ProviderSet;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Explain every page of a PDF file or URL.
///
/// # Returns
/// `Ok(ExplanationOutput)` with exactly one entry per page, even if some
/// pages hold placeholders (check `output.stats.failed_pages`).
///
/// # Errors
/// Only fatal errors:
/// - no provider configured (checked before the input is read)
/// - file not found, download failure, not a PDF
/// - the document cannot be opened
pub async fn explain(
    input_str: impl AsRef<str>,
    config: &ExplainConfig,
) -> Result<ExplanationOutput, ExplainError> {
    let input_str = input_str.as_ref();
    let providers = ProviderSet::from_config(config)?;
    info!("Starting explanation: {}", input_str);

    let bytes = input::read_input(input_str, config.download_timeout_secs).await?;
    let renderer = PdfiumRenderer::open(bytes, config.password.clone()).await?;
    Ok(run(PageLoop::new(Arc::new(renderer), providers, config)).await)
}

/// Explain a PDF held in memory.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf_explain::{explain_from_bytes, ExplainConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("slides.pdf")?;
/// let output = explain_from_bytes(bytes, &ExplainConfig::from_env()).await?;
/// println!("{}", output.to_markdown());
/// # Ok(())
/// # }
/// ```
pub async fn explain_from_bytes(
    bytes: Vec<u8>,
    config: &ExplainConfig,
) -> Result<ExplanationOutput, ExplainError> {
    let providers = ProviderSet::from_config(config)?;
    input::ensure_pdf(&bytes, "<memory>")?;
    let renderer = PdfiumRenderer::open(bytes, config.password.clone()).await?;
    Ok(run(PageLoop::new(Arc::new(renderer), providers, config)).await)
}

/// Explain every page of an already-opened document.
///
/// This is the core of the other entry points; it is public so callers can
/// plug in their own [`PageRenderer`].
pub async fn explain_with_renderer(
    renderer: Arc<dyn PageRenderer>,
    config: &ExplainConfig,
) -> Result<ExplanationOutput, ExplainError> {
    let providers = ProviderSet::from_config(config)?;
    Ok(run(PageLoop::new(renderer, providers, config)).await)
}

/// Explain a PDF and write the Markdown rendering to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn explain_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ExplainConfig,
) -> Result<ExplanationStats, ExplainError> {
    let output = explain(input_str, config).await?;
    write_atomic(output_path.as_ref(), output.to_markdown().as_bytes()).await?;
    Ok(output.stats)
}

/// Synchronous wrapper around [`explain`].
///
/// Creates a temporary tokio runtime internally.
pub fn explain_sync(
    input_str: impl AsRef<str>,
    config: &ExplainConfig,
) -> Result<ExplanationOutput, ExplainError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExplainError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(explain(input_str, config))
}

/// Count the pages of a PDF without contacting any provider.
pub async fn inspect(
    input_str: impl AsRef<str>,
    password: Option<&str>,
) -> Result<usize, ExplainError> {
    let bytes = input::read_input(input_str.as_ref(), 120).await?;
    let renderer = PdfiumRenderer::open(bytes, password.map(String::from)).await?;
    Ok(renderer.page_count())
}

/// Write `contents` to a sibling temp file, then rename over `path`.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ExplainError> {
    let write_failed = |source| ExplainError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(write_failed)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(write_failed)
}

async fn run(mut pages: PageLoop) -> ExplanationOutput {
    let mut results = BTreeMap::new();
    while let Some(entry) = pages.next_page().await {
        results.insert(entry.page_num, entry);
    }
    ExplanationOutput {
        pages: results,
        stats: pages.stats(),
    }
}

// ── Page loop ────────────────────────────────────────────────────────────

/// Sequential page driver shared by the eager and streaming APIs.
///
/// Owns the run's [`PipelineState`]; one instance per run.
pub(crate) struct PageLoop {
    renderer: Arc<dyn PageRenderer>,
    providers: ProviderSet,
    config: ExplainConfig,
    state: PipelineState,
    total_pages: usize,
    next: usize,
    /// Set after a page that reached the providers; the pause is taken
    /// lazily, before the following page, so the last page never waits.
    pending_delay: bool,
    finished: bool,
    started: Instant,
    stats: ExplanationStats,
}

impl PageLoop {
    pub(crate) fn new(
        renderer: Arc<dyn PageRenderer>,
        providers: ProviderSet,
        config: &ExplainConfig,
    ) -> Self {
        let total_pages = renderer.page_count();
        info!(
            "Explaining {} pages (primary: {}, fallback: {})",
            total_pages,
            providers.primary.as_ref().map_or("none", |p| p.name()),
            providers.fallback.as_ref().map_or("none", |p| p.name()),
        );
        if let Some(ref cb) = config.progress_callback {
            cb.on_run_start(total_pages);
        }

        Self {
            renderer,
            providers,
            config: config.clone(),
            state: PipelineState::default(),
            total_pages,
            next: 1,
            pending_delay: false,
            finished: false,
            started: Instant::now(),
            stats: ExplanationStats {
                total_pages,
                ..ExplanationStats::default()
            },
        }
    }

    pub(crate) fn stats(&self) -> ExplanationStats {
        ExplanationStats {
            total_duration_ms: self.started.elapsed().as_millis() as u64,
            ..self.stats.clone()
        }
    }

    /// Process the next page, or `None` once every page has an entry.
    pub(crate) async fn next_page(&mut self) -> Option<PageExplanation> {
        if self.next > self.total_pages {
            self.finish();
            return None;
        }
        let page_num = self.next;
        self.next += 1;

        if std::mem::take(&mut self.pending_delay) && self.config.page_delay_ms > 0 {
            debug!("Waiting {}ms before page {}", self.config.page_delay_ms, page_num);
            tokio::time::sleep(Duration::from_millis(self.config.page_delay_ms)).await;
        }

        let entry = self.explain_page(page_num).await;
        self.pending_delay = !matches!(entry.error, Some(PageError::RenderFailed { .. }));
        Some(entry)
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        info!(
            "Explanation complete: {}/{} pages ({} primary, {} fallback), {}ms",
            self.stats.explained_pages,
            self.total_pages,
            self.stats.primary_pages,
            self.stats.fallback_pages,
            self.started.elapsed().as_millis()
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_run_complete(self.total_pages, self.stats.explained_pages);
        }
    }

    async fn explain_page(&mut self, page_num: usize) -> PageExplanation {
        let total = self.total_pages;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_page_start(page_num, total);
        }
        debug!("Page {}/{}: rendering", page_num, total);
        let page_start = Instant::now();

        let image = match render::rasterize(
            &self.renderer,
            page_num,
            self.config.render_scale,
            self.providers.byte_budget(),
            self.config.jpeg_quality,
        )
        .await
        {
            Ok(image) => image,
            Err(e) => {
                warn!("Page {}: {}", page_num, e);
                return self.record(PageExplanation::failed(e, elapsed_ms(page_start)));
            }
        };

        let prompt =
            prompts::explanation_prompt(self.config.prompt_template.as_deref(), page_num, total);

        let entry = match llm::explain_image(
            &mut self.state,
            &self.providers,
            page_num,
            &prompt,
            &image,
        )
        .await
        {
            Some(completion) => {
                if self.state.active == ActiveProvider::PinnedPrimary {
                    self.stats.primary_pages += 1;
                } else {
                    self.stats.fallback_pages += 1;
                }
                PageExplanation::explained(
                    page_num,
                    postprocess::clean_explanation(&completion.text),
                    completion.provider,
                    completion.model,
                    elapsed_ms(page_start),
                )
            }
            None => {
                let detail = self
                    .state
                    .last_error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "No provider available.".to_string());
                PageExplanation::failed(
                    PageError::Unavailable {
                        page: page_num,
                        detail,
                    },
                    elapsed_ms(page_start),
                )
            }
        };
        self.record(entry)
    }

    fn record(&mut self, entry: PageExplanation) -> PageExplanation {
        let total = self.total_pages;
        match &entry.error {
            None => {
                self.stats.explained_pages += 1;
                info!(
                    "Page {}/{} explained by {} ({} chars, {}ms)",
                    entry.page_num,
                    total,
                    entry.provider.as_deref().unwrap_or("?"),
                    entry.text.len(),
                    entry.duration_ms
                );
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_page_complete(
                        entry.page_num,
                        total,
                        entry.provider.as_deref().unwrap_or_default(),
                        entry.text.len(),
                    );
                }
            }
            Some(_) => {
                self.stats.failed_pages += 1;
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_page_error(entry.page_num, total, &entry.text);
                }
            }
        }
        entry
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn atomic_write_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.md");
        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        assert!(!dir.path().join("nested").join("out.md.tmp").exists());
    }

    #[tokio::test]
    async fn no_provider_fails_before_reading_input() {
        // The path does not exist; the provider check must win.
        let err = explain("/definitely/not/here.pdf", &ExplainConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExplainError::NoProviderConfigured { .. }));
    }
}
