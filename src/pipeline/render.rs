//! PDF rasterisation: render one page to a bitmap, then to a [`RasterImage`].
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which is CPU-bound
//! and not async-aware. [`rasterize`] moves each render onto tokio's blocking
//! pool so the runtime keeps servicing timers (backoff sleeps, request
//! timeouts) while a large page renders.
//!
//! ## Why re-open per page?
//!
//! A `PdfDocument` borrows its `Pdfium` binding and cannot cross an `.await`.
//! [`PdfiumRenderer`] keeps only the raw bytes and opens the document inside
//! each blocking task. Parsing is cheap compared to the VLM round-trip.

use crate::error::{ExplainError, PageError};
use crate::pipeline::encode::{self, RasterImage};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Renders single pages of an opened document.
///
/// Implementations are called from a blocking thread and may be slow.
pub trait PageRenderer: Send + Sync {
    /// Total number of pages in the document.
    fn page_count(&self) -> usize;

    /// Render the 1-based `page_num` at `scale` × the page's natural size.
    fn render(&self, page_num: usize, scale: f32) -> Result<DynamicImage, PageError>;
}

/// Render `page_num` and encode it within `byte_budget`.
///
/// Never returns a fatal error: every failure is a [`PageError::RenderFailed`]
/// for this page, and the caller moves on.
pub async fn rasterize(
    renderer: &Arc<dyn PageRenderer>,
    page_num: usize,
    scale: f32,
    byte_budget: Option<usize>,
    jpeg_quality: u8,
) -> Result<RasterImage, PageError> {
    let renderer = Arc::clone(renderer);

    tokio::task::spawn_blocking(move || {
        let bitmap = renderer.render(page_num, scale)?;
        debug!(
            "Rendered page {} → {}x{} px",
            page_num,
            bitmap.width(),
            bitmap.height()
        );
        encode::encode_page(&bitmap, byte_budget, jpeg_quality).map_err(|e| {
            PageError::RenderFailed {
                page: page_num,
                detail: format!("image encoding failed: {e}"),
            }
        })
    })
    .await
    .map_err(|e| PageError::RenderFailed {
        page: page_num,
        detail: format!("render task panicked: {e}"),
    })?
}

// ── pdfium backend ───────────────────────────────────────────────────────

/// Attempts made to bind the pdfium library before giving up.
const BIND_ATTEMPTS: u32 = 3;
/// Pause between binding attempts.
const BIND_RETRY_DELAY: Duration = Duration::from_millis(100);

/// [`PageRenderer`] backed by pdfium over an in-memory PDF.
pub struct PdfiumRenderer {
    bytes: Arc<Vec<u8>>,
    password: Option<String>,
    page_count: usize,
}

impl PdfiumRenderer {
    /// Open `bytes` once to validate them and count pages.
    pub async fn open(bytes: Vec<u8>, password: Option<String>) -> Result<Self, ExplainError> {
        let bytes = Arc::new(bytes);
        let page_count = {
            let bytes = Arc::clone(&bytes);
            let password = password.clone();
            tokio::task::spawn_blocking(move || count_pages_blocking(&bytes, password.as_deref()))
                .await
                .map_err(|e| ExplainError::Internal(format!("Open task panicked: {e}")))??
        };
        info!("PDF loaded: {} pages", page_count);

        Ok(Self {
            bytes,
            password,
            page_count,
        })
    }
}

impl PageRenderer for PdfiumRenderer {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn render(&self, page_num: usize, scale: f32) -> Result<DynamicImage, PageError> {
        let fail = |detail: String| PageError::RenderFailed {
            page: page_num,
            detail,
        };

        let pdfium = bind_pdfium().map_err(|e| fail(e.to_string()))?;
        let document = pdfium
            .load_pdf_from_byte_slice(&self.bytes, self.password.as_deref())
            .map_err(|e| fail(format!("{e:?}")))?;

        if page_num == 0 || page_num > self.page_count {
            return Err(fail(format!(
                "page out of range (document has {} pages)",
                self.page_count
            )));
        }

        let page = document
            .pages()
            .get((page_num - 1) as u16)
            .map_err(|e| fail(format!("{e:?}")))?;

        let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| fail(format!("{e:?}")))?;

        Ok(bitmap.as_image())
    }
}

fn count_pages_blocking(bytes: &[u8], password: Option<&str>) -> Result<usize, ExplainError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, password)
        .map_err(|e| {
            let err_str = format!("{e:?}");
            if err_str.contains("Password") || err_str.contains("password") {
                if password.is_some() {
                    ExplainError::WrongPassword
                } else {
                    ExplainError::PasswordRequired
                }
            } else {
                ExplainError::CorruptPdf { detail: err_str }
            }
        })?;
    Ok(document.pages().len() as usize)
}

/// Bind pdfium with a bounded poll: a library that is still being installed
/// or unpacked gets a few short retries, then the failure is reported.
fn bind_pdfium() -> Result<Pdfium, ExplainError> {
    let mut last_err = String::new();
    for attempt in 1..=BIND_ATTEMPTS {
        match try_bind() {
            Ok(bindings) => return Ok(Pdfium::new(bindings)),
            Err(e) => {
                last_err = format!("{e:?}");
                debug!("pdfium bind attempt {attempt}/{BIND_ATTEMPTS} failed: {last_err}");
                if attempt < BIND_ATTEMPTS {
                    std::thread::sleep(BIND_RETRY_DELAY);
                }
            }
        }
    }
    Err(ExplainError::PdfiumBindingFailed(last_err))
}

fn try_bind() -> Result<Box<dyn PdfiumLibraryBindings>, PdfiumError> {
    if let Some(path) = std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from) {
        return Pdfium::bind_to_library(path);
    }
    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
}
