//! Progress-callback trait for per-page explanation events.
//!
//! Inject an [`Arc<dyn ExplainProgressCallback>`] via
//! [`crate::config::ExplainConfigBuilder::progress_callback`] to receive
//! events as the pipeline walks the document.
//!
//! Pages are processed strictly one at a time, so events for page `n` always
//! arrive before any event for page `n + 1`, and `on_page_start` fires exactly
//! once per page in increasing page order.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf_explain::{ExplainConfig, ExplainProgressCallback};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ExplainProgressCallback for Printer {
//!     fn on_page_start(&self, page_num: usize, total_pages: usize) {
//!         eprintln!("Explaining page {page_num} of {total_pages}…");
//!     }
//! }
//!
//! let config = ExplainConfig::builder()
//!     .progress_callback(Arc::new(Printer) as Arc<dyn ExplainProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ExplainProgressCallback: Send + Sync {
    /// Called once, after the document is opened and before page 1.
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called before a page is rendered.
    ///
    /// # Arguments
    /// * `page_num`    — 1-indexed page number
    /// * `total_pages` — total pages in the document
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a provider returned an explanation for the page.
    ///
    /// # Arguments
    /// * `provider` — name of the provider that answered (e.g. `"Groq"`)
    /// * `text_len` — byte length of the explanation
    fn on_page_complete(&self, page_num: usize, total_pages: usize, provider: &str, text_len: usize) {
        let _ = (page_num, total_pages, provider, text_len);
    }

    /// Called when a placeholder was recorded instead of an explanation.
    ///
    /// `placeholder` is the exact text stored for the page.
    fn on_page_error(&self, page_num: usize, total_pages: usize, placeholder: &str) {
        let _ = (page_num, total_pages, placeholder);
    }

    /// Called once after the last page.
    fn on_run_complete(&self, total_pages: usize, explained: usize) {
        let _ = (total_pages, explained);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExplainProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExplainConfig`].
pub type ProgressCallback = Arc<dyn ExplainProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ExplainProgressCallback for Recorder {
        fn on_page_start(&self, page_num: usize, total_pages: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("start {page_num}/{total_pages}"));
        }

        fn on_page_error(&self, page_num: usize, _total_pages: usize, placeholder: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("error {page_num}: {placeholder}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(5);
        cb.on_page_start(1, 5);
        cb.on_page_complete(1, 5, "Groq", 42);
        cb.on_page_error(2, 5, "Explanation unavailable for page 2. boom");
        cb.on_run_complete(5, 4);
    }

    #[test]
    fn overridden_methods_receive_events() {
        let rec = Recorder::default();
        rec.on_page_start(1, 2);
        rec.on_page_complete(1, 2, "Gemini", 10);
        rec.on_page_start(2, 2);
        rec.on_page_error(2, 2, "nope");

        let events = rec.events.lock().unwrap();
        assert_eq!(
            *events,
            vec!["start 1/2", "start 2/2", "error 2: nope"]
        );
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_run_start(10);
        cb.on_page_start(1, 10);
    }
}
