//! Result types returned by the explanation entry points.

use crate::error::{is_quota_message, PageError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One page's outcome: provider text or a placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageExplanation {
    /// 1-indexed page number.
    pub page_num: usize,

    /// The explanation, or the placeholder text when `error` is set.
    pub text: String,

    /// Provider that answered (`None` for placeholders).
    pub provider: Option<String>,

    /// Model that answered (`None` for placeholders).
    pub model: Option<String>,

    /// Wall-clock time spent on this page, excluding the inter-page delay.
    pub duration_ms: u64,

    /// Set when `text` is a placeholder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PageError>,
}

impl PageExplanation {
    pub(crate) fn explained(
        page_num: usize,
        text: String,
        provider: String,
        model: String,
        duration_ms: u64,
    ) -> Self {
        Self {
            page_num,
            text,
            provider: Some(provider),
            model: Some(model),
            duration_ms,
            error: None,
        }
    }

    pub(crate) fn failed(error: PageError, duration_ms: u64) -> Self {
        Self {
            page_num: error.page(),
            text: error.to_string(),
            provider: None,
            model: None,
            duration_ms,
            error: Some(error),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.error.is_some()
    }
}

/// Aggregate counters for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplanationStats {
    pub total_pages: usize,
    pub explained_pages: usize,
    pub failed_pages: usize,
    /// Pages answered by the primary provider.
    pub primary_pages: usize,
    /// Pages answered by the fallback provider.
    pub fallback_pages: usize,
    pub total_duration_ms: u64,
}

/// Everything produced by one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExplanationOutput {
    /// One entry per page, keyed 1..=N.
    pub pages: BTreeMap<usize, PageExplanation>,
    pub stats: ExplanationStats,
}

impl ExplanationOutput {
    /// Text stored for `page_num` (explanation or placeholder).
    pub fn text(&self, page_num: usize) -> Option<&str> {
        self.pages.get(&page_num).map(|p| p.text.as_str())
    }

    /// Pages whose placeholder indicates a quota or rate-limit failure.
    pub fn quota_limited_pages(&self) -> Vec<usize> {
        self.pages
            .values()
            .filter(|p| p.is_placeholder() && is_quota_message(&p.text))
            .map(|p| p.page_num)
            .collect()
    }

    /// Render all pages as a Markdown document, one `## Page N` section each.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        for (n, page) in &self.pages {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("## Page {n}\n\n"));
            out.push_str(page.text.trim_end());
            out.push('\n');
        }
        out
    }
}
