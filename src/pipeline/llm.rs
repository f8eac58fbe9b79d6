//! Provider selection for one page: pin, demote, probe.
//!
//! ```text
//!            success                      success
//!   ┌──────────────────────┐      ┌─────────────────────────┐
//!   ▼                      │      ▼                         │
//! PinnedPrimary ──fail──▶ Probing ──primary ok──▶ PinnedPrimary
//!                          │  ▲
//!                          │  └──both fail (placeholder)
//!                          └──fallback ok(model)──▶ PinnedFallback(model)
//! PinnedFallback(model) ──fail──▶ Probing
//! ```
//!
//! A pinned provider is called directly. When it fails, the same page goes
//! through a full probe (primary first, then every fallback model) before a
//! placeholder is recorded. This doubles latency on the failure path; it is
//! kept because a page that the pinned provider rejected often succeeds on
//! the other one.

use crate::error::ProviderError;
use crate::pipeline::encode::RasterImage;
use crate::provider::{Completion, ProviderSet};
use tracing::{debug, info, warn};

/// Which provider handles the next page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ActiveProvider {
    /// No working provider known; try them in priority order.
    #[default]
    Probing,
    /// The primary provider answered the last page it was asked.
    PinnedPrimary,
    /// The fallback provider answered with `model`.
    PinnedFallback { model: String },
}

/// Mutable state for one run. Never shared between runs.
#[derive(Debug, Default)]
pub struct PipelineState {
    pub active: ActiveProvider,
    pub last_error: Option<ProviderError>,
}

impl PipelineState {
    fn demote(&mut self, page_num: usize, provider: &str, err: ProviderError) {
        warn!("Page {page_num}: pinned provider {provider} failed, re-probing — {err}");
        self.active = ActiveProvider::Probing;
        self.last_error = Some(err);
    }
}

/// Obtain an explanation for one rendered page, updating `state`.
///
/// Returns `None` when every reachable provider failed; the cause is in
/// `state.last_error`.
pub async fn explain_image(
    state: &mut PipelineState,
    providers: &ProviderSet,
    page_num: usize,
    prompt: &str,
    image: &RasterImage,
) -> Option<Completion> {
    // ── Pinned: call directly ─────────────────────────────────────────────
    match state.active.clone() {
        ActiveProvider::PinnedPrimary => {
            if let Some(primary) = &providers.primary {
                match primary.submit(prompt, image, None).await {
                    Ok(c) => return Some(c),
                    Err(e) => state.demote(page_num, primary.name(), e),
                }
            } else {
                state.active = ActiveProvider::Probing;
            }
        }
        ActiveProvider::PinnedFallback { model } => {
            if let Some(fallback) = &providers.fallback {
                match fallback.submit(prompt, image, Some(&model)).await {
                    Ok(c) => return Some(c),
                    Err(e) => state.demote(page_num, fallback.name(), e),
                }
            } else {
                state.active = ActiveProvider::Probing;
            }
        }
        ActiveProvider::Probing => {}
    }

    // ── Probing: primary, then fallback models ────────────────────────────
    if let Some(primary) = &providers.primary {
        match primary.submit(prompt, image, None).await {
            Ok(c) => {
                info!("Page {page_num}: pinned {}", primary.name());
                state.active = ActiveProvider::PinnedPrimary;
                return Some(c);
            }
            Err(e) => {
                warn!("Page {page_num}: {} failed — {e}", primary.name());
                state.last_error = Some(e);
            }
        }
    }

    if let Some(fallback) = &providers.fallback {
        match fallback.submit(prompt, image, None).await {
            Ok(c) => {
                info!("Page {page_num}: pinned {} ({})", fallback.name(), c.model);
                state.active = ActiveProvider::PinnedFallback {
                    model: c.model.clone(),
                };
                return Some(c);
            }
            Err(e) => {
                warn!("Page {page_num}: {} failed — {e}", fallback.name());
                state.last_error = Some(e);
            }
        }
    }

    debug!("Page {page_num}: no provider succeeded");
    None
}
