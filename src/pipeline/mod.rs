//! Pipeline stages for explaining one page.
//!
//! Each submodule implements exactly one step. Only [`llm`] touches the
//! network; only [`render`] touches pdfium.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ postprocess
//! (bytes)   (pdfium)  (PNG/JPEG) (Groq│Gemini) (cleanup)
//! ```
//!
//! 1. [`input`]  — read the path or URL into validated PDF bytes
//! 2. [`render`] — rasterise one page in `spawn_blocking`
//! 3. [`encode`] — PNG, downscaled once to JPEG when over the byte budget
//! 4. [`llm`]    — pinned/probing provider selection for the page
//! 5. [`postprocess`] — cosmetic cleanup of provider text

pub mod encode;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod render;
