//! Pipeline stages from questionnaire to printed book.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and the two external collaborators (the LLM and the
//! headless browser) can be swapped without touching the other stages.
//!
//! ## Data Flow
//!
//! ```text
//! photos ──▶ encode ──────────────────────────┐
//!                                             ▼
//! questionnaire ──▶ llm ──▶ markup ──▶ skeleton ──▶ render
//!                  (LLM)   (allow-list)  (shared DOM)  (Chrome → PDF)
//! ```
//!
//! 1. [`encode`]   — sniff, base64-wrap and cap the selected photos
//! 2. [`llm`]      — one bounded story request; the only stage calling the LLM
//! 3. [`markup`]   — unwrap model output and reduce it to the paragraph/highlight
//!    vocabulary
//! 4. [`skeleton`] — the book markup shared by the on-screen view and the PDF
//! 5. [`render`]   — self-contained document → PDF; runs in `spawn_blocking`
//!    because the browser connection is synchronous

pub mod encode;
pub mod llm;
pub mod markup;
pub mod render;
pub mod skeleton;
