//! # memorial-book
//!
//! Turn a short questionnaire about a retired car into an illustrated
//! memorial book, then export exactly that book as a PDF.
//!
//! ## Why this crate?
//!
//! Generation, on-screen display and PDF rendering happen in three places
//! that share no memory: the LLM call on the server, the browser page, and a
//! headless Chrome on the server again. The exported PDF must still show the
//! same story and photos the page showed. This crate keeps that promise
//! without any server-side session. The client retains an immutable copy of
//! what it displayed ([`client::assemble::LastGeneration`]) and rebuilds the
//! export from it, and both renderings share one skeleton and one stylesheet
//! ([`pipeline::skeleton`]).
//!
//! ## Pipeline Overview
//!
//! ```text
//! questionnaire + photos
//!  │
//!  ├─ 1. Encode    photos → data: URLs, first 3 kept
//!  ├─ 2. Generate  POST /generate-story → LLM → allow-listed markup
//!  ├─ 3. Display   title + photos + story in the shared skeleton
//!  ├─ 4. Export    payload rebuilt from retained state → POST /download-pdf
//!  └─ 5. Render    self-contained document → Chrome → PDF attachment
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use memorial_book::{server, BookConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = BookConfig::builder().static_dir("static").build()?;
//!     server::serve(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `memorial-book` binary (clap + anyhow + tracing-subscriber) |
//!
//! ## Markup policy
//!
//! Story markup is untrusted model output. The default
//! [`MarkupPolicy::Sanitize`] keeps `<p>` and `<span class="highlight">` and
//! escapes everything else, at generation and again at render time.
//! [`MarkupPolicy::Trusted`] embeds the markup as generated.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod prompts;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::session::{
    BookSession, Frontend, NoopFrontend, Preview, Sections, Trigger, TriggerState, View,
};
pub use config::{BookConfig, BookConfigBuilder, MarkupPolicy, PageFormat};
pub use error::{AttachmentNotice, BookError};
pub use model::{
    EncodedImage, ExportPayload, NarrativeMarkup, Questionnaire, RenderedDocument, MAX_IMAGES,
};
pub use pipeline::render::{ChromeEngine, DocumentRenderer, PdfEngine, PrintSettings};
