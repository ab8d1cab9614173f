//! Error types for the memorial-book library.
//!
//! Two distinct types reflect two distinct severities:
//!
//! * [`BookError`] — **Fatal** for the user action that raised it: the story
//!   could not be generated, the attachments could not be read, or the PDF
//!   could not be rendered. Nothing is retried; the user re-triggers the flow.
//!
//! * [`AttachmentNotice`] — **Soft**: more photos were selected than a book
//!   can hold. The selection is truncated to the first [`MAX_IMAGES`] and the
//!   flow continues. Returned next to the truncated selection, never as `Err`.
//!
//! [`MAX_IMAGES`]: crate::model::MAX_IMAGES

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the memorial-book library.
#[derive(Debug, Error)]
pub enum BookError {
    // ── Generation ────────────────────────────────────────────────────────
    /// The story exchange failed or the generation service returned non-success.
    #[error("Story generation failed: {detail}")]
    GenerationFailure { detail: String },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Attachments ───────────────────────────────────────────────────────
    /// One photo of the selection could not be read; the whole set is dropped.
    #[error("Could not read photo '{name}': {detail}")]
    AttachmentFailure { name: String, detail: String },

    // ── Rendering ─────────────────────────────────────────────────────────
    /// Document assembly or the rendering engine failed. No partial output.
    #[error("PDF rendering failed: {detail}")]
    RenderFailure { detail: String },

    // ── Client state ──────────────────────────────────────────────────────
    /// The requested action is not available in the current view.
    #[error("Action not available: {0}")]
    InvalidState(String),

    /// The rendered document could not be handed to the user.
    #[error("Failed to save download '{path}': {source}")]
    Download {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config ────────────────────────────────────────────────────────────
    /// Builder validation failed, or the stylesheet could not be loaded.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BookError {
    pub(crate) fn generation(detail: impl Into<String>) -> Self {
        BookError::GenerationFailure {
            detail: detail.into(),
        }
    }

    pub(crate) fn render(detail: impl Into<String>) -> Self {
        BookError::RenderFailure {
            detail: detail.into(),
        }
    }
}

/// Soft warning raised when a photo selection exceeds the attachment cap.
///
/// Policy is "first N survive": the extra files are dropped, never queued.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[error("{selected} photos selected, only the first {kept} are kept")]
pub struct AttachmentNotice {
    pub selected: usize,
    pub kept: usize,
}
