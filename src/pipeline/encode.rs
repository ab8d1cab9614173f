//! Photo capture: selected files → `data:` URLs, capped at [`MAX_IMAGES`].
//!
//! Photos travel inline. The generation page shows them, the export payload
//! carries them, and the renderer prints them, all from the same
//! `data:<mime>;base64,…` token. No file is uploaded separately and no bytes
//! are transcoded.
//!
//! The media type is sniffed from the file's magic bytes, not its extension.
//! A photo saved as `.jpg` that is really a PNG still gets `image/png`, which
//! is what the rendering engine needs to decode it.

use crate::error::{AttachmentNotice, BookError};
use crate::model::{EncodedImage, MAX_IMAGES};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::future::try_join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use tracing::{debug, warn};

/// A photo chosen by the user, before encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// A file on disk, read asynchronously at submission time.
    Path(PathBuf),
    /// Bytes already in memory (drag-and-drop, tests).
    Bytes { name: String, bytes: Vec<u8> },
}

impl ImageSource {
    pub fn name(&self) -> String {
        match self {
            ImageSource::Path(p) => p.display().to_string(),
            ImageSource::Bytes { name, .. } => name.clone(),
        }
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::Path(path)
    }
}

/// Keep the first [`MAX_IMAGES`] items; report when anything was dropped.
///
/// Applied twice: when the selection is made and again at submission, since
/// the selection can change between the two.
pub fn cap_selection<T>(mut files: Vec<T>) -> (Vec<T>, Option<AttachmentNotice>) {
    let selected = files.len();
    if selected <= MAX_IMAGES {
        return (files, None);
    }
    files.truncate(MAX_IMAGES);
    warn!("{} photos selected; keeping the first {}", selected, MAX_IMAGES);
    (
        files,
        Some(AttachmentNotice {
            selected,
            kept: MAX_IMAGES,
        }),
    )
}

/// Encode raw image bytes as a `data:` URL.
pub fn encode_bytes(name: &str, bytes: &[u8]) -> Result<EncodedImage, BookError> {
    let format = image::guess_format(bytes).map_err(|e| BookError::AttachmentFailure {
        name: name.to_string(),
        detail: format!("not a recognised image: {e}"),
    })?;
    let mime = format.to_mime_type();
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded {} ({}) → {} bytes base64", name, mime, b64.len());
    Ok(EncodedImage::from_data_url(format!("data:{mime};base64,{b64}")))
}

/// Read and encode one source.
pub async fn encode_source(source: &ImageSource) -> Result<EncodedImage, BookError> {
    match source {
        ImageSource::Path(path) => {
            let name = path.display().to_string();
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| BookError::AttachmentFailure {
                    name: name.clone(),
                    detail: e.to_string(),
                })?;
            encode_bytes(&name, &bytes)
        }
        ImageSource::Bytes { name, bytes } => encode_bytes(name, bytes),
    }
}

/// Encode every source concurrently and join on all of them.
///
/// Order follows `sources`. Any single failure fails the whole set, so the
/// caller sees either every photo or none.
pub async fn encode_all(sources: &[ImageSource]) -> Result<Vec<EncodedImage>, BookError> {
    try_join_all(sources.iter().map(encode_source)).await
}

static RE_DATA_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\Adata:image/[A-Za-z0-9.+-]+;base64,[A-Za-z0-9+/]+={0,2}\z").unwrap()
});

/// Check that a token received over the wire is an inline base64 image.
pub fn check_data_url(image: &EncodedImage) -> Result<(), String> {
    let s = image.as_str();
    if !RE_DATA_URL.is_match(s) {
        let head: String = s.chars().take(32).collect();
        return Err(format!("not an inline base64 image: '{head}…'"));
    }
    let payload_len = s.len() - s.find(',').map_or(0, |i| i + 1);
    if payload_len % 4 != 0 {
        return Err(format!("truncated base64 payload ({payload_len} chars)"));
    }
    Ok(())
}
