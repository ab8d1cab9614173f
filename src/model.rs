//! Data model shared by the browser-side flow and the two HTTP endpoints.
//!
//! Every type here is plain data: created once, never mutated in place, and
//! serialised with the exact field names the wire protocol uses.

use crate::config::PageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hard cap on photos per book, enforced at selection and at submission.
pub const MAX_IMAGES: usize = 3;

/// Subtitle printed under every book title.
pub const SUBTITLE: &str = "君と走った道のりは、永遠に";

/// Fixed file name offered for the exported PDF.
pub const DOWNLOAD_FILE_NAME: &str = "愛車メモリアルブック.pdf";

/// Separator between maker/model and nickname in a vehicle name,
/// e.g. `スカイライン・ハコスカ`.
pub const NICKNAME_SEPARATOR: char = '・';

/// Content type of a [`RenderedDocument`].
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// The questionnaire filled in by the user. Consumed once by generation.
///
/// Every field is free text; a missing one reads as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Questionnaire {
    #[serde(rename = "carName", alias = "vehicleName")]
    pub vehicle_name: String,
    #[serde(rename = "carNickname", alias = "nickname")]
    pub nickname: String,
    pub first_memory: String,
    pub memorable_drive: String,
    pub favorite_song: String,
    pub final_words: String,
}

impl Questionnaire {
    /// The nickname that titles the book.
    ///
    /// An explicit nickname wins. Otherwise the segment after the first `・`
    /// of the vehicle name is used, and failing that the whole vehicle name.
    pub fn display_nickname(&self) -> &str {
        if !self.nickname.is_empty() {
            return &self.nickname;
        }
        match self.vehicle_name.split(NICKNAME_SEPARATOR).nth(1) {
            Some(segment) if !segment.is_empty() => segment,
            _ => &self.vehicle_name,
        }
    }

    /// Book title: `{nickname}との物語`.
    pub fn title(&self) -> String {
        format!("{}との物語", self.display_nickname())
    }
}

/// Narrative markup returned by the generation service.
///
/// Only `<p>` paragraphs and `<span class="highlight">` spans are expected.
/// The same bytes flow from the generation response to the display, into
/// the export payload and finally into the rendered document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NarrativeMarkup(String);

impl NarrativeMarkup {
    pub fn new(markup: impl Into<String>) -> Self {
        Self(markup.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Number of `<p>` paragraphs in the markup.
    pub fn paragraph_count(&self) -> usize {
        self.0.matches("<p>").count()
    }
}

impl fmt::Display for NarrativeMarkup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for NarrativeMarkup {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NarrativeMarkup {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One photo as a self-contained `data:<mime>;base64,<payload>` token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedImage(String);

impl EncodedImage {
    /// Wrap an already-encoded data URL. No validation happens here; see
    /// [`crate::pipeline::encode::check_data_url`].
    pub fn from_data_url(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Media type between `data:` and `;base64`, if present.
    pub fn mime_type(&self) -> Option<&str> {
        self.0
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(';'))
            .map(|(mime, _)| mime)
    }
}

impl fmt::Display for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body of a successful `POST /generate-story` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub story: NarrativeMarkup,
}

/// Body of a failed `POST /generate-story` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateErrorBody {
    pub error: String,
}

/// The sole input to rendering: `POST /download-pdf` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayload {
    pub title: String,
    pub subtitle: String,
    pub story_html: NarrativeMarkup,
    #[serde(default)]
    pub image_data_urls: Vec<EncodedImage>,
}

/// Binary output of the rendering engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    pub format: PageFormat,
}

impl RenderedDocument {
    pub fn content_type(&self) -> &'static str {
        PDF_CONTENT_TYPE
    }

    /// True when the bytes start with the `%PDF` magic.
    pub fn is_pdf(&self) -> bool {
        self.bytes.starts_with(b"%PDF")
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
