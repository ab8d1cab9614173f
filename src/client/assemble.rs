//! Presentation assembly: what the page shows after a story arrives, and
//! what it keeps to rebuild the export later.
//!
//! The displayed book is ordinary markup that anything on the page may
//! touch. The [`LastGeneration`] next to it is an immutable copy of the
//! exact inputs, and the export is rebuilt from that copy, never from the
//! displayed markup.

use crate::config::MarkupPolicy;
use crate::error::BookError;
use crate::model::{EncodedImage, NarrativeMarkup, Questionnaire};
use crate::pipeline::{markup, skeleton};
use once_cell::sync::Lazy;
use regex::Regex;

/// The exact story and photos a book was displayed from.
///
/// Created once per generation and never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastGeneration {
    story: NarrativeMarkup,
    images: Vec<EncodedImage>,
}

impl LastGeneration {
    pub fn new(story: NarrativeMarkup, images: Vec<EncodedImage>) -> Self {
        Self { story, images }
    }

    pub fn story(&self) -> &NarrativeMarkup {
        &self.story
    }

    pub fn images(&self) -> &[EncodedImage] {
        &self.images
    }
}

static RE_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"<h2 class="{}">(?s:(.*?))</h2>"#,
        skeleton::TITLE_CLASS
    ))
    .unwrap()
});

static RE_SUBTITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"<p class="{}">(?s:(.*?))</p>"#,
        skeleton::SUBTITLE_CLASS
    ))
    .unwrap()
});

/// The book as currently shown on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayedBook {
    html: String,
}

impl DisplayedBook {
    pub fn html(&self) -> &str {
        &self.html
    }

    /// Direct access to the displayed markup, as page scripts have.
    pub fn html_mut(&mut self) -> &mut String {
        &mut self.html
    }

    /// Title text as currently displayed.
    pub fn title(&self) -> Result<String, BookError> {
        read_text(&RE_TITLE, &self.html, "title")
    }

    /// Subtitle text as currently displayed.
    pub fn subtitle(&self) -> Result<String, BookError> {
        read_text(&RE_SUBTITLE, &self.html, "subtitle")
    }

    pub fn photo_count(&self) -> usize {
        self.html
            .matches(&format!(r#"class="{}""#, skeleton::PHOTO_CLASS))
            .count()
    }
}

fn read_text(re: &Regex, html: &str, what: &str) -> Result<String, BookError> {
    re.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| markup::unescape_text(m.as_str()))
        .ok_or_else(|| BookError::InvalidState(format!("no {what} in the displayed book")))
}

/// Build the displayed book and the state retained for export.
///
/// The title comes from the derived nickname, not the raw field. The story
/// is displayed under `policy`; the retained copy is the story exactly as
/// received.
pub fn assemble(
    questionnaire: &Questionnaire,
    subtitle: &str,
    story: NarrativeMarkup,
    images: Vec<EncodedImage>,
    policy: MarkupPolicy,
) -> (DisplayedBook, LastGeneration) {
    let shown = markup::embed(story.as_str(), policy);
    let html = skeleton::book_content(&questionnaire.title(), subtitle, &images, &shown);
    (DisplayedBook { html }, LastGeneration::new(story, images))
}
