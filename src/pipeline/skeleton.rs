//! The book skeleton shared by the on-screen view and the printed PDF.
//!
//! The stylesheet targets the ids and classes below and nothing else, so the
//! two renderings only look identical if both go through this module. The
//! assembler embeds [`book_content`] into the page's book container; the
//! renderer wraps the same content in [`standalone_document`].

use crate::model::{EncodedImage, NarrativeMarkup};
use crate::pipeline::markup::escape_text;

/// Page-level container the book content is placed into.
pub const BOOK_CONTAINER_ID: &str = "memorial-book-container";
/// Root of the book content.
pub const CONTENT_ID: &str = "memorial-content";
/// Photo gallery; omitted entirely when there are no photos.
pub const GALLERY_ID: &str = "image-gallery-display";
pub const TITLE_CLASS: &str = "memorial-title";
pub const SUBTITLE_CLASS: &str = "memorial-subtitle";
pub const PHOTO_CLASS: &str = "memorial-photo";
pub const STORY_CLASS: &str = "memorial-story";

/// Gallery markup for the photos, or an empty string when there are none.
pub fn gallery(images: &[EncodedImage]) -> String {
    if images.is_empty() {
        return String::new();
    }
    let mut html = format!(r#"<div id="{GALLERY_ID}">"#);
    for image in images {
        html.push_str(&format!(
            r#"<img class="{PHOTO_CLASS}" src="{}">"#,
            escape_text(image.as_str())
        ));
    }
    html.push_str("</div>");
    html
}

/// The book itself: title, subtitle, gallery and story.
///
/// `title` and `subtitle` are plain text and get escaped; `story` is embedded
/// as-is and must already satisfy the configured markup policy.
pub fn book_content(
    title: &str,
    subtitle: &str,
    images: &[EncodedImage],
    story: &NarrativeMarkup,
) -> String {
    format!(
        concat!(
            r#"<div id="{content}">"#,
            r#"<h2 class="{title_class}">{title}</h2>"#,
            r#"<p class="{subtitle_class}">{subtitle}</p>"#,
            "{gallery}",
            r#"<div class="{story_class}">{story}</div>"#,
            "</div>"
        ),
        content = CONTENT_ID,
        title_class = TITLE_CLASS,
        title = escape_text(title),
        subtitle_class = SUBTITLE_CLASS,
        subtitle = escape_text(subtitle),
        gallery = gallery(images),
        story_class = STORY_CLASS,
        story = story.as_str(),
    )
}

/// A self-contained document: inlined stylesheet plus the book container.
pub fn standalone_document(stylesheet: &str, content: &str) -> String {
    format!(
        concat!(
            "<!DOCTYPE html>\n",
            r#"<html lang="ja">"#,
            r#"<head><meta charset="UTF-8"><style>{css}</style></head>"#,
            r#"<body><div id="{container}">{content}</div></body>"#,
            "</html>\n"
        ),
        css = stylesheet,
        container = BOOK_CONTAINER_ID,
        content = content,
    )
}
