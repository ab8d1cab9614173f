//! Narrative markup: cleanup of model output and the allow-list sanitiser.
//!
//! The generation service is asked for a tiny vocabulary: `<p>` paragraphs
//! and `<span class="highlight">` keywords. Model output is still untrusted
//! text. Under [`MarkupPolicy::Sanitize`] anything outside that vocabulary is
//! escaped before it reaches a page or a PDF.
//!
//! ## Rules
//!
//! 1. Strip an outer code fence (```` ```html ```` … ```` ``` ````); models add
//!    them even when told not to. Generation path only.
//! 2. Normalise line endings (CRLF/CR → LF).
//! 3. Drop control characters and invisible Unicode (ZWSP, BOM, soft hyphen).
//! 4. Keep only `<p>`, `</p>`, `<span class="highlight">`, `</span>`, written
//!    back in canonical form. Every other `<` and `>` is escaped.
//! 5. Keep well-formed character references (`&amp;`, `&#12354;`); escape
//!    any other `&`.
//! 6. Balance tags: opening a paragraph closes whatever is open, stray
//!    closers are dropped, and everything left open is closed at the end.
//!
//! [`sanitize`] is idempotent. The server applies it when a story is
//! generated and again when a payload is rendered, and a story that went
//! through the first pass comes out of the second byte-for-byte unchanged.

use crate::config::MarkupPolicy;
use crate::model::NarrativeMarkup;
use once_cell::sync::Lazy;
use regex::Regex;

/// Class of the highlight span; part of the vocabulary shared with the stylesheet.
pub const HIGHLIGHT_CLASS: &str = "highlight";

const OPEN_PARAGRAPH: &str = "<p>";
const CLOSE_PARAGRAPH: &str = "</p>";
const OPEN_HIGHLIGHT: &str = r#"<span class="highlight">"#;
const CLOSE_HIGHLIGHT: &str = "</span>";

/// Turn raw model output into the story markup served to clients.
pub fn clean_story(raw: &str, policy: MarkupPolicy) -> NarrativeMarkup {
    let unfenced = strip_code_fences(raw);
    embed(unfenced.trim(), policy)
}

/// Apply the markup policy to a story received from anywhere.
pub fn embed(story: &str, policy: MarkupPolicy) -> NarrativeMarkup {
    match policy {
        MarkupPolicy::Sanitize => NarrativeMarkup::new(sanitize(story)),
        MarkupPolicy::Trusted => NarrativeMarkup::new(story),
    }
}

/// Escape plain text (titles, subtitles) for embedding in markup.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Inverse of [`escape_text`], for reading text back out of displayed markup.
pub fn unescape_text(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\A\s*```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\s*\z").unwrap());

fn strip_code_fences(input: &str) -> &str {
    match RE_OUTER_FENCES.captures(input) {
        Some(caps) => caps.get(1).map_or(input, |m| m.as_str()),
        None => input,
    }
}

// ── Rules 2–6: Allow-list sanitiser ──────────────────────────────────────────

static RE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\A<(/?)(p|span)(\s[^<>]*)?>").unwrap());

static RE_HIGHLIGHT_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\A\s*class\s*=\s*(?:"highlight"|'highlight'|highlight)\s*/?\s*\z"#).unwrap()
});

static RE_ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\A&(?:#[0-9]{1,7}|#[xX][0-9A-Fa-f]{1,6}|[A-Za-z][A-Za-z0-9]{1,31});").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Element {
    Paragraph,
    Highlight,
}

impl Element {
    fn open_tag(self) -> &'static str {
        match self {
            Element::Paragraph => OPEN_PARAGRAPH,
            Element::Highlight => OPEN_HIGHLIGHT,
        }
    }

    fn close_tag(self) -> &'static str {
        match self {
            Element::Paragraph => CLOSE_PARAGRAPH,
            Element::Highlight => CLOSE_HIGHLIGHT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Open(Element),
    Close(Element),
}

/// Reduce `input` to the paragraph/highlight vocabulary. See module docs.
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 16);
    let mut open: Vec<Element> = Vec::new();
    let mut rest = input;

    while let Some(c) = rest.chars().next() {
        let mut consumed = c.len_utf8();
        match c {
            '<' => match parse_tag(rest) {
                Some((tag, len)) => {
                    apply_tag(tag, &mut open, &mut out);
                    consumed = len;
                }
                None => out.push_str("&lt;"),
            },
            '>' => out.push_str("&gt;"),
            '&' => match RE_ENTITY.find(rest) {
                Some(m) => {
                    out.push_str(m.as_str());
                    consumed = m.end();
                }
                None => out.push_str("&amp;"),
            },
            '\r' => {
                if !rest[1..].starts_with('\n') {
                    out.push('\n');
                }
            }
            c if is_stripped(c) => {}
            c => out.push(c),
        }
        rest = &rest[consumed..];
    }

    while let Some(element) = open.pop() {
        out.push_str(element.close_tag());
    }
    out
}

fn parse_tag(input: &str) -> Option<(Tag, usize)> {
    let caps = RE_TAG.captures(input)?;
    let len = caps.get(0)?.end();
    let closing = !caps[1].is_empty();
    let attrs = caps.get(3).map_or("", |m| m.as_str());
    let is_paragraph = caps[2].eq_ignore_ascii_case("p");

    let tag = match (closing, is_paragraph) {
        (false, true) if is_blank(attrs) => Tag::Open(Element::Paragraph),
        (false, false) if RE_HIGHLIGHT_ATTR.is_match(attrs) => Tag::Open(Element::Highlight),
        (true, true) if is_blank(attrs) => Tag::Close(Element::Paragraph),
        (true, false) if is_blank(attrs) => Tag::Close(Element::Highlight),
        _ => return None,
    };
    Some((tag, len))
}

fn apply_tag(tag: Tag, open: &mut Vec<Element>, out: &mut String) {
    match tag {
        Tag::Open(Element::Paragraph) => {
            while let Some(element) = open.pop() {
                out.push_str(element.close_tag());
            }
            out.push_str(OPEN_PARAGRAPH);
            open.push(Element::Paragraph);
        }
        Tag::Open(element) => {
            out.push_str(element.open_tag());
            open.push(element);
        }
        Tag::Close(element) => {
            if !open.contains(&element) {
                return;
            }
            while let Some(top) = open.pop() {
                out.push_str(top.close_tag());
                if top == element {
                    break;
                }
            }
        }
    }
}

fn is_blank(attrs: &str) -> bool {
    attrs.trim().is_empty()
}

fn is_stripped(c: char) -> bool {
    (c.is_control() && c != '\n' && c != '\t')
        || matches!(
            c,
            '\u{200B}' | '\u{FEFF}' | '\u{00AD}' | '\u{200C}' | '\u{200D}' | '\u{2060}'
        )
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const STORY: &str = r#"<p>初めて出会った日、<span class="highlight">ハコスカ</span>は輝いていました。</p>
<p>海沿いの道を走った夏。</p>
<p>ありがとう、<span class="highlight">相棒</span>。</p>"#;

    #[test]
    fn vocabulary_passes_unchanged() {
        assert_eq!(sanitize(STORY), STORY);
    }

    #[test]
    fn sanitize_is_idempotent() {
        let nasty = "<P>a <SPAN class='highlight'>b<p>c</span> & d <script>x</script>\r\n</b>";
        let once = sanitize(nasty);
        assert_eq!(sanitize(&once), once);
    }

    #[test]
    fn script_is_escaped() {
        let out = sanitize("<p>hi<script>alert(1)</script></p>");
        assert_eq!(out, "<p>hi&lt;script&gt;alert(1)&lt;/script&gt;</p>");
    }

    #[test]
    fn attributes_on_paragraph_are_rejected() {
        let out = sanitize(r#"<p onclick="x()">a</p>"#);
        assert!(out.starts_with("&lt;p onclick"));
        assert!(!out.contains("<p "));
    }

    #[test]
    fn other_span_classes_are_rejected() {
        let out = sanitize(r#"<span class="evil">a</span>"#);
        assert_eq!(out, r#"&lt;span class="evil"&gt;a"#);
    }

    #[test]
    fn highlight_tag_is_canonicalised() {
        assert_eq!(
            sanitize("<SPAN CLASS=highlight>k</SPAN>"),
            r#"<span class="highlight">k</span>"#
        );
    }

    #[test]
    fn unclosed_tags_are_closed() {
        assert_eq!(
            sanitize(r#"<p>a<span class="highlight">b"#),
            r#"<p>a<span class="highlight">b</span></p>"#
        );
    }

    #[test]
    fn new_paragraph_closes_open_elements() {
        assert_eq!(
            sanitize(r#"<p>a<span class="highlight">b<p>c</p>"#),
            r#"<p>a<span class="highlight">b</span></p><p>c</p>"#
        );
    }

    #[test]
    fn stray_closers_are_dropped() {
        assert_eq!(sanitize("a</span></p>b"), "ab");
    }

    #[test]
    fn entities_kept_bare_ampersand_escaped() {
        assert_eq!(sanitize("&amp; &#12354; & &x"), "&amp; &#12354; &amp; &amp;x");
    }

    #[test]
    fn control_and_invisible_chars_removed() {
        assert_eq!(sanitize("a\u{0}b\u{200B}c\u{7}d\te"), "abcd\te");
    }

    #[test]
    fn line_endings_normalised() {
        assert_eq!(sanitize("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn fenced_output_is_unwrapped() {
        let raw = format!("```html\n{STORY}\n```\n");
        let story = clean_story(&raw, MarkupPolicy::Sanitize);
        assert_eq!(story.as_str(), STORY);
        assert_eq!(story.paragraph_count(), 3);
    }

    #[test]
    fn unfenced_output_is_trimmed() {
        let story = clean_story(&format!("\n\n{STORY}\n"), MarkupPolicy::Sanitize);
        assert_eq!(story.as_str(), STORY);
    }

    #[test]
    fn trusted_policy_embeds_raw() {
        let raw = "<p><b>bold</b></p>";
        assert_eq!(embed(raw, MarkupPolicy::Trusted).as_str(), raw);
        assert_eq!(
            embed(raw, MarkupPolicy::Sanitize).as_str(),
            "<p>&lt;b&gt;bold&lt;/b&gt;</p>"
        );
    }

    #[test]
    fn escape_text_escapes_markup() {
        assert_eq!(escape_text("<a & 'b'>"), "&lt;a &amp; &#39;b&#39;&gt;");
        assert_eq!(escape_text("ハコスカとの物語"), "ハコスカとの物語");
    }

    #[test]
    fn unescape_reverses_escape() {
        for text in ["<a & 'b'>", "&lt;", "R&D \"GT-R\""] {
            assert_eq!(unescape_text(&escape_text(text)), text);
        }
    }
}
