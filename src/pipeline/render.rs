//! Document rendering: export payload → self-contained HTML → PDF.
//!
//! ## Why spawn_blocking?
//!
//! The rendering engine drives a headless Chrome over a synchronous
//! DevTools connection and can wait a long time for content to load. Running
//! it on Tokio's blocking pool keeps the async workers free to serve other
//! requests while a PDF prints.
//!
//! ## Purity
//!
//! A render is a function of the payload and the stylesheet only. Every call
//! launches a fresh browser with a fresh profile, so no cookies, cache or
//! session from an earlier render can leak into the next one.

use crate::config::{BookConfig, MarkupPolicy, PageFormat};
use crate::error::BookError;
use crate::model::{ExportPayload, RenderedDocument, MAX_IMAGES};
use crate::pipeline::{encode, markup, skeleton};
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Stand-in for "no limit" where the engine insists on a duration.
const UNRESTRICTED_WAIT: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// How the engine lays out the document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrintSettings {
    pub format: PageFormat,
    /// Print CSS backgrounds. Always on for books.
    pub print_background: bool,
    /// Content load timeout. `None` waits without limit.
    pub load_timeout: Option<Duration>,
}

impl PrintSettings {
    pub fn from_config(config: &BookConfig) -> Self {
        Self {
            format: config.page_format,
            print_background: true,
            load_timeout: config.load_timeout_secs.map(Duration::from_secs),
        }
    }

    /// All four page margins, in inches. The book prints full-bleed.
    pub fn margin_inches(&self) -> f64 {
        0.0
    }

    fn wait(&self) -> Duration {
        self.load_timeout.unwrap_or(UNRESTRICTED_WAIT)
    }
}

/// Converts one self-contained HTML document into PDF bytes.
///
/// Implementations block; [`DocumentRenderer`] calls them from
/// `spawn_blocking`.
pub trait PdfEngine: Send + Sync {
    fn print(&self, html: &str, settings: &PrintSettings) -> Result<Vec<u8>, BookError>;
}

/// [`PdfEngine`] backed by headless Chrome/Chromium.
#[derive(Debug, Clone, Default)]
pub struct ChromeEngine {
    chrome_path: Option<PathBuf>,
}

impl ChromeEngine {
    pub fn new(chrome_path: Option<PathBuf>) -> Self {
        Self { chrome_path }
    }
}

impl PdfEngine for ChromeEngine {
    fn print(&self, html: &str, settings: &PrintSettings) -> Result<Vec<u8>, BookError> {
        // Chrome loads the document from disk; multi-megabyte inline photos
        // are too large for a data: navigation.
        let dir = tempfile::tempdir()
            .map_err(|e| BookError::render(format!("tempdir: {e}")))?;
        let page_path = dir.path().join("book.html");
        std::fs::write(&page_path, html)
            .map_err(|e| BookError::render(format!("write document: {e}")))?;
        let url = reqwest::Url::from_file_path(&page_path)
            .map_err(|_| BookError::render("document path is not absolute"))?;

        let wait = settings.wait();
        let launch = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .path(self.chrome_path.clone())
            .idle_browser_timeout(wait)
            .build()
            .map_err(|e| BookError::render(format!("browser options: {e}")))?;

        let browser =
            Browser::new(launch).map_err(|e| BookError::render(format!("launch browser: {e}")))?;
        let tab = browser
            .new_tab()
            .map_err(|e| BookError::render(format!("open tab: {e}")))?;
        tab.set_default_timeout(wait);
        tab.navigate_to(url.as_str())
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| BookError::render(format!("load document: {e}")))?;

        let (width, height) = settings.format.size_inches();
        let margin = settings.margin_inches();
        let options = PrintToPdfOptions {
            print_background: Some(settings.print_background),
            display_header_footer: Some(false),
            paper_width: Some(width),
            paper_height: Some(height),
            margin_top: Some(margin),
            margin_bottom: Some(margin),
            margin_left: Some(margin),
            margin_right: Some(margin),
            prefer_css_page_size: Some(false),
            ..Default::default()
        };
        tab.print_to_pdf(Some(options))
            .map_err(|e| BookError::render(format!("print: {e}")))
    }
}

/// Assembles the export document and hands it to the engine.
///
/// Holds the stylesheet read once at startup; owns nothing per request.
#[derive(Clone)]
pub struct DocumentRenderer {
    stylesheet: Arc<str>,
    engine: Arc<dyn PdfEngine>,
    settings: PrintSettings,
    policy: MarkupPolicy,
}

impl DocumentRenderer {
    pub fn new(
        stylesheet: impl Into<Arc<str>>,
        engine: Arc<dyn PdfEngine>,
        config: &BookConfig,
    ) -> Self {
        Self {
            stylesheet: stylesheet.into(),
            engine,
            settings: PrintSettings::from_config(config),
            policy: config.markup_policy,
        }
    }

    pub fn settings(&self) -> &PrintSettings {
        &self.settings
    }

    /// Build the self-contained document for a payload.
    ///
    /// The story passes through the markup policy again; for a story that came
    /// from the generation endpoint this is a no-op.
    pub fn assemble(&self, payload: &ExportPayload) -> Result<String, BookError> {
        if payload.image_data_urls.len() > MAX_IMAGES {
            return Err(BookError::render(format!(
                "{} photos in payload, at most {} allowed",
                payload.image_data_urls.len(),
                MAX_IMAGES
            )));
        }
        for (i, image) in payload.image_data_urls.iter().enumerate() {
            encode::check_data_url(image)
                .map_err(|detail| BookError::render(format!("photo {}: {}", i + 1, detail)))?;
        }

        let story = markup::embed(payload.story_html.as_str(), self.policy);
        if story != payload.story_html {
            warn!("Story markup outside the allowed vocabulary was escaped");
        }
        let content = skeleton::book_content(
            &payload.title,
            &payload.subtitle,
            &payload.image_data_urls,
            &story,
        );
        Ok(skeleton::standalone_document(&self.stylesheet, &content))
    }

    /// Render a payload to a PDF.
    pub async fn render(&self, payload: &ExportPayload) -> Result<RenderedDocument, BookError> {
        let start = Instant::now();
        let html = self.assemble(payload)?;
        debug!("Assembled export document: {} bytes", html.len());

        let engine = Arc::clone(&self.engine);
        let settings = self.settings;
        let bytes = tokio::task::spawn_blocking(move || engine.print(&html, &settings))
            .await
            .map_err(|e| BookError::render(format!("render task panicked: {e}")))??;

        let document = RenderedDocument {
            bytes,
            format: settings.format,
        };
        if !document.is_pdf() {
            return Err(BookError::render("engine output is not a PDF"));
        }

        info!(
            "Rendered '{}' → {} bytes {:?} in {:?}",
            payload.title,
            document.len(),
            settings.format,
            start.elapsed()
        );
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EncodedImage, NarrativeMarkup};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, PrintSettings)>>,
        output: Vec<u8>,
    }

    impl PdfEngine for Recorder {
        fn print(&self, html: &str, settings: &PrintSettings) -> Result<Vec<u8>, BookError> {
            self.seen.lock().unwrap().push((html.to_string(), *settings));
            Ok(self.output.clone())
        }
    }

    fn renderer(engine: Arc<Recorder>) -> DocumentRenderer {
        DocumentRenderer::new(".memorial-title{color:red}", engine, &BookConfig::default())
    }

    fn payload() -> ExportPayload {
        ExportPayload {
            title: "ハコスカとの物語".into(),
            subtitle: "君と走った道のりは、永遠に".into(),
            story_html: NarrativeMarkup::new(r#"<p>a <span class="highlight">b</span></p>"#),
            image_data_urls: vec![EncodedImage::from_data_url(
                "data:image/png;base64,iVBORw0KGgo=",
            )],
        }
    }

    #[tokio::test]
    async fn render_hands_full_document_to_engine() {
        let engine = Arc::new(Recorder {
            output: b"%PDF-1.7 fake".to_vec(),
            ..Default::default()
        });
        let doc = renderer(Arc::clone(&engine)).render(&payload()).await.unwrap();
        assert!(doc.is_pdf());
        assert_eq!(doc.format, PageFormat::A4);

        let seen = engine.seen.lock().unwrap();
        let (html, settings) = &seen[0];
        assert!(html.contains("<style>.memorial-title{color:red}</style>"));
        assert!(html.contains(
            r#"<div class="memorial-story"><p>a <span class="highlight">b</span></p></div>"#
        ));
        assert!(html.contains("data:image/png;base64,iVBORw0KGgo="));
        assert!(settings.print_background);
        assert_eq!(settings.margin_inches(), 0.0);
        assert!(settings.load_timeout.is_none());
    }

    #[tokio::test]
    async fn non_pdf_output_is_render_failure() {
        let engine = Arc::new(Recorder {
            output: b"<html>".to_vec(),
            ..Default::default()
        });
        let err = renderer(engine).render(&payload()).await.unwrap_err();
        assert!(matches!(err, BookError::RenderFailure { .. }));
    }

    #[test]
    fn too_many_photos_rejected() {
        let mut p = payload();
        p.image_data_urls = vec![p.image_data_urls[0].clone(); MAX_IMAGES + 1];
        let err = renderer(Arc::new(Recorder::default())).assemble(&p).unwrap_err();
        assert!(err.to_string().contains("at most 3"));
    }

    #[test]
    fn malformed_photo_rejected() {
        let mut p = payload();
        p.image_data_urls = vec![EncodedImage::from_data_url("data:image/png;base64,\"><script>")];
        assert!(renderer(Arc::new(Recorder::default())).assemble(&p).is_err());
    }

    #[test]
    fn untrusted_story_is_escaped() {
        let mut p = payload();
        p.story_html = NarrativeMarkup::new("<p><img src=x onerror=alert(1)></p>");
        let html = renderer(Arc::new(Recorder::default())).assemble(&p).unwrap();
        assert!(html.contains("&lt;img src=x onerror=alert(1)&gt;"));
    }

    #[test]
    fn zero_photos_has_no_gallery() {
        let mut p = payload();
        p.image_data_urls.clear();
        let html = renderer(Arc::new(Recorder::default())).assemble(&p).unwrap();
        assert!(!html.contains(skeleton::GALLERY_ID));
    }

    #[tokio::test]
    async fn engine_error_surfaces() {
        struct Broken;
        impl PdfEngine for Broken {
            fn print(&self, _: &str, _: &PrintSettings) -> Result<Vec<u8>, BookError> {
                Err(BookError::render("chrome not found"))
            }
        }
        let r = DocumentRenderer::new("", Arc::new(Broken), &BookConfig::default());
        let err = r.render(&payload()).await.unwrap_err();
        assert!(err.to_string().contains("chrome not found"));
    }
}
