//! Configuration for the memorial-book service.
//!
//! Every knob lives in [`BookConfig`], built via its [`BookConfigBuilder`].
//! One struct is cloned into the server state, logged at startup, and handed
//! to the generator and renderer, so both endpoints always agree on page
//! format, markup policy and file naming.

use crate::error::BookError;
use crate::model::{DOWNLOAD_FILE_NAME, SUBTITLE};
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration for the memorial-book server and its pipeline stages.
///
/// # Example
/// ```rust
/// use memorial_book::{BookConfig, PageFormat};
///
/// let config = BookConfig::builder()
///     .page_format(PageFormat::A4)
///     .model("gemini-1.5-flash")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct BookConfig {
    /// Listen address of the HTTP server. Default: `127.0.0.1:3000`.
    pub addr: SocketAddr,

    /// Directory served as static assets. Default: `static`.
    pub static_dir: PathBuf,

    /// Stylesheet shared by the on-screen book and the PDF.
    /// Read once at startup. Default: `static/style.css`.
    pub stylesheet: PathBuf,

    /// Subtitle printed under every title.
    pub subtitle: String,

    /// File name offered for the exported PDF.
    pub download_file_name: String,

    /// Paper size of the rendered document. Default: [`PageFormat::A4`].
    pub page_format: PageFormat,

    /// How generated markup is embedded. Default: [`MarkupPolicy::Sanitize`].
    pub markup_policy: MarkupPolicy,

    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai").
    /// If None along with `provider`, the provider is detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for story generation. Default: 0.8.
    ///
    /// A story should read warm rather than literal; values near zero make
    /// every book sound alike.
    pub temperature: f32,

    /// Maximum tokens per generated story. Default: 2048.
    pub max_tokens: usize,

    /// Per-request generation timeout in seconds. Default: 120.
    pub generation_timeout_secs: u64,

    /// Maximum accepted request body. Default: 50 MiB, enough for three
    /// inlined photos straight off a phone camera.
    pub body_limit_bytes: usize,

    /// Chrome/Chromium executable. If None, the engine searches the usual places.
    pub chrome_path: Option<PathBuf>,

    /// Content load timeout of the rendering engine in seconds.
    /// `None` waits without limit. Default: None.
    pub load_timeout_secs: Option<u64>,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            static_dir: PathBuf::from("static"),
            stylesheet: PathBuf::from("static/style.css"),
            subtitle: SUBTITLE.to_string(),
            download_file_name: DOWNLOAD_FILE_NAME.to_string(),
            page_format: PageFormat::default(),
            markup_policy: MarkupPolicy::default(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.8,
            max_tokens: 2048,
            generation_timeout_secs: 120,
            body_limit_bytes: 50 * 1024 * 1024,
            chrome_path: None,
            load_timeout_secs: None,
        }
    }
}

impl fmt::Debug for BookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BookConfig")
            .field("addr", &self.addr)
            .field("static_dir", &self.static_dir)
            .field("stylesheet", &self.stylesheet)
            .field("page_format", &self.page_format)
            .field("markup_policy", &self.markup_policy)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("body_limit_bytes", &self.body_limit_bytes)
            .field("chrome_path", &self.chrome_path)
            .field("load_timeout_secs", &self.load_timeout_secs)
            .finish()
    }
}

impl BookConfig {
    /// Create a new builder for `BookConfig`.
    pub fn builder() -> BookConfigBuilder {
        BookConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read the shared stylesheet from disk.
    pub fn load_stylesheet(&self) -> Result<String, BookError> {
        std::fs::read_to_string(&self.stylesheet).map_err(|e| {
            BookError::InvalidConfig(format!(
                "cannot read stylesheet '{}': {}",
                self.stylesheet.display(),
                e
            ))
        })
    }
}

/// Builder for [`BookConfig`].
#[derive(Debug)]
pub struct BookConfigBuilder {
    config: BookConfig,
}

impl BookConfigBuilder {
    pub fn addr(mut self, addr: SocketAddr) -> Self {
        self.config.addr = addr;
        self
    }

    /// Set the static directory. The stylesheet moves along to
    /// `<dir>/style.css` unless [`Self::stylesheet`] is called afterwards.
    pub fn static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.config.stylesheet = dir.join("style.css");
        self.config.static_dir = dir;
        self
    }

    pub fn stylesheet(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.stylesheet = path.into();
        self
    }

    pub fn subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.config.subtitle = subtitle.into();
        self
    }

    pub fn download_file_name(mut self, name: impl Into<String>) -> Self {
        self.config.download_file_name = name.into();
        self
    }

    pub fn page_format(mut self, format: PageFormat) -> Self {
        self.config.page_format = format;
        self
    }

    pub fn markup_policy(mut self, policy: MarkupPolicy) -> Self {
        self.config.markup_policy = policy;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn generation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.generation_timeout_secs = secs;
        self
    }

    pub fn body_limit_bytes(mut self, bytes: usize) -> Self {
        self.config.body_limit_bytes = bytes;
        self
    }

    pub fn chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    pub fn load_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.load_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BookConfig, BookError> {
        let c = &self.config;
        if c.download_file_name.trim().is_empty() {
            return Err(BookError::InvalidConfig(
                "download file name must not be empty".into(),
            ));
        }
        if c.body_limit_bytes < 1024 * 1024 {
            return Err(BookError::InvalidConfig(format!(
                "body limit must be at least 1 MiB to carry inlined photos, got {}",
                c.body_limit_bytes
            )));
        }
        if c.max_tokens == 0 {
            return Err(BookError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.generation_timeout_secs == 0 {
            return Err(BookError::InvalidConfig(
                "generation timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Paper size of the rendered document. Margins are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageFormat {
    /// ISO A4, 210 × 297 mm. (default)
    #[default]
    A4,
    /// ISO A5, 148 × 210 mm.
    A5,
    /// US Letter, 8.5 × 11 in.
    Letter,
}

impl PageFormat {
    /// Paper `(width, height)` in inches, as the print engine expects them.
    pub fn size_inches(self) -> (f64, f64) {
        match self {
            PageFormat::A4 => (8.27, 11.7),
            PageFormat::A5 => (5.83, 8.27),
            PageFormat::Letter => (8.5, 11.0),
        }
    }
}

impl FromStr for PageFormat {
    type Err = BookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "a4" => Ok(PageFormat::A4),
            "a5" => Ok(PageFormat::A5),
            "letter" => Ok(PageFormat::Letter),
            other => Err(BookError::InvalidConfig(format!(
                "unknown page format '{other}' (expected a4, a5 or letter)"
            ))),
        }
    }
}

/// How narrative markup from the generation service is embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MarkupPolicy {
    /// Allow only paragraphs and highlight spans; escape everything else. (default)
    #[default]
    Sanitize,
    /// Embed the markup exactly as generated. The generation service is
    /// trusted to emit only the paragraph/highlight vocabulary.
    Trusted,
}
