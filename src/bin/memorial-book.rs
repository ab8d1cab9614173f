//! CLI binary for memorial-book.
//!
//! A thin shim over the library crate: `serve` runs the HTTP server,
//! `render` prints an export payload offline, and `make` drives the whole
//! browser flow against a running server.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use memorial_book::client::api::HttpBookApi;
use memorial_book::client::assemble::DisplayedBook;
use memorial_book::client::download::DirectoryDownloads;
use memorial_book::pipeline::encode::ImageSource;
use memorial_book::{
    server, BookConfig, BookSession, ChromeEngine, DocumentRenderer, ExportPayload, Frontend,
    MarkupPolicy, PageFormat, Preview, Questionnaire, Trigger, TriggerState,
};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

// ── Terminal frontend for `make` ─────────────────────────────────────────────

/// Presents a book session in the terminal: a spinner while a trigger is
/// busy, alerts and warnings as coloured lines.
struct TerminalFrontend {
    spinner: Mutex<Option<(ProgressBar, Instant)>>,
    quiet: bool,
}

impl TerminalFrontend {
    fn new(quiet: bool) -> Arc<Self> {
        Arc::new(Self {
            spinner: Mutex::new(None),
            quiet,
        })
    }

    fn println(&self, line: String) {
        let spinner = self.spinner.lock().unwrap_or_else(PoisonError::into_inner);
        match spinner.as_ref() {
            Some((bar, _)) => bar.println(line),
            None => eprintln!("{line}"),
        }
    }
}

impl Frontend for TerminalFrontend {
    fn alert(&self, message: &str) {
        self.println(format!("{} {}", red("✘"), message));
    }

    fn warn(&self, message: &str) {
        self.println(format!("{} {}", yellow("⚠"), message));
    }

    fn preview_changed(&self, preview: &Preview) {
        if self.quiet {
            return;
        }
        match preview {
            Preview::Placeholder(text) => self.println(dim(text)),
            Preview::Photos(names) => {
                for name in names {
                    self.println(format!("  {} {}", dim("▣"), name));
                }
            }
        }
    }

    fn trigger_changed(&self, _trigger: Trigger, state: TriggerState) {
        let mut spinner = self.spinner.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.enabled {
            if self.quiet {
                return;
            }
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner:.cyan} {msg}  {elapsed:.dim}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
            );
            bar.set_message(state.label);
            bar.enable_steady_tick(Duration::from_millis(80));
            *spinner = Some((bar, Instant::now()));
        } else if let Some((bar, started)) = spinner.take() {
            bar.finish_and_clear();
            eprintln!("{}", dim(&format!("  {:.1}s", started.elapsed().as_secs_f64())));
        }
    }

    fn book_displayed(&self, book: &DisplayedBook) {
        if self.quiet {
            return;
        }
        let title = book.title().unwrap_or_default();
        self.println(format!(
            "{} {}  {}",
            green("✔"),
            bold(&title),
            dim(&format!("{} photos", book.photo_count()))
        ));
    }
}

// ── CLI definition ───────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the server on the default address (127.0.0.1:3000)
  memorial-book serve

  # Serve a custom static directory, US Letter paper
  memorial-book serve --static-dir ./public --page-format letter

  # Render an export payload offline
  memorial-book render payload.json -o book.pdf

  # Whole flow against a running server: questionnaire + up to 3 photos
  memorial-book make answers.json --photo front.jpg --photo side.jpg

QUESTIONNAIRE FILE (make):
  {
    "carName": "スカイライン・ハコスカ",
    "carNickname": "",
    "firstMemory": "…",
    "memorableDrive": "…",
    "favoriteSong": "",
    "finalWords": "…"
  }

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (preferred provider)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  MEMORIAL_*              Any flag below, e.g. MEMORIAL_ADDR, MEMORIAL_CHROME

  A .env file in the working directory is loaded at startup.
"#;

/// Turn a questionnaire about a retired car into a memorial book PDF.
#[derive(Parser, Debug)]
#[command(
    name = "memorial-book",
    version,
    about = "Turn a questionnaire about a retired car into a memorial book PDF",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "MEMORIAL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "MEMORIAL_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server.
    Serve(ServeArgs),
    /// Render an export payload (JSON) to a PDF file.
    Render(RenderArgs),
    /// Generate and export a book through a running server.
    Make(MakeArgs),
}

#[derive(Args, Debug)]
struct EngineArgs {
    /// Stylesheet shared by page and PDF. Default: <static-dir>/style.css.
    #[arg(long, env = "MEMORIAL_STYLESHEET")]
    stylesheet: Option<PathBuf>,

    /// Paper size of the PDF.
    #[arg(long, env = "MEMORIAL_PAGE_FORMAT", value_enum, default_value = "a4")]
    page_format: PageFormatArg,

    /// Embed story markup as generated instead of allow-listing it.
    #[arg(long, env = "MEMORIAL_TRUSTED_MARKUP")]
    trusted_markup: bool,

    /// Chrome/Chromium executable. Searched for when not set.
    #[arg(long, env = "MEMORIAL_CHROME")]
    chrome: Option<PathBuf>,

    /// Content load timeout in seconds. Unlimited when not set.
    #[arg(long, env = "MEMORIAL_LOAD_TIMEOUT")]
    load_timeout: Option<u64>,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Listen address.
    #[arg(long, env = "MEMORIAL_ADDR", default_value = "127.0.0.1:3000")]
    addr: SocketAddr,

    /// Directory served as static assets.
    #[arg(long, env = "MEMORIAL_STATIC_DIR", default_value = "static")]
    static_dir: PathBuf,

    #[command(flatten)]
    engine: EngineArgs,

    /// LLM model ID (e.g. gemini-1.5-flash, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "MEMORIAL_TEMPERATURE", default_value_t = 0.8)]
    temperature: f32,

    /// Max LLM output tokens per story.
    #[arg(long, env = "MEMORIAL_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// Story generation timeout in seconds.
    #[arg(long, env = "MEMORIAL_GENERATION_TIMEOUT", default_value_t = 120)]
    generation_timeout: u64,

    /// Maximum request body in MiB.
    #[arg(long, env = "MEMORIAL_BODY_LIMIT_MB", default_value_t = 50)]
    body_limit_mb: usize,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Export payload: { title, subtitle, storyHtml, imageDataUrls }.
    payload: PathBuf,

    /// Output PDF. Default: the fixed download name in the current directory.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Args, Debug)]
struct MakeArgs {
    /// Questionnaire JSON file.
    questionnaire: PathBuf,

    /// Photo to attach; repeat up to three times.
    #[arg(short, long = "photo")]
    photos: Vec<PathBuf>,

    /// Server root URL.
    #[arg(long, env = "MEMORIAL_SERVER", default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Directory the PDF is saved into.
    #[arg(long, env = "MEMORIAL_OUT_DIR", default_value = ".")]
    out_dir: PathBuf,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PageFormatArg {
    A4,
    A5,
    Letter,
}

impl From<PageFormatArg> for PageFormat {
    fn from(v: PageFormatArg) -> Self {
        match v {
            PageFormatArg::A4 => PageFormat::A4,
            PageFormatArg::A5 => PageFormat::A5,
            PageFormatArg::Letter => PageFormat::Letter,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // `make` shows a spinner; library INFO lines would tear it.
    let interactive = matches!(cli.command, Command::Make(_)) && !cli.quiet;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || interactive {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Render(args) => render(args, cli.quiet).await,
        Command::Make(args) => make(args, cli.quiet).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let mut builder = BookConfig::builder()
        .addr(args.addr)
        .static_dir(&args.static_dir)
        .temperature(args.temperature)
        .max_tokens(args.max_tokens)
        .generation_timeout_secs(args.generation_timeout)
        .body_limit_bytes(args.body_limit_mb.saturating_mul(1024 * 1024));
    builder = apply_engine_args(builder, &args.engine);
    if let Some(model) = args.model {
        builder = builder.model(model);
    }
    if let Some(provider) = args.provider {
        builder = builder.provider_name(provider);
    }

    let config = builder.build().context("Invalid configuration")?;
    server::serve(config).await.context("Server failed")
}

async fn render(args: RenderArgs, quiet: bool) -> Result<()> {
    let config = apply_engine_args(BookConfig::builder(), &args.engine)
        .build()
        .context("Invalid configuration")?;

    let text = tokio::fs::read_to_string(&args.payload)
        .await
        .with_context(|| format!("Failed to read payload from {:?}", args.payload))?;
    let payload: ExportPayload =
        serde_json::from_str(&text).context("Payload is not a valid export request")?;

    let stylesheet = config.load_stylesheet().context("Failed to load stylesheet")?;
    let engine = Arc::new(ChromeEngine::new(config.chrome_path.clone()));
    let renderer = DocumentRenderer::new(stylesheet, engine, &config);

    let start = Instant::now();
    let document = renderer.render(&payload).await.context("Rendering failed")?;

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(&config.download_file_name));
    write_atomic(&output, &document.bytes).await?;

    if !quiet {
        eprintln!(
            "{}  {} bytes  {}ms  →  {}",
            green("✔"),
            document.len(),
            start.elapsed().as_millis(),
            bold(&output.display().to_string()),
        );
    }
    Ok(())
}

async fn make(args: MakeArgs, quiet: bool) -> Result<()> {
    let text = tokio::fs::read_to_string(&args.questionnaire)
        .await
        .with_context(|| format!("Failed to read questionnaire from {:?}", args.questionnaire))?;
    let questionnaire: Questionnaire =
        serde_json::from_str(&text).context("Questionnaire is not valid JSON")?;

    let config = BookConfig::default();
    let api = Arc::new(HttpBookApi::new(&args.server, None).context("Invalid server URL")?);
    let downloads = Arc::new(DirectoryDownloads::new(&args.out_dir));
    let session = BookSession::new(api, downloads, TerminalFrontend::new(quiet), &config);

    session.choose_photos(args.photos.into_iter().map(ImageSource::from).collect());
    session
        .submit(questionnaire)
        .await
        .context("Story generation failed")?;
    let path = session.export().await.context("PDF export failed")?;

    if !quiet {
        eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
    }
    Ok(())
}

fn apply_engine_args(
    mut builder: memorial_book::BookConfigBuilder,
    args: &EngineArgs,
) -> memorial_book::BookConfigBuilder {
    builder = builder
        .page_format(args.page_format.into())
        .load_timeout_secs(args.load_timeout);
    if args.trusted_markup {
        builder = builder.markup_policy(MarkupPolicy::Trusted);
    }
    if let Some(ref path) = args.stylesheet {
        builder = builder.stylesheet(path);
    }
    if let Some(ref path) = args.chrome {
        builder = builder.chrome_path(path);
    }
    builder
}

/// Write via a temp file and rename so a failed run never leaves half a PDF.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    let tmp_path = path.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, bytes)
        .await
        .with_context(|| format!("Failed to write {:?}", tmp_path))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to move output into {:?}", path))?;
    Ok(())
}
