//! HTTP surface: the two book endpoints plus static assets.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `POST /generate-story` | questionnaire → `{ story }` |
//! | `POST /download-pdf`   | export payload → `application/pdf` attachment |
//! | `GET /healthz`         | liveness |
//! | anything else          | files under the static directory |
//!
//! The server keeps nothing between requests. [`AppState`] holds only what
//! is fixed at startup: config, stylesheet, and the two collaborators.

use crate::config::BookConfig;
use crate::error::BookError;
use crate::model::{
    ExportPayload, GenerateErrorBody, GenerateResponse, Questionnaire, PDF_CONTENT_TYPE,
};
use crate::pipeline::llm::{self, LlmStoryGenerator, StoryGenerator};
use crate::pipeline::render::{ChromeEngine, DocumentRenderer};
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Body of a failed `/generate-story` response.
pub const GENERATION_ERROR_MESSAGE: &str = "AIによる物語の生成に失敗しました。";

/// Body of a failed `/download-pdf` response.
pub const RENDER_ERROR_MESSAGE: &str = "PDFの生成に失敗しました。";

/// Characters left unescaped in the download name, as `encodeURIComponent`
/// does.
const FILENAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: BookConfig,
    pub generator: Arc<dyn StoryGenerator>,
    pub renderer: DocumentRenderer,
}

impl AppState {
    /// Resolve the LLM provider, read the stylesheet and set up Chrome.
    pub fn from_config(config: BookConfig) -> Result<Self, BookError> {
        let generator = Arc::new(LlmStoryGenerator::from_config(&config)?);
        let stylesheet = config.load_stylesheet()?;
        let engine = Arc::new(ChromeEngine::new(config.chrome_path.clone()));
        let renderer = DocumentRenderer::new(stylesheet, engine, &config);
        Ok(Self {
            config,
            generator,
            renderer,
        })
    }
}

/// Run the server until Ctrl-C or SIGTERM.
pub async fn serve(config: BookConfig) -> Result<(), BookError> {
    let addr = config.addr;
    let state = Arc::new(AppState::from_config(config)?);
    info!(
        %addr,
        static_dir = %state.config.static_dir.display(),
        format = ?state.config.page_format,
        policy = ?state.config.markup_policy,
        "Binding HTTP listener"
    );

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| BookError::Internal(format!("bind {addr}: {e}")))?;
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| BookError::Internal(format!("server: {e}")))?;
    info!("HTTP server exited");
    Ok(())
}

pub fn build_router(state: SharedState) -> Router {
    let assets = ServeDir::new(&state.config.static_dir);
    let body_limit = state.config.body_limit_bytes;
    Router::new()
        .route("/generate-story", post(generate_story))
        .route("/download-pdf", post(download_pdf))
        .route("/healthz", get(health))
        .fallback_service(assets)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApiError {
    Generation,
    Render,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Generation => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(GenerateErrorBody {
                    error: GENERATION_ERROR_MESSAGE.to_string(),
                }),
            )
                .into_response(),
            ApiError::Render => (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                RENDER_ERROR_MESSAGE,
            )
                .into_response(),
        }
    }
}

/// `Content-Disposition` forcing a download under `file_name`.
pub fn content_disposition(file_name: &str) -> String {
    format!(
        "attachment; filename*=UTF-8''{}",
        utf8_percent_encode(file_name, FILENAME_ENCODE_SET)
    )
}

async fn health() -> &'static str {
    "ok"
}

async fn generate_story(
    State(state): State<SharedState>,
    body: Result<Json<Questionnaire>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(questionnaire) = body.map_err(|e| {
        error!("Unreadable questionnaire: {}", e.body_text());
        ApiError::Generation
    })?;
    let story = llm::generate_story(
        state.generator.as_ref(),
        &questionnaire,
        state.config.markup_policy,
    )
    .await
    .map_err(|e| {
        error!("Story generation failed: {}", e);
        ApiError::Generation
    })?;
    Ok(Json(GenerateResponse { story }))
}

async fn download_pdf(
    State(state): State<SharedState>,
    body: Result<Json<ExportPayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = body.map_err(|e| {
        error!("Unreadable export payload: {}", e.body_text());
        ApiError::Render
    })?;
    let document = state.renderer.render(&payload).await.map_err(|e| {
        error!("PDF rendering failed: {}", e);
        ApiError::Render
    })?;

    let disposition = HeaderValue::from_str(&content_disposition(&state.config.download_file_name))
        .map_err(|e| {
            error!("Download name not usable as a header: {}", e);
            ApiError::Render
        })?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(PDF_CONTENT_TYPE)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        document.bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DOWNLOAD_FILE_NAME;
    use crate::pipeline::render::{PdfEngine, PrintSettings};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    struct Canned(Option<&'static str>);

    #[async_trait]
    impl StoryGenerator for Canned {
        async fn generate(&self, _q: &Questionnaire) -> Result<String, BookError> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| BookError::generation("quota exceeded"))
        }
    }

    struct Printer(bool);

    impl PdfEngine for Printer {
        fn print(&self, _html: &str, _settings: &PrintSettings) -> Result<Vec<u8>, BookError> {
            if self.0 {
                Ok(b"%PDF-1.7\n%%EOF".to_vec())
            } else {
                Err(BookError::render("browser crashed"))
            }
        }
    }

    fn router(story: Option<&'static str>, prints: bool) -> Router {
        let config = BookConfig::default();
        let renderer = DocumentRenderer::new("", Arc::new(Printer(prints)), &config);
        build_router(Arc::new(AppState {
            config,
            generator: Arc::new(Canned(story)),
            renderer,
        }))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn questionnaire() -> serde_json::Value {
        serde_json::json!({
            "carName": "スカイライン・ハコスカ",
            "carNickname": "",
            "firstMemory": "a",
            "memorableDrive": "b",
            "favoriteSong": "",
            "finalWords": "c"
        })
    }

    fn payload() -> serde_json::Value {
        serde_json::json!({
            "title": "ハコスカとの物語",
            "subtitle": "君と走った道のりは、永遠に",
            "storyHtml": "<p>a</p>",
            "imageDataUrls": ["data:image/png;base64,iVBORw0KGgo="]
        })
    }

    #[test]
    fn disposition_encodes_like_encode_uri_component() {
        assert_eq!(
            content_disposition(DOWNLOAD_FILE_NAME),
            "attachment; filename*=UTF-8''%E6%84%9B%E8%BB%8A%E3%83%A1%E3%83%A2%E3%83%AA%E3%82%A2%E3%83%AB%E3%83%96%E3%83%83%E3%82%AF.pdf"
        );
        assert_eq!(
            content_disposition("a b(1)!.pdf"),
            "attachment; filename*=UTF-8''a%20b(1)!.pdf"
        );
    }

    #[tokio::test]
    async fn generate_returns_story() {
        let app = router(Some("```html\n<p>x</p>\n```"), true);
        let res = app.oneshot(post_json("/generate-story", questionnaire())).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let parsed: GenerateResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.story.as_str(), "<p>x</p>");
    }

    #[tokio::test]
    async fn generate_failure_is_500_json() {
        let app = router(None, true);
        let res = app.oneshot(post_json("/generate-story", questionnaire())).await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let parsed: GenerateErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.error, GENERATION_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn download_returns_pdf_attachment() {
        let app = router(Some("<p>x</p>"), true);
        let res = app.oneshot(post_json("/download-pdf", payload())).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            res.headers()[header::CONTENT_DISPOSITION].to_str().unwrap(),
            content_disposition(DOWNLOAD_FILE_NAME)
        );
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert!(body.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn render_failure_is_500_text() {
        let app = router(Some("<p>x</p>"), false);
        let res = app.oneshot(post_json("/download-pdf", payload())).await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(res.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(std::str::from_utf8(&body).unwrap(), RENDER_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn too_many_photos_is_render_failure() {
        let mut body = payload();
        body["imageDataUrls"] = serde_json::json!([
            "data:image/png;base64,iVBORw0KGgo=",
            "data:image/png;base64,iVBORw0KGgo=",
            "data:image/png;base64,iVBORw0KGgo=",
            "data:image/png;base64,iVBORw0KGgo="
        ]);
        let res = router(None, true)
            .oneshot(post_json("/download-pdf", body))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    async fn assert_render_failure(res: Response) {
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(std::str::from_utf8(&body).unwrap(), RENDER_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn null_story_is_render_failure() {
        let mut body = payload();
        body["storyHtml"] = serde_json::Value::Null;
        let res = router(None, true)
            .oneshot(post_json("/download-pdf", body))
            .await
            .unwrap();
        assert_render_failure(res).await;
    }

    #[tokio::test]
    async fn unparseable_payload_is_render_failure() {
        let req = Request::post("/download-pdf")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("not json"))
            .unwrap();
        assert_render_failure(router(None, true).oneshot(req).await.unwrap()).await;

        let req = Request::post("/download-pdf")
            .body(Body::from(payload().to_string()))
            .unwrap();
        assert_render_failure(router(None, true).oneshot(req).await.unwrap()).await;
    }

    #[tokio::test]
    async fn sparse_questionnaire_still_generates() {
        let res = router(Some("<p>x</p>"), true)
            .oneshot(post_json("/generate-story", serde_json::json!({ "carName": "x" })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unparseable_questionnaire_is_generation_failure() {
        let req = Request::post("/generate-story")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("not json"))
            .unwrap();
        let res = router(Some("<p>x</p>"), true).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let parsed: GenerateErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.error, GENERATION_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn healthz() {
        let res = router(None, true)
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn large_payload_within_limit_is_accepted() {
        let mut body = payload();
        let big = format!("data:image/png;base64,{}", "A".repeat(8 * 1024 * 1024));
        body["imageDataUrls"] = serde_json::json!([big]);
        let res = router(None, true)
            .oneshot(post_json("/download-pdf", body))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
