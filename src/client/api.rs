//! HTTP exchange with the two server endpoints.

use crate::error::BookError;
use crate::model::{ExportPayload, GenerateResponse, NarrativeMarkup, Questionnaire};
use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;
use tracing::{debug, info};

/// The two requests a book session makes.
#[async_trait]
pub trait BookApi: Send + Sync {
    /// `POST /generate-story`. Any non-success outcome is a
    /// [`BookError::GenerationFailure`].
    async fn generate_story(&self, questionnaire: &Questionnaire)
        -> Result<NarrativeMarkup, BookError>;

    /// `POST /download-pdf`. Any non-success outcome is a
    /// [`BookError::RenderFailure`].
    async fn download_pdf(&self, payload: &ExportPayload) -> Result<Vec<u8>, BookError>;
}

/// [`BookApi`] over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpBookApi {
    client: reqwest::Client,
    generate_url: Url,
    download_url: Url,
}

impl HttpBookApi {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:3000`.
    ///
    /// `timeout_secs` bounds each request; `None` waits as long as the
    /// server takes, which matches a render with no load limit.
    pub fn new(base_url: &str, timeout_secs: Option<u64>) -> Result<Self, BookError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| BookError::InvalidConfig(format!("server URL '{base_url}': {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let join = |endpoint: &str| {
            base.join(endpoint)
                .map_err(|e| BookError::InvalidConfig(format!("server URL '{base_url}': {e}")))
        };

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| BookError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            generate_url: join("generate-story")?,
            download_url: join("download-pdf")?,
        })
    }
}

#[async_trait]
impl BookApi for HttpBookApi {
    async fn generate_story(
        &self,
        questionnaire: &Questionnaire,
    ) -> Result<NarrativeMarkup, BookError> {
        info!("POST {}", self.generate_url);
        let response = self
            .client
            .post(self.generate_url.clone())
            .json(questionnaire)
            .send()
            .await
            .map_err(|e| BookError::generation(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BookError::generation(format!("HTTP {}", response.status())));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BookError::generation(format!("malformed response: {e}")))?;
        debug!("Story received: {} bytes", body.story.as_str().len());
        Ok(body.story)
    }

    async fn download_pdf(&self, payload: &ExportPayload) -> Result<Vec<u8>, BookError> {
        info!(
            "POST {} ({} photos)",
            self.download_url,
            payload.image_data_urls.len()
        );
        let response = self
            .client
            .post(self.download_url.clone())
            .json(payload)
            .send()
            .await
            .map_err(|e| BookError::render(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BookError::render(format!("HTTP {status}: {message}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BookError::render(e.to_string()))?;
        debug!("Document received: {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }
}
