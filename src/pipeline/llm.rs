//! Story generation: questionnaire in, narrative markup out.
//!
//! The exchange is thin on purpose. Prompt wording lives in
//! [`crate::prompts`], and markup cleanup lives in [`crate::pipeline::markup`].
//! What remains here is provider selection, one bounded call, and turning
//! any failure into [`BookError::GenerationFailure`].
//!
//! There is no retry loop. A failed generation is terminal for that
//! submission and the user re-submits the form.

use crate::config::{BookConfig, MarkupPolicy};
use crate::error::BookError;
use crate::model::{NarrativeMarkup, Questionnaire};
use crate::pipeline::markup;
use crate::prompts::{story_request, STORY_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default model when the provider is picked from `GEMINI_API_KEY`.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Produces raw story markup for a questionnaire.
///
/// The HTTP layer only sees this trait, so tests and alternative backends
/// can stand in for the LLM.
#[async_trait]
pub trait StoryGenerator: Send + Sync {
    async fn generate(&self, questionnaire: &Questionnaire) -> Result<String, BookError>;
}

/// [`StoryGenerator`] backed by an `edgequake-llm` provider.
pub struct LlmStoryGenerator {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    timeout: Duration,
}

impl LlmStoryGenerator {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &BookConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            timeout: Duration::from_secs(config.generation_timeout_secs),
        }
    }

    /// Resolve the provider from the config and environment.
    pub fn from_config(config: &BookConfig) -> Result<Self, BookError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }
}

#[async_trait]
impl StoryGenerator for LlmStoryGenerator {
    async fn generate(&self, questionnaire: &Questionnaire) -> Result<String, BookError> {
        let messages = vec![
            ChatMessage::system(STORY_SYSTEM_PROMPT),
            ChatMessage::user(story_request(questionnaire)),
        ];

        let call = self.provider.chat(&messages, Some(&self.options));
        let response = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                BookError::generation(format!("timed out after {}s", self.timeout.as_secs()))
            })?
            .map_err(|e| BookError::generation(e.to_string()))?;

        debug!(
            "Story: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

/// Generate a story and bring it into the shape served to clients.
pub async fn generate_story(
    generator: &dyn StoryGenerator,
    questionnaire: &Questionnaire,
    policy: MarkupPolicy,
) -> Result<NarrativeMarkup, BookError> {
    let start = Instant::now();
    info!("Generating story for '{}'", questionnaire.vehicle_name);

    let raw = generator.generate(questionnaire).await.inspect_err(|e| {
        warn!("Story generation failed: {}", e);
    })?;

    let story = markup::clean_story(&raw, policy);
    if story.as_str().trim().is_empty() {
        warn!("Generation service returned an empty story");
        return Err(BookError::generation("empty story"));
    }

    info!(
        "Story ready: {} paragraphs, {} bytes, {:?}",
        story.paragraph_count(),
        story.as_str().len(),
        start.elapsed()
    );
    Ok(story)
}

/// Build `CompletionOptions` from the config.
fn build_options(config: &BookConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, BookError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        BookError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model`.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 4. **Gemini** when `GEMINI_API_KEY` is set.
/// 5. **Full auto-detection** via `ProviderFactory::from_env`.
pub fn resolve_provider(config: &BookConfig) -> Result<Arc<dyn LLMProvider>, BookError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
            return create_provider("gemini", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| BookError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY (or OPENAI_API_KEY, ANTHROPIC_API_KEY).\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
