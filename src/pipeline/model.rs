//! Model backends: the seam between the pipeline and a multimodal API.
//!
//! The extractor and translator only know [`VisionModel`]. Two backends
//! implement it:
//!
//! * [`ProviderModel`]: any `edgequake-llm` provider (OpenAI, Anthropic,
//!   Gemini, Ollama, …), selected by name or auto-detected from API keys.
//! * [`ChatCompletionsModel`]: a direct client for an OpenAI-compatible
//!   `/v1/chat/completions` URL, for self-hosted or proxy servers.
//!
//! [`resolve_backend`] turns a [`ConversionConfig`] into a [`Backend`].

use crate::config::ConversionConfig;
use crate::error::{DatasheetError, ModelError};
use crate::pipeline::encode::EncodedImage;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::future::Future;
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

pub use crate::pipeline::chat_api::ChatCompletionsModel;

/// One model call: system prompt, optional prior-page context, the user
/// instruction, and an optional image.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    /// Context block sent before the instruction (already wrapped).
    pub context: Option<String>,
    pub instruction: String,
    pub image: Option<EncodedImage>,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Text and token usage returned by a model call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// A multimodal model that answers one request at a time.
///
/// Implemented by the real backends and by scripted models in tests.
pub trait VisionModel: Send + Sync {
    /// Short label for logs ("openai/gpt-4o", "http://localhost:8080/…").
    fn describe(&self) -> String;

    fn complete(
        &self,
        request: &ModelRequest,
    ) -> impl Future<Output = Result<ModelReply, ModelError>> + Send;
}

impl<M: VisionModel> VisionModel for &M {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn complete(
        &self,
        request: &ModelRequest,
    ) -> impl Future<Output = Result<ModelReply, ModelError>> + Send {
        (**self).complete(request)
    }
}

impl<M: VisionModel> VisionModel for Arc<M> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn complete(
        &self,
        request: &ModelRequest,
    ) -> impl Future<Output = Result<ModelReply, ModelError>> + Send {
        (**self).complete(request)
    }
}

/// Call `model` with a per-call timeout, retrying transient failures with
/// exponential backoff (`retry_backoff_ms * 2^(attempt-1)`).
///
/// Returns the final outcome and the number of failed attempts before it.
pub async fn complete_with_retry<M: VisionModel>(
    model: &M,
    request: &ModelRequest,
    max_retries: u32,
    retry_backoff_ms: u64,
    timeout_secs: u64,
    label: &str,
) -> (Result<ModelReply, ModelError>, u32) {
    let mut attempt: u32 = 0;
    loop {
        if attempt > 0 {
            let backoff = retry_backoff_ms.saturating_mul(2u64.saturating_pow(attempt - 1));
            warn!(
                "{}: retry {}/{} after {}ms",
                label, attempt, max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let outcome = match timeout(Duration::from_secs(timeout_secs), model.complete(request)).await
        {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout { secs: timeout_secs }),
        };

        match outcome {
            Ok(reply) => {
                debug!(
                    "{}: {} input tokens, {} output tokens",
                    label, reply.input_tokens, reply.output_tokens
                );
                return (Ok(reply), attempt);
            }
            Err(e) if e.is_retryable() && attempt < max_retries => {
                warn!("{}: attempt {} failed: {}", label, attempt + 1, e);
                attempt += 1;
            }
            Err(e) => {
                warn!("{}: giving up after {} attempts: {}", label, attempt + 1, e);
                return (Err(e), attempt);
            }
        }
    }
}

// ── edgequake-llm provider ───────────────────────────────────────────────

/// Wraps an `edgequake-llm` provider.
#[derive(Clone)]
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }

    /// Build the message list. The context travels as a second system
    /// message so the user turn carries only the page.
    fn messages(request: &ModelRequest) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(request.system.as_str())];
        if let Some(ref context) = request.context {
            messages.push(ChatMessage::system(context.as_str()));
        }
        let images: Vec<ImageData> = request
            .image
            .iter()
            .map(|img| {
                ImageData::new(img.base64.clone(), img.mime_type.as_str()).with_detail("high")
            })
            .collect();
        messages.push(ChatMessage::user_with_images(
            request.instruction.as_str(),
            images,
        ));
        messages
    }
}

impl VisionModel for ProviderModel {
    fn describe(&self) -> String {
        self.label.clone()
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelReply, ModelError> {
        let messages = Self::messages(request);
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };
        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ModelError::Provider(e.to_string()))?;
        Ok(ModelReply {
            content: response.content,
            input_tokens: response.prompt_tokens as usize,
            output_tokens: response.completion_tokens as usize,
        })
    }
}

// ── Backend selection ────────────────────────────────────────────────────

/// The backend chosen for a run.
#[derive(Clone)]
pub enum Backend {
    Provider(ProviderModel),
    ChatApi(ChatCompletionsModel),
}

impl VisionModel for Backend {
    fn describe(&self) -> String {
        match self {
            Backend::Provider(m) => m.describe(),
            Backend::ChatApi(m) => m.describe(),
        }
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelReply, ModelError> {
        match self {
            Backend::Provider(m) => m.complete(request).await,
            Backend::ChatApi(m) => m.complete(request).await,
        }
    }
}

/// Resolve the model backend, from most-specific to least-specific:
///
/// 1. a pre-built provider (`config.provider`);
/// 2. a direct endpoint (`config.api_url`);
/// 3. a named provider (`config.provider_name`) with `config.model`;
/// 4. `DATASHEET2MD_PROVIDER` + `DATASHEET2MD_MODEL`, when both are set;
/// 5. OpenAI, when `OPENAI_API_KEY` is set;
/// 6. `ProviderFactory::from_env()` auto-detection.
pub fn resolve_backend(config: &ConversionConfig) -> Result<Backend, DatasheetError> {
    let model = config.model_id();

    if let Some(ref provider) = config.provider {
        return Ok(Backend::Provider(ProviderModel::new(
            Arc::clone(provider),
            format!("custom/{}", model),
        )));
    }

    if let Some(ref url) = config.api_url {
        let key = config
            .api_key
            .clone()
            .or_else(|| non_empty_env("OPENAI_API_KEY"))
            .ok_or_else(|| DatasheetError::ProviderNotConfigured {
                provider: url.clone(),
                hint: "Set OPENAI_API_KEY or pass --api-key for the chat-completions endpoint."
                    .into(),
            })?;
        let client = ChatCompletionsModel::new(url, key, model, config.api_timeout_secs)?;
        return Ok(Backend::ChatApi(client));
    }

    if let Some(ref name) = config.provider_name {
        return named_provider(name, model);
    }

    if let (Some(prov), Some(env_model)) = (
        non_empty_env("DATASHEET2MD_PROVIDER"),
        non_empty_env("DATASHEET2MD_MODEL"),
    ) {
        return named_provider(&prov, &env_model);
    }

    if non_empty_env("OPENAI_API_KEY").is_some() {
        return named_provider("openai", model);
    }

    let (provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DatasheetError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No model provider could be auto-detected from the environment.\n\
                 Set OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY, or pass --api-url.\n\
                 Error: {}",
                e
            ),
        })?;
    debug!("Auto-detected provider from environment");
    Ok(Backend::Provider(ProviderModel::new(provider, "auto")))
}

fn named_provider(name: &str, model: &str) -> Result<Backend, DatasheetError> {
    let provider = ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        DatasheetError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    Ok(Backend::Provider(ProviderModel::new(
        provider,
        format!("{}/{}", name, model),
    )))
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
