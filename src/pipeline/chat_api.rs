//! Direct client for OpenAI-compatible chat-completions endpoints.
//!
//! Used when the caller points the tool at a specific URL (a local vLLM or
//! LM Studio server, a corporate proxy) instead of a named provider. The
//! request mirrors the OpenAI vision format: a system message, then one user
//! message whose content parts are the optional context text, the
//! instruction, and the page as a `data:` URL.

use crate::error::{DatasheetError, ModelError};
use crate::pipeline::model::{ModelReply, ModelRequest, VisionModel};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Client for one chat-completions URL.
#[derive(Clone)]
pub struct ChatCompletionsModel {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl std::fmt::Debug for ChatCompletionsModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsModel")
            .field("url", &self.url)
            .field("model", &self.model)
            .finish()
    }
}

impl ChatCompletionsModel {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, DatasheetError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DatasheetError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout_secs,
        })
    }
}

impl VisionModel for ChatCompletionsModel {
    fn describe(&self) -> String {
        format!("{} ({})", self.url, self.model)
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelReply, ModelError> {
        let payload = build_payload(&self.model, request);
        debug!("POST {} (image: {})", self.url, request.image.is_some());

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout {
                        secs: self.timeout_secs,
                    }
                } else {
                    ModelError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(ModelError::Http {
                status: status.as_u16(),
                body,
            });
        }
        parse_reply(&body)
    }
}

// ── Wire format ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Content<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Content<'a> {
    Text(&'a str),
    Parts(Vec<Part<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Part<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

fn build_payload<'a>(model: &'a str, request: &'a ModelRequest) -> ChatRequest<'a> {
    let mut parts = Vec::with_capacity(3);
    if let Some(ref context) = request.context {
        parts.push(Part::Text { text: context });
    }
    parts.push(Part::Text {
        text: &request.instruction,
    });
    if let Some(ref image) = request.image {
        parts.push(Part::ImageUrl {
            image_url: ImageUrl {
                url: image.data_url(),
                detail: "high",
            },
        });
    }

    ChatRequest {
        model,
        messages: vec![
            Message {
                role: "system",
                content: Content::Text(&request.system),
            },
            Message {
                role: "user",
                content: Content::Parts(parts),
            },
        ],
        max_tokens: request.max_tokens,
        temperature: request.temperature,
    }
}

fn parse_reply(body: &str) -> Result<ModelReply, ModelError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ModelError::MalformedResponse(format!("{e}: {}", truncate(body, 200))))?;
    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ModelError::MalformedResponse(truncate(body, 200).to_string()))?;
    let usage = parsed.usage.unwrap_or(Usage {
        prompt_tokens: 0,
        completion_tokens: 0,
    });
    Ok(ModelReply {
        content,
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
