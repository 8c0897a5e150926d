//! Text-only translation passes.
//!
//! Inline translation needs no code here: the extraction prompt already asks
//! for the target language. This module covers the two modes that keep the
//! source text: one call per extracted page, and one call for the whole
//! assembled body.

use crate::config::ConversionConfig;
use crate::error::ModelError;
use crate::pipeline::model::{complete_with_retry, ModelReply, ModelRequest, VisionModel};
use crate::pipeline::postprocess::clean_markdown;
use crate::prompts;
use tracing::debug;

fn request(text: &str, language: &str, config: &ConversionConfig) -> ModelRequest {
    ModelRequest {
        system: prompts::translation_prompt(language),
        context: None,
        instruction: text.to_string(),
        image: None,
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    }
}

async fn translate(
    model: &impl VisionModel,
    text: &str,
    language: &str,
    config: &ConversionConfig,
    label: &str,
) -> Result<ModelReply, ModelError> {
    let (outcome, _retries) = complete_with_retry(
        model,
        &request(text, language, config),
        config.max_retries,
        config.retry_backoff_ms,
        config.api_timeout_secs,
        label,
    )
    .await;
    let mut reply = outcome?;
    reply.content = clean_markdown(&reply.content);
    Ok(reply)
}

/// Translate one page's Markdown into `language`.
///
/// The reply content is already cleaned. Token counts are those of the
/// translation call alone.
pub async fn translate_page<M: VisionModel>(
    model: &M,
    page_num: usize,
    text: &str,
    language: &str,
    config: &ConversionConfig,
) -> Result<ModelReply, ModelError> {
    debug!("Page {}: translating {} chars into {}", page_num, text.len(), language);
    translate(model, text, language, config, &format!("Page {page_num} translation")).await
}

/// Translate the assembled document body in a single call.
pub async fn translate_document<M: VisionModel>(
    model: &M,
    markdown: &str,
    language: &str,
    config: &ConversionConfig,
) -> Result<ModelReply, ModelError> {
    debug!("Translating document body ({} chars) into {}", markdown.len(), language);
    translate(model, markdown, language, config, "Document translation").await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_request_is_text_only() {
        let config = ConversionConfig::default();
        let req = request("# Pinout", "German", &config);
        assert!(req.image.is_none());
        assert!(req.context.is_none());
        assert_eq!(req.instruction, "# Pinout");
        assert!(req.system.contains("into German"));
        assert_eq!(req.max_tokens, config.max_tokens);
    }
}
