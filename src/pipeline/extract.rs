//! Page extraction: one model call per page, strictly in page order.
//!
//! [`PageExtractor`] owns the state that flows from page to page (the
//! [`ContextWindow`] of recent page text) and processes one rendered page at
//! a time. [`extract_pages`] drives it over a slice; the streaming API in
//! [`crate::stream`] drives it from a `Stream`.
//!
//! A page never aborts the run: render, encode and model failures become a
//! failed [`ExtractionResult`] and the next page is processed with the
//! context built so far.

use crate::config::{ConversionConfig, TranslationMode};
use crate::document::{ExtractionResult, Page};
use crate::error::PageError;
use crate::pipeline::context::ContextWindow;
use crate::pipeline::encode::prepare_image;
use crate::pipeline::model::{complete_with_retry, ModelRequest, VisionModel};
use crate::pipeline::postprocess::clean_markdown;
use crate::pipeline::translate::translate_page;
use crate::progress::{ConversionProgressCallback, NoopProgressCallback};
use crate::prompts;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// A rendered page, or the reason it could not be rendered.
pub type RenderedPage = Result<Page, PageError>;

/// Extract one page.
///
/// `context` is the carried text of previous pages (unwrapped); it is sent
/// as a context block ahead of the page instruction. Returns a failed result
/// instead of an error.
pub async fn extract_page<M: VisionModel>(
    model: &M,
    page: &Page,
    total_pages: usize,
    context: Option<&str>,
    config: &ConversionConfig,
) -> ExtractionResult {
    let start = Instant::now();
    let page_num = page.number();

    let image = match prepare_image(page, config.max_image_bytes) {
        Ok(img) => img,
        Err(e) => {
            warn!("Page {}: could not prepare image: {}", page_num, e);
            return ExtractionResult::failed(
                page.index,
                PageError::EncodeFailed {
                    page: page_num,
                    detail: e.to_string(),
                },
            );
        }
    };

    let inline_language = if config.translates_inline() {
        config.language()
    } else {
        None
    };
    let request = ModelRequest {
        system: config
            .system_prompt
            .clone()
            .unwrap_or_else(|| prompts::system_prompt(inline_language)),
        context: context
            .filter(|c| !c.trim().is_empty())
            .map(prompts::context_block),
        instruction: prompts::page_instruction(page_num, total_pages, inline_language),
        image: Some(image),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    };

    let (outcome, retries) = complete_with_retry(
        model,
        &request,
        config.max_retries,
        config.retry_backoff_ms,
        config.api_timeout_secs,
        &format!("Page {page_num}"),
    )
    .await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(reply) => ExtractionResult {
            page_index: page.index,
            text: clean_markdown(&reply.content),
            input_tokens: reply.input_tokens,
            output_tokens: reply.output_tokens,
            duration_ms,
            retries,
            ..Default::default()
        },
        Err(e) => ExtractionResult {
            page_index: page.index,
            duration_ms,
            retries,
            error: Some(PageError::ExtractionFailed {
                page: page_num,
                retries,
                detail: e.to_string(),
            }),
            ..Default::default()
        },
    }
}

/// Sequential extractor carrying context from page to page.
pub struct PageExtractor<M> {
    model: M,
    config: ConversionConfig,
    context: ContextWindow,
    total_pages: usize,
    selected_pages: usize,
    processed: usize,
}

impl<M: VisionModel> PageExtractor<M> {
    /// `total_pages` is the page count of the whole PDF (used in the page
    /// instruction); `selected_pages` is how many pages this run visits
    /// (used for progress reporting).
    pub fn new(model: M, config: ConversionConfig, total_pages: usize, selected_pages: usize) -> Self {
        let context = ContextWindow::new(config.context_window, config.context_max_chars);
        Self {
            model,
            config,
            context,
            total_pages,
            selected_pages,
            processed: 0,
        }
    }

    /// Extract the next page in order, translating it when the per-page mode
    /// is active, and update the carried context.
    pub async fn process(&mut self, page: &RenderedPage) -> ExtractionResult {
        let noop = NoopProgressCallback;
        let callback: &dyn ConversionProgressCallback = match self.config.progress_callback {
            Some(ref cb) => cb.as_ref(),
            None => &noop,
        };

        if self.processed > 0 && self.config.page_delay_ms > 0 {
            debug!("Pausing {}ms before the next page", self.config.page_delay_ms);
            sleep(Duration::from_millis(self.config.page_delay_ms)).await;
        }
        self.processed += 1;

        let page = match page {
            Ok(page) => page,
            Err(e) => {
                let page_num = e.page();
                callback.on_page_start(page_num, self.selected_pages);
                warn!("{}", e);
                callback.on_page_error(page_num, self.selected_pages, &e.to_string());
                return ExtractionResult::failed(page_num.saturating_sub(1), e.clone());
            }
        };
        let page_num = page.number();
        callback.on_page_start(page_num, self.selected_pages);

        let carried = self.context.render();
        let mut result = extract_page(
            &self.model,
            page,
            self.total_pages,
            carried.as_deref(),
            &self.config,
        )
        .await;

        if let Some(ref e) = result.error {
            warn!("{}", e);
            callback.on_page_error(page_num, self.selected_pages, &e.to_string());
            return result;
        }

        self.context.push(&result.text);

        if self.config.translation == TranslationMode::PerPage {
            if let Some(language) = self.config.language() {
                self.translate_result(&mut result, language.to_string()).await;
            }
        }

        info!(
            "Page {}/{} extracted ({} chars)",
            page_num,
            self.total_pages,
            result.output_text().len()
        );
        callback.on_page_complete(page_num, self.selected_pages, result.output_text().len());
        result
    }

    async fn translate_result(&self, result: &mut ExtractionResult, language: String) {
        let page_num = result.page_num();
        if result.text.trim().is_empty() {
            return;
        }
        let start = Instant::now();
        match translate_page(&self.model, page_num, &result.text, &language, &self.config).await {
            Ok(reply) => {
                result.translated = Some(reply.content);
                result.input_tokens += reply.input_tokens;
                result.output_tokens += reply.output_tokens;
            }
            Err(e) => {
                let err = PageError::TranslationFailed {
                    page: page_num,
                    detail: e.to_string(),
                };
                warn!("{}; keeping the source text", err);
                result.translation_error = Some(err);
            }
        }
        result.translation_ms = start.elapsed().as_millis() as u64;
    }
}

/// Extract `pages` one after another.
///
/// `total_pages` is the page count of the whole PDF.
pub async fn extract_pages<M: VisionModel>(
    model: &M,
    pages: &[RenderedPage],
    total_pages: usize,
    config: &ConversionConfig,
) -> Vec<ExtractionResult> {
    let mut extractor = PageExtractor::new(model, config.clone(), total_pages, pages.len());
    let mut results = Vec::with_capacity(pages.len());
    for page in pages {
        results.push(extractor.process(page).await);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::pipeline::model::ModelReply;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies from a queue and records every request.
    struct Scripted {
        replies: Mutex<VecDeque<Result<ModelReply, ModelError>>>,
        seen: Mutex<Vec<ModelRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<ModelReply, ModelError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl VisionModel for Scripted {
        fn describe(&self) -> String {
            "scripted".into()
        }

        async fn complete(&self, request: &ModelRequest) -> Result<ModelReply, ModelError> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ModelError::Provider("script exhausted".into())))
        }
    }

    fn ok(text: &str) -> Result<ModelReply, ModelError> {
        Ok(ModelReply {
            content: text.into(),
            input_tokens: 10,
            output_tokens: 5,
        })
    }

    fn page(index: usize) -> Page {
        // 1x1 white PNG.
        let mut png = Vec::new();
        image::DynamicImage::new_rgb8(1, 1)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        Page::new(index, png)
    }

    fn fast_config() -> ConversionConfig {
        ConversionConfig::builder()
            .max_retries(2)
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn first_page_has_no_context() {
        let model = Scripted::new(vec![ok("# LM317")]);
        let r = extract_page(&model, &page(0), 3, None, &fast_config()).await;
        assert!(r.is_success());
        assert_eq!(r.text, "# LM317\n");
        let seen = model.seen.lock().unwrap();
        assert!(seen[0].context.is_none());
        assert!(seen[0].instruction.starts_with("This is page 1 of 3"));
        assert!(seen[0].image.is_some());
    }

    #[tokio::test]
    async fn retries_transient_errors() {
        let model = Scripted::new(vec![
            Err(ModelError::Http { status: 503, body: String::new() }),
            ok("text"),
        ]);
        let r = extract_page(&model, &page(0), 1, None, &fast_config()).await;
        assert!(r.is_success());
        assert_eq!(r.retries, 1);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let model = Scripted::new(vec![
            Err(ModelError::Http { status: 401, body: "bad key".into() }),
            ok("never used"),
        ]);
        let r = extract_page(&model, &page(4), 9, None, &fast_config()).await;
        assert!(matches!(
            r.error,
            Some(PageError::ExtractionFailed { page: 5, retries: 0, .. })
        ));
        assert_eq!(model.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn context_carries_previous_pages() {
        let model = Scripted::new(vec![ok("alpha"), ok("beta"), ok("gamma")]);
        let pages: Vec<RenderedPage> = (0..3).map(|i| Ok(page(i))).collect();
        let results = extract_pages(&model, &pages, 3, &fast_config()).await;
        assert_eq!(results.len(), 3);

        let seen = model.seen.lock().unwrap();
        assert!(seen[0].context.is_none());
        assert!(seen[1].context.as_deref().unwrap().ends_with("alpha"));
        assert!(seen[2].context.as_deref().unwrap().ends_with("alpha\n\nbeta"));
    }

    #[tokio::test]
    async fn render_failure_skips_model_and_context() {
        let model = Scripted::new(vec![ok("one"), ok("three")]);
        let pages: Vec<RenderedPage> = vec![
            Ok(page(0)),
            Err(PageError::RenderFailed { page: 2, detail: "bad stream".into() }),
            Ok(page(2)),
        ];
        let results = extract_pages(&model, &pages, 3, &fast_config()).await;
        assert!(results[0].is_success());
        assert_eq!(results[1].page_num(), 2);
        assert!(!results[1].is_success());
        assert!(results[2].is_success());
        assert_eq!(model.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn zero_context_window_sends_no_context() {
        let model = Scripted::new(vec![ok("one"), ok("two")]);
        let config = ConversionConfig::builder()
            .context_window(0)
            .build()
            .unwrap();
        let pages: Vec<RenderedPage> = (0..2).map(|i| Ok(page(i))).collect();
        extract_pages(&model, &pages, 2, &config).await;
        assert!(model.seen.lock().unwrap().iter().all(|r| r.context.is_none()));
    }

    #[tokio::test]
    async fn no_pages_no_calls() {
        let model = Scripted::new(vec![]);
        assert!(extract_pages(&model, &[], 0, &fast_config()).await.is_empty());
    }
}
