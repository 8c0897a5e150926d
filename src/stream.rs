//! Streaming conversion: yield each page as soon as it is extracted.
//!
//! Pages are still processed one at a time and in order, carrying context
//! forward exactly like [`crate::convert::convert`]; the stream only hands
//! each [`ExtractionResult`] to the caller without waiting for the rest.
//! Whole-document translation needs every page and is therefore not applied
//! here; inline and per-page translation are.

use crate::config::ConversionConfig;
use crate::document::ExtractionResult;
use crate::error::DatasheetError;
use crate::pipeline::extract::{PageExtractor, RenderedPage};
use crate::pipeline::model::{resolve_backend, VisionModel};
use crate::pipeline::{input, render};
use futures::stream;
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of page results, in page order.
pub type PageStream = Pin<Box<dyn Stream<Item = ExtractionResult> + Send>>;

/// Run the sequential extraction loop over `pages` as a stream.
///
/// `total_pages` is the page count of the whole PDF. The progress callback
/// gets `on_conversion_start` right away and `on_conversion_complete` once
/// the stream is drained.
pub fn extract_stream<M>(
    model: M,
    pages: Vec<RenderedPage>,
    total_pages: usize,
    config: ConversionConfig,
) -> PageStream
where
    M: VisionModel + 'static,
{
    let selected = pages.len();
    let callback = config.progress_callback.clone();
    if let Some(ref cb) = callback {
        cb.on_conversion_start(selected);
    }
    let extractor = PageExtractor::new(model, config, total_pages, selected);
    let s = stream::unfold(
        (extractor, pages.into_iter(), 0usize),
        move |(mut extractor, mut remaining, succeeded)| {
            let callback = callback.clone();
            async move {
                let Some(page) = remaining.next() else {
                    if let Some(cb) = callback {
                        cb.on_conversion_complete(selected, succeeded);
                    }
                    return None;
                };
                let result = extractor.process(&page).await;
                let succeeded = succeeded + usize::from(result.is_success());
                Some((result, (extractor, remaining, succeeded)))
            }
        },
    );
    Box::pin(s)
}

/// Render a PDF file or URL and stream its pages through the configured
/// backend.
pub async fn convert_stream(
    input: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<PageStream, DatasheetError> {
    let input = input.as_ref();
    info!("Streaming conversion of {}", input);

    let model = resolve_backend(config)?;
    let resolved = input::resolve_input(input, config.download_timeout_secs).await?;
    let metadata = render::extract_metadata(resolved.path(), config.password.as_deref()).await?;
    let indices = config.pages.to_indices(metadata.page_count);
    if indices.is_empty() {
        return Err(DatasheetError::PageOutOfRange {
            selection: config.pages.to_string(),
            total: metadata.page_count,
        });
    }
    let pages = render::render_pages(resolved.path(), config, &indices).await?;

    Ok(extract_stream(model, pages, metadata.page_count, config.clone()))
}
