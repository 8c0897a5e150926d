//! Eager conversion entry points.
//!
//! Every function here waits for the whole datasheet and returns a
//! [`ConversionOutput`]. [`convert_pages`] is the renderer-free core: it takes
//! already rendered pages, so it also serves callers that rasterise PDFs
//! themselves. Use [`crate::stream`] to receive pages as they complete.

use crate::assemble::{assemble, assemble_body, full_file_name, page_file_name, AssemblyOptions};
use crate::config::{ConversionConfig, PageSelection, TranslationMode};
use crate::document::{ConversionOutput, ConversionStats, Document, DocumentMetadata};
use crate::error::DatasheetError;
use crate::pipeline::extract::{extract_pages, RenderedPage};
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::model::{resolve_backend, VisionModel};
use crate::pipeline::render;
use crate::pipeline::translate::translate_document;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Convert a PDF file or URL to Markdown with the configured backend.
///
/// Succeeds as long as one page was extracted; check
/// `output.stats.failed_pages` or call [`ConversionOutput::into_result`]
/// for strictness.
pub async fn convert(
    input: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, DatasheetError> {
    let model = resolve_backend(config)?;
    convert_with_model(input, &model, config).await
}

/// [`convert`] with an explicit model.
pub async fn convert_with_model<M: VisionModel>(
    input: impl AsRef<str>,
    model: &M,
    config: &ConversionConfig,
) -> Result<ConversionOutput, DatasheetError> {
    let input = input.as_ref();
    info!("Converting {}", input);
    let resolved = input::resolve_input(input, config.download_timeout_secs).await?;
    convert_resolved(&resolved, model, config).await
}

async fn convert_resolved<M: VisionModel>(
    resolved: &ResolvedInput,
    model: &M,
    config: &ConversionConfig,
) -> Result<ConversionOutput, DatasheetError> {
    let start = Instant::now();
    let path = resolved.path();

    let metadata = render::extract_metadata(path, config.password.as_deref()).await?;
    let indices = config.pages.to_indices(metadata.page_count);
    if indices.is_empty() {
        return Err(DatasheetError::PageOutOfRange {
            selection: config.pages.to_string(),
            total: metadata.page_count,
        });
    }
    info!(
        "{}: {} pages, converting {}",
        resolved.file_name(),
        metadata.page_count,
        indices.len()
    );

    let render_start = Instant::now();
    let pages = render::render_pages(path, config, &indices).await?;
    let render_ms = render_start.elapsed().as_millis() as u64;
    debug!("Rendered {} pages in {}ms", pages.len(), render_ms);

    let mut output = convert_pages(model, resolved.file_name(), &pages, metadata, config).await?;
    output.stats.render_duration_ms = render_ms;
    output.stats.total_duration_ms = start.elapsed().as_millis() as u64;
    Ok(output)
}

/// Extract, translate and assemble pages that are already rendered.
///
/// `source` is the file name recorded in the document. When
/// `metadata.page_count` is zero the highest page number in `pages` is used
/// as the document length.
pub async fn convert_pages<M: VisionModel>(
    model: &M,
    source: impl Into<String>,
    pages: &[RenderedPage],
    metadata: DocumentMetadata,
    config: &ConversionConfig,
) -> Result<ConversionOutput, DatasheetError> {
    let start = Instant::now();
    let page_numbers: Vec<usize> = pages
        .iter()
        .map(|p| match p {
            Ok(page) => page.number(),
            Err(e) => e.page(),
        })
        .collect();
    let total_pages = metadata
        .page_count
        .max(page_numbers.iter().copied().max().unwrap_or(0));
    if pages.is_empty() {
        return Err(DatasheetError::PageOutOfRange {
            selection: config.pages.to_string(),
            total: total_pages,
        });
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(pages.len());
    }
    info!("Extracting {} pages with {}", pages.len(), model.describe());

    let results = extract_pages(model, pages, total_pages, config).await;

    let mut document = Document::new(source, metadata);
    document.page_range = page_numbers;
    document.target_language = config.language().map(str::to_string);
    document.results = results;

    let processed = document.successful().count();
    let failed = document.results.len() - processed;
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(pages.len(), processed);
    }
    if processed == 0 {
        let first_error = document
            .results
            .iter()
            .find_map(|r| r.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(DatasheetError::AllPagesFailed {
            total: pages.len(),
            retries: config.max_retries,
            first_error,
        });
    }

    let mut stats = ConversionStats {
        total_pages,
        selected_pages: pages.len(),
        processed_pages: processed,
        failed_pages: failed,
        untranslated_pages: document
            .results
            .iter()
            .filter(|r| r.translation_error.is_some())
            .count(),
        total_input_tokens: document.results.iter().map(|r| r.input_tokens as u64).sum(),
        total_output_tokens: document.results.iter().map(|r| r.output_tokens as u64).sum(),
        extraction_duration_ms: document.results.iter().map(|r| r.duration_ms).sum(),
        translation_duration_ms: document.results.iter().map(|r| r.translation_ms).sum(),
        ..Default::default()
    };

    if config.translation == TranslationMode::Document {
        if let Some(language) = config.language() {
            translate_whole_document(model, &mut document, &mut stats, language, config).await;
        }
    }

    let markdown = assemble(&document, &AssemblyOptions::from_config(config));
    stats.total_duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Converted {}/{} pages ({} failed), {} tokens in / {} out, {}ms",
        processed,
        pages.len(),
        failed,
        stats.total_input_tokens,
        stats.total_output_tokens,
        stats.total_duration_ms
    );

    Ok(ConversionOutput {
        markdown,
        document,
        stats,
    })
}

/// One translation call over the assembled body. A failure is recorded on
/// the document and the source text is kept.
async fn translate_whole_document<M: VisionModel>(
    model: &M,
    document: &mut Document,
    stats: &mut ConversionStats,
    language: &str,
    config: &ConversionConfig,
) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_translation_start(language);
    }
    let body = assemble_body(document, &config.page_separator);
    if body.trim().is_empty() {
        return;
    }
    info!("Translating document into {}", language);

    let start = Instant::now();
    match translate_document(model, &body, language, config).await {
        Ok(reply) => {
            stats.total_input_tokens += reply.input_tokens as u64;
            stats.total_output_tokens += reply.output_tokens as u64;
            document.translated_body = Some(reply.content);
        }
        Err(e) => {
            warn!("Document translation failed, keeping the source text: {}", e);
            document.translation_error = Some(e.to_string());
        }
    }
    stats.translation_duration_ms += start.elapsed().as_millis() as u64;
}

/// Convert and write the Markdown to `output_path` atomically
/// (`<name>.md.tmp`, then rename).
pub async fn convert_to_file(
    input: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, DatasheetError> {
    let output = convert(input, config).await?;
    write_file(&output, output_path.as_ref()).await?;
    Ok(output.stats)
}

/// Write the assembled Markdown of `output` to `path` atomically.
pub async fn write_file(output: &ConversionOutput, path: &Path) -> Result<(), DatasheetError> {
    write_atomic(path, &output.markdown).await?;
    info!("Wrote {}", path.display());
    Ok(())
}

/// Files written by [`convert_to_dir`].
#[derive(Debug, Clone)]
pub struct DirOutput {
    /// `{stem}_full.md`
    pub full: PathBuf,
    /// `{stem}_page_{NNN}.md`, one per successful page, in page order.
    pub pages: Vec<PathBuf>,
    pub stats: ConversionStats,
}

/// Convert and write one Markdown file per page plus the assembled document
/// into `dir`.
pub async fn convert_to_dir(
    input: impl AsRef<str>,
    dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<DirOutput, DatasheetError> {
    let output = convert(input, config).await?;
    write_dir(&output, dir.as_ref()).await
}

/// Write `output` as per-page files and a full file under `dir`.
pub async fn write_dir(output: &ConversionOutput, dir: &Path) -> Result<DirOutput, DatasheetError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| DatasheetError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

    let stem = output.document.stem().to_string();
    let page_options = AssemblyOptions {
        header: crate::config::MetadataHeader::None,
        table_of_contents: false,
        ..Default::default()
    };

    let mut pages = Vec::new();
    for result in output.document.successful() {
        let path = dir.join(page_file_name(&stem, result.page_num()));
        let text = assemble(
            &output.document,
            &page_options.clone().with_pages(PageSelection::Single(result.page_num())),
        );
        write_atomic(&path, &text).await?;
        pages.push(path);
    }

    let full = dir.join(full_file_name(&stem));
    write_atomic(&full, &output.markdown).await?;
    info!("Wrote {} page files and {}", pages.len(), full.display());

    Ok(DirOutput {
        full,
        pages,
        stats: output.stats.clone(),
    })
}

async fn write_atomic(path: &Path, contents: &str) -> Result<(), DatasheetError> {
    let write_failed = |e| DatasheetError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }
    let tmp = path.with_extension("md.tmp");
    tokio::fs::write(&tmp, contents).await.map_err(write_failed)?;
    tokio::fs::rename(&tmp, path).await.map_err(write_failed)?;
    Ok(())
}

/// Convert an in-memory PDF.
///
/// The bytes are written to a temp file named `file_name` for pdfium and
/// removed when the call returns.
pub async fn convert_from_bytes(
    bytes: &[u8],
    file_name: &str,
    config: &ConversionConfig,
) -> Result<ConversionOutput, DatasheetError> {
    let model = resolve_backend(config)?;
    let resolved = input::materialise_bytes(bytes, file_name)?;
    convert_resolved(&resolved, &model, config).await
}

/// Blocking wrapper around [`convert`] with its own tokio runtime.
pub fn convert_sync(
    input: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, DatasheetError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DatasheetError::Internal(format!("tokio runtime: {e}")))?
        .block_on(convert(input, config))
}

/// Read PDF metadata without calling a model.
pub async fn inspect(
    input: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<DocumentMetadata, DatasheetError> {
    let resolved = input::resolve_input(input.as_ref(), config.download_timeout_secs).await?;
    render::extract_metadata(resolved.path(), config.password.as_deref()).await
}
