//! PDF rasterisation with pdfium.
//!
//! pdfium is a blocking C++ library, so every call runs inside
//! `tokio::task::spawn_blocking`. Pages are rendered at the configured DPI,
//! capped so the longest edge never exceeds `max_rendered_pixels`, and
//! returned as PNG bytes.
//!
//! A page that fails to render becomes a [`PageError::RenderFailed`] in its
//! slot; only failures to open the document are fatal.

use crate::config::ConversionConfig;
use crate::document::{DocumentMetadata, Page};
use crate::error::{DatasheetError, PageError};
use crate::pipeline::extract::RenderedPage;
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Bind pdfium: `PDFIUM_LIB_PATH` (library file or directory), then the
/// working directory, then the system library path.
pub fn bind_pdfium() -> Result<Pdfium, DatasheetError> {
    let bindings = match std::env::var_os("PDFIUM_LIB_PATH") {
        Some(configured) => {
            let configured = PathBuf::from(configured);
            let lib = if configured.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&configured)
            } else {
                configured
            };
            Pdfium::bind_to_library(&lib).map_err(|e| {
                DatasheetError::RendererUnavailable(format!("{}: {:?}", lib.display(), e))
            })?
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| DatasheetError::RendererUnavailable(format!("{e:?}")))?,
    };
    Ok(Pdfium::new(bindings))
}

fn open_error(path: &Path, password: Option<&str>, err: PdfiumError) -> DatasheetError {
    let detail = format!("{err:?}");
    if detail.to_lowercase().contains("password") {
        if password.is_some() {
            DatasheetError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            DatasheetError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        DatasheetError::CorruptPdf {
            path: path.to_path_buf(),
            detail,
        }
    }
}

/// Pixel width for a page `width_points` wide at `dpi`, capped at
/// `max_pixels`.
pub fn target_width(width_points: f32, dpi: u32, max_pixels: u32) -> i32 {
    let px = (width_points / 72.0 * dpi as f32).round() as i64;
    px.clamp(1, max_pixels.max(1) as i64) as i32
}

/// Render the 0-based `indices` of the PDF at `path`, in order.
pub async fn render_pages(
    path: &Path,
    config: &ConversionConfig,
    indices: &[usize],
) -> Result<Vec<RenderedPage>, DatasheetError> {
    let path = path.to_path_buf();
    let password = config.password.clone();
    let dpi = config.dpi;
    let max_pixels = config.max_rendered_pixels;
    let indices = indices.to_vec();

    tokio::task::spawn_blocking(move || {
        render_blocking(&path, password.as_deref(), dpi, max_pixels, &indices)
    })
    .await
    .map_err(|e| DatasheetError::Internal(format!("render task panicked: {e}")))?
}

fn render_blocking(
    path: &Path,
    password: Option<&str>,
    dpi: u32,
    max_pixels: u32,
    indices: &[usize],
) -> Result<Vec<RenderedPage>, DatasheetError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(path, password)
        .map_err(|e| open_error(path, password, e))?;
    let pages = document.pages();
    let total = pages.len() as usize;
    info!("Rendering {} of {} pages at {} DPI", indices.len(), total, dpi);

    let rendered = indices
        .iter()
        .map(|&idx| {
            let page_num = idx + 1;
            let failed = |detail: String| PageError::RenderFailed {
                page: page_num,
                detail,
            };
            if idx >= total {
                return Err(failed(format!("page index out of range ({total} pages)")));
            }
            let page = pages.get(idx as u16).map_err(|e| failed(format!("{e:?}")))?;
            let width = target_width(page.width().value, dpi, max_pixels);
            let render_config = PdfRenderConfig::new()
                .set_target_width(width)
                .set_maximum_height(max_pixels as i32);
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| failed(format!("{e:?}")))?;
            let img = bitmap.as_image();

            let mut png = Vec::new();
            img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
                .map_err(|e| failed(e.to_string()))?;
            debug!(
                "Rendered page {} → {}x{} px, {} PNG bytes",
                page_num,
                img.width(),
                img.height(),
                png.len()
            );
            Ok(Page::new(idx, png))
        })
        .collect();
    Ok(rendered)
}

/// Read the document information dictionary and page count.
pub async fn extract_metadata(
    path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, DatasheetError> {
    let path = path.to_path_buf();
    let password = password.map(str::to_string);
    tokio::task::spawn_blocking(move || metadata_blocking(&path, password.as_deref()))
        .await
        .map_err(|e| DatasheetError::Internal(format!("metadata task panicked: {e}")))?
}

fn metadata_blocking(path: &Path, password: Option<&str>) -> Result<DocumentMetadata, DatasheetError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(path, password)
        .map_err(|e| open_error(path, password, e))?;
    let info = document.metadata();
    let tag = |kind: PdfDocumentMetadataTagType| {
        info.get(kind)
            .map(|t| t.value().trim().to_string())
            .filter(|v| !v.is_empty())
    };

    Ok(DocumentMetadata {
        title: tag(PdfDocumentMetadataTagType::Title),
        author: tag(PdfDocumentMetadataTagType::Author),
        subject: tag(PdfDocumentMetadataTagType::Subject),
        creator: tag(PdfDocumentMetadataTagType::Creator),
        producer: tag(PdfDocumentMetadataTagType::Producer),
        creation_date: tag(PdfDocumentMetadataTagType::CreationDate),
        modification_date: tag(PdfDocumentMetadataTagType::ModificationDate),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    })
}
