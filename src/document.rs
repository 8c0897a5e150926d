//! Data model shared by the pipeline stages.
//!
//! A run turns rendered [`Page`]s into [`ExtractionResult`]s, gathers them in
//! a [`Document`], and hands that to the assembler. Nothing here is
//! persisted; the only durable artefact is the Markdown written at the end.

use crate::config::PageSelection;
use crate::error::{DatasheetError, PageError};
use serde::{Deserialize, Serialize};

/// One rendered page of the source PDF.
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    /// 0-based page index in the PDF.
    pub index: usize,
    /// PNG-encoded page image.
    pub png: Vec<u8>,
}

impl Page {
    pub fn new(index: usize, png: Vec<u8>) -> Self {
        Self { index, png }
    }

    /// 1-based page number, as shown to users and the model.
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("index", &self.index)
            .field("png_bytes", &self.png.len())
            .finish()
    }
}

/// Outcome of extracting (and optionally translating) one page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// 0-based page index in the PDF.
    pub page_index: usize,
    /// Cleaned Markdown produced by the extraction call. Empty on failure.
    ///
    /// With inline translation this is already in the target language.
    pub text: String,
    /// Per-page translation of `text`, when requested and successful.
    pub translated: Option<String>,
    /// Prompt tokens across extraction and translation calls.
    pub input_tokens: usize,
    /// Completion tokens across extraction and translation calls.
    pub output_tokens: usize,
    /// Wall time of the extraction call, retries included.
    pub duration_ms: u64,
    /// Wall time of the per-page translation call, if any.
    #[serde(default)]
    pub translation_ms: u64,
    /// Failed extraction attempts before the final one.
    pub retries: u32,
    /// Set when the page could not be rendered or extracted.
    pub error: Option<PageError>,
    /// Set when the per-page translation failed; `text` is still usable.
    pub translation_error: Option<PageError>,
}

impl ExtractionResult {
    /// A failed result carrying only the error.
    pub fn failed(page_index: usize, error: PageError) -> Self {
        Self {
            page_index,
            error: Some(error),
            ..Default::default()
        }
    }

    /// 1-based page number.
    pub fn page_num(&self) -> usize {
        self.page_index + 1
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// The text the assembler emits: the translation when present.
    pub fn output_text(&self) -> &str {
        self.translated.as_deref().unwrap_or(&self.text)
    }
}

/// Metadata read from the PDF information dictionary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// All page results of one run plus what the assembler needs to know.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    /// File name of the source PDF (no directory).
    pub source: String,
    /// 1-based numbers of the pages that were selected for conversion.
    pub page_range: Vec<usize>,
    /// Translation target, when translation was requested.
    pub target_language: Option<String>,
    pub metadata: DocumentMetadata,
    /// Results in page order.
    pub results: Vec<ExtractionResult>,
    /// Whole-document translation of the assembled body.
    pub translated_body: Option<String>,
    /// Why the whole-document translation is missing, if it failed.
    pub translation_error: Option<String>,
}

impl Document {
    pub fn new(source: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            source: source.into(),
            metadata,
            ..Default::default()
        }
    }

    /// Source file name without extension, used for output file names.
    pub fn stem(&self) -> &str {
        let name = self.source.rsplit(['/', '\\']).next().unwrap_or(&self.source);
        match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => name,
        }
    }

    /// Successful results, in page order.
    pub fn successful(&self) -> impl Iterator<Item = &ExtractionResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    /// Successful results restricted to `selection` (1-based numbers).
    pub fn successful_in<'a>(
        &'a self,
        selection: &'a PageSelection,
    ) -> impl Iterator<Item = &'a ExtractionResult> + 'a {
        self.successful()
            .filter(move |r| selection.contains(r.page_num()))
    }
}

/// Aggregate statistics for a conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Pages in the PDF.
    pub total_pages: usize,
    pub selected_pages: usize,
    pub processed_pages: usize,
    pub failed_pages: usize,
    /// Pages whose per-page translation failed (their source text is kept).
    pub untranslated_pages: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
    pub render_duration_ms: u64,
    pub extraction_duration_ms: u64,
    pub translation_duration_ms: u64,
}

/// The result of a conversion: the assembled Markdown plus the data it was
/// built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    pub markdown: String,
    pub document: Document,
    pub stats: ConversionStats,
}

impl ConversionOutput {
    /// Treat any failed page as an error.
    pub fn into_result(self) -> Result<Self, DatasheetError> {
        if self.stats.failed_pages > 0 {
            return Err(DatasheetError::PartialFailure {
                success: self.stats.processed_pages,
                failed: self.stats.failed_pages,
                total: self.stats.selected_pages,
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(page_index: usize, text: &str) -> ExtractionResult {
        ExtractionResult {
            page_index,
            text: text.into(),
            ..Default::default()
        }
    }

    #[test]
    fn output_text_prefers_translation() {
        let mut r = ok(0, "Supply voltage");
        assert_eq!(r.output_text(), "Supply voltage");
        r.translated = Some("Versorgungsspannung".into());
        assert_eq!(r.output_text(), "Versorgungsspannung");
    }

    #[test]
    fn stem_strips_directory_and_extension() {
        let d = Document::new("specs/ATmega328P.pdf", DocumentMetadata::default());
        assert_eq!(d.stem(), "ATmega328P");
        let d = Document::new("noext", DocumentMetadata::default());
        assert_eq!(d.stem(), "noext");
        let d = Document::new("lm317.v2.pdf", DocumentMetadata::default());
        assert_eq!(d.stem(), "lm317.v2");
    }

    #[test]
    fn successful_in_filters_failed_and_unselected() {
        let mut d = Document::new("a.pdf", DocumentMetadata::default());
        d.results = vec![
            ok(0, "one"),
            ExtractionResult::failed(
                1,
                PageError::RenderFailed {
                    page: 2,
                    detail: "x".into(),
                },
            ),
            ok(2, "three"),
            ok(3, "four"),
        ];
        let sel = PageSelection::Range(2, 3);
        let pages: Vec<usize> = d.successful_in(&sel).map(|r| r.page_num()).collect();
        assert_eq!(pages, vec![3]);
        assert_eq!(d.successful().count(), 3);
    }

    #[test]
    fn into_result_reports_partial_failure() {
        let out = ConversionOutput {
            markdown: String::new(),
            document: Document::default(),
            stats: ConversionStats {
                selected_pages: 4,
                processed_pages: 3,
                failed_pages: 1,
                ..Default::default()
            },
        };
        assert!(matches!(
            out.into_result(),
            Err(DatasheetError::PartialFailure { failed: 1, total: 4, .. })
        ));
    }
}
