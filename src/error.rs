//! Error types for the datasheet2md library.
//!
//! Three error types map to three failure scopes:
//!
//! * [`DatasheetError`]: **fatal**, the conversion cannot proceed at all
//!   (bad input file, wrong password, no model configured). Returned as
//!   `Err(DatasheetError)` from the top-level `convert*` functions.
//!
//! * [`PageError`]: **non-fatal**, a single page failed (render glitch,
//!   model error after retries) while the rest of the datasheet is fine.
//!   Stored inside [`crate::document::ExtractionResult`] so callers can
//!   inspect partial success.
//!
//! * [`ModelError`]: one failed model call. The extractor decides from
//!   [`ModelError::is_retryable`] whether another attempt is worth it.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the datasheet2md library.
#[derive(Debug, Error)]
pub enum DatasheetError {
    // ── Input errors ──────────────────────────────────────────────────────
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The page selection matched no page of the document.
    #[error("Page selection {selection} matches no page (document has {total} pages)")]
    PageOutOfRange { selection: String, total: usize },

    /// No pdfium library could be bound.
    #[error(
        "PDF renderer unavailable: {0}\n\n\
Datasheet pages are rasterised with pdfium. Either:\n\
  • set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory), or\n\
  • place libpdfium next to the working directory, or\n\
  • install pdfium as a system library.\n"
    )]
    RendererUnavailable(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// No model backend could be built (missing API key, unknown provider).
    #[error("Model provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Every selected page failed; the output would be empty.
    #[error("All {total} pages failed after {retries} retries each.\nFirst error: {first_error}")]
    AllPagesFailed {
        total: usize,
        retries: u32,
        first_error: String,
    },

    /// Some pages succeeded but at least one failed.
    ///
    /// Returned by [`crate::document::ConversionOutput::into_result`] when
    /// the caller wants to treat any page failure as an error.
    #[error("{failed}/{total} pages failed during conversion")]
    PartialFailure {
        success: usize,
        failed: usize,
        total: usize,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// The conversion continues with the next page unless every page fails.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    #[error("Page {page}: image preparation failed: {detail}")]
    EncodeFailed { page: usize, detail: String },

    /// Model call failed after retries (or on a non-retryable error).
    #[error("Page {page}: extraction failed after {retries} retries: {detail}")]
    ExtractionFailed {
        page: usize,
        retries: u32,
        detail: String,
    },

    #[error("Page {page}: translation failed: {detail}")]
    TranslationFailed { page: usize, detail: String },
}

impl PageError {
    /// 1-indexed page number the error refers to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::EncodeFailed { page, .. }
            | PageError::ExtractionFailed { page, .. }
            | PageError::TranslationFailed { page, .. } => *page,
        }
    }
}

/// Failure of a single model call.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// The endpoint answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Connection-level failure (DNS, TLS, reset).
    #[error("transport error: {0}")]
    Transport(String),

    #[error("no response within {secs}s")]
    Timeout { secs: u64 },

    /// The reply did not contain `choices[0].message.content`.
    #[error("unexpected response format: {0}")]
    MalformedResponse(String),

    /// Error surfaced by an `edgequake-llm` provider.
    #[error("{0}")]
    Provider(String),
}

impl ModelError {
    /// Whether another attempt can reasonably succeed.
    ///
    /// Client errors (bad key, bad request, unknown model) and replies we
    /// cannot parse are permanent; 408/429 and 5xx are transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Http { status, .. } => {
                matches!(status, 408 | 409 | 425 | 429) || *status >= 500
            }
            ModelError::Transport(_) | ModelError::Timeout { .. } => true,
            ModelError::MalformedResponse(_) => false,
            ModelError::Provider(msg) => {
                let m = msg.to_ascii_lowercase();
                !(m.contains("401")
                    || m.contains("403")
                    || m.contains("unauthorized")
                    || m.contains("invalid api key")
                    || m.contains("content_filter"))
            }
        }
    }
}
