//! # datasheet2md
//!
//! Convert PDF datasheets to Markdown with a multimodal model.
//!
//! Text extraction tools lose the structure that matters in a datasheet:
//! pin tables, register maps, absolute-maximum ratings and footnotes come out
//! as a jumble. This crate renders every page to an image and asks a vision
//! model to transcribe it, one page at a time, sending the text of the
//! previous pages along so tables and numbering continue across page breaks.
//! The result can be translated on the way, page by page or as a whole.
//!
//! ## Pipeline
//!
//! ```text
//! PDF
//!  ├─ input      resolve a local path, URL or byte buffer
//!  ├─ render     rasterise pages with pdfium (spawn_blocking)
//!  ├─ encode     downscale oversize pages, base64
//!  ├─ extract    sequential model calls with prior-page context
//!  ├─ clean      deterministic Markdown repairs
//!  ├─ translate  optional: inline, per page, or whole document
//!  └─ assemble   header, table of contents, page separators
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use datasheet2md::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Backend picked from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY.
//!     let config = ConversionConfig::builder()
//!         .context_window(2)
//!         .target_language("German")
//!         .build()?;
//!     let output = convert("lm317.pdf", &config).await?;
//!     println!("{}", output.markdown);
//!     Ok(())
//! }
//! ```
//!
//! ## Custom models
//!
//! Everything above the renderer is generic over [`VisionModel`], so a
//! caller can plug in its own client (or a test double) and feed pages it
//! rendered itself to [`convert_pages`].
//!
//! ## Feature flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | The `datasheet2md` binary (clap, indicatif, tracing-subscriber) |

pub mod assemble;
pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

pub use assemble::{assemble, full_file_name, page_file_name, AssemblyOptions};
pub use config::{
    ConversionConfig, ConversionConfigBuilder, MetadataHeader, PageSelection, PageSeparator,
    TranslationMode, DEFAULT_MODEL,
};
pub use convert::{
    convert, convert_from_bytes, convert_pages, convert_sync, convert_to_dir, convert_to_file,
    convert_with_model, inspect, write_dir, write_file, DirOutput,
};
pub use document::{
    ConversionOutput, ConversionStats, Document, DocumentMetadata, ExtractionResult, Page,
};
pub use error::{DatasheetError, ModelError, PageError};
pub use pipeline::extract::{extract_page, extract_pages, PageExtractor, RenderedPage};
pub use pipeline::model::{
    resolve_backend, Backend, ChatCompletionsModel, ModelReply, ModelRequest, ProviderModel,
    VisionModel,
};
pub use pipeline::translate::{translate_document, translate_page};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{convert_stream, extract_stream, PageStream};
