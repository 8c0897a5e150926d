//! Pipeline stages for datasheet-to-Markdown conversion.
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ extract ──▶ postprocess ──▶ translate
//! (path/URL)  (pdfium)   (base64)   (model +     (cleanup)      (optional)
//!                                    context)
//! ```
//!
//! * [`input`]: resolve a path, URL or byte buffer to a local PDF
//! * [`render`]: rasterise pages to PNG in `spawn_blocking`
//! * [`encode`]: downscale oversize pages and base64-encode them
//! * [`extract`]: the sequential, context-carrying page loop
//! * [`translate`]: per-page and whole-document translation passes
//! * [`model`] / [`chat_api`]: model backends behind [`model::VisionModel`]
//! * [`postprocess`]: deterministic Markdown cleanup

pub mod chat_api;
pub mod context;
pub mod encode;
pub mod extract;
pub mod input;
pub mod model;
pub mod postprocess;
pub mod render;
pub mod translate;
