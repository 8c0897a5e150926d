//! Configuration types for datasheet conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Every knob lives in one struct so a
//! run can be logged, cloned into the streaming API, or diffed against
//! another run.

use crate::error::DatasheetError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Model used when neither the caller nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Configuration for a datasheet conversion.
///
/// # Example
/// ```rust
/// use datasheet2md::{ConversionConfig, TranslationMode};
///
/// let config = ConversionConfig::builder()
///     .context_window(3)
///     .target_language("German")
///     .translation(TranslationMode::PerPage)
///     .build()
///     .unwrap();
/// assert_eq!(config.context_window, 3);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Rendering DPI. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    ///
    /// Caps either edge independently of DPI so a large-format drawing
    /// sheet cannot produce a giant bitmap.
    pub max_rendered_pixels: u32,

    /// Largest PNG uploaded as-is, in bytes. Default: 5 MiB.
    ///
    /// Bigger images are downscaled by `sqrt(max / size)` on both axes,
    /// which brings the encoded size roughly under the limit.
    pub max_image_bytes: usize,

    /// Model identifier, e.g. "gpt-4o". If None, [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// `edgequake-llm` provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over everything else.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// OpenAI-compatible chat-completions URL. When set, requests go
    /// straight to this endpoint instead of through a named provider.
    pub api_url: Option<String>,

    /// Bearer key for `api_url`. Falls back to `OPENAI_API_KEY`.
    pub api_key: Option<String>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 4096.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient model failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per model call timeout in seconds. Default: 120.
    ///
    /// Dense register-map pages can take well over a minute to transcribe.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Custom system prompt. If None, the built-in prompt for the current
    /// translation mode is used.
    pub system_prompt: Option<String>,

    /// Number of previous pages whose text is sent along with each page. Default: 2.
    ///
    /// Datasheets continue register tables and pin lists across pages; the
    /// prior text lets the model keep numbering and heading levels stable.
    /// `0` sends every page on its own.
    pub context_window: usize,

    /// Upper bound on the carried context, in characters. Default: 12 000.
    ///
    /// When exceeded, the oldest text is dropped first.
    pub context_max_chars: usize,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// Language to translate the datasheet into. None disables translation.
    pub target_language: Option<String>,

    /// How translation is performed when `target_language` is set.
    pub translation: TranslationMode,

    /// Separator placed between pages in the assembled output.
    pub page_separator: PageSeparator,

    /// Header rendered above the first page.
    pub metadata_header: MetadataHeader,

    /// Insert a table of contents after the first heading. Default: true.
    pub table_of_contents: bool,

    /// Pause between page requests in milliseconds. Default: 0.
    pub page_delay_ms: u64,

    /// Receives per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 2000,
            max_image_bytes: 5 * 1024 * 1024,
            model: None,
            provider_name: None,
            provider: None,
            api_url: None,
            api_key: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            password: None,
            system_prompt: None,
            context_window: 2,
            context_max_chars: 12_000,
            pages: PageSelection::default(),
            target_language: None,
            translation: TranslationMode::default(),
            page_separator: PageSeparator::default(),
            metadata_header: MetadataHeader::default(),
            table_of_contents: true,
            page_delay_ms: 0,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("max_image_bytes", &self.max_image_bytes)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("context_window", &self.context_window)
            .field("pages", &self.pages)
            .field("target_language", &self.target_language)
            .field("translation", &self.translation)
            .field("page_separator", &self.page_separator)
            .field("metadata_header", &self.metadata_header)
            .field("table_of_contents", &self.table_of_contents)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model id in effect.
    pub fn model_id(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// Target language, when translation is enabled.
    pub fn language(&self) -> Option<&str> {
        self.target_language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }

    /// True when extraction prompts should ask for the target language directly.
    pub fn translates_inline(&self) -> bool {
        self.language().is_some() && self.translation == TranslationMode::Inline
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn max_image_bytes(mut self, bytes: usize) -> Self {
        self.config.max_image_bytes = bytes;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn context_window(mut self, pages: usize) -> Self {
        self.config.context_window = pages;
        self
    }

    pub fn context_max_chars(mut self, chars: usize) -> Self {
        self.config.context_max_chars = chars;
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn target_language(mut self, language: impl Into<String>) -> Self {
        self.config.target_language = Some(language.into());
        self
    }

    pub fn translation(mut self, mode: TranslationMode) -> Self {
        self.config.translation = mode;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn metadata_header(mut self, header: MetadataHeader) -> Self {
        self.config.metadata_header = header;
        self
    }

    pub fn table_of_contents(mut self, v: bool) -> Self {
        self.config.table_of_contents = v;
        self
    }

    pub fn page_delay_ms(mut self, ms: u64) -> Self {
        self.config.page_delay_ms = ms;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, DatasheetError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(DatasheetError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.max_image_bytes < 64 * 1024 {
            return Err(DatasheetError::InvalidConfig(format!(
                "max_image_bytes must be at least 65536, got {}",
                c.max_image_bytes
            )));
        }
        if let Some(ref lang) = c.target_language {
            if lang.trim().is_empty() {
                return Err(DatasheetError::InvalidConfig(
                    "target language must not be empty".into(),
                ));
            }
        }
        if let Some(ref url) = c.api_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(DatasheetError::InvalidConfig(format!(
                    "api_url must be an http(s) URL, got '{}'",
                    url
                )));
            }
        }
        if let PageSelection::Range(start, end) = c.pages {
            if start == 0 || start > end {
                return Err(DatasheetError::InvalidConfig(format!(
                    "invalid page range {}-{}",
                    start, end
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the optional translation is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationMode {
    /// The extraction prompt asks for the target language directly:
    /// one model call per page, no source text kept. (default)
    #[default]
    Inline,
    /// Extract in the source language, then translate each page in a
    /// second text-only call. Both versions are kept.
    PerPage,
    /// Extract every page, then translate the assembled body in one call.
    Document,
}

/// Specifies which pages of the PDF to convert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Convert all pages (default).
    #[default]
    All,
    /// Convert a single page (1-indexed).
    Single(usize),
    /// Convert a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Convert specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Whether the 1-indexed `page_num` is part of the selection.
    pub fn contains(&self, page_num: usize) -> bool {
        match self {
            PageSelection::All => page_num >= 1,
            PageSelection::Single(p) => *p == page_num,
            PageSelection::Range(start, end) => (*start..=*end).contains(&page_num),
            PageSelection::Set(pages) => pages.contains(&page_num),
        }
    }
}

impl fmt::Display for PageSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSelection::All => write!(f, "all"),
            PageSelection::Single(p) => write!(f, "{}", p),
            PageSelection::Range(s, e) => write!(f, "{}-{}", s, e),
            PageSelection::Set(pages) => {
                let parts: Vec<String> = pages.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

/// How to separate pages in the assembled Markdown output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSeparator {
    /// Pages joined with a blank line. (default)
    #[default]
    None,
    /// Horizontal rule: "\n\n---\n\n"
    HorizontalRule,
    /// HTML comment with page number: "<!-- page N -->"
    Comment,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator placed before the given page (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Comment => format!("\n\n<!-- page {} -->\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }
}

/// Document header rendered above the first page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataHeader {
    /// No header.
    None,
    /// `# Title`, author and description lines, then a rule. (default)
    #[default]
    Heading,
    /// YAML front matter.
    YamlFrontMatter,
}
