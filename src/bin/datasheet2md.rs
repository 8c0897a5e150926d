//! CLI binary for datasheet2md.
//!
//! Maps flags (and their `DATASHEET2MD_*` environment fallbacks) onto a
//! `ConversionConfig`, drives a progress bar from the conversion callbacks
//! and writes Markdown to stdout, a file or a directory.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use datasheet2md::{
    convert, inspect, write_dir, write_file, ConversionConfig, ConversionProgressCallback,
    MetadataHeader, PageSelection, PageSeparator, ProgressCallback, TranslationMode,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Progress bar ────────────────────────────────────────────────────────────

/// Progress bar plus one log line per finished page.
struct CliProgress {
    bar: ProgressBar,
    started: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Rendering datasheet…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            started: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.started
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgress {
    fn on_conversion_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} pages  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total_pages: usize) {
        if let Ok(mut m) = self.started.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, text_len: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = match error.char_indices().nth(80) {
            Some((cut, _)) => format!("{}…", &error[..cut]),
            None => error.to_string(),
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total_pages,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_translation_start(&self, language: &str) {
        self.bar.set_prefix("Translating");
        self.bar.set_message(format!("document → {language}"));
    }

    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.set_message(String::new());
        let failed = self.errors.load(Ordering::SeqCst);
        let mark = match failed {
            0 => green("✔"),
            f if f == total_pages => red("✘"),
            _ => cyan("⚠"),
        };
        self.bar.println(format!(
            "{} {}/{} pages extracted",
            mark,
            bold(&success_count.to_string()),
            total_pages
        ));
    }
}

// ── Arguments ───────────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Datasheet to stdout
  datasheet2md lm317.pdf

  # One file per page plus lm317_full.md
  datasheet2md lm317.pdf --output-dir out/

  # Pages 3-12, translated into German in a second pass per page
  datasheet2md --pages 3-12 --translate German --translation-mode page stm32.pdf -o stm32.de.md

  # Self-hosted OpenAI-compatible server
  datasheet2md --api-url http://localhost:8000/v1/chat/completions --model qwen2-vl ds.pdf

  # PDF metadata only (no API key needed)
  datasheet2md --inspect-only lm317.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI key (also used for --api-url endpoints)
  OPENAI_API_URL          OpenAI-compatible chat-completions URL
  ANTHROPIC_API_KEY       Anthropic key
  GEMINI_API_KEY          Google Gemini key
  DATASHEET2MD_PROVIDER   Provider name (openai, anthropic, gemini, ollama, …)
  DATASHEET2MD_MODEL      Model id (default gpt-4o)
  PDFIUM_LIB_PATH         libpdfium file or the directory containing it
  RUST_LOG                Log filter, overrides -v / -q
"#;

/// Convert PDF datasheets to Markdown with a multimodal model.
#[derive(Parser, Debug)]
#[command(
    name = "datasheet2md",
    version,
    about = "Convert PDF datasheets to Markdown with a multimodal model",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF path or HTTP/HTTPS URL.
    input: String,

    /// Write the assembled Markdown to this file.
    #[arg(short, long, env = "DATASHEET2MD_OUTPUT", conflicts_with = "output_dir")]
    output: Option<PathBuf>,

    /// Write `{stem}_page_NNN.md` files and `{stem}_full.md` into this directory.
    #[arg(long, env = "DATASHEET2MD_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Model id (default: gpt-4o).
    #[arg(short, long, env = "DATASHEET2MD_MODEL")]
    model: Option<String>,

    /// Provider: openai, anthropic, gemini, ollama, azure, …
    #[arg(long, env = "DATASHEET2MD_PROVIDER")]
    provider: Option<String>,

    /// OpenAI-compatible chat-completions URL; bypasses provider selection.
    #[arg(long, env = "OPENAI_API_URL")]
    api_url: Option<String>,

    /// Bearer key for --api-url (default: OPENAI_API_KEY).
    #[arg(long, env = "DATASHEET2MD_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Page selection: all, 5, 3-15, or 1,3,5.
    #[arg(long, env = "DATASHEET2MD_PAGES", default_value = "all")]
    pages: String,

    /// Previous pages carried as context (0 disables).
    #[arg(short = 'c', long, env = "DATASHEET2MD_CONTEXT_WINDOW", default_value_t = 2)]
    context_window: usize,

    /// Character cap of the carried context.
    #[arg(long, env = "DATASHEET2MD_CONTEXT_MAX_CHARS", default_value_t = 12_000)]
    context_max_chars: usize,

    /// Translate the output into this language.
    #[arg(short, long, env = "DATASHEET2MD_TRANSLATE")]
    translate: Option<String>,

    /// How to translate: inline (during extraction), page (second pass per
    /// page) or document (one pass over the result).
    #[arg(long, env = "DATASHEET2MD_TRANSLATION_MODE", value_enum, default_value = "inline")]
    translation_mode: TranslationArg,

    /// Page separator: none, hr, comment, or a custom string.
    #[arg(long, env = "DATASHEET2MD_SEPARATOR", default_value = "none")]
    separator: String,

    /// Document header: heading, yaml or none.
    #[arg(long, env = "DATASHEET2MD_HEADER", value_enum, default_value = "heading")]
    header: HeaderArg,

    /// Do not insert a table of contents.
    #[arg(long, env = "DATASHEET2MD_NO_TOC")]
    no_toc: bool,

    /// Rendering DPI (72–400).
    #[arg(long, env = "DATASHEET2MD_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Pages larger than this many bytes are downscaled before upload.
    #[arg(long, env = "DATASHEET2MD_MAX_IMAGE_BYTES", default_value_t = 5 * 1024 * 1024)]
    max_image_bytes: usize,

    /// Password for encrypted PDFs.
    #[arg(long, env = "DATASHEET2MD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// File with a custom extraction system prompt.
    #[arg(long, env = "DATASHEET2MD_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max output tokens per model call.
    #[arg(long, env = "DATASHEET2MD_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "DATASHEET2MD_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per model call on transient failures.
    #[arg(long, env = "DATASHEET2MD_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Pause between page requests, in milliseconds.
    #[arg(long, env = "DATASHEET2MD_PAGE_DELAY_MS", default_value_t = 0)]
    page_delay_ms: u64,

    /// Timeout per model call, in seconds.
    #[arg(long, env = "DATASHEET2MD_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Timeout for URL downloads, in seconds.
    #[arg(long, env = "DATASHEET2MD_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print the full conversion result as JSON on stdout (Markdown still goes
    /// to -o or --output-dir when given).
    #[arg(long, env = "DATASHEET2MD_JSON")]
    json: bool,

    /// Print PDF metadata only.
    #[arg(long)]
    inspect_only: bool,

    /// Disable the progress bar.
    #[arg(long, env = "DATASHEET2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Debug-level logs.
    #[arg(short, long, env = "DATASHEET2MD_VERBOSE")]
    verbose: bool,

    /// Errors only.
    #[arg(short, long, env = "DATASHEET2MD_QUIET", conflicts_with = "verbose")]
    quiet: bool,

    /// Also write logs (debug level, no colour) to this file.
    #[arg(long, env = "DATASHEET2MD_LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum TranslationArg {
    Inline,
    Page,
    Document,
}

impl From<TranslationArg> for TranslationMode {
    fn from(v: TranslationArg) -> Self {
        match v {
            TranslationArg::Inline => TranslationMode::Inline,
            TranslationArg::Page => TranslationMode::PerPage,
            TranslationArg::Document => TranslationMode::Document,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum HeaderArg {
    Heading,
    Yaml,
    None,
}

impl From<HeaderArg> for MetadataHeader {
    fn from(v: HeaderArg) -> Self {
        match v {
            HeaderArg::Heading => MetadataHeader::Heading,
            HeaderArg::Yaml => MetadataHeader::YamlFrontMatter,
            HeaderArg::None => MetadataHeader::None,
        }
    }
}

// ── Logging ─────────────────────────────────────────────────────────────────

/// stderr logs filtered by verbosity (`RUST_LOG` wins), plus an optional
/// non-blocking file layer at debug level. The guard must outlive `main`.
fn init_logging(cli: &Cli, show_progress: bool) -> Result<Option<WorkerGuard>> {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    let stderr_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(stderr_filter)
        .boxed();

    let (file_layer, guard) = match cli.log_file {
        Some(ref path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create log directory {}", parent.display()))?;
            }
            let file = std::fs::File::create(path)
                .with_context(|| format!("create log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_filter(EnvFilter::new("datasheet2md=debug,info"))
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;
    Ok(guard)
}

// ── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let _log_guard = init_logging(&cli, show_progress)?;

    if cli.inspect_only {
        return print_metadata(&cli).await;
    }

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgress::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress).await?;

    let output = convert(&cli.input, &config)
        .await
        .context("Conversion failed")?;

    if let Some(ref dir) = cli.output_dir {
        let written = write_dir(&output, dir).await.context("Writing output failed")?;
        if !cli.quiet {
            eprintln!(
                "{}  {} page files  →  {}",
                green("✔"),
                written.pages.len(),
                bold(&written.full.display().to_string())
            );
        }
    } else if let Some(ref path) = cli.output {
        write_file(&output, path).await.context("Writing output failed")?;
        if !cli.quiet {
            eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
        }
    } else if !cli.json {
        io::stdout()
            .lock()
            .write_all(output.markdown.as_bytes())
            .context("Failed to write to stdout")?;
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
    }
    if !cli.quiet {
        print_summary(&output.stats, output.document.translation_error.as_deref());
    }

    Ok(())
}

fn print_summary(stats: &datasheet2md::ConversionStats, translation_error: Option<&str>) {
    eprintln!(
        "   {}/{} pages  {} failed  {} tokens in / {} out  {}ms",
        stats.processed_pages,
        stats.selected_pages,
        stats.failed_pages,
        dim(&stats.total_input_tokens.to_string()),
        dim(&stats.total_output_tokens.to_string()),
        stats.total_duration_ms
    );
    if stats.untranslated_pages > 0 {
        eprintln!(
            "   {} {} pages kept their source text (translation failed)",
            cyan("⚠"),
            stats.untranslated_pages
        );
    }
    if let Some(err) = translation_error {
        eprintln!("   {} document translation failed: {}", cyan("⚠"), err);
    }
}

async fn print_metadata(cli: &Cli) -> Result<()> {
    let mut builder = ConversionConfig::builder().download_timeout_secs(cli.download_timeout);
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    let config = builder.build().context("Invalid configuration")?;
    let meta = inspect(&cli.input, &config)
        .await
        .context("Failed to inspect PDF")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&meta).context("Failed to serialise metadata")?
        );
        return Ok(());
    }
    println!("File:         {}", cli.input);
    let fields = [
        ("Title", &meta.title),
        ("Author", &meta.author),
        ("Subject", &meta.subject),
        ("Creator", &meta.creator),
        ("Producer", &meta.producer),
        ("Created", &meta.creation_date),
        ("Modified", &meta.modification_date),
    ];
    for (label, value) in fields {
        if let Some(v) = value {
            println!("{:<13} {}", format!("{label}:"), v);
        }
    }
    println!("Pages:        {}", meta.page_count);
    println!("PDF version:  {}", meta.pdf_version);
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .dpi(cli.dpi)
        .max_image_bytes(cli.max_image_bytes)
        .pages(parse_pages(&cli.pages)?)
        .context_window(cli.context_window)
        .context_max_chars(cli.context_max_chars)
        .translation(cli.translation_mode.into())
        .page_separator(parse_separator(&cli.separator))
        .metadata_header(cli.header.into())
        .table_of_contents(!cli.no_toc)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .page_delay_ms(cli.page_delay_ms)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref path) = cli.system_prompt {
        let prompt = read_prompt(path).await?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref lang) = cli.translate {
        builder = builder.target_language(lang.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref url) = cli.api_url {
        builder = builder.api_url(url.clone());
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn read_prompt(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read system prompt from {}", path.display()))
}

/// Parse `--pages` into a `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();
    if s == "all" {
        return Ok(PageSelection::All);
    }

    let page = |p: &str| -> Result<usize> {
        let n: usize = p
            .trim()
            .parse()
            .with_context(|| format!("Invalid page number: '{}'", p.trim()))?;
        if n < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {n})");
        }
        Ok(n)
    };

    if let Some((start, end)) = s.split_once('-') {
        let (start, end) = (page(start)?, page(end)?);
        if start > end {
            anyhow::bail!("Invalid page range '{start}-{end}': start must be <= end");
        }
        return Ok(PageSelection::Range(start, end));
    }
    if s.contains(',') {
        let pages = s.split(',').map(page).collect::<Result<Vec<_>>>()?;
        return Ok(PageSelection::Set(pages));
    }
    Ok(PageSelection::Single(page(&s)?))
}

/// Parse `--separator` into a `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "none" => PageSeparator::None,
        "hr" | "---" => PageSeparator::HorizontalRule,
        "comment" => PageSeparator::Comment,
        _ => PageSeparator::Custom(s.to_string()),
    }
}
